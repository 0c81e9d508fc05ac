pub mod catalog;
pub mod config;
pub mod heuristics;
pub mod order;
pub mod order_store;
pub mod pdf_text;
pub mod session;

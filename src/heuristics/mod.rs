// src/heuristics/mod.rs

mod purchase_order;

use crate::catalog::CatalogIndex;
use crate::order::iso_date;
use serde::{Deserialize, Serialize};
use time::Date;

pub use purchase_order::DEFAULT_SYSTEM;

/// A catalog item recognized in the pasted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedLineItem {
    pub sku: String,
    pub name: String,
    pub system: String,
    pub quantity: u32,
}

/// Everything the parser could pull out of one block of order text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedOrderFragment {
    pub order_id: Option<String>,
    /// Falls back to the parse date when the text carries none.
    #[serde(with = "iso_date")]
    pub order_date: Date,
    /// Whether `order_date` came from the text rather than the fallback.
    pub date_found: bool,
    pub supplier: Option<String>,
    pub items: Vec<ParsedLineItem>,
}

impl ParsedOrderFragment {
    /// How many header fields were recognized (out of order id, date, supplier).
    pub fn coverage(&self) -> (usize, usize) {
        let total = 3;
        let filled = [self.order_id.is_some(), self.date_found, self.supplier.is_some()]
            .iter()
            .filter(|&&v| v)
            .count();
        (filled, total)
    }
}

/// Parse order text, falling back to today's date.
pub fn parse_order_text(text: &str, index: &CatalogIndex) -> ParsedOrderFragment {
    purchase_order::parse(text, index, crate::order::today())
}


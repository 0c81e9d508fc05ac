// src/order.rs

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, OffsetDateTime};

time::serde::format_description!(pub iso_date, Date, "[year]-[month]-[day]");

/// Parse an ISO `YYYY-MM-DD` calendar date.
pub fn parse_iso_date(s: &str) -> Result<Date, time::error::Parse> {
    Date::parse(s.trim(), format_description!("[year]-[month]-[day]"))
}

/// Render a date as ISO `YYYY-MM-DD`.
pub fn format_iso_date(date: Date) -> Result<String, time::error::Format> {
    date.format(format_description!("[year]-[month]-[day]"))
}

pub fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Where the goods of an order end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Normal,
    Project,
}

/// Status stored on the saved record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "Lager")]
    Stock,
    #[serde(rename = "Projekt")]
    Project,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Stock => "Lager",
            OrderStatus::Project => "Projekt",
        }
    }

    pub fn from_stored(s: &str) -> Self {
        if s == "Projekt" {
            OrderStatus::Project
        } else {
            OrderStatus::Stock
        }
    }
}

impl From<Option<OrderType>> for OrderStatus {
    fn from(order_type: Option<OrderType>) -> Self {
        match order_type {
            Some(OrderType::Project) => OrderStatus::Project,
            _ => OrderStatus::Stock,
        }
    }
}

/// One line of a saved order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRecord {
    pub sku: String,
    pub name: String,
    pub quantity_expected: u32,
    pub quantity_received: u32,
    pub is_added_later: bool,
    pub is_deleted: bool,
}

/// An order as handed to, and returned from, persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: String,
    pub supplier: String,
    #[serde(with = "iso_date")]
    pub date_created: Date,
    #[serde(with = "iso_date::option", default)]
    pub expected_delivery_date: Option<Date>,
    pub status: OrderStatus,
    pub is_archived: bool,
    pub items: Vec<OrderLineRecord>,
}

impl PurchaseOrder {
    pub fn line(&self, sku: &str) -> Option<&OrderLineRecord> {
        self.items.iter().find(|l| l.sku == sku)
    }
}

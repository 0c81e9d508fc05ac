use super::{ParsedLineItem, ParsedOrderFragment};
use crate::catalog::{CatalogIndex, CatalogItem};
use once_cell::sync::Lazy;
use regex::Regex;
use time::{Date, Month};
use tracing::debug;

/// System label for matched items whose catalog entry has none.
pub const DEFAULT_SYSTEM: &str = "Sonstiges";

/// Tokens shorter than this are never looked up as SKUs.
const MIN_TOKEN_LEN: usize = 3;

// "03.11.2024", "3.11.24"
static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]{1,2})\.([0-9]{1,2})\.([0-9]{2,4})").unwrap());

// "Nr. 4711", "Bestellung: PO-2024-7", "PO# 789", "Auftrag 2024/55"
static ORDER_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:Nr\.?|#|Bestellung|Order|Auftrag)\s*[:.]?\s*([A-Za-z0-9\-/]{3,})").unwrap()
});

// "10x", "10 Stk", "4 pcs", "2 Pack"
static QTY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)([0-9]+)\s*(?:x|stk|st|pcs|Pack)").unwrap());

// Tabular layout: "10   4000123   Bleiakku"
static LEADING_QTY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([0-9]+)\s+").unwrap());

/// Line-by-line scan. Header fields keep their first match, items keep line order.
pub fn parse(text: &str, index: &CatalogIndex, today: Date) -> ParsedOrderFragment {
    let mut order_id: Option<String> = None;
    let mut order_date: Option<Date> = None;
    let mut supplier: Option<String> = None;
    let mut first_manufacturer: Option<String> = None;
    let mut items = Vec::new();

    for line in text.lines() {
        if order_date.is_none() {
            order_date = extract_date(line);
        }
        if order_id.is_none() {
            order_id = extract_order_id(line);
        }
        if supplier.is_none() {
            supplier = index
                .hints
                .find_in(&line.to_lowercase())
                .map(str::to_string);
        }

        let Some(found) = match_item(line, index) else {
            continue;
        };

        let quantity = extract_quantity(line);
        debug!(sku = %found.sku, quantity, "Matched catalog item");

        if first_manufacturer.is_none() {
            first_manufacturer = found.manufacturer.clone().filter(|m| !m.is_empty());
        }

        items.push(ParsedLineItem {
            sku: found.sku.clone(),
            name: found.name.clone(),
            system: found
                .system
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SYSTEM.to_string()),
            quantity,
        });
    }

    // No explicit hint anywhere: guess from the first recognized item.
    if supplier.is_none() {
        supplier = first_manufacturer;
    }

    let fragment = ParsedOrderFragment {
        order_id,
        date_found: order_date.is_some(),
        order_date: order_date.unwrap_or(today),
        supplier,
        items,
    };

    let (filled, total) = fragment.coverage();
    debug!(
        filled,
        total,
        items = fragment.items.len(),
        order_id = ?fragment.order_id,
        supplier = ?fragment.supplier,
        "Order text parsed"
    );
    fragment
}

/// `D(D).M(M).YY(YY)`; two-digit years are 20xx. Impossible dates are skipped.
fn extract_date(line: &str) -> Option<Date> {
    let cap = DATE_RE.captures(line)?;
    let day: u8 = cap[1].parse().ok()?;
    let month: u8 = cap[2].parse().ok()?;
    let year: i32 = match cap[3].len() {
        2 => 2000 + cap[3].parse::<i32>().ok()?,
        4 => cap[3].parse().ok()?,
        _ => return None,
    };
    Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
}

fn extract_order_id(line: &str) -> Option<String> {
    ORDER_ID_RE.captures(line).map(|c| c[1].to_string())
}

/// First token of the line that resolves to a catalog SKU.
fn match_item<'a>(line: &str, index: &'a CatalogIndex) -> Option<&'a CatalogItem> {
    line.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| token.len() >= MIN_TOKEN_LEN)
        .find_map(|token| index.skus.get(token))
}

/// Unit-marked quantity, else a leading number, else 1.
fn extract_quantity(line: &str) -> u32 {
    let positive = |s: &str| s.parse::<u32>().ok().filter(|q| *q >= 1);

    QTY_RE
        .captures(line)
        .and_then(|c| positive(&c[1]))
        .or_else(|| LEADING_QTY_RE.captures(line).and_then(|c| positive(&c[1])))
        .unwrap_or(1)
}

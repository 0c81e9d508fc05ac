// src/session.rs

use crate::catalog::{Catalog, CatalogItem};
use crate::heuristics::{DEFAULT_SYSTEM, ParsedLineItem, ParsedOrderFragment};
use crate::order::{OrderLineRecord, OrderStatus, OrderType, PurchaseOrder};
use async_trait::async_trait;
use thiserror::Error as ThisError;
use time::Date;
use tracing::{info, warn};

/// System label for lines reopened from a stored order whose SKU left the catalog.
const FALLBACK_SYSTEM: &str = "Bestand";

///
/// SessionError
///

#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum SessionError {
    #[error("item {sku} is already on the order")]
    DuplicateSku { sku: String },

    #[error("no line at position {index}")]
    NoSuchLine { index: usize },

    #[error("line {index} is not marked as deleted")]
    NotDeleted { index: usize },

    #[error("manual item needs a {field}")]
    MissingItemField { field: &'static str },

    #[error("quantity must be at least 1")]
    InvalidQuantity,

    #[error("missing required fields: {}", .0.join(", "))]
    Incomplete(Vec<&'static str>),

    #[error("order has no active lines")]
    NoActiveLines,
}

/// Collaborator that turns a finished order into a saved record.
#[async_trait]
pub trait OrderSink: Send + Sync {
    async fn save_order(
        &self,
        order: &PurchaseOrder,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Observable state of the one asynchronous step, the save.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubmissionStatus {
    #[default]
    Idle,
    Submitting,
    Succeeded,
    Failed(String),
}

/// Result of importing a parsed fragment into the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported(usize),
    NoItemsRecognized,
}

/// Header fields of the order being edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderHeader {
    pub order_id: String,
    pub supplier: String,
    pub order_date: Date,
    pub expected_delivery_date: Option<Date>,
    pub order_type: Option<OrderType>,
}

/// A working line item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub sku: String,
    pub name: String,
    pub system: String,
    pub quantity: u32,
    /// Inserted while editing an order that already existed.
    pub added_later: bool,
    /// Soft-delete marker; only ever set on persisted lines.
    pub deleted: bool,
    /// Existed before this session began.
    pub persisted: bool,
}

impl CartLine {
    fn from_parsed(item: ParsedLineItem) -> Self {
        Self {
            sku: item.sku,
            name: item.name,
            system: item.system,
            quantity: item.quantity,
            added_later: false,
            deleted: false,
            persisted: true,
        }
    }
}

/// The single-owner working state of one create or edit workflow.
#[derive(Debug, Clone)]
pub struct OrderSession {
    pub header: OrderHeader,
    lines: Vec<CartLine>,
    original: Option<PurchaseOrder>,
    status: SubmissionStatus,
}

impl OrderSession {
    /// Start a new order dated `today`.
    pub fn create(today: Date) -> Self {
        Self {
            header: OrderHeader {
                order_id: String::new(),
                supplier: String::new(),
                order_date: today,
                expected_delivery_date: None,
                order_type: None,
            },
            lines: Vec::new(),
            original: None,
            status: SubmissionStatus::Idle,
        }
    }

    /// Reopen a stored order. Every existing line counts as persisted.
    pub fn edit(order: PurchaseOrder, catalog: &Catalog) -> Self {
        let lines = order
            .items
            .iter()
            .map(|i| CartLine {
                sku: i.sku.clone(),
                name: i.name.clone(),
                system: catalog
                    .find_by_sku(&i.sku)
                    .and_then(|c| c.system.clone())
                    .unwrap_or_else(|| FALLBACK_SYSTEM.to_string()),
                quantity: i.quantity_expected,
                added_later: i.is_added_later,
                deleted: i.is_deleted,
                persisted: true,
            })
            .collect();

        let header = OrderHeader {
            order_id: order.id.clone(),
            supplier: order.supplier.clone(),
            order_date: order.date_created,
            expected_delivery_date: order.expected_delivery_date,
            order_type: Some(match order.status {
                OrderStatus::Project => OrderType::Project,
                OrderStatus::Stock => OrderType::Normal,
            }),
        };

        info!(order_id = %order.id, lines = order.items.len(), "Editing existing order");
        Self {
            header,
            lines,
            original: Some(order),
            status: SubmissionStatus::Idle,
        }
    }

    pub fn is_editing(&self) -> bool {
        self.original.is_some()
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn status(&self) -> &SubmissionStatus {
        &self.status
    }

    pub fn has_active_lines(&self) -> bool {
        self.lines.iter().any(|l| !l.deleted)
    }

    fn line_mut(&mut self, index: usize) -> Result<&mut CartLine, SessionError> {
        self.lines
            .get_mut(index)
            .ok_or(SessionError::NoSuchLine { index })
    }

    fn push_new(&mut self, sku: String, name: String, system: String) {
        let added_later = self.is_editing();
        self.lines.push(CartLine {
            sku,
            name,
            system,
            quantity: 1,
            added_later,
            deleted: false,
            persisted: false,
        });
    }

    /// Add a catalog item, reviving a soft-deleted line with the same SKU.
    pub fn add_from_catalog(&mut self, item: &CatalogItem) -> Result<(), SessionError> {
        match self.lines.iter().position(|l| l.sku == item.sku) {
            Some(index) if self.lines[index].deleted => self.restore(index),
            Some(_) => Err(SessionError::DuplicateSku {
                sku: item.sku.clone(),
            }),
            None => {
                self.push_new(
                    item.sku.clone(),
                    item.name.clone(),
                    item.system
                        .clone()
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| DEFAULT_SYSTEM.to_string()),
                );
                Ok(())
            }
        }
    }

    /// Add a manually entered item that is not in the catalog. Name and SKU
    /// are required; an empty system falls back to the default label.
    pub fn add_new(&mut self, name: &str, sku: &str, system: &str) -> Result<(), SessionError> {
        let (name, sku, system) = (name.trim(), sku.trim(), system.trim());
        if name.is_empty() {
            return Err(SessionError::MissingItemField { field: "name" });
        }
        if sku.is_empty() {
            return Err(SessionError::MissingItemField { field: "sku" });
        }
        let system = if system.is_empty() {
            DEFAULT_SYSTEM
        } else {
            system
        };
        self.push_new(sku.to_string(), name.to_string(), system.to_string());
        Ok(())
    }

    pub fn set_quantity(&mut self, index: usize, quantity: u32) -> Result<(), SessionError> {
        if quantity == 0 {
            return Err(SessionError::InvalidQuantity);
        }
        self.line_mut(index)?.quantity = quantity;
        Ok(())
    }

    /// Soft-delete a persisted line; drop a line that only exists in this session.
    pub fn remove(&mut self, index: usize) -> Result<(), SessionError> {
        if self.line_mut(index)?.persisted {
            self.lines[index].deleted = true;
        } else {
            self.lines.remove(index);
        }
        Ok(())
    }

    pub fn restore(&mut self, index: usize) -> Result<(), SessionError> {
        let line = self.line_mut(index)?;
        if !line.deleted {
            return Err(SessionError::NotDeleted { index });
        }
        line.deleted = false;
        Ok(())
    }

    /// Throw away the working set and take the parsed items as-is.
    pub fn replace_all(&mut self, items: Vec<ParsedLineItem>) {
        self.lines = items.into_iter().map(CartLine::from_parsed).collect();
    }

    /// Fold a parse result into the session. Only non-empty values overwrite.
    pub fn apply_fragment(&mut self, fragment: ParsedOrderFragment) -> ImportOutcome {
        if let Some(id) = fragment.order_id.filter(|s| !s.is_empty()) {
            self.header.order_id = id;
        }
        if let Some(supplier) = fragment.supplier.filter(|s| !s.is_empty()) {
            self.header.supplier = supplier;
        }
        self.header.order_date = fragment.order_date;

        if fragment.items.is_empty() {
            warn!("No known items found in imported text");
            return ImportOutcome::NoItemsRecognized;
        }

        let count = fragment.items.len();
        self.replace_all(fragment.items);
        info!(count, "Imported lines from text");
        ImportOutcome::Imported(count)
    }

    /// Line records ready for persistence. Received quantities come from the
    /// order as it was when the session opened.
    pub fn finalize(&self) -> Vec<OrderLineRecord> {
        self.lines
            .iter()
            .map(|l| OrderLineRecord {
                sku: l.sku.clone(),
                name: l.name.clone(),
                quantity_expected: l.quantity,
                quantity_received: self
                    .original
                    .as_ref()
                    .and_then(|o| o.line(&l.sku))
                    .map_or(0, |o| o.quantity_received),
                is_added_later: l.added_later,
                is_deleted: l.deleted,
            })
            .collect()
    }

    pub fn to_purchase_order(&self) -> PurchaseOrder {
        PurchaseOrder {
            id: self.header.order_id.clone(),
            supplier: self.header.supplier.clone(),
            date_created: self.header.order_date,
            expected_delivery_date: self.header.expected_delivery_date,
            status: OrderStatus::from(self.header.order_type),
            is_archived: false,
            items: self.finalize(),
        }
    }

    /// Check the order is complete enough to save.
    pub fn validate(&self, require_delivery_date: bool) -> Result<(), SessionError> {
        let mut missing = Vec::new();
        if self.header.order_id.trim().is_empty() {
            missing.push("order_id");
        }
        if self.header.supplier.trim().is_empty() {
            missing.push("supplier");
        }
        if self.header.order_type.is_none() {
            missing.push("order_type");
        }
        if require_delivery_date && self.header.expected_delivery_date.is_none() {
            missing.push("expected_delivery_date");
        }
        if !missing.is_empty() {
            return Err(SessionError::Incomplete(missing));
        }
        if !self.has_active_lines() {
            return Err(SessionError::NoActiveLines);
        }
        Ok(())
    }

    /// Validate and move to `Submitting`. The returned order is what the
    /// caller hands to its store before calling [`complete_submit`].
    ///
    /// [`complete_submit`]: OrderSession::complete_submit
    pub fn begin_submit(&mut self, require_delivery_date: bool) -> Result<PurchaseOrder, SessionError> {
        self.validate(require_delivery_date)?;

        let order = self.to_purchase_order();
        self.status = SubmissionStatus::Submitting;
        info!(order_id = %self.header.order_id, lines = order.items.len(), "Submitting order");
        Ok(order)
    }

    /// Record the outcome of the save. A failure keeps the working set so
    /// the caller can retry.
    pub fn complete_submit<E: std::fmt::Display>(&mut self, result: Result<(), E>) -> &SubmissionStatus {
        self.status = match result {
            Ok(()) => {
                info!(order_id = %self.header.order_id, "Order saved");
                SubmissionStatus::Succeeded
            }
            Err(e) => {
                tracing::error!(error = %e, order_id = %self.header.order_id, "Saving order failed");
                SubmissionStatus::Failed(e.to_string())
            }
        };
        &self.status
    }

    /// Validate, then hand the order to `sink`.
    pub async fn submit(
        &mut self,
        sink: &dyn OrderSink,
        require_delivery_date: bool,
    ) -> Result<&SubmissionStatus, SessionError> {
        let order = self.begin_submit(require_delivery_date)?;
        let result = sink.save_order(&order).await;
        Ok(self.complete_submit(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use time::macros::date;

    fn catalog_item(sku: &str, name: &str) -> CatalogItem {
        CatalogItem {
            sku: sku.to_string(),
            name: name.to_string(),
            manufacturer: None,
            system: Some("Akku".to_string()),
        }
    }

    fn parsed(sku: &str, quantity: u32) -> ParsedLineItem {
        ParsedLineItem {
            sku: sku.to_string(),
            name: format!("item {sku}"),
            system: DEFAULT_SYSTEM.to_string(),
            quantity,
        }
    }

    fn stored_order() -> PurchaseOrder {
        PurchaseOrder {
            id: "PO-1".to_string(),
            supplier: "Varta AG".to_string(),
            date_created: date!(2024 - 11 - 03),
            expected_delivery_date: None,
            status: OrderStatus::Project,
            is_archived: false,
            items: vec![
                OrderLineRecord {
                    sku: "1000".to_string(),
                    name: "Akku".to_string(),
                    quantity_expected: 10,
                    quantity_received: 4,
                    is_added_later: false,
                    is_deleted: false,
                },
                OrderLineRecord {
                    sku: "2000".to_string(),
                    name: "Kabel".to_string(),
                    quantity_expected: 2,
                    quantity_received: 0,
                    is_added_later: false,
                    is_deleted: true,
                },
            ],
        }
    }

    fn ready(session: &mut OrderSession) {
        session.header.order_id = "PO-9".to_string();
        session.header.supplier = "Varta AG".to_string();
        session.header.order_type = Some(OrderType::Normal);
        session.add_new("Akku", "1000", "").unwrap();
    }

    #[derive(Default)]
    struct RecordingSink {
        saved: Mutex<Vec<PurchaseOrder>>,
        fail: bool,
    }

    #[async_trait]
    impl OrderSink for RecordingSink {
        async fn save_order(
            &self,
            order: &PurchaseOrder,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            if self.fail {
                return Err("store offline".into());
            }
            self.saved.lock().unwrap().push(order.clone());
            Ok(())
        }
    }

    #[test]
    fn test_add_from_catalog_tags_by_mode() {
        let mut create = OrderSession::create(date!(2025 - 01 - 01));
        create.add_from_catalog(&catalog_item("3000", "Neu")).unwrap();
        assert!(!create.lines()[0].added_later);
        assert!(!create.lines()[0].persisted);
        assert_eq!(create.lines()[0].quantity, 1);

        let mut edit = OrderSession::edit(stored_order(), &Catalog::default());
        edit.add_from_catalog(&catalog_item("3000", "Neu")).unwrap();
        assert!(edit.lines()[2].added_later);
        assert!(!edit.lines()[2].persisted);
    }

    #[test]
    fn test_add_from_catalog_duplicate_is_rejected_without_change() {
        let mut session = OrderSession::edit(stored_order(), &Catalog::default());
        let before = session.lines().to_vec();
        let err = session
            .add_from_catalog(&catalog_item("1000", "Akku"))
            .unwrap_err();
        assert_eq!(err, SessionError::DuplicateSku { sku: "1000".to_string() });
        assert_eq!(session.lines(), before.as_slice());
    }

    #[test]
    fn test_add_from_catalog_revives_deleted_line() {
        let mut session = OrderSession::edit(stored_order(), &Catalog::default());
        session.add_from_catalog(&catalog_item("2000", "Kabel")).unwrap();
        assert_eq!(session.lines().len(), 2);
        assert!(!session.lines()[1].deleted);
    }

    #[test]
    fn test_add_new_skips_duplicate_check() {
        let mut session = OrderSession::create(date!(2025 - 01 - 01));
        session.add_new("Sonderteil", "X-1", "").unwrap();
        session.add_new("Sonderteil", "X-1", "Akku").unwrap();
        assert_eq!(session.lines().len(), 2);
        assert_eq!(session.lines()[0].system, DEFAULT_SYSTEM);
        assert_eq!(session.lines()[1].system, "Akku");
    }

    #[test]
    fn test_add_new_requires_name_and_sku() {
        let mut session = OrderSession::create(date!(2025 - 01 - 01));
        assert_eq!(
            session.add_new("", "", ""),
            Err(SessionError::MissingItemField { field: "name" })
        );
        assert_eq!(
            session.add_new("Sonderteil", "   ", "Akku"),
            Err(SessionError::MissingItemField { field: "sku" })
        );
        assert!(session.lines().is_empty());

        session.add_new("  Sonderteil ", " X-1", " ").unwrap();
        assert_eq!(session.lines()[0].name, "Sonderteil");
        assert_eq!(session.lines()[0].sku, "X-1");
        assert_eq!(session.lines()[0].system, DEFAULT_SYSTEM);
    }

    #[test]
    fn test_remove_persisted_line_only_flags_it() {
        let mut session = OrderSession::edit(stored_order(), &Catalog::default());
        let before = session.lines()[0].clone();
        session.remove(0).unwrap();
        assert_eq!(session.lines().len(), 2);
        assert!(session.lines()[0].deleted);

        session.restore(0).unwrap();
        assert_eq!(session.lines()[0], before);
    }

    #[test]
    fn test_remove_new_line_drops_it() {
        let mut session = OrderSession::edit(stored_order(), &Catalog::default());
        session.add_new("Neu", "3000", "").unwrap();
        assert_eq!(session.lines().len(), 3);
        session.remove(2).unwrap();
        assert_eq!(session.lines().len(), 2);
    }

    #[test]
    fn test_invalid_line_operations() {
        let mut session = OrderSession::edit(stored_order(), &Catalog::default());
        assert_eq!(session.remove(9), Err(SessionError::NoSuchLine { index: 9 }));
        assert_eq!(session.restore(0), Err(SessionError::NotDeleted { index: 0 }));
        assert_eq!(session.set_quantity(0, 0), Err(SessionError::InvalidQuantity));
        assert_eq!(session.lines()[0].quantity, 10);
    }

    #[test]
    fn test_finalize_keeps_received_quantities() {
        let mut session = OrderSession::edit(stored_order(), &Catalog::default());
        session.set_quantity(0, 3).unwrap();
        session.set_quantity(0, 25).unwrap();
        session.add_new("Neu", "3000", "").unwrap();

        let records = session.finalize();
        assert_eq!(records[0].quantity_expected, 25);
        assert_eq!(records[0].quantity_received, 4);
        assert!(records[1].is_deleted);
        assert_eq!(records[2].quantity_received, 0);
        assert!(records[2].is_added_later);
    }

    #[test]
    fn test_replace_all_discards_manual_edits() {
        let mut session = OrderSession::edit(stored_order(), &Catalog::default());
        session.add_new("Manuell", "9999", "").unwrap();
        session.replace_all(vec![parsed("1000", 7)]);

        let records = session.finalize();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sku, "1000");
        assert_eq!(records[0].quantity_expected, 7);
        assert_eq!(records[0].quantity_received, 4);
        assert!(session.lines()[0].persisted);
        assert!(!session.lines()[0].added_later);
    }

    #[test]
    fn test_apply_fragment_only_overwrites_with_values() {
        let mut session = OrderSession::create(date!(2025 - 01 - 01));
        session.header.supplier = "Akku-Tech".to_string();
        session.add_new("Manuell", "9999", "").unwrap();

        let outcome = session.apply_fragment(ParsedOrderFragment {
            order_id: Some("PO-2024-7".to_string()),
            order_date: date!(2024 - 11 - 03),
            date_found: true,
            supplier: None,
            items: vec![],
        });
        assert_eq!(outcome, ImportOutcome::NoItemsRecognized);
        assert_eq!(session.header.order_id, "PO-2024-7");
        assert_eq!(session.header.supplier, "Akku-Tech");
        assert_eq!(session.header.order_date, date!(2024 - 11 - 03));
        assert_eq!(session.lines().len(), 1);

        let outcome = session.apply_fragment(ParsedOrderFragment {
            order_id: None,
            order_date: date!(2024 - 11 - 03),
            date_found: true,
            supplier: Some("Varta AG".to_string()),
            items: vec![parsed("1000", 2), parsed("2000", 1)],
        });
        assert_eq!(outcome, ImportOutcome::Imported(2));
        assert_eq!(session.header.order_id, "PO-2024-7");
        assert_eq!(session.header.supplier, "Varta AG");
        assert_eq!(session.lines().len(), 2);
    }

    #[test]
    fn test_edit_restores_header_and_systems() {
        let catalog = Catalog::new(vec![catalog_item("1000", "Akku")]);
        let session = OrderSession::edit(stored_order(), &catalog);
        assert!(session.is_editing());
        assert_eq!(session.header.order_type, Some(OrderType::Project));
        assert_eq!(session.lines()[0].system, "Akku");
        assert_eq!(session.lines()[1].system, FALLBACK_SYSTEM);
        assert_eq!(session.to_purchase_order().status, OrderStatus::Project);
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let mut session = OrderSession::create(date!(2025 - 01 - 01));
        assert_eq!(
            session.validate(true),
            Err(SessionError::Incomplete(vec![
                "order_id",
                "supplier",
                "order_type",
                "expected_delivery_date"
            ]))
        );
        ready(&mut session);
        assert_eq!(session.validate(false), Ok(()));
        session.remove(0).unwrap();
        assert_eq!(session.validate(false), Err(SessionError::NoActiveLines));
    }

    #[tokio::test]
    async fn test_submit_success() {
        let sink = RecordingSink::default();
        let mut session = OrderSession::create(date!(2025 - 01 - 01));
        assert_eq!(session.status(), &SubmissionStatus::Idle);
        ready(&mut session);

        let status = session.submit(&sink, false).await.unwrap();
        assert_eq!(status, &SubmissionStatus::Succeeded);
        let saved = sink.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id, "PO-9");
        assert_eq!(saved[0].status, OrderStatus::Stock);
    }

    #[tokio::test]
    async fn test_submit_failure_keeps_working_set() {
        let sink = RecordingSink {
            fail: true,
            ..Default::default()
        };
        let mut session = OrderSession::create(date!(2025 - 01 - 01));
        ready(&mut session);

        let status = session.submit(&sink, false).await.unwrap().clone();
        assert_eq!(status, SubmissionStatus::Failed("store offline".to_string()));
        assert_eq!(session.lines().len(), 1);

        let ok = RecordingSink::default();
        assert_eq!(
            session.submit(&ok, false).await.unwrap(),
            &SubmissionStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn test_status_is_submitting_while_save_is_pending() {
        let sink = RecordingSink::default();
        let mut session = OrderSession::create(date!(2025 - 01 - 01));
        ready(&mut session);

        let order = session.begin_submit(false).unwrap();
        assert_eq!(session.status(), &SubmissionStatus::Submitting);
        assert_eq!(order.id, "PO-9");

        let result = sink.save_order(&order).await;
        assert_eq!(session.complete_submit(result), &SubmissionStatus::Succeeded);
        assert_eq!(sink.saved.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_save_is_recorded_with_reason() {
        let mut session = OrderSession::create(date!(2025 - 01 - 01));
        ready(&mut session);
        session.begin_submit(false).unwrap();
        let status = session.complete_submit(Err("disk full"));
        assert_eq!(status, &SubmissionStatus::Failed("disk full".to_string()));
        assert_eq!(session.lines().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_rejects_incomplete_order() {
        let sink = RecordingSink::default();
        let mut session = OrderSession::create(date!(2025 - 01 - 01));
        assert!(session.submit(&sink, false).await.is_err());
        assert_eq!(session.status(), &SubmissionStatus::Idle);
        assert!(sink.saved.lock().unwrap().is_empty());
    }
}

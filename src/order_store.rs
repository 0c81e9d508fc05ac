use crate::order::{OrderLineRecord, OrderStatus, PurchaseOrder, format_iso_date, parse_iso_date};
use crate::session::OrderSink;
use async_trait::async_trait;
use rusqlite::{Connection, Result as SqliteResult, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

pub struct OrderStore {
    conn: Mutex<Connection>,
}

impl OrderStore {
    /// Create a new order store with SQLite backend
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        // Create orders table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                supplier TEXT NOT NULL,
                date_created TEXT NOT NULL,
                expected_delivery_date TEXT,
                status TEXT NOT NULL,
                is_archived INTEGER NOT NULL DEFAULT 0,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        // Create order_items table, one row per line in entry order
        conn.execute(
            "CREATE TABLE IF NOT EXISTS order_items (
                order_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                sku TEXT NOT NULL,
                name TEXT NOT NULL,
                quantity_expected INTEGER NOT NULL,
                quantity_received INTEGER NOT NULL DEFAULT 0,
                is_added_later INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (order_id, position),
                FOREIGN KEY (order_id) REFERENCES orders(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_order_items_sku ON order_items(sku)",
            [],
        )?;

        info!("Database initialized successfully");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // poisoning leaves the connection usable
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or replace an order together with all of its lines.
    pub fn upsert_order(&self, order: &PurchaseOrder) -> SqliteResult<()> {
        let to_sql = |e: time::error::Format| rusqlite::Error::ToSqlConversionFailure(Box::new(e));
        let date_created = format_iso_date(order.date_created).map_err(to_sql)?;
        let expected_delivery_date = order
            .expected_delivery_date
            .map(format_iso_date)
            .transpose()
            .map_err(to_sql)?;

        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO orders
                (id, supplier, date_created, expected_delivery_date, status, is_archived)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                supplier = excluded.supplier,
                date_created = excluded.date_created,
                expected_delivery_date = excluded.expected_delivery_date,
                status = excluded.status,
                is_archived = excluded.is_archived,
                updated_at = CURRENT_TIMESTAMP",
            params![
                order.id,
                order.supplier,
                date_created,
                expected_delivery_date,
                order.status.as_str(),
                order.is_archived,
            ],
        )?;

        tx.execute(
            "DELETE FROM order_items WHERE order_id = ?1",
            params![order.id],
        )?;

        for (position, item) in order.items.iter().enumerate() {
            tx.execute(
                "INSERT INTO order_items
                    (order_id, position, sku, name, quantity_expected, quantity_received, is_added_later, is_deleted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    order.id,
                    position as i64,
                    item.sku,
                    item.name,
                    item.quantity_expected,
                    item.quantity_received,
                    item.is_added_later,
                    item.is_deleted,
                ],
            )?;
        }

        tx.commit()?;
        info!(id = %order.id, lines = order.items.len(), "Order stored");
        Ok(())
    }

    /// Get order by id, with its lines in entry order
    pub fn get_order(&self, id: &str) -> SqliteResult<Option<PurchaseOrder>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, supplier, date_created, expected_delivery_date, status, is_archived
             FROM orders
             WHERE id = ?1",
        )?;

        let mut rows = stmt.query(params![id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let date_created: String = row.get(2)?;
        let expected: Option<String> = row.get(3)?;
        let status: String = row.get(4)?;

        let mut order = PurchaseOrder {
            id: row.get(0)?,
            supplier: row.get(1)?,
            date_created: parse_stored_date(2, &date_created)?,
            expected_delivery_date: expected
                .as_deref()
                .map(|d| parse_stored_date(3, d))
                .transpose()?,
            status: OrderStatus::from_stored(&status),
            is_archived: row.get(5)?,
            items: Vec::new(),
        };

        let mut stmt = conn.prepare(
            "SELECT sku, name, quantity_expected, quantity_received, is_added_later, is_deleted
             FROM order_items
             WHERE order_id = ?1
             ORDER BY position",
        )?;
        let items = stmt.query_map(params![id], |row| Self::row_to_line(row))?;
        order.items = items.collect::<SqliteResult<_>>()?;

        Ok(Some(order))
    }

    /// Helper: map a row with the 6-column line projection to `OrderLineRecord`.
    fn row_to_line(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrderLineRecord> {
        Ok(OrderLineRecord {
            sku: row.get(0)?,
            name: row.get(1)?,
            quantity_expected: row.get(2)?,
            quantity_received: row.get(3)?,
            is_added_later: row.get(4)?,
            is_deleted: row.get(5)?,
        })
    }

    /// Record goods arriving for one line of an order.
    pub fn set_quantity_received(
        &self,
        order_id: &str,
        sku: &str,
        quantity_received: u32,
    ) -> SqliteResult<usize> {
        let updated = self.conn().execute(
            "UPDATE order_items SET quantity_received = ?1 WHERE order_id = ?2 AND sku = ?3",
            params![quantity_received, order_id, sku],
        )?;
        info!(order_id = %order_id, sku = %sku, quantity_received, "Received quantity updated");
        Ok(updated)
    }

    /// Get all order ids, newest first
    pub fn get_order_ids(&self) -> SqliteResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id FROM orders ORDER BY date_created DESC, id")?;
        let ids = stmt.query_map([], |row| row.get(0))?;
        ids.collect()
    }

    /// Get count of orders, lines, and soft-deleted lines
    pub fn get_counts(&self) -> SqliteResult<(usize, usize, usize)> {
        let conn = self.conn();
        let total_orders: usize =
            conn.query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))?;

        let total_lines: usize =
            conn.query_row("SELECT COUNT(*) FROM order_items", [], |row| row.get(0))?;

        let deleted_lines: usize = conn.query_row(
            "SELECT COUNT(*) FROM order_items WHERE is_deleted = 1",
            [],
            |row| row.get(0),
        )?;

        Ok((total_orders, total_lines, deleted_lines))
    }
}

fn parse_stored_date(column: usize, value: &str) -> SqliteResult<time::Date> {
    parse_iso_date(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[async_trait]
impl OrderSink for OrderStore {
    async fn save_order(
        &self,
        order: &PurchaseOrder,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.upsert_order(order)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::order::OrderType;
    use crate::session::{OrderSession, SubmissionStatus};
    use time::macros::date;

    fn sample_order() -> PurchaseOrder {
        PurchaseOrder {
            id: "PO-2024-7".to_string(),
            supplier: "Varta AG".to_string(),
            date_created: date!(2024 - 11 - 03),
            expected_delivery_date: Some(date!(2024 - 12 - 01)),
            status: OrderStatus::Project,
            is_archived: false,
            items: vec![
                OrderLineRecord {
                    sku: "4000123".to_string(),
                    name: "Bleiakku".to_string(),
                    quantity_expected: 5,
                    quantity_received: 0,
                    is_added_later: false,
                    is_deleted: false,
                },
                OrderLineRecord {
                    sku: "LG500".to_string(),
                    name: "Ladegerät".to_string(),
                    quantity_expected: 1,
                    quantity_received: 0,
                    is_added_later: false,
                    is_deleted: true,
                },
            ],
        }
    }

    #[test]
    fn test_order_roundtrip() {
        let store = OrderStore::new(":memory:").unwrap();
        let order = sample_order();
        store.upsert_order(&order).unwrap();

        assert_eq!(store.get_order("PO-2024-7").unwrap(), Some(order));
        assert_eq!(store.get_order("missing").unwrap(), None);
        assert_eq!(store.get_counts().unwrap(), (1, 2, 1));
    }

    #[test]
    fn test_upsert_replaces_lines() {
        let store = OrderStore::new(":memory:").unwrap();
        let mut order = sample_order();
        store.upsert_order(&order).unwrap();

        order.items.truncate(1);
        order.supplier = "Akku-Tech".to_string();
        store.upsert_order(&order).unwrap();

        let loaded = store.get_order("PO-2024-7").unwrap().unwrap();
        assert_eq!(loaded.supplier, "Akku-Tech");
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(store.get_order_ids().unwrap(), vec!["PO-2024-7"]);
    }

    #[tokio::test]
    async fn test_edit_session_keeps_received_quantity() {
        let store = OrderStore::new(":memory:").unwrap();
        store.upsert_order(&sample_order()).unwrap();
        assert_eq!(store.set_quantity_received("PO-2024-7", "4000123", 3).unwrap(), 1);

        let stored = store.get_order("PO-2024-7").unwrap().unwrap();
        let mut session = OrderSession::edit(stored, &Catalog::default());
        assert_eq!(session.header.order_type, Some(OrderType::Project));
        session.set_quantity(0, 8).unwrap();
        session.add_new("Kabel", "KB-900", "").unwrap();

        let status = session.submit(&store, false).await.unwrap();
        assert_eq!(status, &SubmissionStatus::Succeeded);

        let saved = store.get_order("PO-2024-7").unwrap().unwrap();
        assert_eq!(saved.items.len(), 3);
        assert_eq!(saved.items[0].quantity_expected, 8);
        assert_eq!(saved.items[0].quantity_received, 3);
        assert!(saved.items[1].is_deleted);
        assert!(saved.items[2].is_added_later);
    }
}

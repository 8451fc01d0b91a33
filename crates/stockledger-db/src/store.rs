//! # SQLite Ledger Transaction
//!
//! Implements the core storage ports on top of one SQLite transaction.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database (UnitOfWork)                                                  │
//! │       │ begin()           → BEGIN IMMEDIATE (waits up to busy_timeout)  │
//! │       ▼                                                                 │
//! │  SqliteLedgerTx { sqlx::Transaction }                                  │
//! │       ├── InventoryStore  → InventoryRepository::*(&mut conn)          │
//! │       ├── BatchStore      → BatchRepository::*(&mut conn)              │
//! │       ├── commit()        → COMMIT                                     │
//! │       └── drop            → ROLLBACK (sqlx queues it on the connection)│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::debug;

use crate::error::DbError;
use crate::pool::Database;
use crate::repository::{BatchRepository, InventoryRepository};
use stockledger_core::store::{BatchStore, InventoryStore, LedgerTransaction, UnitOfWork};
use stockledger_core::{
    Batch, BatchId, DatedBatch, InventoryItem, ItemId, LedgerError, LedgerResult,
};

/// An open ledger transaction on a pooled SQLite connection.
pub struct SqliteLedgerTx {
    tx: Transaction<'static, Sqlite>,
}

impl SqliteLedgerTx {
    fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }
}

fn item_missing(id: ItemId) -> impl FnOnce(DbError) -> LedgerError {
    move |err| match err {
        DbError::NotFound { .. } => LedgerError::ItemNotFound(id),
        other => other.into(),
    }
}

fn batch_missing(id: BatchId) -> impl FnOnce(DbError) -> LedgerError {
    move |err| match err {
        DbError::NotFound { .. } => LedgerError::BatchNotFound(id),
        other => other.into(),
    }
}

#[async_trait]
impl InventoryStore for SqliteLedgerTx {
    async fn lock_item(&mut self, id: ItemId) -> LedgerResult<InventoryItem> {
        InventoryRepository::lock(self.conn(), id)
            .await?
            .ok_or(LedgerError::ItemNotFound(id))
    }

    async fn item(&mut self, id: ItemId) -> LedgerResult<Option<InventoryItem>> {
        Ok(InventoryRepository::fetch(self.conn(), id).await?)
    }

    async fn find_item_by_name(&mut self, name: &str) -> LedgerResult<Option<InventoryItem>> {
        Ok(InventoryRepository::fetch_by_name(self.conn(), name).await?)
    }

    async fn create_item(
        &mut self,
        name: &str,
        category_ref: Option<&str>,
    ) -> LedgerResult<InventoryItem> {
        Ok(InventoryRepository::insert(self.conn(), name, category_ref).await?)
    }

    async fn set_total_quantity(&mut self, id: ItemId, total: i64) -> LedgerResult<()> {
        InventoryRepository::set_total(self.conn(), id, total)
            .await
            .map_err(item_missing(id))
    }

    async fn assign_category(&mut self, id: ItemId, category_ref: &str) -> LedgerResult<()> {
        InventoryRepository::set_category(self.conn(), id, category_ref)
            .await
            .map_err(item_missing(id))
    }
}

#[async_trait]
impl BatchStore for SqliteLedgerTx {
    async fn batches_for_item(&mut self, item_id: ItemId) -> LedgerResult<Vec<Batch>> {
        Ok(BatchRepository::for_item(self.conn(), item_id).await?)
    }

    async fn batch(&mut self, id: BatchId) -> LedgerResult<Option<Batch>> {
        Ok(BatchRepository::fetch(self.conn(), id).await?)
    }

    async fn insert_batch(
        &mut self,
        item_id: ItemId,
        quantity: i64,
        expiry: Option<DateTime<Utc>>,
    ) -> LedgerResult<Batch> {
        if quantity <= 0 {
            return Err(LedgerError::invalid_quantity("quantity", quantity));
        }
        BatchRepository::insert(self.conn(), item_id, quantity, expiry)
            .await
            .map_err(|err| match err {
                DbError::ForeignKeyViolation { .. } => LedgerError::ItemNotFound(item_id),
                other => other.into(),
            })
    }

    async fn set_batch_quantity(&mut self, id: BatchId, quantity: i64) -> LedgerResult<()> {
        if quantity <= 0 {
            return Err(LedgerError::invalid_quantity("quantity", quantity));
        }
        BatchRepository::set_quantity(self.conn(), id, quantity)
            .await
            .map_err(batch_missing(id))
    }

    async fn update_batch(
        &mut self,
        id: BatchId,
        quantity: i64,
        expiry: Option<DateTime<Utc>>,
    ) -> LedgerResult<()> {
        if quantity <= 0 {
            return Err(LedgerError::invalid_quantity("quantity", quantity));
        }
        BatchRepository::update(self.conn(), id, quantity, expiry)
            .await
            .map_err(batch_missing(id))
    }

    async fn delete_batch(&mut self, id: BatchId) -> LedgerResult<()> {
        BatchRepository::delete(self.conn(), id)
            .await
            .map_err(batch_missing(id))
    }
}

#[async_trait]
impl LedgerTransaction for SqliteLedgerTx {
    async fn commit(self) -> LedgerResult<()> {
        self.tx.commit().await.map_err(DbError::from)?;
        debug!("Ledger transaction committed");
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for Database {
    type Tx = SqliteLedgerTx;

    async fn begin(&self) -> LedgerResult<SqliteLedgerTx> {
        // Take the write lock up front. A deferred transaction that reads
        // before its first write cannot wait on busy_timeout in WAL mode.
        let tx = self
            .pool()
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(DbError::from)?;
        Ok(SqliteLedgerTx { tx })
    }

    async fn mismatched_item_ids(&self) -> LedgerResult<Vec<ItemId>> {
        Ok(self.inventory().mismatched_ids().await?)
    }

    async fn items_with_expired_batches(&self, now: DateTime<Utc>) -> LedgerResult<Vec<ItemId>> {
        Ok(self.batches().items_with_expired(now).await?)
    }

    async fn dated_batches_until(&self, until: DateTime<Utc>) -> LedgerResult<Vec<DatedBatch>> {
        Ok(self.batches().dated_until(until).await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use chrono::Duration;
    use stockledger_core::{
        AdjustmentKind, AdjustmentRequest, ImportSettings, LedgerSettings, MovementReason,
        StockInRow, StockLedger, StockOutRow,
    };

    async fn ledger() -> StockLedger<Database> {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.ledger(LedgerSettings::default())
    }

    async fn seed_item(ledger: &StockLedger<Database>, name: &str) -> ItemId {
        let mut tx = ledger.store().begin().await.unwrap();
        let item = tx.create_item(name, None).await.unwrap();
        tx.commit().await.unwrap();
        item.id
    }

    async fn assert_consistent(ledger: &StockLedger<Database>, id: ItemId) {
        let detail = ledger.item_detail(id).await.unwrap();
        let sum: i64 = detail.batches.iter().map(|b| b.quantity).sum();
        assert_eq!(sum, detail.item.total_quantity);
        assert!(detail.batches.iter().all(|b| b.quantity > 0));
        assert!(detail.batches.iter().filter(|b| b.is_indefinite()).count() <= 1);
    }

    #[tokio::test]
    async fn test_receive_then_consume_fifo() {
        let ledger = ledger().await;
        let id = seed_item(&ledger, "Ibuprofen 200mg").await;
        let now = Utc::now();

        ledger.receive(id, 4, Some(now + Duration::days(10))).await.unwrap();
        ledger.receive(id, 5, Some(now + Duration::days(40))).await.unwrap();
        ledger.receive(id, 3, None).await.unwrap();

        let receipt = ledger.consume(id, 6).await.unwrap();
        assert_eq!(receipt.total_quantity, 6);
        assert_eq!(receipt.movements.len(), 2);

        let batches = ledger.item_detail(id).await.unwrap().batches;
        let dated: Vec<i64> = batches
            .iter()
            .filter(|b| !b.is_indefinite())
            .map(|b| b.quantity)
            .collect();
        assert_eq!(dated, vec![3]);
        assert_consistent(&ledger, id).await;
    }

    #[tokio::test]
    async fn test_failed_consume_rolls_back() {
        let ledger = ledger().await;
        let id = seed_item(&ledger, "Cetirizine").await;
        ledger.receive(id, 2, None).await.unwrap();

        let err = ledger.consume(id, 5).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { remaining: 3, .. }));

        // The pool's single connection must be free again after the rollback.
        let detail = ledger.item_detail(id).await.unwrap();
        assert_eq!(detail.item.total_quantity, 2);
        assert_eq!(detail.batches[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_set_total_trims_indefinite_first() {
        let ledger = ledger().await;
        let id = seed_item(&ledger, "Bandage roll").await;
        ledger.receive(id, 6, None).await.unwrap();
        ledger
            .receive(id, 8, Some(Utc::now() + Duration::days(30)))
            .await
            .unwrap();

        let receipt = ledger.set_total(id, 6).await.unwrap();
        assert!(receipt
            .movements
            .iter()
            .all(|m| m.reason == MovementReason::Trim));

        let batches = ledger.item_detail(id).await.unwrap().batches;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].quantity, 6);
        assert!(!batches[0].is_indefinite());
        assert_consistent(&ledger, id).await;
    }

    #[tokio::test]
    async fn test_reconcile_all_repairs_drift() {
        let ledger = ledger().await;
        let drifted = seed_item(&ledger, "Drifted").await;
        let clean = seed_item(&ledger, "Clean").await;
        ledger.receive(clean, 4, None).await.unwrap();

        // Aggregate edited behind the ledger's back.
        let mut conn = ledger.store().pool().acquire().await.unwrap();
        InventoryRepository::set_total(&mut conn, drifted, 9).await.unwrap();
        drop(conn);

        assert_eq!(ledger.store().mismatched_item_ids().await.unwrap(), vec![drifted]);

        let report = ledger.reconcile_all().await.unwrap();
        assert_eq!(report.receipts.len(), 1);
        assert!(report.failures.is_empty());
        assert!(ledger.store().mismatched_item_ids().await.unwrap().is_empty());
        assert_consistent(&ledger, drifted).await;
    }

    #[tokio::test]
    async fn test_expire_batches_removes_expired_stock() {
        let ledger = ledger().await;
        let id = seed_item(&ledger, "Insulin pen").await;
        let now = Utc::now();
        ledger.receive(id, 5, Some(now - Duration::days(1))).await.unwrap();
        ledger.receive(id, 7, Some(now + Duration::days(20))).await.unwrap();

        let report = ledger.expire_batches(now).await.unwrap();
        assert_eq!(report.expired_batches, 1);
        assert_eq!(report.expired_quantity, 5);

        let detail = ledger.item_detail(id).await.unwrap();
        assert_eq!(detail.item.total_quantity, 7);
        assert_consistent(&ledger, id).await;
    }

    #[tokio::test]
    async fn test_bulk_adjust_partial_failure() {
        let ledger = ledger().await;
        let id = seed_item(&ledger, "Syringes").await;

        let summary = ledger
            .bulk_adjust(&[
                AdjustmentRequest {
                    item_id: id,
                    kind: AdjustmentKind::Increase,
                    quantity: 10,
                    expiry: None,
                },
                AdjustmentRequest {
                    item_id: ItemId(404),
                    kind: AdjustmentKind::Increase,
                    quantity: 1,
                    expiry: None,
                },
                AdjustmentRequest {
                    item_id: id,
                    kind: AdjustmentKind::Decrease,
                    quantity: 3,
                    expiry: None,
                },
            ])
            .await;

        assert_eq!(summary.processed_count, 2);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].code, "item_not_found");
        assert_eq!(ledger.item_detail(id).await.unwrap().item.total_quantity, 7);
        assert_consistent(&ledger, id).await;
    }

    #[tokio::test]
    async fn test_stock_in_import_creates_items() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let settings = LedgerSettings {
            import: ImportSettings {
                auto_create_items: true,
                default_category: None,
            },
            ..LedgerSettings::default()
        };
        let ledger = db.ledger(settings);

        let expiry = Utc::now() + Duration::days(60);
        let summary = ledger
            .import_stock_in(&[
                StockInRow {
                    product_name: "Paracetamol 500mg".into(),
                    quantity: 20,
                    expiry: Some(expiry),
                    category_hint: Some("Analgesics".into()),
                },
                StockInRow {
                    product_name: "Paracetamol 500mg".into(),
                    quantity: 5,
                    expiry: Some(expiry),
                    category_hint: None,
                },
                StockInRow {
                    product_name: "   ".into(),
                    quantity: 5,
                    expiry: None,
                    category_hint: None,
                },
            ])
            .await;

        assert_eq!(summary.processed_count, 2);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].row, 3);

        let item = db.inventory().get_by_name("Paracetamol 500mg").await.unwrap().unwrap();
        assert_eq!(item.total_quantity, 25);
        assert_eq!(item.category_ref.as_deref(), Some("Analgesics"));
        // Same expiry still means a separate lot.
        assert_eq!(db.batches().list_for_item(item.id).await.unwrap().len(), 2);

        let out = ledger
            .import_stock_out(&[StockOutRow {
                product_name: "Paracetamol 500mg".into(),
                declared_remaining: 15,
                sold: Some(10),
            }])
            .await;
        assert!(out.is_clean());
        assert_consistent(&ledger, item.id).await;
    }

    #[tokio::test]
    async fn test_missing_batch_maps_to_batch_not_found() {
        let ledger = ledger().await;
        seed_item(&ledger, "Thermometer").await;

        let err = ledger.discard_batch(BatchId(42)).await.unwrap_err();
        assert!(matches!(err, LedgerError::BatchNotFound(BatchId(42))));
    }

    #[tokio::test]
    async fn test_insert_batch_for_missing_item() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut tx = db.begin().await.unwrap();

        let err = tx.insert_batch(ItemId(8), 3, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::ItemNotFound(ItemId(8))));
    }

    #[tokio::test]
    async fn test_expiry_listings_across_items() {
        let ledger = ledger().await;
        let saline = seed_item(&ledger, "Saline Solution 100ml").await;
        let wipes = seed_item(&ledger, "Antiseptic Wipes").await;
        let now = Utc::now();
        ledger.receive(saline, 3, Some(now - Duration::days(4))).await.unwrap();
        ledger.receive(saline, 8, Some(now + Duration::days(12))).await.unwrap();
        ledger.receive(wipes, 6, Some(now + Duration::days(3))).await.unwrap();
        ledger.receive(wipes, 2, None).await.unwrap();

        let expiring = ledger.expiring_batches(now, 30).await.unwrap();
        let rows: Vec<(ItemId, i64, i64)> = expiring
            .iter()
            .map(|a| (a.item_id, a.quantity, a.days_remaining))
            .collect();
        assert_eq!(rows, vec![(wipes, 6, 3), (saline, 8, 12)]);
        assert_eq!(expiring[1].item_name, "Saline Solution 100ml");

        let expired = ledger.expired_batches(now).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].item_id, saline);
        assert_eq!(expired[0].days_expired(), 4);

        assert_eq!(
            ledger.items_with_expiring_batches(now, 5).await.unwrap(),
            vec![wipes]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_on_file_database() {
        let root = std::env::temp_dir().join(format!(
            "stockledger-store-concurrency-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&root);
        let config = DbConfig::new(root.join("ledger.db"))
            .max_connections(8)
            .busy_timeout(std::time::Duration::from_secs(30));
        let db = Database::new(config).await.unwrap();
        let ledger = db.ledger(LedgerSettings {
            import: ImportSettings {
                auto_create_items: true,
                default_category: None,
            },
            ..LedgerSettings::default()
        });

        let shared = seed_item(&ledger, "Saline Solution").await;
        ledger.receive(shared, 1000, None).await.unwrap();

        let gauze = seed_item(&ledger, "Gauze Pads").await;
        let far = Utc::now() + Duration::days(365);
        let mut lots = Vec::new();
        for _ in 0..20 {
            let receipt = ledger.receive(gauze, 2, Some(far)).await.unwrap();
            lots.push(receipt.batch_id.unwrap());
        }

        let tape = seed_item(&ledger, "Medical Tape").await;
        let tape_lot = ledger.receive(tape, 10, None).await.unwrap().batch_id.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    ledger.receive(shared, 3, None).await.unwrap();
                }
            }));
        }
        for _ in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    ledger.consume(shared, 2).await.unwrap();
                }
            }));
        }
        for chunk in lots.chunks(5) {
            let ledger = ledger.clone();
            let chunk = chunk.to_vec();
            handles.push(tokio::spawn(async move {
                for lot in chunk {
                    ledger.discard_batch(lot).await.unwrap();
                }
            }));
        }
        for _ in 0..4 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..5 {
                    ledger.amend_batch(tape_lot, 10, None).await.unwrap();
                }
            }));
        }
        for _ in 0..4 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                let mut rows: Vec<StockInRow> = (0..10)
                    .map(|_| StockInRow {
                        product_name: "Saline Solution".into(),
                        quantity: 1,
                        expiry: None,
                        category_hint: None,
                    })
                    .collect();
                rows.push(StockInRow {
                    product_name: "Sterile Water 10ml".into(),
                    quantity: 1,
                    expiry: None,
                    category_hint: None,
                });
                let summary = ledger.import_stock_in(&rows).await;
                assert!(summary.is_clean(), "{:?}", summary.errors);
                assert_eq!(summary.processed_count, 11);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // 1000 + 8*10*3 - 8*10*2 + 4*10
        let detail = ledger.item_detail(shared).await.unwrap();
        assert_eq!(detail.item.total_quantity, 1120);
        assert_consistent(&ledger, shared).await;

        let gauze_detail = ledger.item_detail(gauze).await.unwrap();
        assert_eq!(gauze_detail.item.total_quantity, 0);
        assert!(gauze_detail.batches.is_empty());

        assert_eq!(ledger.item_detail(tape).await.unwrap().item.total_quantity, 10);
        assert_consistent(&ledger, tape).await;

        // Every import raced on the same new name; exactly one item exists.
        let water = db
            .inventory()
            .get_by_name("Sterile Water 10ml")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(water.total_quantity, 4);
        assert_consistent(&ledger, water.id).await;
        assert!(ledger.store().mismatched_item_ids().await.unwrap().is_empty());

        db.close().await;
        let _ = std::fs::remove_dir_all(&root);
    }
}

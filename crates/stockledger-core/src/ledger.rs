//! # Stock Ledger
//!
//! The transactional facade over the allocator, the receiver and the
//! reconciler. Each operation runs in exactly one unit of work and always
//! ends with a reconciliation before it commits.
//!
//! ## Operation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate input            (no transaction yet)                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  begin ──► lock_item ──► allocate | receive | set total | edit batch   │
//! │                                │                                        │
//! │                                ▼                                        │
//! │                           reconcile ──► commit ──► StockReceipt        │
//! │                                                                         │
//! │  any Err before commit → transaction dropped → nothing applied         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use stockledger_core::store::{InventoryStore, LedgerTransaction, UnitOfWork};
//! use stockledger_core::{LedgerSettings, MemoryStore, StockLedger};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), stockledger_core::LedgerError> {
//!     let ledger = StockLedger::new(MemoryStore::new(), LedgerSettings::default());
//!
//!     let mut tx = ledger.store().begin().await?;
//!     let item = tx.create_item("Paracetamol 500mg", None).await?;
//!     tx.commit().await?;
//!
//!     ledger.receive(item.id, 10, None).await?;
//!     let receipt = ledger.consume(item.id, 4).await?;
//!     assert_eq!(receipt.total_quantity, 6);
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::allocator::{allocate, allocation_movements};
use crate::error::{LedgerError, LedgerResult};
use crate::import::ImportSettings;
use crate::policy::consumption_order;
use crate::receiver::{receipt_movement, receive};
use crate::reconciler::reconcile;
use crate::store::{BatchStore, InventoryStore, LedgerTransaction, UnitOfWork};
use crate::types::{
    AdjustmentKind, AdjustmentRequest, BatchAlert, BatchId, BatchMovement, BatchStats, BulkAdjustSummary,
    ExpirationReport, ItemDetail, ItemFailure, ItemId, MovementReason, ReconcileAllReport,
    RowError, StockReceipt,
};
use crate::validation::{validate_non_negative_quantity, validate_positive_quantity};
use crate::DEFAULT_EXPIRING_SOON_DAYS;

// =============================================================================
// Settings
// =============================================================================

/// Runtime settings for the ledger, usually loaded by `stockledger-db`'s
/// configuration layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Window used by [`StockLedger::batch_stats`] for "expiring soon".
    pub expiring_soon_days: i64,

    pub import: ImportSettings,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            expiring_soon_days: DEFAULT_EXPIRING_SOON_DAYS,
            import: ImportSettings::default(),
        }
    }
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// Batch ledger over a storage backend.
#[derive(Debug, Clone)]
pub struct StockLedger<U> {
    uow: U,
    settings: LedgerSettings,
}

impl<U: UnitOfWork> StockLedger<U> {
    pub fn new(uow: U, settings: LedgerSettings) -> Self {
        Self { uow, settings }
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    /// The storage backend.
    pub fn store(&self) -> &U {
        &self.uow
    }

    // -------------------------------------------------------------------------
    // Quantity operations
    // -------------------------------------------------------------------------

    /// Consumes `qty` units in consumption order and lowers the aggregate.
    ///
    /// Fails with [`LedgerError::InsufficientStock`] if the batches cannot
    /// cover `qty`; nothing is applied in that case.
    pub async fn consume(&self, item_id: ItemId, qty: i64) -> LedgerResult<StockReceipt> {
        validate_positive_quantity("quantity", qty)?;

        let mut tx = self.uow.begin().await?;
        let movements = consume_in(&mut tx, item_id, qty).await?;
        finish(tx, item_id, movements, None, "consume").await
    }

    /// Receives a lot and raises the aggregate by `qty`.
    pub async fn receive(
        &self,
        item_id: ItemId,
        qty: i64,
        expiry: Option<DateTime<Utc>>,
    ) -> LedgerResult<StockReceipt> {
        validate_positive_quantity("quantity", qty)?;

        let mut tx = self.uow.begin().await?;
        let (batch_id, movements) = receive_in(&mut tx, item_id, qty, expiry).await?;
        finish(tx, item_id, movements, Some(batch_id), "receive").await
    }

    /// Overwrites the aggregate total and reconciles the batches to it.
    pub async fn set_total(&self, item_id: ItemId, total: i64) -> LedgerResult<StockReceipt> {
        validate_non_negative_quantity("total_quantity", total)?;

        let mut tx = self.uow.begin().await?;
        tx.lock_item(item_id).await?;
        tx.set_total_quantity(item_id, total).await?;
        finish(tx, item_id, Vec::new(), None, "set_total").await
    }

    /// Reconciles one item without changing its aggregate.
    pub async fn reconcile(&self, item_id: ItemId) -> LedgerResult<StockReceipt> {
        let mut tx = self.uow.begin().await?;
        tx.lock_item(item_id).await?;
        finish(tx, item_id, Vec::new(), None, "reconcile").await
    }

    /// Routes an ad-hoc adjustment to receive, consume or set_total.
    pub async fn adjust(&self, request: &AdjustmentRequest) -> LedgerResult<StockReceipt> {
        match request.kind {
            AdjustmentKind::Increase => {
                self.receive(request.item_id, request.quantity, request.expiry)
                    .await
            }
            AdjustmentKind::Decrease => self.consume(request.item_id, request.quantity).await,
            AdjustmentKind::Set => self.set_total(request.item_id, request.quantity).await,
        }
    }

    /// Applies each adjustment in its own transaction. A failing request is
    /// recorded and the rest still run.
    pub async fn bulk_adjust(&self, requests: &[AdjustmentRequest]) -> BulkAdjustSummary {
        let mut summary = BulkAdjustSummary::default();

        for (index, request) in requests.iter().enumerate() {
            match self.adjust(request).await {
                Ok(receipt) => {
                    summary.processed_count += 1;
                    summary.receipts.push(receipt);
                }
                Err(e) => {
                    warn!(row = index + 1, item_id = %request.item_id, error = %e, "Adjustment failed");
                    summary.errors.push(RowError {
                        row: index + 1,
                        product_name: None,
                        code: e.code().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            total = requests.len(),
            processed = summary.processed_count,
            failed = summary.errors.len(),
            "Bulk adjustment complete"
        );
        summary
    }

    // -------------------------------------------------------------------------
    // Batch maintenance
    // -------------------------------------------------------------------------

    /// Reconciles every item whose batch sum disagrees with its aggregate.
    pub async fn reconcile_all(&self) -> LedgerResult<ReconcileAllReport> {
        let ids = self.uow.mismatched_item_ids().await?;
        let mut report = ReconcileAllReport::default();

        for item_id in ids {
            match self.reconcile(item_id).await {
                Ok(receipt) => report.receipts.push(receipt),
                Err(e) => {
                    warn!(item_id = %item_id, error = %e, "Reconciliation failed");
                    report.failures.push(item_failure(item_id, &e));
                }
            }
        }

        info!(
            reconciled = report.receipts.len(),
            failed = report.failures.len(),
            "Reconciled mismatched items"
        );
        Ok(report)
    }

    /// Removes every dated batch that expired before `now` and lowers each
    /// owning item's aggregate by the removed quantity.
    pub async fn expire_batches(&self, now: DateTime<Utc>) -> LedgerResult<ExpirationReport> {
        let ids = self.uow.items_with_expired_batches(now).await?;
        let mut report = ExpirationReport::default();

        for item_id in ids {
            match self.expire_item(item_id, now).await {
                Ok((receipt, count, quantity)) => {
                    report.expired_batches += count;
                    report.expired_quantity += quantity;
                    report.receipts.push(receipt);
                }
                Err(e) => {
                    warn!(item_id = %item_id, error = %e, "Batch expiration failed");
                    report.failures.push(item_failure(item_id, &e));
                }
            }
        }

        info!(
            batches = report.expired_batches,
            quantity = report.expired_quantity,
            failed = report.failures.len(),
            "Expired batches removed"
        );
        Ok(report)
    }

    async fn expire_item(
        &self,
        item_id: ItemId,
        now: DateTime<Utc>,
    ) -> LedgerResult<(StockReceipt, usize, i64)> {
        let mut tx = self.uow.begin().await?;
        let item = tx.lock_item(item_id).await?;

        let mut movements = Vec::new();
        let mut removed = 0;
        for batch in tx.batches_for_item(item_id).await? {
            if !batch.is_expired(now) {
                continue;
            }
            tx.delete_batch(batch.id).await?;
            removed += batch.quantity;
            movements.push(BatchMovement {
                batch_id: batch.id,
                delta: -batch.quantity,
                reason: MovementReason::Expiry,
            });
        }

        let count = movements.len();
        tx.set_total_quantity(item_id, (item.total_quantity - removed).max(0))
            .await?;
        let receipt = finish(tx, item_id, movements, None, "expire").await?;
        Ok((receipt, count, removed))
    }

    /// Edits one batch's quantity and expiry, then reconciles against the
    /// unchanged aggregate.
    pub async fn amend_batch(
        &self,
        batch_id: BatchId,
        quantity: i64,
        expiry: Option<DateTime<Utc>>,
    ) -> LedgerResult<StockReceipt> {
        validate_positive_quantity("quantity", quantity)?;

        let mut tx = self.uow.begin().await?;
        let item_id = owning_item(&mut tx, batch_id).await?;
        tx.lock_item(item_id).await?;
        let batch = tx
            .batch(batch_id)
            .await?
            .ok_or(LedgerError::BatchNotFound(batch_id))?;

        tx.update_batch(batch_id, quantity, expiry).await?;
        let movements = vec![BatchMovement {
            batch_id,
            delta: quantity - batch.quantity,
            reason: MovementReason::Manual,
        }];
        finish(tx, item_id, movements, Some(batch_id), "amend_batch").await
    }

    /// Deletes one batch and lowers the aggregate by its quantity.
    pub async fn discard_batch(&self, batch_id: BatchId) -> LedgerResult<StockReceipt> {
        let mut tx = self.uow.begin().await?;
        let item_id = owning_item(&mut tx, batch_id).await?;
        let item = tx.lock_item(item_id).await?;
        let batch = tx
            .batch(batch_id)
            .await?
            .ok_or(LedgerError::BatchNotFound(batch_id))?;

        tx.delete_batch(batch_id).await?;
        tx.set_total_quantity(item_id, (item.total_quantity - batch.quantity).max(0))
            .await?;
        let movements = vec![BatchMovement {
            batch_id,
            delta: -batch.quantity,
            reason: MovementReason::Manual,
        }];
        finish(tx, item_id, movements, None, "discard_batch").await
    }

    // -------------------------------------------------------------------------
    // Read models
    // -------------------------------------------------------------------------

    /// An item with its batches in consumption order.
    pub async fn item_detail(&self, item_id: ItemId) -> LedgerResult<ItemDetail> {
        let mut tx = self.uow.begin().await?;
        let item = tx
            .item(item_id)
            .await?
            .ok_or(LedgerError::ItemNotFound(item_id))?;
        let mut batches = tx.batches_for_item(item_id).await?;
        consumption_order(&mut batches);
        Ok(ItemDetail { item, batches })
    }

    /// Batch statistics for one item as of `now`.
    pub async fn batch_stats(&self, item_id: ItemId, now: DateTime<Utc>) -> LedgerResult<BatchStats> {
        let detail = self.item_detail(item_id).await?;
        let window = Duration::days(self.settings.expiring_soon_days);

        Ok(BatchStats {
            item_id,
            total_quantity: detail.item.total_quantity,
            batch_count: detail.batches.len(),
            indefinite_quantity: detail
                .batches
                .iter()
                .filter(|b| b.is_indefinite())
                .map(|b| b.quantity)
                .sum(),
            earliest_expiry: detail.batches.iter().filter_map(|b| b.expiry).min(),
            expiring_soon_count: detail
                .batches
                .iter()
                .filter(|b| b.is_expiring_within(now, window))
                .count(),
            expired_count: detail.batches.iter().filter(|b| b.is_expired(now)).count(),
        })
    }

    /// Batches across all items that are still good at `now` but expire
    /// within `days`, soonest first.
    pub async fn expiring_batches(&self, now: DateTime<Utc>, days: i64) -> LedgerResult<Vec<BatchAlert>> {
        validate_non_negative_quantity("days", days)?;
        let window = Duration::days(days);
        let dated = self.uow.dated_batches_until(now + window).await?;
        Ok(dated
            .iter()
            .filter(|d| d.batch.is_expiring_within(now, window))
            .filter_map(|d| BatchAlert::at(d, now))
            .collect())
    }

    /// [`expiring_batches`](Self::expiring_batches) over the configured
    /// expiring-soon window.
    pub async fn expiring_soon(&self, now: DateTime<Utc>) -> LedgerResult<Vec<BatchAlert>> {
        self.expiring_batches(now, self.settings.expiring_soon_days)
            .await
    }

    /// Batches across all items that expired before `now`, oldest first.
    pub async fn expired_batches(&self, now: DateTime<Utc>) -> LedgerResult<Vec<BatchAlert>> {
        let dated = self.uow.dated_batches_until(now).await?;
        Ok(dated
            .iter()
            .filter(|d| d.batch.is_expired(now))
            .filter_map(|d| BatchAlert::at(d, now))
            .collect())
    }

    /// Distinct items owning at least one batch that expires within `days`.
    pub async fn items_with_expiring_batches(
        &self,
        now: DateTime<Utc>,
        days: i64,
    ) -> LedgerResult<Vec<ItemId>> {
        let mut ids: Vec<ItemId> = self
            .expiring_batches(now, days)
            .await?
            .into_iter()
            .map(|alert| alert.item_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

// =============================================================================
// In-transaction steps
// =============================================================================

/// Locks the item, allocates `qty` and lowers the aggregate.
pub(crate) async fn consume_in<T>(
    tx: &mut T,
    item_id: ItemId,
    qty: i64,
) -> LedgerResult<Vec<BatchMovement>>
where
    T: InventoryStore + BatchStore + ?Sized,
{
    let item = tx.lock_item(item_id).await?;
    let allocation = allocate(tx, item_id, qty).await?;
    tx.set_total_quantity(item_id, (item.total_quantity - qty).max(0))
        .await?;
    Ok(allocation_movements(&allocation))
}

/// Locks the item, receives a lot and raises the aggregate.
pub(crate) async fn receive_in<T>(
    tx: &mut T,
    item_id: ItemId,
    qty: i64,
    expiry: Option<DateTime<Utc>>,
) -> LedgerResult<(BatchId, Vec<BatchMovement>)>
where
    T: InventoryStore + BatchStore + ?Sized,
{
    let item = tx.lock_item(item_id).await?;
    let total = item
        .total_quantity
        .checked_add(qty)
        .ok_or_else(|| LedgerError::invalid_quantity("quantity", qty))?;
    let lot = receive(tx, item_id, qty, expiry).await?;
    tx.set_total_quantity(item_id, total).await?;
    Ok((lot.batch_id, vec![receipt_movement(&lot)]))
}

/// Reconciles, commits and builds the receipt.
pub(crate) async fn finish<T: LedgerTransaction>(
    mut tx: T,
    item_id: ItemId,
    mut movements: Vec<BatchMovement>,
    batch_id: Option<BatchId>,
    operation: &'static str,
) -> LedgerResult<StockReceipt> {
    let reconciliation = reconcile(&mut tx, item_id).await?;
    movements.extend(reconciliation.movements);
    tx.commit().await?;

    let receipt = StockReceipt {
        operation_id: Uuid::new_v4(),
        item_id,
        movements,
        total_quantity: reconciliation.target,
        batch_id,
        underflow: reconciliation.underflow,
    };
    info!(
        operation,
        operation_id = %receipt.operation_id,
        item_id = %item_id,
        total_quantity = receipt.total_quantity,
        movements = receipt.movements.len(),
        "Stock operation committed"
    );
    Ok(receipt)
}

async fn owning_item<T: BatchStore + ?Sized>(tx: &mut T, batch_id: BatchId) -> LedgerResult<ItemId> {
    tx.batch(batch_id)
        .await?
        .map(|b| b.inventory_id)
        .ok_or(LedgerError::BatchNotFound(batch_id))
}

fn item_failure(item_id: ItemId, e: &LedgerError) -> ItemFailure {
    ItemFailure {
        item_id,
        code: e.code().to_string(),
        message: e.to_string(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

//! # Domain Types
//!
//! Core domain types used throughout the stock ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐        ┌─────────────────┐                        │
//! │  │  InventoryItem  │ 1    * │      Batch      │                        │
//! │  │  ─────────────  │◄───────│  ─────────────  │                        │
//! │  │  id (ItemId)    │        │  id (BatchId)   │                        │
//! │  │  name (unique)  │        │  inventory_id   │                        │
//! │  │  category_ref   │        │  quantity > 0   │                        │
//! │  │  total_quantity │        │  expiry?        │ None = indefinite      │
//! │  └─────────────────┘        └─────────────────┘                        │
//! │                                                                         │
//! │  Invariant after every committed operation:                            │
//! │      Σ batch.quantity == item.total_quantity                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Batches are stored independently and looked up by item id; an item never
//! caches its batch list.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// Store-assigned inventory item identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct ItemId(pub i64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned batch identifier.
///
/// Ids increase monotonically, which makes them the final tie-breaker when
/// two batches share an expiry and a creation instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct BatchId(pub i64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Inventory Item
// =============================================================================

/// An inventory item with its authoritative aggregate quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryItem {
    pub id: ItemId,

    /// Unique display name; bulk import resolves items by it.
    pub name: String,

    /// Category reference owned by the catalog collaborator.
    pub category_ref: Option<String>,

    /// Authoritative stock count. Batches are reconciled to this value.
    pub total_quantity: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Batch
// =============================================================================

/// A persisted lot of stock sharing one expiry characteristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Batch {
    pub id: BatchId,

    /// Owning item.
    pub inventory_id: ItemId,

    /// Always positive once persisted; a batch driven to zero is deleted.
    pub quantity: i64,

    /// Expiry instant. `None` marks the indefinite (safety buffer) batch.
    #[ts(as = "Option<String>")]
    pub expiry: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    /// Returns true if this batch has no expiry.
    #[inline]
    pub fn is_indefinite(&self) -> bool {
        self.expiry.is_none()
    }

    /// Returns true if the batch expired strictly before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiry, Some(expiry) if expiry < now)
    }

    /// Returns true if the batch is still good at `now` but expires within
    /// `window`.
    pub fn is_expiring_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        matches!(self.expiry, Some(expiry) if expiry >= now && expiry <= now + window)
    }
}

// =============================================================================
// Movements
// =============================================================================

/// Why a batch quantity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    /// Consumed by the FIFO allocator.
    Allocation,
    /// Received as a new or merged lot.
    Receipt,
    /// Reconciler grew the indefinite batch to meet the aggregate.
    TopUp,
    /// Reconciler trimmed a batch down to the aggregate.
    Trim,
    /// Duplicate indefinite batch folded into the canonical one.
    Merge,
    /// Removed because its expiry passed.
    Expiry,
    /// Edited or discarded directly.
    Manual,
}

/// One signed change to one batch, for the movement-history collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BatchMovement {
    pub batch_id: BatchId,
    /// Positive for stock added to the batch, negative for stock removed.
    pub delta: i64,
    pub reason: MovementReason,
}

/// A batch touched by an allocation and the amount taken from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TouchedBatch {
    pub batch_id: BatchId,
    pub amount: i64,
}

/// Result of a FIFO allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Allocation {
    pub item_id: ItemId,
    pub requested: i64,
    /// Batches in the order they were consumed.
    pub touched: Vec<TouchedBatch>,
}

impl Allocation {
    /// Total quantity taken across all touched batches.
    pub fn allocated(&self) -> i64 {
        self.touched.iter().map(|t| t.amount).sum()
    }
}

/// Result of receiving a lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceivedLot {
    pub batch_id: BatchId,
    /// True if the quantity was added to an existing indefinite batch.
    pub merged: bool,
    pub quantity: i64,
}

/// Result of reconciling one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Reconciliation {
    pub item_id: ItemId,
    /// The aggregate the batches were reconciled to.
    pub target: i64,
    /// Batch sum before reconciliation.
    pub batch_sum_before: i64,
    pub movements: Vec<BatchMovement>,
    /// Amount by which the aggregate was below zero, if it was. Batches were
    /// trimmed to zero and the aggregate clamped.
    pub underflow: Option<i64>,
}

impl Reconciliation {
    /// Returns true if nothing had to change.
    pub fn is_noop(&self) -> bool {
        self.movements.is_empty() && self.underflow.is_none()
    }
}

/// Result of a top-level mutating ledger operation.
///
/// Handed to the movement-history collaborator; `operation_id` correlates
/// the movements of one committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockReceipt {
    #[ts(as = "String")]
    pub operation_id: Uuid,
    pub item_id: ItemId,
    pub movements: Vec<BatchMovement>,
    /// Aggregate total after the operation committed.
    pub total_quantity: i64,
    /// Batch created or merged into, for receive operations.
    pub batch_id: Option<BatchId>,
    /// Set when the aggregate had gone below zero and was clamped.
    pub underflow: Option<i64>,
}

// =============================================================================
// Adjustments
// =============================================================================

/// How an ad-hoc adjustment request is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    /// Receive a lot (LotReceiver).
    Increase,
    /// Consume stock (FIFO allocator).
    Decrease,
    /// Overwrite the aggregate total.
    Set,
}

/// An ad-hoc `{itemId, quantity, expiry?}` adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AdjustmentRequest {
    pub item_id: ItemId,
    pub kind: AdjustmentKind,
    pub quantity: i64,
    /// Only meaningful for `Increase`.
    #[ts(as = "Option<String>")]
    pub expiry: Option<DateTime<Utc>>,
}

/// Summary of a bulk adjustment run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BulkAdjustSummary {
    pub processed_count: usize,
    pub receipts: Vec<StockReceipt>,
    pub errors: Vec<RowError>,
}

// =============================================================================
// Bulk Import
// =============================================================================

/// Which sheet a bulk import processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    /// Sales sheet: declared remaining counts.
    StockOut,
    /// Purchase sheet: received lots.
    StockIn,
}

/// One pre-validated row of a stock-out (sales) sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockOutRow {
    pub product_name: String,
    /// Physical count after sales; becomes the new aggregate.
    pub declared_remaining: i64,
    /// Units sold, if the sheet reports them. Consumed in FIFO order before
    /// the aggregate is overwritten.
    pub sold: Option<i64>,
}

/// One pre-validated row of a stock-in (purchase) sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockInRow {
    pub product_name: String,
    pub quantity: i64,
    #[ts(as = "Option<String>")]
    pub expiry: Option<DateTime<Utc>>,
    pub category_hint: Option<String>,
}

/// A row that failed; the rest of the sheet was still processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RowError {
    /// 1-based row position within the submitted rows.
    pub row: usize,
    pub product_name: Option<String>,
    /// Stable machine-readable error code (see `LedgerError::code`).
    pub code: String,
    pub message: String,
}

/// Structured result of a bulk import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ImportSummary {
    pub kind: ImportKind,
    pub total_rows: usize,
    pub processed_count: usize,
    pub errors: Vec<RowError>,
    pub succeeded_names: Vec<String>,
    pub elapsed_ms: u64,
}

impl ImportSummary {
    /// Returns true if every row was applied.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

// =============================================================================
// Maintenance Reports
// =============================================================================

/// A per-item failure inside a multi-item maintenance run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemFailure {
    pub item_id: ItemId,
    pub code: String,
    pub message: String,
}

/// Result of reconciling every mismatched item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReconcileAllReport {
    pub receipts: Vec<StockReceipt>,
    pub failures: Vec<ItemFailure>,
}

/// Result of removing expired batches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExpirationReport {
    pub expired_batches: usize,
    pub expired_quantity: i64,
    pub receipts: Vec<StockReceipt>,
    pub failures: Vec<ItemFailure>,
}

// =============================================================================
// Read Models
// =============================================================================

/// An item and its batches in consumption order, for detail views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemDetail {
    pub item: InventoryItem,
    pub batches: Vec<Batch>,
}

/// A dated batch joined with its owning item, as returned by the cross-item
/// expiry scan.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DatedBatch {
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    pub batch: Batch,
    pub item_name: String,
    pub category_ref: Option<String>,
}

/// One row of the expiring / expired batch listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BatchAlert {
    pub batch_id: BatchId,
    pub item_id: ItemId,
    pub item_name: String,
    pub category_ref: Option<String>,
    pub quantity: i64,
    #[ts(as = "String")]
    pub expiry: DateTime<Utc>,
    /// Calendar days from `now` to the expiry date; negative once expired.
    pub days_remaining: i64,
}

impl BatchAlert {
    /// Builds the alert for `dated` as seen at `now`. `None` for an
    /// indefinite batch.
    pub fn at(dated: &DatedBatch, now: DateTime<Utc>) -> Option<Self> {
        let expiry = dated.batch.expiry?;
        Some(BatchAlert {
            batch_id: dated.batch.id,
            item_id: dated.batch.inventory_id,
            item_name: dated.item_name.clone(),
            category_ref: dated.category_ref.clone(),
            quantity: dated.batch.quantity,
            expiry,
            days_remaining: (expiry.date_naive() - now.date_naive()).num_days(),
        })
    }

    /// Days since expiry, zero while still good.
    pub fn days_expired(&self) -> i64 {
        (-self.days_remaining).max(0)
    }
}

/// Batch statistics for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BatchStats {
    pub item_id: ItemId,
    pub total_quantity: i64,
    pub batch_count: usize,
    pub indefinite_quantity: i64,
    #[ts(as = "Option<String>")]
    pub earliest_expiry: Option<DateTime<Utc>>,
    pub expiring_soon_count: usize,
    pub expired_count: usize,
}

// =============================================================================
// Unit Tests
// =============================================================================

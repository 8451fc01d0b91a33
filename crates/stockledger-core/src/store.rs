//! # Storage Ports
//!
//! The ledger reaches storage only through these traits. The SQLite
//! implementation lives in `stockledger-db`; [`crate::memory::MemoryStore`]
//! implements them in-process.
//!
//! ## Unit of Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UnitOfWork::begin()                                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LedgerTransaction  (InventoryStore + BatchStore)                      │
//! │       │                                                                 │
//! │       ├── lock_item(id)         serializes work on one item            │
//! │       ├── allocate / receive / set_total                               │
//! │       ├── reconcile                                                    │
//! │       │                                                                 │
//! │       ├── commit()  → all writes visible at once                       │
//! │       └── drop      → rollback, nothing visible                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every method that writes must be called on a transaction whose item was
//! locked first. Implementations stamp `created_at` / `updated_at` themselves.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::LedgerResult;
use crate::types::{Batch, BatchId, DatedBatch, InventoryItem, ItemId};

// =============================================================================
// Inventory Aggregate
// =============================================================================

/// Item rows: the authoritative aggregate total and catalog lookups.
#[async_trait]
pub trait InventoryStore: Send {
    /// Locks the item for the rest of the transaction and returns its current
    /// state. Fails with `ItemNotFound` if it does not exist.
    async fn lock_item(&mut self, id: ItemId) -> LedgerResult<InventoryItem>;

    /// Reads an item without locking it.
    async fn item(&mut self, id: ItemId) -> LedgerResult<Option<InventoryItem>>;

    /// Resolves an item by its unique name.
    async fn find_item_by_name(&mut self, name: &str) -> LedgerResult<Option<InventoryItem>>;

    /// Creates an item with a zero aggregate.
    async fn create_item(
        &mut self,
        name: &str,
        category_ref: Option<&str>,
    ) -> LedgerResult<InventoryItem>;

    /// Overwrites the aggregate total.
    async fn set_total_quantity(&mut self, id: ItemId, total: i64) -> LedgerResult<()>;

    /// Sets the item's category reference.
    async fn assign_category(&mut self, id: ItemId, category_ref: &str) -> LedgerResult<()>;
}

// =============================================================================
// Batch Store
// =============================================================================

/// Batch rows, keyed by owning item.
///
/// Returned lists carry no particular order; callers sort them through
/// [`crate::policy`].
#[async_trait]
pub trait BatchStore: Send {
    async fn batches_for_item(&mut self, item_id: ItemId) -> LedgerResult<Vec<Batch>>;

    async fn batch(&mut self, id: BatchId) -> LedgerResult<Option<Batch>>;

    /// Inserts a batch. `quantity` must be positive.
    async fn insert_batch(
        &mut self,
        item_id: ItemId,
        quantity: i64,
        expiry: Option<DateTime<Utc>>,
    ) -> LedgerResult<Batch>;

    /// Sets a batch quantity. `quantity` must be positive; use
    /// [`BatchStore::delete_batch`] for zero.
    async fn set_batch_quantity(&mut self, id: BatchId, quantity: i64) -> LedgerResult<()>;

    /// Sets both quantity and expiry of a batch.
    async fn update_batch(
        &mut self,
        id: BatchId,
        quantity: i64,
        expiry: Option<DateTime<Utc>>,
    ) -> LedgerResult<()>;

    async fn delete_batch(&mut self, id: BatchId) -> LedgerResult<()>;
}

// =============================================================================
// Transaction Boundary
// =============================================================================

/// One open unit of work. Dropping it without [`commit`](Self::commit)
/// discards every write.
#[async_trait]
pub trait LedgerTransaction: InventoryStore + BatchStore + Sized {
    async fn commit(self) -> LedgerResult<()>;
}

/// Opens transactions and answers the cross-item scans that maintenance
/// runs start from.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    type Tx: LedgerTransaction;

    async fn begin(&self) -> LedgerResult<Self::Tx>;

    /// Items whose batch sum differs from their aggregate total.
    async fn mismatched_item_ids(&self) -> LedgerResult<Vec<ItemId>>;

    /// Items owning at least one batch that expired before `now`.
    async fn items_with_expired_batches(&self, now: DateTime<Utc>) -> LedgerResult<Vec<ItemId>>;

    /// Committed dated batches expiring at or before `until`, with their
    /// item's name and category, ordered by expiry then batch id.
    async fn dated_batches_until(&self, until: DateTime<Utc>) -> LedgerResult<Vec<DatedBatch>>;
}

//! # In-Memory Store
//!
//! A process-local implementation of the storage ports, used by tests and by
//! embedders that do not need persistence.
//!
//! ## Isolation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  begin()   → snapshot of the shared state                              │
//! │  reads     → served from the snapshot                                  │
//! │  writes    → applied to the snapshot, touched items recorded           │
//! │  commit()  → for each touched item:                                    │
//! │                version still equal to snapshot? apply : Conflict       │
//! │  drop      → snapshot discarded                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The first committer on an item wins; a later transaction that touched the
//! same item fails with [`LedgerError::Conflict`] and applies nothing.
//! Transactions on different items commit independently.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{LedgerError, LedgerResult};
use crate::store::{BatchStore, InventoryStore, LedgerTransaction, UnitOfWork};
use crate::types::{Batch, BatchId, DatedBatch, InventoryItem, ItemId};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    items: BTreeMap<ItemId, InventoryItem>,
    batches: BTreeMap<BatchId, Batch>,
    versions: BTreeMap<ItemId, u64>,
    next_item_id: i64,
    next_batch_id: i64,
}

impl MemoryState {
    fn batches_of(&self, item_id: ItemId) -> impl Iterator<Item = &Batch> {
        self.batches
            .values()
            .filter(move |b| b.inventory_id == item_id)
    }
}

/// Shared in-memory ledger storage. Cloning shares the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        lock(&self.shared)
    }

    /// Committed view of one item, for assertions and read models.
    pub fn item(&self, id: ItemId) -> Option<InventoryItem> {
        self.state().items.get(&id).cloned()
    }

    /// Committed batches of one item, in id order.
    pub fn batches(&self, item_id: ItemId) -> Vec<Batch> {
        self.state().batches_of(item_id).cloned().collect()
    }
}

fn lock(shared: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl UnitOfWork for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> LedgerResult<MemoryTx> {
        let snapshot = self.state().clone();
        Ok(MemoryTx {
            shared: Arc::clone(&self.shared),
            working: snapshot,
            touched: BTreeSet::new(),
            created: BTreeSet::new(),
        })
    }

    async fn mismatched_item_ids(&self) -> LedgerResult<Vec<ItemId>> {
        let state = self.state();
        Ok(state
            .items
            .values()
            .filter(|item| {
                let sum: i64 = state.batches_of(item.id).map(|b| b.quantity).sum();
                sum != item.total_quantity
            })
            .map(|item| item.id)
            .collect())
    }

    async fn items_with_expired_batches(&self, now: DateTime<Utc>) -> LedgerResult<Vec<ItemId>> {
        let state = self.state();
        let ids: BTreeSet<ItemId> = state
            .batches
            .values()
            .filter(|b| b.is_expired(now))
            .map(|b| b.inventory_id)
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn dated_batches_until(&self, until: DateTime<Utc>) -> LedgerResult<Vec<DatedBatch>> {
        let state = self.state();
        let mut dated: Vec<DatedBatch> = state
            .batches
            .values()
            .filter(|b| matches!(b.expiry, Some(expiry) if expiry <= until))
            .filter_map(|b| {
                let item = state.items.get(&b.inventory_id)?;
                Some(DatedBatch {
                    batch: b.clone(),
                    item_name: item.name.clone(),
                    category_ref: item.category_ref.clone(),
                })
            })
            .collect();
        dated.sort_by_key(|d| (d.batch.expiry, d.batch.id));
        Ok(dated)
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// An open in-memory transaction.
#[derive(Debug)]
pub struct MemoryTx {
    shared: Arc<Mutex<MemoryState>>,
    working: MemoryState,
    touched: BTreeSet<ItemId>,
    created: BTreeSet<ItemId>,
}

impl MemoryTx {
    fn touch(&mut self, id: ItemId) {
        self.touched.insert(id);
    }

    fn item_mut(&mut self, id: ItemId) -> LedgerResult<&mut InventoryItem> {
        self.working
            .items
            .get_mut(&id)
            .ok_or(LedgerError::ItemNotFound(id))
    }

    fn batch_mut(&mut self, id: BatchId) -> LedgerResult<&mut Batch> {
        self.working
            .batches
            .get_mut(&id)
            .ok_or(LedgerError::BatchNotFound(id))
    }
}

#[async_trait]
impl InventoryStore for MemoryTx {
    async fn lock_item(&mut self, id: ItemId) -> LedgerResult<InventoryItem> {
        let item = self
            .working
            .items
            .get(&id)
            .cloned()
            .ok_or(LedgerError::ItemNotFound(id))?;
        self.touch(id);
        Ok(item)
    }

    async fn item(&mut self, id: ItemId) -> LedgerResult<Option<InventoryItem>> {
        Ok(self.working.items.get(&id).cloned())
    }

    async fn find_item_by_name(&mut self, name: &str) -> LedgerResult<Option<InventoryItem>> {
        Ok(self
            .working
            .items
            .values()
            .find(|item| item.name == name)
            .cloned())
    }

    async fn create_item(
        &mut self,
        name: &str,
        category_ref: Option<&str>,
    ) -> LedgerResult<InventoryItem> {
        if self.working.items.values().any(|item| item.name == name) {
            return Err(LedgerError::Conflict(format!(
                "inventory item '{name}' already exists"
            )));
        }

        // Ids come from the shared counter so concurrent transactions never
        // hand out the same one.
        let id = {
            let mut shared = lock(&self.shared);
            shared.next_item_id += 1;
            ItemId(shared.next_item_id)
        };

        let now = Utc::now();
        let item = InventoryItem {
            id,
            name: name.to_string(),
            category_ref: category_ref.map(str::to_string),
            total_quantity: 0,
            created_at: now,
            updated_at: now,
        };
        self.working.items.insert(id, item.clone());
        self.created.insert(id);
        self.touch(id);
        Ok(item)
    }

    async fn set_total_quantity(&mut self, id: ItemId, total: i64) -> LedgerResult<()> {
        let item = self.item_mut(id)?;
        item.total_quantity = total;
        item.updated_at = Utc::now();
        self.touch(id);
        Ok(())
    }

    async fn assign_category(&mut self, id: ItemId, category_ref: &str) -> LedgerResult<()> {
        let item = self.item_mut(id)?;
        item.category_ref = Some(category_ref.to_string());
        item.updated_at = Utc::now();
        self.touch(id);
        Ok(())
    }
}

#[async_trait]
impl BatchStore for MemoryTx {
    async fn batches_for_item(&mut self, item_id: ItemId) -> LedgerResult<Vec<Batch>> {
        Ok(self.working.batches_of(item_id).cloned().collect())
    }

    async fn batch(&mut self, id: BatchId) -> LedgerResult<Option<Batch>> {
        Ok(self.working.batches.get(&id).cloned())
    }

    async fn insert_batch(
        &mut self,
        item_id: ItemId,
        quantity: i64,
        expiry: Option<DateTime<Utc>>,
    ) -> LedgerResult<Batch> {
        if quantity <= 0 {
            return Err(LedgerError::invalid_quantity("batch quantity", quantity));
        }
        if !self.working.items.contains_key(&item_id) {
            return Err(LedgerError::ItemNotFound(item_id));
        }

        let id = {
            let mut shared = lock(&self.shared);
            shared.next_batch_id += 1;
            BatchId(shared.next_batch_id)
        };

        let now = Utc::now();
        let batch = Batch {
            id,
            inventory_id: item_id,
            quantity,
            expiry,
            created_at: now,
            updated_at: now,
        };
        self.working.batches.insert(id, batch.clone());
        self.touch(item_id);
        Ok(batch)
    }

    async fn set_batch_quantity(&mut self, id: BatchId, quantity: i64) -> LedgerResult<()> {
        if quantity <= 0 {
            return Err(LedgerError::invalid_quantity("batch quantity", quantity));
        }
        let batch = self.batch_mut(id)?;
        batch.quantity = quantity;
        batch.updated_at = Utc::now();
        let item_id = batch.inventory_id;
        self.touch(item_id);
        Ok(())
    }

    async fn update_batch(
        &mut self,
        id: BatchId,
        quantity: i64,
        expiry: Option<DateTime<Utc>>,
    ) -> LedgerResult<()> {
        if quantity <= 0 {
            return Err(LedgerError::invalid_quantity("batch quantity", quantity));
        }
        let batch = self.batch_mut(id)?;
        batch.quantity = quantity;
        batch.expiry = expiry;
        batch.updated_at = Utc::now();
        let item_id = batch.inventory_id;
        self.touch(item_id);
        Ok(())
    }

    async fn delete_batch(&mut self, id: BatchId) -> LedgerResult<()> {
        let batch = self
            .working
            .batches
            .remove(&id)
            .ok_or(LedgerError::BatchNotFound(id))?;
        self.touch(batch.inventory_id);
        Ok(())
    }
}

#[async_trait]
impl LedgerTransaction for MemoryTx {
    async fn commit(self) -> LedgerResult<()> {
        let mut shared = lock(&self.shared);

        for id in &self.touched {
            let seen = self.working.versions.get(id).copied().unwrap_or(0);
            let current = shared.versions.get(id).copied().unwrap_or(0);
            if seen != current {
                return Err(LedgerError::Conflict(format!(
                    "inventory item {id} was modified by a concurrent transaction"
                )));
            }
        }
        for id in &self.created {
            let name = self.working.items.get(id).map(|item| item.name.as_str());
            if shared
                .items
                .values()
                .any(|existing| Some(existing.name.as_str()) == name)
            {
                return Err(LedgerError::Conflict(format!(
                    "inventory item {id} was created concurrently under the same name"
                )));
            }
        }

        for id in &self.touched {
            shared.batches.retain(|_, b| b.inventory_id != *id);
            for batch in self.working.batches_of(*id) {
                shared.batches.insert(batch.id, batch.clone());
            }
            if let Some(item) = self.working.items.get(id) {
                shared.items.insert(*id, item.clone());
            }
            *shared.versions.entry(*id).or_insert(0) += 1;
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded(store: &MemoryStore) -> ItemId {
        let mut tx = store.begin().await.unwrap();
        let item = tx.create_item("Ibuprofen 200mg", None).await.unwrap();
        tx.commit().await.unwrap();
        item.id
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let store = MemoryStore::new();
        let id = seeded(&store).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.lock_item(id).await.unwrap();
            tx.insert_batch(id, 5, None).await.unwrap();
            tx.set_total_quantity(id, 5).await.unwrap();
        }

        assert_eq!(store.item(id).unwrap().total_quantity, 0);
        assert!(store.batches(id).is_empty());
    }

    #[tokio::test]
    async fn test_second_writer_on_same_item_conflicts() {
        let store = MemoryStore::new();
        let id = seeded(&store).await;

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.lock_item(id).await.unwrap();
        second.lock_item(id).await.unwrap();
        first.set_total_quantity(id, 3).await.unwrap();
        second.set_total_quantity(id, 9).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.item(id).unwrap().total_quantity, 3);
    }

    #[tokio::test]
    async fn test_writers_on_different_items_both_commit() {
        let store = MemoryStore::new();
        let a = seeded(&store).await;
        let b = {
            let mut tx = store.begin().await.unwrap();
            let item = tx.create_item("Cetirizine 10mg", None).await.unwrap();
            tx.commit().await.unwrap();
            item.id
        };

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.lock_item(a).await.unwrap();
        first.insert_batch(a, 2, None).await.unwrap();
        second.lock_item(b).await.unwrap();
        second.insert_batch(b, 7, None).await.unwrap();

        first.commit().await.unwrap();
        second.commit().await.unwrap();
        assert_eq!(store.batches(a).len(), 1);
        assert_eq!(store.batches(b)[0].quantity, 7);
    }

    #[tokio::test]
    async fn test_zero_quantity_batch_rejected() {
        let store = MemoryStore::new();
        let id = seeded(&store).await;

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert_batch(id, 0, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidQuantity { .. }));
    }

    #[tokio::test]
    async fn test_mismatched_items_scan() {
        let store = MemoryStore::new();
        let id = seeded(&store).await;
        assert!(store.mismatched_item_ids().await.unwrap().is_empty());

        let mut tx = store.begin().await.unwrap();
        tx.lock_item(id).await.unwrap();
        tx.set_total_quantity(id, 4).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.mismatched_item_ids().await.unwrap(), vec![id]);
    }
}

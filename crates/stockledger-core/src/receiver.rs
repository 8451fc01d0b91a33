//! # Lot Receiver
//!
//! Adds stock to an item as a new or merged batch.
//!
//! - No expiry: merged into the item's canonical indefinite batch, which is
//!   created if missing.
//! - With expiry: always a new dated batch, even when another batch carries
//!   the same expiry.
//!
//! The aggregate total is left to the caller.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::LedgerResult;
use crate::policy::canonical_indefinite;
use crate::store::BatchStore;
use crate::types::{BatchMovement, ItemId, MovementReason, ReceivedLot};
use crate::validation::validate_positive_quantity;

/// Receives `qty` units of `item_id`.
pub async fn receive<S>(
    store: &mut S,
    item_id: ItemId,
    qty: i64,
    expiry: Option<DateTime<Utc>>,
) -> LedgerResult<ReceivedLot>
where
    S: BatchStore + ?Sized,
{
    validate_positive_quantity("quantity", qty)?;

    if expiry.is_none() {
        let batches = store.batches_for_item(item_id).await?;
        if let Some(indefinite) = canonical_indefinite(&batches) {
            store
                .set_batch_quantity(indefinite.id, indefinite.quantity + qty)
                .await?;
            debug!(item_id = %item_id, batch_id = %indefinite.id, qty, "Merged into indefinite batch");
            return Ok(ReceivedLot {
                batch_id: indefinite.id,
                merged: true,
                quantity: qty,
            });
        }
    }

    let batch = store.insert_batch(item_id, qty, expiry).await?;
    debug!(item_id = %item_id, batch_id = %batch.id, qty, ?expiry, "Created batch");
    Ok(ReceivedLot {
        batch_id: batch.id,
        merged: false,
        quantity: qty,
    })
}

/// Movement record for a received lot.
pub fn receipt_movement(lot: &ReceivedLot) -> BatchMovement {
    BatchMovement {
        batch_id: lot.batch_id,
        delta: lot.quantity,
        reason: MovementReason::Receipt,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::memory::MemoryStore;
    use crate::store::{InventoryStore, LedgerTransaction, UnitOfWork};
    use chrono::Duration;

    async fn item(store: &MemoryStore) -> ItemId {
        let mut tx = store.begin().await.unwrap();
        let item = tx.create_item("Metformin 500mg", None).await.unwrap();
        tx.commit().await.unwrap();
        item.id
    }

    #[tokio::test]
    async fn test_indefinite_receipt_merges() {
        let store = MemoryStore::new();
        let id = item(&store).await;

        let mut tx = store.begin().await.unwrap();
        let first = receive(&mut tx, id, 4, None).await.unwrap();
        let second = receive(&mut tx, id, 5, None).await.unwrap();
        tx.commit().await.unwrap();

        assert!(!first.merged);
        assert!(second.merged);
        assert_eq!(first.batch_id, second.batch_id);

        let batches = store.batches(id);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].quantity, 9);
        assert!(batches[0].is_indefinite());
    }

    #[tokio::test]
    async fn test_dated_receipts_never_merge() {
        let store = MemoryStore::new();
        let id = item(&store).await;
        let expiry = Some(Utc::now() + Duration::days(30));

        let mut tx = store.begin().await.unwrap();
        let first = receive(&mut tx, id, 2, expiry).await.unwrap();
        let second = receive(&mut tx, id, 2, expiry).await.unwrap();
        tx.commit().await.unwrap();

        assert_ne!(first.batch_id, second.batch_id);
        assert_eq!(store.batches(id).len(), 2);
    }

    #[tokio::test]
    async fn test_receipt_leaves_aggregate_alone() {
        let store = MemoryStore::new();
        let id = item(&store).await;

        let mut tx = store.begin().await.unwrap();
        receive(&mut tx, id, 3, None).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.item(id).unwrap().total_quantity, 0);
    }

    #[tokio::test]
    async fn test_negative_quantity_rejected() {
        let store = MemoryStore::new();
        let id = item(&store).await;

        let mut tx = store.begin().await.unwrap();
        let err = receive(&mut tx, id, -2, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidQuantity { value: -2, .. }));
    }
}

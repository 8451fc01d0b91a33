//! # FIFO Allocator
//!
//! Deducts a requested quantity across an item's batches in consumption
//! order (see [`crate::policy::consumption_cmp`]).
//!
//! ## Walk
//! ```text
//! allocate(item, 6)
//!
//!   batches (consumption order)     remaining   action
//!   ───────────────────────────     ─────────   ─────────────────────
//!   B  qty 3  expiry +2d               6        3 ≤ 6 → delete B
//!   A  qty 5  expiry +10d              3        5 > 3 → A becomes 2
//!   C  qty 4  indefinite               0        untouched
//! ```
//!
//! The walk is planned before anything is written, so a shortfall fails with
//! [`LedgerError::InsufficientStock`] without touching the store. The
//! aggregate total is left to the caller.

use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::policy::consumption_order;
use crate::store::BatchStore;
use crate::types::{Allocation, Batch, BatchMovement, ItemId, MovementReason, TouchedBatch};
use crate::validation::validate_positive_quantity;

/// Plans an allocation over `batches` without writing.
///
/// Returns the batches to draw from in order, or the unsatisfied remainder.
pub fn plan_allocation(batches: &[Batch], qty: i64) -> Result<Vec<TouchedBatch>, i64> {
    let mut ordered = batches.to_vec();
    consumption_order(&mut ordered);

    let mut remaining = qty;
    let mut touched = Vec::new();
    for batch in &ordered {
        if remaining == 0 {
            break;
        }
        let amount = batch.quantity.min(remaining);
        touched.push(TouchedBatch {
            batch_id: batch.id,
            amount,
        });
        remaining -= amount;
    }

    if remaining > 0 {
        Err(remaining)
    } else {
        Ok(touched)
    }
}

/// Consumes `qty` units of `item_id` in consumption order.
///
/// A batch drawn down to zero is deleted; a partially drawn batch is
/// decremented.
pub async fn allocate<S>(store: &mut S, item_id: ItemId, qty: i64) -> LedgerResult<Allocation>
where
    S: BatchStore + ?Sized,
{
    validate_positive_quantity("quantity", qty)?;

    let batches = store.batches_for_item(item_id).await?;
    let touched = plan_allocation(&batches, qty)
        .map_err(|remaining| LedgerError::InsufficientStock { item_id, remaining })?;

    for step in &touched {
        // Planned from this same list, so the lookup always hits.
        let Some(batch) = batches.iter().find(|b| b.id == step.batch_id) else {
            return Err(LedgerError::BatchNotFound(step.batch_id));
        };
        let left = batch.quantity - step.amount;
        if left == 0 {
            store.delete_batch(batch.id).await?;
        } else {
            store.set_batch_quantity(batch.id, left).await?;
        }
        debug!(item_id = %item_id, batch_id = %batch.id, amount = step.amount, left, "Allocated from batch");
    }

    Ok(Allocation {
        item_id,
        requested: qty,
        touched,
    })
}

/// Movement records for an allocation.
pub fn allocation_movements(allocation: &Allocation) -> Vec<BatchMovement> {
    allocation
        .touched
        .iter()
        .map(|t| BatchMovement {
            batch_id: t.batch_id,
            delta: -t.amount,
            reason: MovementReason::Allocation,
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

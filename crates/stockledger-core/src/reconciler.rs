//! # Reconciler
//!
//! Restores `Σ batch.quantity == total_quantity` for one item. The aggregate
//! is authoritative: batches move to meet it, never the other way round.
//!
//! ## Steps
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Merge duplicate indefinite batches into the canonical (oldest) one │
//! │  2. Clamp a negative aggregate to zero (reported as underflow)         │
//! │  3. delta = total_quantity − Σ batches                                 │
//! │       delta > 0  → top up (or create) the indefinite batch             │
//! │       delta < 0  → trim in trim order:                                 │
//! │                      indefinite first, then oldest expiry first        │
//! │       delta = 0  → nothing                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An already consistent item produces no writes, so calling
//! [`reconcile`] twice in a row leaves the store exactly as the first call
//! did.

use tracing::{debug, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::policy::{canonical_indefinite, trim_order};
use crate::store::{BatchStore, InventoryStore};
use crate::types::{Batch, BatchMovement, ItemId, MovementReason, Reconciliation};

/// Reconciles the batches of `item_id` to its aggregate total.
pub async fn reconcile<S>(store: &mut S, item_id: ItemId) -> LedgerResult<Reconciliation>
where
    S: InventoryStore + BatchStore + ?Sized,
{
    let item = store
        .item(item_id)
        .await?
        .ok_or(LedgerError::ItemNotFound(item_id))?;
    let mut batches = store.batches_for_item(item_id).await?;
    let mut movements = Vec::new();

    merge_indefinite(store, &mut batches, &mut movements).await?;

    let batch_sum_before: i64 = batches.iter().map(|b| b.quantity).sum();

    let mut target = item.total_quantity;
    let mut underflow = None;
    if target < 0 {
        warn!(
            item_id = %item_id,
            total_quantity = target,
            batch_sum = batch_sum_before,
            "Aggregate below zero; trimming all batches and clamping to zero"
        );
        underflow = Some(-target);
        target = 0;
        store.set_total_quantity(item_id, 0).await?;
    }

    let delta = target - batch_sum_before;
    if delta > 0 {
        top_up(store, item_id, &batches, delta, &mut movements).await?;
    } else if delta < 0 {
        trim(store, item_id, batches, -delta, &mut movements).await?;
    }

    if !movements.is_empty() {
        debug!(item_id = %item_id, target, delta, moves = movements.len(), "Reconciled");
    }

    Ok(Reconciliation {
        item_id,
        target,
        batch_sum_before,
        movements,
        underflow,
    })
}

/// Folds every indefinite batch other than the canonical one into it.
async fn merge_indefinite<S>(
    store: &mut S,
    batches: &mut Vec<Batch>,
    movements: &mut Vec<BatchMovement>,
) -> LedgerResult<()>
where
    S: BatchStore + ?Sized,
{
    let Some(canonical) = canonical_indefinite(batches).map(|b| b.id) else {
        return Ok(());
    };

    let duplicates: Vec<Batch> = batches
        .iter()
        .filter(|b| b.is_indefinite() && b.id != canonical)
        .cloned()
        .collect();
    if duplicates.is_empty() {
        return Ok(());
    }

    let folded: i64 = duplicates.iter().map(|b| b.quantity).sum();
    for dup in &duplicates {
        store.delete_batch(dup.id).await?;
        movements.push(BatchMovement {
            batch_id: dup.id,
            delta: -dup.quantity,
            reason: MovementReason::Merge,
        });
    }

    batches.retain(|b| !duplicates.iter().any(|d| d.id == b.id));
    if let Some(kept) = batches.iter_mut().find(|b| b.id == canonical) {
        kept.quantity += folded;
        store.set_batch_quantity(kept.id, kept.quantity).await?;
    }
    movements.push(BatchMovement {
        batch_id: canonical,
        delta: folded,
        reason: MovementReason::Merge,
    });

    debug!(batch_id = %canonical, merged = duplicates.len(), folded, "Merged duplicate indefinite batches");
    Ok(())
}

async fn top_up<S>(
    store: &mut S,
    item_id: ItemId,
    batches: &[Batch],
    delta: i64,
    movements: &mut Vec<BatchMovement>,
) -> LedgerResult<()>
where
    S: BatchStore + ?Sized,
{
    let batch_id = match canonical_indefinite(batches) {
        Some(indefinite) => {
            store
                .set_batch_quantity(indefinite.id, indefinite.quantity + delta)
                .await?;
            indefinite.id
        }
        None => store.insert_batch(item_id, delta, None).await?.id,
    };
    movements.push(BatchMovement {
        batch_id,
        delta,
        reason: MovementReason::TopUp,
    });
    Ok(())
}

async fn trim<S>(
    store: &mut S,
    item_id: ItemId,
    mut batches: Vec<Batch>,
    excess: i64,
    movements: &mut Vec<BatchMovement>,
) -> LedgerResult<()>
where
    S: BatchStore + ?Sized,
{
    trim_order(&mut batches);

    let mut remaining = excess;
    for batch in &batches {
        if remaining == 0 {
            break;
        }
        let amount = batch.quantity.min(remaining);
        if amount == batch.quantity {
            store.delete_batch(batch.id).await?;
        } else {
            store
                .set_batch_quantity(batch.id, batch.quantity - amount)
                .await?;
        }
        movements.push(BatchMovement {
            batch_id: batch.id,
            delta: -amount,
            reason: MovementReason::Trim,
        });
        remaining -= amount;
    }

    if remaining > 0 {
        // Target is never negative here, so the batches always cover the excess.
        return Err(LedgerError::Storage(format!(
            "batches of item {item_id} changed during reconciliation"
        )));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

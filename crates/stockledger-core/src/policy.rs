//! # Ordering Policies
//!
//! The ledger walks an item's batches in one of two named orders. Storage
//! order is never relied on; every walk sorts through this module.
//!
//! ```text
//! batches: A (+10d)   B (+2d)   C (indefinite)
//!
//! consumption_order:  B → A → C     dated stock first, buffer last
//! trim_order:         C → B → A     buffer first, then oldest expiry
//! ```
//!
//! Both orders break ties on `created_at` and then on the store-assigned id,
//! so the walk is deterministic for identical expiries.

use std::cmp::Ordering;

use crate::types::Batch;

/// Compares two batches in consumption order: expiry ascending with
/// indefinite batches after every dated one.
pub fn consumption_cmp(a: &Batch, b: &Batch) -> Ordering {
    let by_expiry = match (a.expiry, b.expiry) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_expiry.then_with(|| tie_break(a, b))
}

/// Compares two batches in trim order: indefinite batches first, then dated
/// batches oldest expiry first.
pub fn trim_cmp(a: &Batch, b: &Batch) -> Ordering {
    let by_expiry = match (a.expiry, b.expiry) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    };
    by_expiry.then_with(|| tie_break(a, b))
}

/// Sorts batches in place into consumption order.
pub fn consumption_order(batches: &mut [Batch]) {
    batches.sort_by(consumption_cmp);
}

/// Sorts batches in place into trim order.
pub fn trim_order(batches: &mut [Batch]) {
    batches.sort_by(trim_cmp);
}

/// Picks the canonical indefinite batch: the oldest by `created_at`, then id.
pub fn canonical_indefinite(batches: &[Batch]) -> Option<&Batch> {
    batches
        .iter()
        .filter(|b| b.is_indefinite())
        .min_by(|a, b| tie_break(a, b))
}

fn tie_break(a: &Batch, b: &Batch) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

// =============================================================================
// Unit Tests
// =============================================================================

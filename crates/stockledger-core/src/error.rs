//! # Error Types
//!
//! Domain-specific error types for stockledger-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockledger-core errors (this file)                                   │
//! │  ├── LedgerError      - Ledger operation failures                      │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  stockledger-db errors (separate crate)                                │
//! │  └── DbError          - Database failures, converted into              │
//! │                         LedgerError::Conflict / LedgerError::Storage   │
//! │                                                                         │
//! │  Flow: ValidationError → LedgerError ← DbError                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A reconciliation underflow is deliberately absent: the aggregate total is
//! authoritative, so an underflow is trimmed, logged and reported on
//! [`Reconciliation`](crate::types::Reconciliation) instead of failing.

use thiserror::Error;

use crate::types::{BatchId, ItemId};

// =============================================================================
// Ledger Error
// =============================================================================

/// Errors surfaced by ledger operations.
///
/// Every variant is raised before the enclosing transaction commits, so a
/// caller that sees an `Err` can rely on the item being unchanged.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Allocation could not be fully satisfied from the item's batches.
    ///
    /// ## User Workflow
    /// ```text
    /// consume(item, 10)
    ///      │
    ///      ▼
    /// batches: [3 (+2d), 4 (indefinite)]  → 7 on hand
    ///      │
    ///      ▼
    /// InsufficientStock { remaining: 3 }  → transaction rolled back
    /// ```
    #[error("Insufficient stock for item {item_id}: {remaining} more needed")]
    InsufficientStock { item_id: ItemId, remaining: i64 },

    /// Inventory item does not exist.
    #[error("Inventory item not found: {0}")]
    ItemNotFound(ItemId),

    /// No inventory item carries this name.
    #[error("Inventory item not found: '{0}'")]
    ItemNameNotFound(String),

    /// Stock batch does not exist.
    #[error("Stock batch not found: {0}")]
    BatchNotFound(BatchId),

    /// Quantity is non-positive (or negative where zero is allowed).
    ///
    /// Raised synchronously, before any mutation.
    #[error("Invalid {field}: {value}")]
    InvalidQuantity { field: String, value: i64 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The transaction conflicted with a concurrent one or timed out waiting
    /// for the item lock. Nothing was applied.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// Any other storage failure. Nothing was applied.
    #[error("Storage failure: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Creates an InvalidQuantity error for the given field.
    pub fn invalid_quantity(field: impl Into<String>, value: i64) -> Self {
        LedgerError::InvalidQuantity {
            field: field.into(),
            value,
        }
    }

    /// Returns true for errors caused by the caller's input rather than by
    /// ledger state or storage.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidQuantity { .. } | LedgerError::Validation(_)
        )
    }

    /// Returns true if retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Conflict(_))
    }

    /// Stable machine-readable code, used in import and maintenance reports.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InsufficientStock { .. } => "insufficient_stock",
            LedgerError::ItemNotFound(_) | LedgerError::ItemNameNotFound(_) => "item_not_found",
            LedgerError::BatchNotFound(_) => "batch_not_found",
            LedgerError::InvalidQuantity { .. } => "invalid_quantity",
            LedgerError::Validation(_) => "validation",
            LedgerError::Conflict(_) => "conflict",
            LedgerError::Storage(_) => "storage",
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before any transaction is opened.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with LedgerError.
pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = LedgerError::InsufficientStock {
            item_id: ItemId(7),
            remaining: 3,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for item 7: 3 more needed"
        );

        let err = LedgerError::invalid_quantity("quantity", -1);
        assert_eq!(err.to_string(), "Invalid quantity: -1");
    }

    #[test]
    fn test_validation_converts_to_ledger_error() {
        let validation_err = ValidationError::Required {
            field: "product_name".to_string(),
        };
        let err: LedgerError = validation_err.into();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(err.is_rejection());
    }

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(LedgerError::Conflict("database is locked".into()).is_retryable());
        assert!(!LedgerError::Storage("disk I/O error".into()).is_retryable());
        assert!(!LedgerError::ItemNotFound(ItemId(1)).is_retryable());
    }

    #[test]
    fn test_name_and_id_lookups_share_a_code() {
        assert_eq!(LedgerError::ItemNotFound(ItemId(1)).code(), "item_not_found");
        assert_eq!(
            LedgerError::ItemNameNotFound("Paracetamol".into()).code(),
            "item_not_found"
        );
    }
}

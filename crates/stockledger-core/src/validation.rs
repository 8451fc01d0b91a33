//! # Validation Module
//!
//! Input checks run before a unit of work is opened.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Ingestion collaborator                                       │
//! │  ├── Spreadsheet cell parsing                                          │
//! │  └── Type checks (rows arrive pre-validated)                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Quantity sign rules → LedgerError::InvalidQuantity                │
//! │  └── Name / category rules → ValidationError                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity > 0) on stock_batches                             │
//! │  └── UNIQUE (name) on inventory_items                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockledger_core::validation::{validate_positive_quantity, validate_product_name};
//!
//! assert!(validate_positive_quantity("quantity", 5).is_ok());
//! assert!(validate_positive_quantity("quantity", 0).is_err());
//! assert!(validate_product_name("Paracetamol 500mg").is_ok());
//! ```

use crate::error::{LedgerError, LedgerResult, ValidationError};
use crate::{MAX_CATEGORY_REF_LEN, MAX_PRODUCT_NAME_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Quantity Validators
// =============================================================================

/// Validates a quantity that must be strictly positive.
///
/// Used for allocation, receipt and stock-in rows.
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Stock-in sheet, row 42: qty = -1                                      │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_positive_quantity("quantity", -1) ← THIS FUNCTION            │
/// │       │                                                                 │
/// │       ├── qty <= 0? → InvalidQuantity, row recorded as failed          │
/// │       │                                                                 │
/// │       └── OK → open transaction, receive lot                           │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_positive_quantity(field: &str, qty: i64) -> LedgerResult<()> {
    if qty <= 0 {
        return Err(LedgerError::invalid_quantity(field, qty));
    }
    Ok(())
}

/// Validates a quantity where zero is allowed (aggregate totals, declared
/// remaining counts).
pub fn validate_non_negative_quantity(field: &str, qty: i64) -> LedgerResult<()> {
    if qty < 0 {
        return Err(LedgerError::invalid_quantity(field, qty));
    }
    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product name used for import lookups and item creation.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most [`MAX_PRODUCT_NAME_LEN`] characters
///
/// ## Returns
/// The trimmed name.
pub fn validate_product_name(name: &str) -> ValidationResult<String> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "product_name".to_string(),
        });
    }

    if name.chars().count() > MAX_PRODUCT_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "product_name".to_string(),
            max: MAX_PRODUCT_NAME_LEN,
        });
    }

    Ok(name.to_string())
}

/// Validates an optional category hint.
///
/// Blank hints are treated as absent.
pub fn validate_category_ref(category: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(category) = category.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };

    if category.chars().count() > MAX_CATEGORY_REF_LEN {
        return Err(ValidationError::TooLong {
            field: "category".to_string(),
            max: MAX_CATEGORY_REF_LEN,
        });
    }

    Ok(Some(category.to_string()))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_positive_quantity() {
        assert!(validate_positive_quantity("quantity", 1).is_ok());
        assert!(validate_positive_quantity("quantity", 10_000).is_ok());

        let err = validate_positive_quantity("quantity", 0).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidQuantity { value: 0, .. }));
        assert!(validate_positive_quantity("quantity", -1).is_err());
    }

    #[test]
    fn test_validate_non_negative_quantity() {
        assert!(validate_non_negative_quantity("total_quantity", 0).is_ok());
        assert!(validate_non_negative_quantity("total_quantity", 25).is_ok());
        assert!(validate_non_negative_quantity("total_quantity", -3).is_err());
    }

    #[test]
    fn test_validate_product_name() {
        assert_eq!(
            validate_product_name("  Amoxicillin 250mg ").unwrap(),
            "Amoxicillin 250mg"
        );
        assert!(validate_product_name("").is_err());
        assert!(validate_product_name("   ").is_err());
        assert!(validate_product_name(&"A".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_category_ref() {
        assert_eq!(validate_category_ref(None).unwrap(), None);
        assert_eq!(validate_category_ref(Some("  ")).unwrap(), None);
        assert_eq!(
            validate_category_ref(Some(" Analgesics ")).unwrap(),
            Some("Analgesics".to_string())
        );
        assert!(validate_category_ref(Some(&"c".repeat(101))).is_err());
    }
}

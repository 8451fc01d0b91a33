//! # stockledger-core: Batch Ledger Logic
//!
//! Keeps each inventory item's batch-level detail consistent with its
//! independently settable aggregate total.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stock Ledger Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          API / spreadsheet ingestion (collaborators)            │   │
//! │  │    adjustments, stock-in sheets, stock-out sheets               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            ★ stockledger-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌────────────┐  ┌──────────┐  │   │
//! │  │   │ allocator │  │ receiver  │  │ reconciler │  │  import  │  │   │
//! │  │   │   FIFO    │  │   lots    │  │  Σ = total │  │ per-row  │  │   │
//! │  │   └───────────┘  └───────────┘  └────────────┘  └──────────┘  │   │
//! │  │            ledger: one transaction per operation               │   │
//! │  │                                                                 │   │
//! │  │   storage through traits only (store.rs)                       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 stockledger-db (SQLite layer)                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Items, batches, movements, receipts, import rows
//! - [`error`] - Ledger and validation errors
//! - [`validation`] - Input checks run before a transaction opens
//! - [`policy`] - Consumption and trim orderings
//! - [`store`] - Storage ports and the unit of work
//! - [`memory`] - In-memory store
//! - [`allocator`] - FIFO consumption
//! - [`receiver`] - Lot receipt
//! - [`reconciler`] - Batch/aggregate reconciliation
//! - [`import`] - Bulk spreadsheet import
//! - [`ledger`] - Transactional facade
//!
//! ## Design Principles
//!
//! 1. **Aggregate wins**: `total_quantity` is authoritative; batches follow it
//! 2. **One item, one transaction**: every operation locks its item first
//! 3. **No I/O**: storage is reached only through [`store`] traits
//! 4. **Explicit Errors**: every failure is a [`LedgerError`] variant

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocator;
pub mod error;
pub mod import;
pub mod ledger;
pub mod memory;
pub mod policy;
pub mod receiver;
pub mod reconciler;
pub mod store;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{LedgerError, LedgerResult, ValidationError};
pub use import::ImportSettings;
pub use ledger::{LedgerSettings, StockLedger};
pub use memory::MemoryStore;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of an inventory item name.
pub const MAX_PRODUCT_NAME_LEN: usize = 200;

/// Maximum length of a category reference.
pub const MAX_CATEGORY_REF_LEN: usize = 100;

/// Default "expiring soon" window for batch statistics, in days.
pub const DEFAULT_EXPIRING_SOON_DAYS: i64 = 30;

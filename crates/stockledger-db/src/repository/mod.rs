//! # Repository Module
//!
//! SQL for the two ledger tables.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  StockLedger (stockledger-core)                                        │
//! │       │                                                                 │
//! │       │  tx.lock_item(id) / tx.insert_batch(..)                        │
//! │       ▼                                                                 │
//! │  SqliteLedgerTx (store.rs)                                             │
//! │       │                                                                 │
//! │       │  InventoryRepository::lock(&mut conn, id)                      │
//! │       ▼                                                                 │
//! │  InventoryRepository / BatchRepository                                 │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Read views (db.inventory().list(..)) go straight to the pool.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`InventoryRepository`] - Item rows, locking and the mismatch scan
//! - [`BatchRepository`] - Batch rows and the expiry scan

pub mod batch;
pub mod inventory;

pub use batch::BatchRepository;
pub use inventory::InventoryRepository;

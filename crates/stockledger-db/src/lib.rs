//! # stockledger-db: SQLite Layer for the Stock Ledger
//!
//! Persists inventory items and their batches in SQLite through sqlx and
//! runs [`stockledger_core::StockLedger`] on top of them.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stock Ledger Data Flow                           │
//! │                                                                         │
//! │  StockLedger<Database>::consume(item, 6)                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 stockledger-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │ SqliteLedgerTx│    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  (store.rs)   │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │───►│ InventoryRepo │    │ 001_init.sql │  │   │
//! │  │   │ UnitOfWork    │    │ BatchRepo     │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   LedgerConfig (config.rs): TOML file + STOCKLEDGER_* env      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   ~/.local/share/stockledger/stockledger.db                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Item and batch SQL
//! - [`store`] - Storage ports over one SQLite transaction
//! - [`config`] - File and environment configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockledger_db::{Database, LedgerConfig};
//!
//! let config = LedgerConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//! let ledger = db.ledger(config.ledger_settings());
//!
//! let receipt = ledger.consume(item_id, 6).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, LedgerConfig};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::{BatchRepository, InventoryRepository};
pub use store::SqliteLedgerTx;

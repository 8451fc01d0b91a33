//! # Bulk Import Pipeline
//!
//! Applies pre-validated spreadsheet rows to the ledger, one transaction per
//! row. A failing row is recorded in the [`ImportSummary`] and the remaining
//! rows still run; nothing is ever aborted wholesale.
//!
//! ## Row Handling
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Stock-out (sales) row                                                  │
//! │    resolve item by name ── missing? → row error, continue              │
//! │    sold > 0?  consume min(sold, on hand) in consumption order          │
//! │    total_quantity = declared_remaining     (physical count wins)       │
//! │    reconcile                                                            │
//! │                                                                         │
//! │  Stock-in (purchase) row                                                │
//! │    resolve item by name ── missing? → create (if enabled)              │
//! │    no category yet?  assign the row's hint                             │
//! │    receive lot, total_quantity += qty                                  │
//! │    reconcile                                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are numbered from 1 in the summary.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::allocator::{allocate, allocation_movements};
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{finish, receive_in, StockLedger};
use crate::store::{BatchStore, InventoryStore, UnitOfWork};
use crate::types::{
    ImportKind, ImportSummary, InventoryItem, RowError, StockInRow, StockOutRow, StockReceipt,
};
use crate::validation::{
    validate_category_ref, validate_non_negative_quantity, validate_positive_quantity,
    validate_product_name,
};

/// Import behavior switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSettings {
    /// Create unknown items named on stock-in rows.
    pub auto_create_items: bool,

    /// Category assigned when a stock-in row names none and the item has
    /// none.
    pub default_category: Option<String>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            auto_create_items: true,
            default_category: None,
        }
    }
}

/// Accumulates per-row outcomes into an [`ImportSummary`].
struct SummaryBuilder {
    kind: ImportKind,
    total_rows: usize,
    started: Instant,
    processed_count: usize,
    errors: Vec<RowError>,
    succeeded_names: Vec<String>,
}

impl SummaryBuilder {
    fn new(kind: ImportKind, total_rows: usize) -> Self {
        Self {
            kind,
            total_rows,
            started: Instant::now(),
            processed_count: 0,
            errors: Vec::new(),
            succeeded_names: Vec::new(),
        }
    }

    fn record(&mut self, row: usize, product_name: &str, outcome: LedgerResult<StockReceipt>) {
        match outcome {
            Ok(_) => {
                self.processed_count += 1;
                self.succeeded_names.push(product_name.trim().to_string());
            }
            Err(e) => {
                warn!(kind = ?self.kind, row, product = %product_name, error = %e, "Import row failed");
                self.errors.push(RowError {
                    row,
                    product_name: Some(product_name.to_string()).filter(|n| !n.trim().is_empty()),
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    fn finish(self) -> ImportSummary {
        let summary = ImportSummary {
            kind: self.kind,
            total_rows: self.total_rows,
            processed_count: self.processed_count,
            errors: self.errors,
            succeeded_names: self.succeeded_names,
            elapsed_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        info!(
            kind = ?summary.kind,
            total = summary.total_rows,
            processed = summary.processed_count,
            failed = summary.errors.len(),
            elapsed_ms = summary.elapsed_ms,
            "Import complete"
        );
        summary
    }
}

impl<U: UnitOfWork> StockLedger<U> {
    /// Applies a stock-out (sales) sheet.
    pub async fn import_stock_out(&self, rows: &[StockOutRow]) -> ImportSummary {
        let mut summary = SummaryBuilder::new(ImportKind::StockOut, rows.len());
        for (index, row) in rows.iter().enumerate() {
            let outcome = self.stock_out_row(row).await;
            summary.record(index + 1, &row.product_name, outcome);
        }
        summary.finish()
    }

    /// Applies a stock-in (purchase) sheet.
    pub async fn import_stock_in(&self, rows: &[StockInRow]) -> ImportSummary {
        let mut summary = SummaryBuilder::new(ImportKind::StockIn, rows.len());
        for (index, row) in rows.iter().enumerate() {
            let outcome = self.stock_in_row(row).await;
            summary.record(index + 1, &row.product_name, outcome);
        }
        summary.finish()
    }

    async fn stock_out_row(&self, row: &StockOutRow) -> LedgerResult<StockReceipt> {
        let name = validate_product_name(&row.product_name)?;
        validate_non_negative_quantity("declared_remaining", row.declared_remaining)?;
        let sold = row.sold.unwrap_or(0);
        validate_non_negative_quantity("sold", sold)?;

        let mut tx = self.store().begin().await?;
        let item_id = tx
            .find_item_by_name(&name)
            .await?
            .ok_or(LedgerError::ItemNameNotFound(name))?
            .id;
        tx.lock_item(item_id).await?;

        let mut movements = Vec::new();
        if sold > 0 {
            let on_hand: i64 = tx
                .batches_for_item(item_id)
                .await?
                .iter()
                .map(|b| b.quantity)
                .sum();
            let take = sold.min(on_hand);
            if take > 0 {
                let allocation = allocate(&mut tx, item_id, take).await?;
                movements = allocation_movements(&allocation);
            }
        }

        tx.set_total_quantity(item_id, row.declared_remaining).await?;
        finish(tx, item_id, movements, None, "import_stock_out").await
    }

    async fn stock_in_row(&self, row: &StockInRow) -> LedgerResult<StockReceipt> {
        let name = validate_product_name(&row.product_name)?;
        validate_positive_quantity("quantity", row.quantity)?;
        let category = validate_category_ref(row.category_hint.as_deref())?
            .or_else(|| self.settings().import.default_category.clone());

        let mut tx = self.store().begin().await?;
        let item = match tx.find_item_by_name(&name).await? {
            Some(item) => item,
            None if self.settings().import.auto_create_items => {
                let item = tx.create_item(&name, category.as_deref()).await?;
                info!(item_id = %item.id, name = %item.name, "Created item from import");
                item
            }
            None => return Err(LedgerError::ItemNameNotFound(name)),
        };

        assign_missing_category(&mut tx, &item, category.as_deref()).await?;

        let (batch_id, movements) = receive_in(&mut tx, item.id, row.quantity, row.expiry).await?;
        finish(tx, item.id, movements, Some(batch_id), "import_stock_in").await
    }
}

async fn assign_missing_category<T>(
    tx: &mut T,
    item: &InventoryItem,
    category: Option<&str>,
) -> LedgerResult<()>
where
    T: InventoryStore + ?Sized,
{
    if item.category_ref.is_some() {
        return Ok(());
    }
    if let Some(category) = category {
        tx.assign_category(item.id, category).await?;
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

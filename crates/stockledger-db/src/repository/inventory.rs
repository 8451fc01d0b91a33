//! # Inventory Repository
//!
//! SQL for `inventory_items`.
//!
//! ## Two Entry Points
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  InventoryRepository::new(pool).get_by_id(id)                           │
//! │      read views; acquires its own pooled connection                    │
//! │                                                                         │
//! │  InventoryRepository::lock(&mut tx, id)                                │
//! │      ledger work; runs on the caller's open transaction                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Connection-level functions never touch the pool, so a transaction holding
//! the only connection of an in-memory database cannot deadlock on itself.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use stockledger_core::{InventoryItem, ItemId};

/// Repository for inventory item rows.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    // =========================================================================
    // Pool reads
    // =========================================================================

    pub async fn get_by_id(&self, id: ItemId) -> DbResult<Option<InventoryItem>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id).await
    }

    pub async fn get_by_name(&self, name: &str) -> DbResult<Option<InventoryItem>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_by_name(&mut conn, name).await
    }

    /// Lists items by name.
    pub async fn list(&self, limit: i64) -> DbResult<Vec<InventoryItem>> {
        let items = sqlx::query_as::<_, InventoryItem>(
            r#"
            SELECT id, name, category_ref, total_quantity, created_at, updated_at
            FROM inventory_items
            ORDER BY name
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inventory_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Items whose batch sum differs from their aggregate total.
    pub async fn mismatched_ids(&self) -> DbResult<Vec<ItemId>> {
        let ids = sqlx::query_scalar::<_, ItemId>(
            r#"
            SELECT i.id
            FROM inventory_items i
            LEFT JOIN stock_batches b ON b.inventory_id = i.id
            GROUP BY i.id, i.total_quantity
            HAVING COALESCE(SUM(b.quantity), 0) != i.total_quantity
            ORDER BY i.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!(count = ids.len(), "Found mismatched items");
        Ok(ids)
    }

    // =========================================================================
    // Connection-level operations
    // =========================================================================

    pub async fn fetch(conn: &mut SqliteConnection, id: ItemId) -> DbResult<Option<InventoryItem>> {
        let item = sqlx::query_as::<_, InventoryItem>(
            r#"
            SELECT id, name, category_ref, total_quantity, created_at, updated_at
            FROM inventory_items
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(item)
    }

    pub async fn fetch_by_name(
        conn: &mut SqliteConnection,
        name: &str,
    ) -> DbResult<Option<InventoryItem>> {
        let item = sqlx::query_as::<_, InventoryItem>(
            r#"
            SELECT id, name, category_ref, total_quantity, created_at, updated_at
            FROM inventory_items
            WHERE name = ?1
            "#,
        )
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(item)
    }

    /// Takes the database write lock through a no-op update of the item row
    /// and returns the row. `None` if the item does not exist.
    ///
    /// ```text
    /// SQLite has no SELECT ... FOR UPDATE. The first write inside a
    /// transaction acquires the RESERVED lock, held until commit/rollback;
    /// other writers wait up to busy_timeout, then fail with SQLITE_BUSY.
    /// ```
    ///
    /// `updated_at` is left alone so that locking is invisible.
    pub async fn lock(conn: &mut SqliteConnection, id: ItemId) -> DbResult<Option<InventoryItem>> {
        debug!(id = %id, "Locking inventory item");

        let item = sqlx::query_as::<_, InventoryItem>(
            r#"
            UPDATE inventory_items
            SET total_quantity = total_quantity
            WHERE id = ?1
            RETURNING id, name, category_ref, total_quantity, created_at, updated_at
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(item)
    }

    pub async fn insert(
        conn: &mut SqliteConnection,
        name: &str,
        category_ref: Option<&str>,
    ) -> DbResult<InventoryItem> {
        debug!(name = %name, "Inserting inventory item");

        let now = Utc::now();
        let item = sqlx::query_as::<_, InventoryItem>(
            r#"
            INSERT INTO inventory_items (name, category_ref, total_quantity, created_at, updated_at)
            VALUES (?1, ?2, 0, ?3, ?3)
            RETURNING id, name, category_ref, total_quantity, created_at, updated_at
            "#,
        )
        .bind(name)
        .bind(category_ref)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: name.to_string(),
            },
            other => other,
        })?;

        Ok(item)
    }

    /// Overwrites the aggregate total.
    pub async fn set_total(conn: &mut SqliteConnection, id: ItemId, total: i64) -> DbResult<()> {
        debug!(id = %id, total, "Setting total quantity");

        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET total_quantity = ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(total)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("InventoryItem", id));
        }
        Ok(())
    }

    pub async fn set_category(
        conn: &mut SqliteConnection,
        id: ItemId,
        category_ref: &str,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET category_ref = ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(category_ref)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("InventoryItem", id));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let item = InventoryRepository::insert(&mut conn, "Hydrocortisone 1%", Some("Topicals"))
            .await
            .unwrap();
        assert_eq!(item.total_quantity, 0);
        drop(conn);

        let by_name = db.inventory().get_by_name("Hydrocortisone 1%").await.unwrap();
        assert_eq!(by_name.map(|i| i.id), Some(item.id));
        assert_eq!(db.inventory().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_name_is_unique_violation() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        InventoryRepository::insert(&mut conn, "Saline 0.9%", None)
            .await
            .unwrap();
        let err = InventoryRepository::insert(&mut conn, "Saline 0.9%", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref value, .. } if value == "Saline 0.9%"));
    }

    #[tokio::test]
    async fn test_lock_leaves_row_unchanged() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let item = InventoryRepository::insert(&mut conn, "Lidocaine gel", None)
            .await
            .unwrap();
        let locked = InventoryRepository::lock(&mut conn, item.id).await.unwrap();
        assert_eq!(locked, Some(item));

        assert!(InventoryRepository::lock(&mut conn, ItemId(999))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_set_total_missing_item() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let err = InventoryRepository::set_total(&mut conn, ItemId(5), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}

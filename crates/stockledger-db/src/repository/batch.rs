//! # Batch Repository
//!
//! SQL for `stock_batches`.
//!
//! Writes run on the caller's transaction connection; the pool is used only
//! for read views and maintenance scans.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use stockledger_core::{Batch, BatchId, DatedBatch, ItemId};

/// Repository for stock batch rows.
#[derive(Debug, Clone)]
pub struct BatchRepository {
    pool: SqlitePool,
}

impl BatchRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BatchRepository { pool }
    }

    // =========================================================================
    // Pool reads
    // =========================================================================

    pub async fn get_by_id(&self, id: BatchId) -> DbResult<Option<Batch>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id).await
    }

    /// Batches of one item, in storage order.
    pub async fn list_for_item(&self, item_id: ItemId) -> DbResult<Vec<Batch>> {
        let mut conn = self.pool.acquire().await?;
        Self::for_item(&mut conn, item_id).await
    }

    /// Distinct items owning a dated batch whose expiry is before `now`.
    pub async fn items_with_expired(&self, now: DateTime<Utc>) -> DbResult<Vec<ItemId>> {
        let ids = sqlx::query_scalar::<_, ItemId>(
            r#"
            SELECT DISTINCT inventory_id
            FROM stock_batches
            WHERE expiry IS NOT NULL
              AND julianday(expiry) < julianday(?1)
            ORDER BY inventory_id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = ids.len(), "Found items with expired batches");
        Ok(ids)
    }

    /// Dated batches expiring at or before `until`, joined with their item,
    /// ordered by expiry then id.
    pub async fn dated_until(&self, until: DateTime<Utc>) -> DbResult<Vec<DatedBatch>> {
        let rows = sqlx::query_as::<_, DatedBatch>(
            r#"
            SELECT b.id, b.inventory_id, b.quantity, b.expiry, b.created_at, b.updated_at,
                   i.name AS item_name, i.category_ref
            FROM stock_batches b
            JOIN inventory_items i ON i.id = b.inventory_id
            WHERE b.expiry IS NOT NULL
              AND julianday(b.expiry) <= julianday(?1)
            ORDER BY julianday(b.expiry), b.id
            "#,
        )
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), "Listed dated batches");
        Ok(rows)
    }

    // =========================================================================
    // Connection-level operations
    // =========================================================================

    pub async fn fetch(conn: &mut SqliteConnection, id: BatchId) -> DbResult<Option<Batch>> {
        let batch = sqlx::query_as::<_, Batch>(
            r#"
            SELECT id, inventory_id, quantity, expiry, created_at, updated_at
            FROM stock_batches
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(batch)
    }

    pub async fn for_item(conn: &mut SqliteConnection, item_id: ItemId) -> DbResult<Vec<Batch>> {
        let batches = sqlx::query_as::<_, Batch>(
            r#"
            SELECT id, inventory_id, quantity, expiry, created_at, updated_at
            FROM stock_batches
            WHERE inventory_id = ?1
            ORDER BY id
            "#,
        )
        .bind(item_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(batches)
    }

    pub async fn insert(
        conn: &mut SqliteConnection,
        item_id: ItemId,
        quantity: i64,
        expiry: Option<DateTime<Utc>>,
    ) -> DbResult<Batch> {
        debug!(item_id = %item_id, quantity, ?expiry, "Inserting batch");

        let now = Utc::now();
        let batch = sqlx::query_as::<_, Batch>(
            r#"
            INSERT INTO stock_batches (inventory_id, quantity, expiry, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            RETURNING id, inventory_id, quantity, expiry, created_at, updated_at
            "#,
        )
        .bind(item_id)
        .bind(quantity)
        .bind(expiry)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        Ok(batch)
    }

    pub async fn set_quantity(conn: &mut SqliteConnection, id: BatchId, quantity: i64) -> DbResult<()> {
        debug!(id = %id, quantity, "Setting batch quantity");

        let result = sqlx::query(
            r#"
            UPDATE stock_batches
            SET quantity = ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Batch", id));
        }
        Ok(())
    }

    pub async fn update(
        conn: &mut SqliteConnection,
        id: BatchId,
        quantity: i64,
        expiry: Option<DateTime<Utc>>,
    ) -> DbResult<()> {
        debug!(id = %id, quantity, ?expiry, "Updating batch");

        let result = sqlx::query(
            r#"
            UPDATE stock_batches
            SET quantity = ?2, expiry = ?3, updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(quantity)
        .bind(expiry)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Batch", id));
        }
        Ok(())
    }

    pub async fn delete(conn: &mut SqliteConnection, id: BatchId) -> DbResult<()> {
        debug!(id = %id, "Deleting batch");

        let result = sqlx::query("DELETE FROM stock_batches WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Batch", id));
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
    use crate::repository::InventoryRepository;
    use chrono::Duration;

    #[tokio::test]
    async fn test_insert_preserves_expiry() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let item = InventoryRepository::insert(&mut conn, "Amoxicillin 500mg", None)
            .await
            .unwrap();

        let expiry = Utc::now() + Duration::days(90);
        let dated = BatchRepository::insert(&mut conn, item.id, 12, Some(expiry))
            .await
            .unwrap();
        let indefinite = BatchRepository::insert(&mut conn, item.id, 3, None)
            .await
            .unwrap();
        drop(conn);

        let stored = db.batches().list_for_item(item.id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].id, dated.id);
        assert_eq!(stored[0].expiry, Some(expiry));
        assert_eq!(stored[1].id, indefinite.id);
        assert!(stored[1].is_indefinite());
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected_by_schema() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let item = InventoryRepository::insert(&mut conn, "Gauze pads", None)
            .await
            .unwrap();

        let err = BatchRepository::insert(&mut conn, item.id, 0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }

    #[tokio::test]
    async fn test_items_with_expired_skips_indefinite_and_future() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        let mut conn = db.pool().acquire().await.unwrap();

        let stale = InventoryRepository::insert(&mut conn, "Stale", None).await.unwrap();
        let fresh = InventoryRepository::insert(&mut conn, "Fresh", None).await.unwrap();
        BatchRepository::insert(&mut conn, stale.id, 4, Some(now - Duration::days(2)))
            .await
            .unwrap();
        BatchRepository::insert(&mut conn, stale.id, 1, None).await.unwrap();
        BatchRepository::insert(&mut conn, fresh.id, 4, Some(now + Duration::days(2)))
            .await
            .unwrap();
        BatchRepository::insert(&mut conn, fresh.id, 9, None).await.unwrap();
        drop(conn);

        let ids = db.batches().items_with_expired(now).await.unwrap();
        assert_eq!(ids, vec![stale.id]);
    }

    #[tokio::test]
    async fn test_dated_until_joins_item_and_orders_by_expiry() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        let mut conn = db.pool().acquire().await.unwrap();

        let gauze = InventoryRepository::insert(&mut conn, "Gauze Pads", Some("First Aid"))
            .await
            .unwrap();
        let tape = InventoryRepository::insert(&mut conn, "Medical Tape", None).await.unwrap();
        let late = BatchRepository::insert(&mut conn, gauze.id, 3, Some(now + Duration::days(8)))
            .await
            .unwrap();
        let early = BatchRepository::insert(&mut conn, tape.id, 5, Some(now - Duration::days(1)))
            .await
            .unwrap();
        BatchRepository::insert(&mut conn, tape.id, 7, Some(now + Duration::days(40)))
            .await
            .unwrap();
        BatchRepository::insert(&mut conn, gauze.id, 2, None).await.unwrap();
        drop(conn);

        let rows = db.batches().dated_until(now + Duration::days(8)).await.unwrap();
        let ids: Vec<BatchId> = rows.iter().map(|r| r.batch.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);
        assert_eq!(rows[0].item_name, "Medical Tape");
        assert_eq!(rows[0].category_ref, None);
        assert_eq!(rows[1].item_name, "Gauze Pads");
        assert_eq!(rows[1].category_ref.as_deref(), Some("First Aid"));
        assert_eq!(rows[1].batch.expiry, Some(now + Duration::days(8)));
    }

    #[tokio::test]
    async fn test_delete_missing_batch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let err = BatchRepository::delete(&mut conn, BatchId(77)).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}

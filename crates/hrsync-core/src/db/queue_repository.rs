//! Retry queue repository implementation

use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{QueueStatus, RetryQueueItem};

use super::{opt_int, opt_text};

/// Per-status item counts for a tenant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Trait for retry queue storage operations
#[allow(async_fn_in_trait)]
pub trait QueueRepository {
    /// Insert a new item
    async fn insert(&self, item: &RetryQueueItem) -> Result<()>;

    /// Load an item
    async fn get(&self, id: &str) -> Result<Option<RetryQueueItem>>;

    /// Atomically lease up to `limit` due PENDING items, flipping each to
    /// PROCESSING. Ordered by priority desc, then age asc. A crashed
    /// worker's lease is recovered by `reset_stuck`, never lost.
    async fn lease(
        &self,
        tenant_id: Option<&str>,
        limit: usize,
        now: i64,
    ) -> Result<Vec<RetryQueueItem>>;

    /// Persist an item's new state
    async fn update(&self, item: &RetryQueueItem) -> Result<()>;

    /// Revert PROCESSING items untouched since `cutoff` back to PENDING,
    /// due at `now`. Returns how many were reverted.
    async fn reset_stuck(&self, cutoff: i64, now: i64) -> Result<u64>;

    /// Drop terminal items last touched before `cutoff`. Returns how
    /// many were deleted.
    async fn delete_finished_before(&self, cutoff: i64) -> Result<u64>;

    /// Item counts per status for a tenant
    async fn counts(&self, tenant_id: &str) -> Result<QueueCounts>;
}

/// libSQL implementation of `QueueRepository`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_item(row: &libsql::Row) -> Result<RetryQueueItem> {
        Ok(RetryQueueItem {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            operation: row.get(2)?,
            payload: serde_json::from_str(&row.get::<String>(3)?)?,
            priority: row.get(4)?,
            attempts: u32::try_from(row.get::<i64>(5)?).unwrap_or(0),
            max_attempts: u32::try_from(row.get::<i64>(6)?).unwrap_or(0),
            status: row.get::<String>(7)?.parse()?,
            next_retry_at: row.get::<Option<i64>>(8)?,
            last_error: row.get::<Option<String>>(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    async fn due_candidates(
        &self,
        tenant_id: Option<&str>,
        limit: usize,
        now: i64,
    ) -> Result<Vec<String>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = match tenant_id {
            Some(tenant) => {
                self.conn
                    .query(
                        "SELECT id FROM retry_queue
                         WHERE tenant_id = ? AND status = 'PENDING'
                           AND next_retry_at IS NOT NULL AND next_retry_at <= ?
                         ORDER BY priority DESC, created_at ASC, id ASC
                         LIMIT ?",
                        params![tenant, now, limit],
                    )
                    .await?
            }
            None => {
                self.conn
                    .query(
                        "SELECT id FROM retry_queue
                         WHERE status = 'PENDING'
                           AND next_retry_at IS NOT NULL AND next_retry_at <= ?
                         ORDER BY priority DESC, created_at ASC, id ASC
                         LIMIT ?",
                        params![now, limit],
                    )
                    .await?
            }
        };

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<String>(0)?);
        }
        Ok(ids)
    }
}

const ITEM_COLUMNS: &str = "id, tenant_id, operation, payload, priority, attempts, max_attempts, \
     status, next_retry_at, last_error, created_at, updated_at";

impl QueueRepository for LibSqlQueueRepository<'_> {
    async fn insert(&self, item: &RetryQueueItem) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO retry_queue (id, tenant_id, operation, payload, priority, attempts, \
                 max_attempts, status, next_retry_at, last_error, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    item.id.as_str(),
                    item.tenant_id.as_str(),
                    item.operation.as_str(),
                    serde_json::to_string(&item.payload)?,
                    item.priority,
                    i64::from(item.attempts),
                    i64::from(item.max_attempts),
                    item.status.as_str(),
                    opt_int(item.next_retry_at),
                    opt_text(item.last_error.as_deref()),
                    item.created_at,
                    item.updated_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<RetryQueueItem>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ITEM_COLUMNS} FROM retry_queue WHERE id = ?"),
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_item(&row)?)),
            None => Ok(None),
        }
    }

    async fn lease(
        &self,
        tenant_id: Option<&str>,
        limit: usize,
        now: i64,
    ) -> Result<Vec<RetryQueueItem>> {
        let candidates = self.due_candidates(tenant_id, limit, now).await?;

        let mut leased = Vec::new();
        for id in candidates {
            // Conditional flip: if another worker got here first the row
            // is no longer PENDING and the update affects nothing.
            let affected = self
                .conn
                .execute(
                    "UPDATE retry_queue SET status = 'PROCESSING', updated_at = ?
                     WHERE id = ? AND status = 'PENDING'",
                    params![now, id.as_str()],
                )
                .await?;

            if affected == 1 {
                if let Some(item) = self.get(&id).await? {
                    leased.push(item);
                }
            }
        }

        Ok(leased)
    }

    async fn update(&self, item: &RetryQueueItem) -> Result<()> {
        self.conn
            .execute(
                "UPDATE retry_queue SET status = ?, attempts = ?, next_retry_at = ?, \
                 last_error = ?, updated_at = ? WHERE id = ?",
                params![
                    item.status.as_str(),
                    i64::from(item.attempts),
                    opt_int(item.next_retry_at),
                    opt_text(item.last_error.as_deref()),
                    item.updated_at,
                    item.id.as_str(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn reset_stuck(&self, cutoff: i64, now: i64) -> Result<u64> {
        let affected = self
            .conn
            .execute(
                "UPDATE retry_queue SET status = 'PENDING', next_retry_at = ?, updated_at = ?
                 WHERE status = 'PROCESSING' AND updated_at <= ?",
                params![now, now, cutoff],
            )
            .await?;
        Ok(affected)
    }

    async fn delete_finished_before(&self, cutoff: i64) -> Result<u64> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM retry_queue
                 WHERE status IN ('COMPLETED', 'FAILED') AND updated_at <= ?",
                params![cutoff],
            )
            .await?;
        Ok(affected)
    }

    async fn counts(&self, tenant_id: &str) -> Result<QueueCounts> {
        let mut rows = self
            .conn
            .query(
                "SELECT status, COUNT(*) FROM retry_queue WHERE tenant_id = ? GROUP BY status",
                params![tenant_id],
            )
            .await?;

        let mut counts = QueueCounts::default();
        while let Some(row) = rows.next().await? {
            let status: QueueStatus = row.get::<String>(0)?.parse()?;
            let count = u64::try_from(row.get::<i64>(1)?).unwrap_or(0);
            match status {
                QueueStatus::Pending => counts.pending = count,
                QueueStatus::Processing => counts.processing = count,
                QueueStatus::Completed => counts.completed = count,
                QueueStatus::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::db::Database;

    use super::*;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_and_get_round_trip() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let item = RetryQueueItem::new("t1", "attendance_push", json!({"id": "a-1"}), 2, 5);
        repo.insert(&item).await.unwrap();

        let loaded = repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(loaded, item);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lease_respects_tenant_filter() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        repo.insert(&RetryQueueItem::new("t1", "op", json!(1), 0, 3))
            .await
            .unwrap();
        repo.insert(&RetryQueueItem::new("t2", "op", json!(2), 0, 3))
            .await
            .unwrap();

        let leased = repo
            .lease(Some("t1"), 10, crate::util::now_millis())
            .await
            .unwrap();
        assert_eq!(leased.len(), 1);
        assert_eq!(leased[0].tenant_id, "t1");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn counts_group_by_status() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        repo.insert(&RetryQueueItem::new("t1", "op", json!(1), 0, 3))
            .await
            .unwrap();
        let mut failed = RetryQueueItem::new("t1", "op", json!(2), 0, 3);
        failed.status = QueueStatus::Failed;
        failed.next_retry_at = None;
        repo.insert(&failed).await.unwrap();

        let counts = repo.counts("t1").await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.completed, 0);
    }
}

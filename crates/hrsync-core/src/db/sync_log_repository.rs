//! Sync log repository implementation

use libsql::{params, Connection};

use crate::error::Result;
use crate::models::SyncLogEntry;

use super::opt_int;

/// Trait for sync log storage operations
#[allow(async_fn_in_trait)]
pub trait SyncLogRepository {
    /// Upsert an entry by id (created RUNNING, completed once)
    async fn save(&self, entry: &SyncLogEntry) -> Result<()>;

    /// Most recent entry for a tenant, optionally for one operation
    async fn latest(&self, tenant_id: &str, operation: Option<&str>)
        -> Result<Option<SyncLogEntry>>;

    /// Recent entries for a tenant, newest first
    async fn list_recent(&self, tenant_id: &str, limit: usize) -> Result<Vec<SyncLogEntry>>;
}

/// libSQL implementation of `SyncLogRepository`
pub struct LibSqlSyncLogRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncLogRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &libsql::Row) -> Result<SyncLogEntry> {
        Ok(SyncLogEntry {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            operation: row.get(2)?,
            direction: row.get::<String>(3)?.parse()?,
            status: row.get::<String>(4)?.parse()?,
            record_count: u32::try_from(row.get::<i64>(5)?).unwrap_or(0),
            success_count: u32::try_from(row.get::<i64>(6)?).unwrap_or(0),
            failed_count: u32::try_from(row.get::<i64>(7)?).unwrap_or(0),
            duration_ms: row.get(8)?,
            errors: serde_json::from_str(&row.get::<String>(9)?)?,
            started_at: row.get(10)?,
            finished_at: row.get::<Option<i64>>(11)?,
        })
    }
}

const LOG_COLUMNS: &str = "id, tenant_id, operation, direction, status, record_count, \
     success_count, failed_count, duration_ms, errors, started_at, finished_at";

impl SyncLogRepository for LibSqlSyncLogRepository<'_> {
    async fn save(&self, entry: &SyncLogEntry) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_logs (id, tenant_id, operation, direction, status, \
                 record_count, success_count, failed_count, duration_ms, errors, started_at, \
                 finished_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    record_count = excluded.record_count,
                    success_count = excluded.success_count,
                    failed_count = excluded.failed_count,
                    duration_ms = excluded.duration_ms,
                    errors = excluded.errors,
                    finished_at = excluded.finished_at",
                params![
                    entry.id.as_str(),
                    entry.tenant_id.as_str(),
                    entry.operation.as_str(),
                    entry.direction.as_str(),
                    entry.status.as_str(),
                    i64::from(entry.record_count),
                    i64::from(entry.success_count),
                    i64::from(entry.failed_count),
                    entry.duration_ms,
                    serde_json::to_string(&entry.errors)?,
                    entry.started_at,
                    opt_int(entry.finished_at),
                ],
            )
            .await?;
        Ok(())
    }

    async fn latest(
        &self,
        tenant_id: &str,
        operation: Option<&str>,
    ) -> Result<Option<SyncLogEntry>> {
        let mut rows = match operation {
            Some(operation) => {
                self.conn
                    .query(
                        &format!(
                            "SELECT {LOG_COLUMNS} FROM sync_logs
                             WHERE tenant_id = ? AND operation = ?
                             ORDER BY started_at DESC LIMIT 1"
                        ),
                        params![tenant_id, operation],
                    )
                    .await?
            }
            None => {
                self.conn
                    .query(
                        &format!(
                            "SELECT {LOG_COLUMNS} FROM sync_logs
                             WHERE tenant_id = ?
                             ORDER BY started_at DESC LIMIT 1"
                        ),
                        params![tenant_id],
                    )
                    .await?
            }
        };

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_entry(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_recent(&self, tenant_id: &str, limit: usize) -> Result<Vec<SyncLogEntry>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {LOG_COLUMNS} FROM sync_logs
                     WHERE tenant_id = ?
                     ORDER BY started_at DESC LIMIT ?"
                ),
                params![tenant_id, i64::try_from(limit).unwrap_or(i64::MAX)],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::models::{SyncDirection, SyncRunStatus};

    use super::*;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn running_entry_completes_in_place() {
        let db = setup().await;
        let repo = LibSqlSyncLogRepository::new(db.connection());

        let mut entry = SyncLogEntry::begin("t1", "employee_sync", SyncDirection::Inbound);
        repo.save(&entry).await.unwrap();

        entry.finish(5, 4, vec!["emp-9: no email".to_string()]);
        repo.save(&entry).await.unwrap();

        let latest = repo.latest("t1", None).await.unwrap().unwrap();
        assert_eq!(latest.id, entry.id);
        assert_eq!(latest.status, SyncRunStatus::Partial);
        assert_eq!(latest.errors, vec!["emp-9: no email".to_string()]);
        assert!(latest.finished_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn latest_filters_by_operation() {
        let db = setup().await;
        let repo = LibSqlSyncLogRepository::new(db.connection());

        let mut employee = SyncLogEntry::begin("t1", "employee_sync", SyncDirection::Inbound);
        employee.started_at -= 10;
        let attendance = SyncLogEntry::begin("t1", "attendance_push", SyncDirection::Outbound);
        repo.save(&employee).await.unwrap();
        repo.save(&attendance).await.unwrap();

        let latest_any = repo.latest("t1", None).await.unwrap().unwrap();
        assert_eq!(latest_any.operation, "attendance_push");

        let latest_employee = repo
            .latest("t1", Some("employee_sync"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest_employee.id, employee.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_recent_orders_newest_first() {
        let db = setup().await;
        let repo = LibSqlSyncLogRepository::new(db.connection());

        let mut older = SyncLogEntry::begin("t1", "employee_sync", SyncDirection::Inbound);
        older.started_at -= 1000;
        let newer = SyncLogEntry::begin("t1", "employee_sync", SyncDirection::Inbound);
        repo.save(&older).await.unwrap();
        repo.save(&newer).await.unwrap();

        let recent = repo.list_recent("t1", 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, newer.id);
    }
}

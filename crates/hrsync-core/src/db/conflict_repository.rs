//! Conflict record repository implementation

use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{ConflictRecord, ResolutionState};

use super::{opt_int, opt_text};

/// Trait for conflict record storage operations
#[allow(async_fn_in_trait)]
pub trait ConflictRepository {
    /// Upsert a conflict record by id
    async fn save(&self, record: &ConflictRecord) -> Result<()>;

    /// Load a conflict record
    async fn get(&self, id: &str) -> Result<Option<ConflictRecord>>;

    /// All records still awaiting manual review, oldest first
    async fn list_unresolved(&self, tenant_id: &str) -> Result<Vec<ConflictRecord>>;

    /// Apply the manual resolution action
    async fn mark_resolved(
        &self,
        id: &str,
        state: ResolutionState,
        resolved_by: &str,
        at: i64,
    ) -> Result<()>;
}

/// libSQL implementation of `ConflictRepository`
pub struct LibSqlConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_record(row: &libsql::Row) -> Result<ConflictRecord> {
        Ok(ConflictRecord {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            entity_type: row.get::<String>(2)?.parse()?,
            entity_id: row.get(3)?,
            local_snapshot: serde_json::from_str(&row.get::<String>(4)?)?,
            remote_snapshot: serde_json::from_str(&row.get::<String>(5)?)?,
            conflict_kind: row.get::<String>(6)?.parse()?,
            resolution_state: row.get::<String>(7)?.parse()?,
            resolved_by: row.get::<Option<String>>(8)?,
            resolved_at: row.get::<Option<i64>>(9)?,
            created_at: row.get(10)?,
        })
    }
}

const CONFLICT_COLUMNS: &str = "id, tenant_id, entity_type, entity_id, local_snapshot, \
     remote_snapshot, conflict_kind, resolution_state, resolved_by, resolved_at, created_at";

impl ConflictRepository for LibSqlConflictRepository<'_> {
    async fn save(&self, record: &ConflictRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO conflicts (id, tenant_id, entity_type, entity_id, local_snapshot, \
                 remote_snapshot, conflict_kind, resolution_state, resolved_by, resolved_at, \
                 created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    resolution_state = excluded.resolution_state,
                    resolved_by = excluded.resolved_by,
                    resolved_at = excluded.resolved_at",
                params![
                    record.id.as_str(),
                    record.tenant_id.as_str(),
                    record.entity_type.as_str(),
                    record.entity_id.as_str(),
                    serde_json::to_string(&record.local_snapshot)?,
                    serde_json::to_string(&record.remote_snapshot)?,
                    record.conflict_kind.as_str(),
                    record.resolution_state.as_str(),
                    opt_text(record.resolved_by.as_deref()),
                    opt_int(record.resolved_at),
                    record.created_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ConflictRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {CONFLICT_COLUMNS} FROM conflicts WHERE id = ?"),
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_unresolved(&self, tenant_id: &str) -> Result<Vec<ConflictRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {CONFLICT_COLUMNS} FROM conflicts
                     WHERE tenant_id = ? AND resolution_state = 'UNRESOLVED'
                     ORDER BY created_at ASC"
                ),
                params![tenant_id],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }

    async fn mark_resolved(
        &self,
        id: &str,
        state: ResolutionState,
        resolved_by: &str,
        at: i64,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE conflicts SET resolution_state = ?, resolved_by = ?, resolved_at = ?
                 WHERE id = ?",
                params![state.as_str(), resolved_by, at, id],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::db::Database;
    use crate::models::EntityType;

    use super::*;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn save_and_get_round_trip() {
        let db = setup().await;
        let repo = LibSqlConflictRepository::new(db.connection());

        let record = ConflictRecord::unresolved(
            "t1",
            EntityType::Employee,
            "emp-1",
            json!({"name": "Ali"}),
            json!({"name": "Aly"}),
        );
        repo.save(&record).await.unwrap();

        let loaded = repo.get(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unresolved_listing_excludes_resolved_records() {
        let db = setup().await;
        let repo = LibSqlConflictRepository::new(db.connection());

        let open = ConflictRecord::unresolved("t1", EntityType::Employee, "emp-1", json!({}), json!({}));
        let closed = ConflictRecord::unresolved("t1", EntityType::Employee, "emp-2", json!({}), json!({}));
        repo.save(&open).await.unwrap();
        repo.save(&closed).await.unwrap();
        repo.mark_resolved(&closed.id, ResolutionState::KeepOdoo, "admin", 1)
            .await
            .unwrap();

        let unresolved = repo.list_unresolved("t1").await.unwrap();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].id, open.id);

        let resolved = repo.get(&closed.id).await.unwrap().unwrap();
        assert_eq!(resolved.resolution_state, ResolutionState::KeepOdoo);
        assert_eq!(resolved.resolved_by.as_deref(), Some("admin"));
    }
}

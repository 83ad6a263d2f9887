//! Sync lease repository implementation
//!
//! The lease row replaces an in-process "is running" flag so multiple
//! service instances sharing the store coordinate safely. Expired leases
//! are reclaimable; a crashed run never wedges its tenant.

use libsql::{params, Connection};

use crate::error::Result;

/// Trait for sync lease storage operations
#[allow(async_fn_in_trait)]
pub trait LeaseRepository {
    /// Try to claim the `(tenant, flow)` lease for `owner` until
    /// `expires_at`. An expired lease is reclaimed; a live one held by
    /// someone else denies the claim. Returns whether the claim
    /// succeeded.
    async fn acquire(
        &self,
        tenant_id: &str,
        flow: &str,
        owner: &str,
        now: i64,
        expires_at: i64,
    ) -> Result<bool>;

    /// Release a lease held by `owner`. Releasing a lease that was
    /// already reclaimed is a no-op.
    async fn release(&self, tenant_id: &str, flow: &str, owner: &str) -> Result<()>;
}

/// libSQL implementation of `LeaseRepository`
pub struct LibSqlLeaseRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlLeaseRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl LeaseRepository for LibSqlLeaseRepository<'_> {
    async fn acquire(
        &self,
        tenant_id: &str,
        flow: &str,
        owner: &str,
        now: i64,
        expires_at: i64,
    ) -> Result<bool> {
        // Drop an expired lease so the insert below can reclaim the slot
        self.conn
            .execute(
                "DELETE FROM sync_leases WHERE tenant_id = ? AND flow = ? AND expires_at <= ?",
                params![tenant_id, flow, now],
            )
            .await?;

        self.conn
            .execute(
                "INSERT OR IGNORE INTO sync_leases (tenant_id, flow, owner, expires_at)
                 VALUES (?, ?, ?, ?)",
                params![tenant_id, flow, owner, expires_at],
            )
            .await?;

        // Whoever's owner id is stored holds the lease
        let mut rows = self
            .conn
            .query(
                "SELECT owner FROM sync_leases WHERE tenant_id = ? AND flow = ?",
                params![tenant_id, flow],
            )
            .await?;

        let holder: Option<String> = match rows.next().await? {
            Some(row) => Some(row.get(0)?),
            None => None,
        };

        Ok(holder.as_deref() == Some(owner))
    }

    async fn release(&self, tenant_id: &str, flow: &str, owner: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM sync_leases WHERE tenant_id = ? AND flow = ? AND owner = ?",
                params![tenant_id, flow, owner],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    use super::*;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_claim_is_denied_while_lease_is_live() {
        let db = setup().await;
        let repo = LibSqlLeaseRepository::new(db.connection());

        assert!(repo
            .acquire("t1", "employee_sync", "run-a", 1000, 10_000)
            .await
            .unwrap());
        assert!(!repo
            .acquire("t1", "employee_sync", "run-b", 2000, 12_000)
            .await
            .unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn expired_lease_is_reclaimable() {
        let db = setup().await;
        let repo = LibSqlLeaseRepository::new(db.connection());

        assert!(repo
            .acquire("t1", "employee_sync", "run-a", 1000, 2000)
            .await
            .unwrap());
        // run-a crashed; its lease expired at 2000
        assert!(repo
            .acquire("t1", "employee_sync", "run-b", 3000, 9000)
            .await
            .unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn release_frees_the_slot() {
        let db = setup().await;
        let repo = LibSqlLeaseRepository::new(db.connection());

        repo.acquire("t1", "employee_sync", "run-a", 1000, 10_000)
            .await
            .unwrap();
        repo.release("t1", "employee_sync", "run-a").await.unwrap();

        assert!(repo
            .acquire("t1", "employee_sync", "run-b", 1500, 11_000)
            .await
            .unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flows_and_tenants_hold_independent_leases() {
        let db = setup().await;
        let repo = LibSqlLeaseRepository::new(db.connection());

        assert!(repo
            .acquire("t1", "employee_sync", "run-a", 1000, 10_000)
            .await
            .unwrap());
        assert!(repo
            .acquire("t1", "attendance_push", "run-b", 1000, 10_000)
            .await
            .unwrap());
        assert!(repo
            .acquire("t2", "employee_sync", "run-c", 1000, 10_000)
            .await
            .unwrap());
    }
}

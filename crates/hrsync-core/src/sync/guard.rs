//! Per-tenant, per-flow run guard

use crate::db::LeaseRepository;
use crate::error::{Error, Result};
use crate::util::{new_id, now_millis};

/// How long a flow may hold its lease before a crashed run becomes
/// reclaimable.
pub const LEASE_DURATION_MINUTES: i64 = 15;

/// A held claim on one `(tenant, flow)` slot.
///
/// Prevents a scheduled trigger from racing a manual one. The lease
/// carries an expiry, so a run that dies without releasing never wedges
/// the tenant: the next run reclaims the slot once the lease lapses.
#[derive(Debug)]
pub struct SyncGuard {
    tenant_id: String,
    flow: String,
    owner: String,
}

impl SyncGuard {
    /// Claim the slot or fail with [`Error::SyncInProgress`].
    pub async fn acquire<R: LeaseRepository>(
        repo: &R,
        tenant_id: &str,
        flow: &str,
    ) -> Result<Self> {
        let owner = new_id();
        let now = now_millis();
        let expires_at = now + LEASE_DURATION_MINUTES * 60_000;

        let acquired = repo.acquire(tenant_id, flow, &owner, now, expires_at).await?;
        if !acquired {
            return Err(Error::SyncInProgress(format!("{tenant_id}/{flow}")));
        }

        Ok(Self {
            tenant_id: tenant_id.to_string(),
            flow: flow.to_string(),
            owner,
        })
    }

    /// Release the slot. Safe to call after the lease expired.
    pub async fn release<R: LeaseRepository>(self, repo: &R) -> Result<()> {
        repo.release(&self.tenant_id, &self.flow, &self.owner).await
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{Database, LibSqlLeaseRepository};

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_acquire_is_denied_until_release() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlLeaseRepository::new(db.connection());

        let guard = SyncGuard::acquire(&repo, "t1", "employee_sync").await.unwrap();

        let denied = SyncGuard::acquire(&repo, "t1", "employee_sync").await;
        assert!(matches!(denied, Err(Error::SyncInProgress(_))));

        guard.release(&repo).await.unwrap();
        SyncGuard::acquire(&repo, "t1", "employee_sync").await.unwrap();
    }
}

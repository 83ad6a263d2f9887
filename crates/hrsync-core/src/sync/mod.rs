//! Sync orchestration: the concrete flows composing the codec, client,
//! mapper, resolver, and retry queue
//!
//! Every flow follows the same shape: claim the tenant's lease, open a
//! RUNNING log entry, work through the batch collecting per-record
//! errors, then close the entry and release the lease. A per-record
//! failure never aborts the batch; a connection-level failure does and
//! is recorded as a FAILED entry.

mod attendance;
mod employee;
mod guard;
mod leave;
mod payroll;

pub use attendance::{AttendancePushReport, AttendanceWindow, ATTENDANCE_BATCH_LIMIT};
pub use employee::{EmployeeSyncOptions, EmployeeSyncReport};
pub use guard::{SyncGuard, LEASE_DURATION_MINUTES};
pub use leave::{LeaveFetchOptions, LeavePushReport};
pub use payroll::{summarize_attendance, PayrollExport, PayrollPeriod, PayrollPushReport};

use serde_json::Value as Json;

use crate::db::{
    ConnectionRepository, Database, EntityMappingRepository, FieldMappingRepository,
    LibSqlConnectionRepository, LibSqlEntityMappingRepository, LibSqlFieldMappingRepository,
    LibSqlLeaseRepository, LibSqlQueueRepository, LibSqlSyncLogRepository, SyncLogRepository,
};
use crate::error::{Error, Result};
use crate::hr::HrRepository;
use crate::mapping::{seed_defaults, FieldMapper};
use crate::models::{ConnectionConfig, EntityMapping, EntityType, RetryQueueItem, SyncLogEntry};
use crate::queue::RetryQueue;
use crate::remote::RemoteClient;
use crate::util::{is_http_url, normalize_text_option, now_millis};

/// Outcome of one queue worker pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueRunReport {
    /// Items leased this pass
    pub processed: u32,
    /// Items that completed
    pub completed: u32,
    /// Items that failed (rescheduled or terminal)
    pub failed: u32,
}

/// Connection state summary for status surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Whether a connection row exists
    pub connected: bool,
    /// When a flow last finished (unix ms)
    pub last_sync_at: Option<i64>,
    /// Remote base URL (non-secret echo)
    pub remote_url: Option<String>,
    /// Remote database name
    pub database: Option<String>,
    /// Scheduler interval hint
    pub sync_interval_minutes: Option<i64>,
}

/// Composes the remote client, field mapper, conflict resolver, and
/// retry queue into the concrete sync flows.
pub struct SyncOrchestrator<'a, H> {
    db: &'a Database,
    hr: &'a H,
    remote: RemoteClient,
}

impl<'a, H: HrRepository> SyncOrchestrator<'a, H> {
    /// Create an orchestrator over the sync store and the external HR
    /// store.
    pub fn new(db: &'a Database, hr: &'a H) -> Result<Self> {
        Ok(Self {
            db,
            hr,
            remote: RemoteClient::new()?,
        })
    }

    /// The sync store this orchestrator works against.
    pub const fn database(&self) -> &Database {
        self.db
    }

    pub(crate) const fn hr(&self) -> &H {
        self.hr
    }

    pub(crate) const fn remote(&self) -> &RemoteClient {
        &self.remote
    }

    // ---------------------------------------------------------------
    // Connection lifecycle
    // ---------------------------------------------------------------

    /// Authenticate without storing anything; returns the session id.
    pub async fn test_connection(
        &self,
        remote_url: &str,
        database: &str,
        username: &str,
        secret: &str,
    ) -> Result<i64> {
        self.remote
            .authenticate(remote_url, database, username, secret)
            .await
    }

    /// Verify credentials, store the tenant connection with the session
    /// id cached, and seed the default field mappings.
    pub async fn connect(&self, mut config: ConnectionConfig) -> Result<ConnectionConfig> {
        if !is_http_url(&config.remote_url) {
            return Err(Error::InvalidInput(
                "remote URL must include http:// or https://".to_string(),
            ));
        }
        config.webhook_url = normalize_text_option(config.webhook_url.take());
        config.webhook_secret = normalize_text_option(config.webhook_secret.take());

        let uid = self
            .remote
            .authenticate(
                &config.remote_url,
                &config.database,
                &config.username,
                &config.secret,
            )
            .await?;
        config.session_id = Some(uid);
        config.connected_at = now_millis();

        let connections = LibSqlConnectionRepository::new(self.db.connection());
        connections.save(&config).await?;

        let field_mappings = LibSqlFieldMappingRepository::new(self.db.connection());
        seed_defaults(&field_mappings, &config.tenant_id).await?;

        tracing::info!(tenant = %config.tenant_id, uid, "remote connection established");
        Ok(config)
    }

    /// Remove the tenant's connection and all of its entity mappings.
    pub async fn disconnect(&self, tenant_id: &str) -> Result<()> {
        let connections = LibSqlConnectionRepository::new(self.db.connection());
        connections.delete(tenant_id).await?;

        let mappings = LibSqlEntityMappingRepository::new(self.db.connection());
        mappings.delete_all(tenant_id).await?;

        tracing::info!(tenant = tenant_id, "remote connection removed");
        Ok(())
    }

    /// Load a tenant's stored connection or fail with `NotFound`.
    pub async fn config(&self, tenant_id: &str) -> Result<ConnectionConfig> {
        let connections = LibSqlConnectionRepository::new(self.db.connection());
        connections
            .find(tenant_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no connection for tenant {tenant_id}")))
    }

    /// Non-secret connection state for status surfaces.
    pub async fn status(&self, tenant_id: &str) -> Result<ConnectionStatus> {
        let connections = LibSqlConnectionRepository::new(self.db.connection());
        Ok(connections.find(tenant_id).await?.map_or(
            ConnectionStatus {
                connected: false,
                last_sync_at: None,
                remote_url: None,
                database: None,
                sync_interval_minutes: None,
            },
            |config| ConnectionStatus {
                connected: true,
                last_sync_at: config.last_sync_at,
                remote_url: Some(config.remote_url),
                database: Some(config.database),
                sync_interval_minutes: Some(config.sync_interval_minutes),
            },
        ))
    }

    /// Link a local employee to a remote one by hand.
    pub async fn map_employee(
        &self,
        tenant_id: &str,
        local_id: &str,
        remote_id: i64,
    ) -> Result<EntityMapping> {
        let mappings = LibSqlEntityMappingRepository::new(self.db.connection());
        let mapping = EntityMapping::new(tenant_id, EntityType::Employee, local_id, remote_id);
        mappings.save(&mapping).await?;
        Ok(mapping)
    }

    /// Remove a local employee's link.
    pub async fn unmap_employee(&self, tenant_id: &str, local_id: &str) -> Result<()> {
        let mappings = LibSqlEntityMappingRepository::new(self.db.connection());
        mappings
            .delete_by_local(tenant_id, EntityType::Employee, local_id)
            .await
    }

    /// All employee links for a tenant, oldest first.
    pub async fn list_employee_mappings(&self, tenant_id: &str) -> Result<Vec<EntityMapping>> {
        let mappings = LibSqlEntityMappingRepository::new(self.db.connection());
        mappings.list(tenant_id, EntityType::Employee).await
    }

    // ---------------------------------------------------------------
    // Queue worker
    // ---------------------------------------------------------------

    /// Lease due retry items for the tenant and execute them, completing
    /// or rescheduling each through the queue's backoff rules.
    pub async fn run_queue(&self, config: &ConnectionConfig, limit: usize) -> Result<QueueRunReport> {
        let queue = RetryQueue::new(LibSqlQueueRepository::new(self.db.connection()));
        let items = queue.lease_next_for(&config.tenant_id, limit).await?;

        let mut report = QueueRunReport {
            processed: u32::try_from(items.len()).unwrap_or(u32::MAX),
            ..QueueRunReport::default()
        };

        for item in items {
            match self.execute_queued(config, &item).await {
                Ok(()) => {
                    queue.mark_completed(&item.id).await?;
                    report.completed += 1;
                }
                Err(error) => {
                    queue.mark_failed(&item.id, &error.to_string()).await?;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Dispatch one leased item by operation name.
    async fn execute_queued(&self, config: &ConnectionConfig, item: &RetryQueueItem) -> Result<()> {
        match item.operation.as_str() {
            "attendance_push" => self.execute_queued_attendance(config, &item.payload).await,
            "leave_push" => self.execute_queued_leave(config, &item.payload).await,
            "employee_sync" => self.execute_queued_employee(config, &item.payload).await,
            other => Err(Error::InvalidInput(format!("unknown queue operation: {other}"))),
        }
    }

    // ---------------------------------------------------------------
    // Shared flow plumbing
    // ---------------------------------------------------------------

    pub(crate) async fn acquire_guard(&self, tenant_id: &str, flow: &str) -> Result<SyncGuard> {
        let leases = LibSqlLeaseRepository::new(self.db.connection());
        SyncGuard::acquire(&leases, tenant_id, flow).await
    }

    pub(crate) async fn release_guard(&self, guard: SyncGuard) {
        let leases = LibSqlLeaseRepository::new(self.db.connection());
        if let Err(error) = guard.release(&leases).await {
            tracing::warn!("failed to release sync lease: {error}");
        }
    }

    pub(crate) async fn save_log(&self, entry: &SyncLogEntry) -> Result<()> {
        let logs = LibSqlSyncLogRepository::new(self.db.connection());
        logs.save(entry).await
    }

    pub(crate) async fn mark_synced(&self, tenant_id: &str) -> Result<()> {
        let connections = LibSqlConnectionRepository::new(self.db.connection());
        connections.record_sync(tenant_id, now_millis()).await
    }

    pub(crate) async fn mapper(
        &self,
        tenant_id: &str,
        entity_type: EntityType,
    ) -> Result<FieldMapper> {
        let field_mappings = LibSqlFieldMappingRepository::new(self.db.connection());
        let rules = field_mappings.list(tenant_id, entity_type).await?;
        Ok(FieldMapper::new(entity_type, rules))
    }

    /// Enqueue a retry for a transiently failed push.
    pub(crate) async fn enqueue_retry(
        &self,
        tenant_id: &str,
        operation: &str,
        payload: Json,
    ) -> Result<String> {
        let queue = RetryQueue::new(LibSqlQueueRepository::new(self.db.connection()));
        queue.enqueue(tenant_id, operation, payload, 0).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::hr::MemoryHrRepository;
    use crate::models::{QueueStatus, RetryQueueItem};

    use super::*;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn connect_rejects_non_http_urls_before_any_network_io() {
        let db = setup().await;
        let hr = MemoryHrRepository::new();
        let orchestrator = SyncOrchestrator::new(&db, &hr).unwrap();

        let config = ConnectionConfig::new("t1", "erp.example.com", "db", "admin", "k");
        let error = orchestrator.connect(config).await.unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn status_reports_disconnected_tenant() {
        let db = setup().await;
        let hr = MemoryHrRepository::new();
        let orchestrator = SyncOrchestrator::new(&db, &hr).unwrap();

        let status = orchestrator.status("t1").await.unwrap();
        assert!(!status.connected);
        assert!(status.remote_url.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn map_and_unmap_employee_round_trip() {
        let db = setup().await;
        let hr = MemoryHrRepository::new();
        let orchestrator = SyncOrchestrator::new(&db, &hr).unwrap();

        orchestrator.map_employee("t1", "emp-1", 10).await.unwrap();

        let mappings = LibSqlEntityMappingRepository::new(db.connection());
        assert!(mappings
            .find_by_local("t1", EntityType::Employee, "emp-1")
            .await
            .unwrap()
            .is_some());

        orchestrator.unmap_employee("t1", "emp-1").await.unwrap();
        assert!(mappings
            .find_by_local("t1", EntityType::Employee, "emp-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queue_worker_fails_unknown_operations_through_backoff() {
        let db = setup().await;
        let hr = MemoryHrRepository::new();
        let orchestrator = SyncOrchestrator::new(&db, &hr).unwrap();
        let config = ConnectionConfig::new("t1", "https://erp.example.com", "db", "admin", "k");

        let queue = RetryQueue::new(LibSqlQueueRepository::new(db.connection()));
        let id = queue
            .enqueue("t1", "frobnicate", json!({}), 0)
            .await
            .unwrap();

        let report = orchestrator.run_queue(&config, 10).await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);

        let item: RetryQueueItem = queue.get(&id).await.unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.attempts, 1);
        assert!(item.last_error.unwrap().contains("unknown queue operation"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queue_worker_replays_leave_push_and_fails_on_missing_mapping() {
        let db = setup().await;
        let hr = MemoryHrRepository::new();
        let orchestrator = SyncOrchestrator::new(&db, &hr).unwrap();
        let config = ConnectionConfig::new("t1", "https://erp.example.com", "db", "admin", "k");

        let queue = RetryQueue::new(LibSqlQueueRepository::new(db.connection()));
        let leave = crate::models::LeaveRequest {
            id: crate::util::new_id(),
            tenant_id: "t1".to_string(),
            employee_id: "emp-unmapped".to_string(),
            leave_type_id: 1,
            date_from: 0,
            date_to: 1,
            notes: None,
        };
        let id = queue
            .enqueue("t1", "leave_push", json!({ "leave": leave }), 0)
            .await
            .unwrap();

        let report = orchestrator.run_queue(&config, 10).await.unwrap();
        assert_eq!(report.failed, 1);

        let item = queue.get(&id).await.unwrap().unwrap();
        assert!(item.last_error.unwrap().contains("not mapped"));
    }
}

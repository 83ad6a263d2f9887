//! Attendance push flow (local → remote)

use serde_json::{Map, Value as Json};

use crate::db::{EntityMappingRepository, LibSqlEntityMappingRepository};
use crate::error::{Error, Result};
use crate::hr::HrRepository;
use crate::mapping::FieldMapper;
use crate::models::{
    AttendanceRecord, ConnectionConfig, EntityType, SyncDirection, SyncLogEntry,
};
use crate::util::millis_to_rfc3339;
use crate::wire::Value;

use super::SyncOrchestrator;

const FLOW: &str = "attendance_push";

/// Bounded batch size per run; the scheduler catches the remainder on
/// the next trigger.
pub const ATTENDANCE_BATCH_LIMIT: usize = 100;

/// Time window of local attendance to push (unix ms, inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendanceWindow {
    pub from: i64,
    pub to: i64,
}

/// Aggregate outcome of one attendance push run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendancePushReport {
    /// Local records considered
    pub total: u32,
    /// Records created remotely
    pub pushed: u32,
    /// Records that failed (transient failures also land in the retry
    /// queue)
    pub failed: u32,
    /// Per-record failures
    pub errors: Vec<String>,
}

impl<H: HrRepository> SyncOrchestrator<'_, H> {
    /// Push a window of local attendance for mapped employees to the
    /// remote system.
    pub async fn push_attendance(
        &self,
        config: &ConnectionConfig,
        window: AttendanceWindow,
    ) -> Result<AttendancePushReport> {
        let guard = self.acquire_guard(&config.tenant_id, FLOW).await?;
        let mut log = SyncLogEntry::begin(&config.tenant_id, FLOW, SyncDirection::Outbound);
        self.save_log(&log).await?;

        let result = self.push_attendance_window(config, window).await;
        let report = match result {
            Ok(report) => report,
            Err(error) => {
                log.fail(error.to_string());
                self.save_log(&log).await?;
                self.release_guard(guard).await;
                return Err(error);
            }
        };

        log.finish(report.total, report.pushed, report.errors.clone());
        self.save_log(&log).await?;
        self.mark_synced(&config.tenant_id).await?;
        self.release_guard(guard).await;

        tracing::info!(
            tenant = %config.tenant_id,
            pushed = report.pushed,
            failed = report.failed,
            "attendance push finished"
        );
        Ok(report)
    }

    async fn push_attendance_window(
        &self,
        config: &ConnectionConfig,
        window: AttendanceWindow,
    ) -> Result<AttendancePushReport> {
        let mappings = LibSqlEntityMappingRepository::new(self.database().connection());
        let links = mappings.list(&config.tenant_id, EntityType::Employee).await?;

        if links.is_empty() {
            return Ok(AttendancePushReport {
                errors: vec!["no employees are mapped to the remote system".to_string()],
                ..AttendancePushReport::default()
            });
        }

        let employee_ids: Vec<String> = links.iter().map(|link| link.local_id.clone()).collect();
        let remote_ids: std::collections::HashMap<&str, i64> = links
            .iter()
            .map(|link| (link.local_id.as_str(), link.remote_id))
            .collect();

        let records = self
            .hr()
            .attendance_between(
                &config.tenant_id,
                &employee_ids,
                window.from,
                window.to,
                ATTENDANCE_BATCH_LIMIT,
            )
            .await?;

        let mapper = self.mapper(&config.tenant_id, EntityType::Attendance).await?;
        let mut report = AttendancePushReport {
            total: u32::try_from(records.len()).unwrap_or(u32::MAX),
            ..AttendancePushReport::default()
        };

        for record in records {
            let Some(remote_employee_id) = remote_ids.get(record.employee_id.as_str()).copied()
            else {
                continue;
            };

            match self
                .push_one_attendance(config, &mapper, &record, remote_employee_id)
                .await
            {
                Ok(remote_id) => {
                    tracing::debug!(attendance = %record.id, remote_id, "attendance pushed");
                    report.pushed += 1;
                }
                Err(error) => {
                    if error.is_transient() {
                        let payload = serde_json::json!({
                            "attendance": record,
                            "remote_employee_id": remote_employee_id,
                        });
                        self.enqueue_retry(&config.tenant_id, FLOW, payload).await?;
                    }
                    report.failed += 1;
                    report.errors.push(format!("attendance {}: {error}", record.id));
                }
            }
        }

        Ok(report)
    }

    /// Push a single attendance record; used by the flow and by the
    /// queue worker when it replays a retry item.
    pub(crate) async fn push_one_attendance(
        &self,
        config: &ConnectionConfig,
        mapper: &FieldMapper,
        record: &AttendanceRecord,
        remote_employee_id: i64,
    ) -> Result<i64> {
        let payload = attendance_payload(mapper, record, remote_employee_id)?;
        self.remote().create(config, "hr.attendance", payload).await
    }

    /// Replay one queued attendance push.
    pub(crate) async fn execute_queued_attendance(
        &self,
        config: &ConnectionConfig,
        payload: &Json,
    ) -> Result<()> {
        let record: AttendanceRecord = serde_json::from_value(
            payload
                .get("attendance")
                .cloned()
                .ok_or_else(|| {
                    Error::InvalidInput("attendance_push payload carries no record".to_string())
                })?,
        )?;
        let remote_employee_id = payload
            .get("remote_employee_id")
            .and_then(Json::as_i64)
            .ok_or_else(|| {
                Error::InvalidInput(
                    "attendance_push payload carries no remote employee id".to_string(),
                )
            })?;

        let mapper = self.mapper(&config.tenant_id, EntityType::Attendance).await?;
        self.push_one_attendance(config, &mapper, &record, remote_employee_id)
            .await?;
        Ok(())
    }
}

/// Build the remote record for one attendance row.
pub(crate) fn attendance_payload(
    mapper: &FieldMapper,
    record: &AttendanceRecord,
    remote_employee_id: i64,
) -> Result<Value> {
    let mut local = Map::new();
    local.insert(
        "check_in".to_string(),
        millis_to_rfc3339(record.check_in).map_or(Json::Null, Json::String),
    );
    local.insert(
        "check_out".to_string(),
        record
            .check_out
            .and_then(millis_to_rfc3339)
            .map_or(Json::Null, Json::String),
    );

    let tree = mapper.to_remote(&local)?;
    let mut payload = Value::from_json(&tree);
    if let Value::Struct(members) = &mut payload {
        members.insert(0, ("employee_id".to_string(), Value::Int(remote_employee_id)));
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::hr::MemoryHrRepository;
    use crate::mapping::seed_defaults;
    use crate::models::AttendanceStatus;

    use super::super::SyncOrchestrator;
    use super::*;

    fn attendance(id: &str, employee_id: &str, check_in: i64) -> AttendanceRecord {
        AttendanceRecord {
            id: id.to_string(),
            tenant_id: "t1".to_string(),
            employee_id: employee_id.to_string(),
            check_in,
            check_out: Some(check_in + 8 * 60 * 60_000),
            working_minutes: 480,
            overtime_minutes: 0,
            late_minutes: 0,
            early_leave_minutes: 0,
            status: AttendanceStatus::Present,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn push_without_mappings_reports_instead_of_failing() {
        let db = Database::open_in_memory().await.unwrap();
        let hr = MemoryHrRepository::new();
        let orchestrator = SyncOrchestrator::new(&db, &hr).unwrap();
        let config = ConnectionConfig::new("t1", "https://erp.example.com", "db", "admin", "k");

        let report = orchestrator
            .push_attendance(&config, AttendanceWindow { from: 0, to: 10 })
            .await
            .unwrap();

        assert_eq!(report.total, 0);
        assert_eq!(report.pushed, 0);
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn payload_maps_timestamps_and_prepends_employee() {
        let db = Database::open_in_memory().await.unwrap();
        let field_mappings = crate::db::LibSqlFieldMappingRepository::new(db.connection());
        seed_defaults(&field_mappings, "t1").await.unwrap();

        let hr = MemoryHrRepository::new();
        let orchestrator = SyncOrchestrator::new(&db, &hr).unwrap();
        let mapper = orchestrator
            .mapper("t1", EntityType::Attendance)
            .await
            .unwrap();

        // 2024-03-01T08:00:00Z
        let record = attendance("a-1", "emp-1", 1_709_280_000_000);
        let payload = attendance_payload(&mapper, &record, 77).unwrap();

        assert_eq!(payload.get("employee_id"), Some(&Value::Int(77)));
        assert_eq!(
            payload.get("check_in"),
            Some(&Value::string("2024-03-01 08:00:00"))
        );
        assert_eq!(
            payload.get("check_out"),
            Some(&Value::string("2024-03-01 16:00:00"))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_attendance_omits_check_out() {
        let db = Database::open_in_memory().await.unwrap();
        let field_mappings = crate::db::LibSqlFieldMappingRepository::new(db.connection());
        seed_defaults(&field_mappings, "t1").await.unwrap();

        let hr = MemoryHrRepository::new();
        let orchestrator = SyncOrchestrator::new(&db, &hr).unwrap();
        let mapper = orchestrator
            .mapper("t1", EntityType::Attendance)
            .await
            .unwrap();

        let mut record = attendance("a-1", "emp-1", 1_709_280_000_000);
        record.check_out = None;
        let payload = attendance_payload(&mapper, &record, 77).unwrap();

        assert!(payload.get("check_in").is_some());
        assert_eq!(payload.get("check_out"), None);
    }
}

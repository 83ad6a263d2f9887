//! Leave fetch/push flows

use serde_json::{Map, Value as Json};

use crate::db::{EntityMappingRepository, LibSqlEntityMappingRepository};
use crate::error::{Error, Result};
use crate::hr::HrRepository;
use crate::models::{
    ConnectionConfig, EntityType, LeaveRequest, SyncDirection, SyncLogEntry,
};
use crate::util::millis_to_rfc3339;
use crate::wire::Value;

use super::SyncOrchestrator;

const FETCH_FLOW: &str = "leave_fetch";
const PUSH_FLOW: &str = "leave_push";

const LEAVE_FIELDS: [&str; 8] = [
    "id",
    "employee_id",
    "holiday_status_id",
    "date_from",
    "date_to",
    "number_of_days",
    "state",
    "name",
];

/// Filters for a remote leave fetch (unix ms bounds, remote state).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaveFetchOptions {
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub state: Option<String>,
}

/// Aggregate outcome of one leave push run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeavePushReport {
    /// Local requests considered
    pub total: u32,
    /// Requests created remotely
    pub pushed: u32,
    /// Requests that failed (transient failures also land in the retry
    /// queue)
    pub failed: u32,
    /// Per-record failures
    pub errors: Vec<String>,
}

impl<H: HrRepository> SyncOrchestrator<'_, H> {
    /// Fetch remote leave records, mapped into the local field shape.
    pub async fn fetch_leaves(
        &self,
        config: &ConnectionConfig,
        options: &LeaveFetchOptions,
    ) -> Result<Vec<Map<String, Json>>> {
        let guard = self.acquire_guard(&config.tenant_id, FETCH_FLOW).await?;
        let mut log = SyncLogEntry::begin(&config.tenant_id, FETCH_FLOW, SyncDirection::Inbound);
        self.save_log(&log).await?;

        let fetched = self
            .remote()
            .search_read(config, "hr.leave", leave_domain(options), &LEAVE_FIELDS)
            .await;
        let records = match fetched {
            Ok(records) => records,
            Err(error) => {
                log.fail(error.to_string());
                self.save_log(&log).await?;
                self.release_guard(guard).await;
                return Err(error);
            }
        };

        let mapper = self.mapper(&config.tenant_id, EntityType::Leave).await?;
        let mut mapped = Vec::new();
        let mut errors = Vec::new();
        for record in &records {
            let json = record.to_json();
            match mapper.to_local(&json) {
                Ok(mut local) => {
                    // Identity fields travel outside the mapping rules
                    if let Some(id) = json.get("id") {
                        local.insert("remote_id".to_string(), id.clone());
                    }
                    if let Some(employee) = json.get("employee_id") {
                        local.insert("remote_employee".to_string(), employee.clone());
                    }
                    mapped.push(local);
                }
                Err(error) => errors.push(error.to_string()),
            }
        }

        let total = u32::try_from(records.len()).unwrap_or(u32::MAX);
        let success = u32::try_from(mapped.len()).unwrap_or(u32::MAX);
        log.finish(total, success, errors);
        self.save_log(&log).await?;
        self.release_guard(guard).await;

        Ok(mapped)
    }

    /// Remote leave types as `(id, name)` pairs.
    pub async fn fetch_leave_types(&self, config: &ConnectionConfig) -> Result<Vec<(i64, String)>> {
        let records = self
            .remote()
            .search_read(
                config,
                "hr.leave.type",
                Value::Array(Vec::new()),
                &["id", "name"],
            )
            .await?;

        Ok(records
            .iter()
            .filter_map(|record| {
                let id = record.get("id")?.as_i64()?;
                let name = record.get("name")?.as_str()?.to_string();
                Some((id, name))
            })
            .collect())
    }

    /// Push the tenant's pending local leave requests to the remote
    /// system.
    pub async fn push_leaves(&self, config: &ConnectionConfig) -> Result<LeavePushReport> {
        let guard = self.acquire_guard(&config.tenant_id, PUSH_FLOW).await?;
        let mut log = SyncLogEntry::begin(&config.tenant_id, PUSH_FLOW, SyncDirection::Outbound);
        self.save_log(&log).await?;

        let leaves = match self.hr().pending_leaves(&config.tenant_id).await {
            Ok(leaves) => leaves,
            Err(error) => {
                log.fail(error.to_string());
                self.save_log(&log).await?;
                self.release_guard(guard).await;
                return Err(error);
            }
        };

        let mut report = LeavePushReport {
            total: u32::try_from(leaves.len()).unwrap_or(u32::MAX),
            ..LeavePushReport::default()
        };

        for leave in leaves {
            match self.push_leave(config, &leave).await {
                Ok(remote_id) => {
                    tracing::debug!(leave = %leave.id, remote_id, "leave pushed");
                    report.pushed += 1;
                }
                Err(error) => {
                    if error.is_transient() {
                        let payload = serde_json::json!({ "leave": leave });
                        self.enqueue_retry(&config.tenant_id, PUSH_FLOW, payload).await?;
                    }
                    report.failed += 1;
                    report.errors.push(format!("leave {}: {error}", leave.id));
                }
            }
        }

        log.finish(report.total, report.pushed, report.errors.clone());
        self.save_log(&log).await?;
        self.mark_synced(&config.tenant_id).await?;
        self.release_guard(guard).await;

        Ok(report)
    }

    /// Create one remote leave for a mapped employee; returns the remote
    /// id.
    pub async fn push_leave(&self, config: &ConnectionConfig, leave: &LeaveRequest) -> Result<i64> {
        let mappings = LibSqlEntityMappingRepository::new(self.database().connection());
        let mapping = mappings
            .find_by_local(&config.tenant_id, EntityType::Employee, &leave.employee_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "employee {} is not mapped to the remote system",
                    leave.employee_id
                ))
            })?;

        let mapper = self.mapper(&config.tenant_id, EntityType::Leave).await?;
        let payload = leave_payload(&mapper, leave, mapping.remote_id)?;
        self.remote().create(config, "hr.leave", payload).await
    }

    /// Replay one queued leave push.
    pub(crate) async fn execute_queued_leave(
        &self,
        config: &ConnectionConfig,
        payload: &Json,
    ) -> Result<()> {
        let leave: LeaveRequest = serde_json::from_value(
            payload.get("leave").cloned().ok_or_else(|| {
                Error::InvalidInput("leave_push payload carries no request".to_string())
            })?,
        )?;
        self.push_leave(config, &leave).await?;
        Ok(())
    }
}

/// Domain filter for the remote leave fetch.
fn leave_domain(options: &LeaveFetchOptions) -> Value {
    let mut clauses = Vec::new();
    if let Some(from) = options.from.and_then(remote_datetime) {
        clauses.push(Value::Array(vec![
            Value::string("date_from"),
            Value::string(">="),
            Value::Str(from),
        ]));
    }
    if let Some(to) = options.to.and_then(remote_datetime) {
        clauses.push(Value::Array(vec![
            Value::string("date_to"),
            Value::string("<="),
            Value::Str(to),
        ]));
    }
    if let Some(state) = &options.state {
        clauses.push(Value::Array(vec![
            Value::string("state"),
            Value::string("="),
            Value::string(state.as_str()),
        ]));
    }
    Value::Array(clauses)
}

fn remote_datetime(ms: i64) -> Option<String> {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Build the remote record for one leave request. The remote model wants
/// both the effective and the requested date range, with the same
/// values.
fn leave_payload(
    mapper: &crate::mapping::FieldMapper,
    leave: &LeaveRequest,
    remote_employee_id: i64,
) -> Result<Value> {
    let mut local = Map::new();
    local.insert(
        "date_from".to_string(),
        millis_to_rfc3339(leave.date_from).map_or(Json::Null, Json::String),
    );
    local.insert(
        "date_to".to_string(),
        millis_to_rfc3339(leave.date_to).map_or(Json::Null, Json::String),
    );
    local.insert("leave_type_id".to_string(), Json::from(leave.leave_type_id));
    local.insert(
        "notes".to_string(),
        leave.notes.clone().map_or(Json::Null, Json::String),
    );

    let tree = mapper.to_remote(&local)?;
    let mut payload = Value::from_json(&tree);
    if let Value::Struct(members) = &mut payload {
        members.insert(0, ("employee_id".to_string(), Value::Int(remote_employee_id)));
        // Mirror the effective range into the requested range
        let date_from = members
            .iter()
            .find(|(name, _)| name == "date_from")
            .map(|(_, value)| value.clone());
        let date_to = members
            .iter()
            .find(|(name, _)| name == "date_to")
            .map(|(_, value)| value.clone());
        if let Some(date_from) = date_from {
            members.push(("request_date_from".to_string(), date_from));
        }
        if let Some(date_to) = date_to {
            members.push(("request_date_to".to_string(), date_to));
        }
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::hr::MemoryHrRepository;
    use crate::mapping::seed_defaults;
    use crate::util::new_id;

    use super::super::SyncOrchestrator;
    use super::*;

    fn leave(employee_id: &str) -> LeaveRequest {
        LeaveRequest {
            id: new_id(),
            tenant_id: "t1".to_string(),
            employee_id: employee_id.to_string(),
            leave_type_id: 3,
            date_from: 1_709_280_000_000, // 2024-03-01T08:00:00Z
            date_to: 1_709_366_400_000,   // 2024-03-02T08:00:00Z
            notes: Some("Family visit".to_string()),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn payload_maps_dates_type_and_employee() {
        let db = Database::open_in_memory().await.unwrap();
        let field_mappings = crate::db::LibSqlFieldMappingRepository::new(db.connection());
        seed_defaults(&field_mappings, "t1").await.unwrap();

        let hr = MemoryHrRepository::new();
        let orchestrator = SyncOrchestrator::new(&db, &hr).unwrap();
        let mapper = orchestrator.mapper("t1", EntityType::Leave).await.unwrap();

        let payload = leave_payload(&mapper, &leave("emp-1"), 42).unwrap();

        assert_eq!(payload.get("employee_id"), Some(&Value::Int(42)));
        assert_eq!(payload.get("holiday_status_id"), Some(&Value::Int(3)));
        assert_eq!(
            payload.get("date_from"),
            Some(&Value::string("2024-03-01 08:00:00"))
        );
        assert_eq!(
            payload.get("request_date_from"),
            Some(&Value::string("2024-03-01 08:00:00"))
        );
        assert_eq!(payload.get("name"), Some(&Value::string("Family visit")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn push_fails_fast_for_unmapped_employee() {
        let db = Database::open_in_memory().await.unwrap();
        let field_mappings = crate::db::LibSqlFieldMappingRepository::new(db.connection());
        seed_defaults(&field_mappings, "t1").await.unwrap();

        let hr = MemoryHrRepository::new();
        let orchestrator = SyncOrchestrator::new(&db, &hr).unwrap();
        let config = ConnectionConfig::new("t1", "https://erp.example.com", "db", "admin", "k");

        let error = orchestrator
            .push_leave(&config, &leave("emp-unmapped"))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[test]
    fn domain_renders_bounds_as_remote_datetimes() {
        let options = LeaveFetchOptions {
            from: Some(1_709_280_000_000),
            to: None,
            state: Some("validate".to_string()),
        };
        let Value::Array(clauses) = leave_domain(&options) else {
            panic!("domain must be an array");
        };
        assert_eq!(clauses.len(), 2);
        assert_eq!(
            clauses[0],
            Value::Array(vec![
                Value::string("date_from"),
                Value::string(">="),
                Value::string("2024-03-01 08:00:00"),
            ])
        );
    }
}

//! Employee sync flow (remote → local)

use serde_json::{Map, Value as Json};

use crate::conflict::{detect_conflicts, ConflictResolver, ResolutionAction};
use crate::db::{EntityMappingRepository, LibSqlConflictRepository, LibSqlEntityMappingRepository};
use crate::error::{Error, Result};
use crate::hr::HrRepository;
use crate::mapping::FieldMapper;
use crate::models::{
    ConnectionConfig, EntityMapping, EntityType, LocalEmployee, SyncDirection, SyncLogEntry,
};
use crate::util::{millis_to_rfc3339, now_millis};
use crate::wire::Value;

use super::SyncOrchestrator;

const FLOW: &str = "employee_sync";

const EMPLOYEE_FIELDS: [&str; 8] = [
    "id",
    "name",
    "work_email",
    "mobile_phone",
    "work_phone",
    "job_title",
    "active",
    "write_date",
];

/// Knobs for one employee sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeSyncOptions {
    /// Only fetch employees the remote system marks active
    pub active_only: bool,
    /// Restrict the fetch to one remote department
    pub department_id: Option<i64>,
    /// Import unmapped remote employees that have a work email
    pub create_missing: bool,
}

impl Default for EmployeeSyncOptions {
    fn default() -> Self {
        Self {
            active_only: true,
            department_id: None,
            create_missing: false,
        }
    }
}

/// Aggregate outcome of one employee sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmployeeSyncReport {
    /// Remote records considered
    pub total: u32,
    /// New local records created (with a new mapping)
    pub imported: u32,
    /// Existing local records refreshed
    pub updated: u32,
    /// Records left alone (no email, creation disabled, or conflict kept
    /// local)
    pub skipped: u32,
    /// Per-record failures; never abort the batch
    pub errors: Vec<String>,
}

enum ImportOutcome {
    Imported,
    Updated,
    Skipped,
}

impl<H: HrRepository> SyncOrchestrator<'_, H> {
    /// Fetch the remote employee list and reconcile it into the local
    /// HR store.
    pub async fn sync_employees(
        &self,
        config: &ConnectionConfig,
        options: &EmployeeSyncOptions,
    ) -> Result<EmployeeSyncReport> {
        let guard = self.acquire_guard(&config.tenant_id, FLOW).await?;
        let mut log = SyncLogEntry::begin(&config.tenant_id, FLOW, SyncDirection::Inbound);
        self.save_log(&log).await?;

        let records = match self.fetch_remote_employees(config, options).await {
            Ok(records) => records,
            Err(error) => {
                log.fail(error.to_string());
                self.save_log(&log).await?;
                self.release_guard(guard).await;
                return Err(error);
            }
        };

        let report = self.import_employees(config, &records, options).await?;

        let success = report.imported + report.updated + report.skipped;
        log.finish(report.total, success, report.errors.clone());
        self.save_log(&log).await?;
        self.mark_synced(&config.tenant_id).await?;
        self.release_guard(guard).await;

        tracing::info!(
            tenant = %config.tenant_id,
            imported = report.imported,
            updated = report.updated,
            skipped = report.skipped,
            errors = report.errors.len(),
            "employee sync finished"
        );
        Ok(report)
    }

    async fn fetch_remote_employees(
        &self,
        config: &ConnectionConfig,
        options: &EmployeeSyncOptions,
    ) -> Result<Vec<Json>> {
        let records = self
            .remote()
            .search_read(config, "hr.employee", employee_domain(options), &EMPLOYEE_FIELDS)
            .await?;
        Ok(records.iter().map(Value::to_json).collect())
    }

    /// Reconcile a batch of already-decoded remote employee records.
    pub(crate) async fn import_employees(
        &self,
        config: &ConnectionConfig,
        records: &[Json],
        options: &EmployeeSyncOptions,
    ) -> Result<EmployeeSyncReport> {
        let mapper = self.mapper(&config.tenant_id, EntityType::Employee).await?;

        let mut report = EmployeeSyncReport {
            total: u32::try_from(records.len()).unwrap_or(u32::MAX),
            ..EmployeeSyncReport::default()
        };

        for record in records {
            match self.import_one(config, &mapper, record, options).await {
                Ok(ImportOutcome::Imported) => report.imported += 1,
                Ok(ImportOutcome::Updated) => report.updated += 1,
                Ok(ImportOutcome::Skipped) => report.skipped += 1,
                Err(error) => report
                    .errors
                    .push(format!("remote employee {}: {error}", remote_label(record))),
            }
        }

        Ok(report)
    }

    /// Refresh a single remote employee; used by the queue worker for
    /// inbound `employee.*` webhook events.
    pub(crate) async fn execute_queued_employee(
        &self,
        config: &ConnectionConfig,
        payload: &Json,
    ) -> Result<()> {
        let remote_id = payload
            .get("remote_id")
            .or_else(|| payload.get("id"))
            .and_then(Json::as_i64)
            .ok_or_else(|| {
                Error::InvalidInput("employee_sync payload carries no remote id".to_string())
            })?;

        let domain = Value::Array(vec![Value::Array(vec![
            Value::string("id"),
            Value::string("="),
            Value::Int(remote_id),
        ])]);
        let records = self
            .remote()
            .search_read(config, "hr.employee", domain, &EMPLOYEE_FIELDS)
            .await?;
        let records: Vec<Json> = records.iter().map(Value::to_json).collect();

        let options = EmployeeSyncOptions {
            create_missing: true,
            ..EmployeeSyncOptions::default()
        };
        let report = self.import_employees(config, &records, &options).await?;
        if report.errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Api(report.errors.join("; ")))
        }
    }

    async fn import_one(
        &self,
        config: &ConnectionConfig,
        mapper: &FieldMapper,
        record: &Json,
        options: &EmployeeSyncOptions,
    ) -> Result<ImportOutcome> {
        let raw = record
            .as_object()
            .ok_or_else(|| Error::InvalidInput("remote employee is not a struct".to_string()))?;
        let remote_id = raw
            .get("id")
            .and_then(Json::as_i64)
            .ok_or_else(|| Error::InvalidInput("remote employee without id".to_string()))?;

        let patch = mapper.to_local(record)?;
        let mappings = LibSqlEntityMappingRepository::new(self.database().connection());

        if let Some(mapping) = mappings
            .find_by_remote(&config.tenant_id, EntityType::Employee, remote_id)
            .await?
        {
            let Some(mut employee) = self.hr().employee(&config.tenant_id, &mapping.local_id).await?
            else {
                return Err(Error::NotFound(format!(
                    "mapped local employee {} is missing",
                    mapping.local_id
                )));
            };

            let outcome = self.update_mapped(config, &mut employee, &patch, raw).await?;
            mappings.touch(&mapping.id, now_millis()).await?;
            return Ok(outcome);
        }

        // Unmapped remote employee: import only with an email to key on
        let email = raw
            .get("work_email")
            .and_then(Json::as_str)
            .map(str::trim)
            .filter(|email| !email.is_empty());
        let Some(email) = email else {
            return Ok(ImportOutcome::Skipped);
        };
        if !options.create_missing {
            return Ok(ImportOutcome::Skipped);
        }

        if let Some(mut existing) = self.hr().employee_by_email(&config.tenant_id, email).await? {
            // The record already exists locally; link instead of
            // duplicating it
            apply_patch(&mut existing, &patch);
            self.hr().update_employee(&existing).await?;
            mappings
                .save(&EntityMapping::new(
                    &config.tenant_id,
                    EntityType::Employee,
                    &existing.id,
                    remote_id,
                ))
                .await?;
            return Ok(ImportOutcome::Updated);
        }

        let employee = employee_from_patch(&config.tenant_id, email, &patch);
        self.hr().create_employee(&employee).await?;
        mappings
            .save(&EntityMapping::new(
                &config.tenant_id,
                EntityType::Employee,
                &employee.id,
                remote_id,
            ))
            .await?;
        Ok(ImportOutcome::Imported)
    }

    async fn update_mapped(
        &self,
        config: &ConnectionConfig,
        employee: &mut LocalEmployee,
        patch: &Map<String, Json>,
        raw: &Map<String, Json>,
    ) -> Result<ImportOutcome> {
        let local = employee_as_mapped(employee);
        let fields: Vec<String> = patch.keys().cloned().collect();
        let conflicts = detect_conflicts(&local, patch, &fields);

        if conflicts.is_empty() {
            apply_patch(employee, patch);
            self.hr().update_employee(employee).await?;
            return Ok(ImportOutcome::Updated);
        }

        // Carry the remote modification timestamp so LATEST_WINS can
        // compare sides
        let mut remote_snapshot = patch.clone();
        if let Some(write_date) = raw.get("write_date") {
            remote_snapshot.insert("write_date".to_string(), write_date.clone());
        }

        let resolver =
            ConflictResolver::new(LibSqlConflictRepository::new(self.database().connection()));
        let resolution = resolver
            .resolve(
                &config.tenant_id,
                EntityType::Employee,
                &employee.id,
                &local,
                &remote_snapshot,
                config.conflict_strategy,
            )
            .await?;

        match resolution.action {
            ResolutionAction::KeepOdoo | ResolutionAction::Merged => {
                match resolution.merged {
                    Some(merged) => apply_patch(employee, &merged),
                    None => apply_patch(employee, patch),
                }
                self.hr().update_employee(employee).await?;
                Ok(ImportOutcome::Updated)
            }
            ResolutionAction::KeepLocal | ResolutionAction::Skipped => Ok(ImportOutcome::Skipped),
        }
    }
}

fn employee_domain(options: &EmployeeSyncOptions) -> Value {
    let mut clauses = Vec::new();
    if options.active_only {
        clauses.push(Value::Array(vec![
            Value::string("active"),
            Value::string("="),
            Value::Bool(true),
        ]));
    }
    if let Some(department_id) = options.department_id {
        clauses.push(Value::Array(vec![
            Value::string("department_id"),
            Value::string("="),
            Value::Int(department_id),
        ]));
    }
    Value::Array(clauses)
}

fn remote_label(record: &Json) -> String {
    record
        .get("id")
        .and_then(Json::as_i64)
        .map_or_else(|| "?".to_string(), |id| id.to_string())
}

/// The local employee in the same field shape the mapper produces, for
/// conflict detection and LATEST_WINS comparison.
fn employee_as_mapped(employee: &LocalEmployee) -> Map<String, Json> {
    let mut map = Map::new();
    map.insert(
        "name".to_string(),
        serde_json::json!({
            "first_name": employee.first_name,
            "last_name": employee.last_name,
        }),
    );
    map.insert("email".to_string(), Json::String(employee.email.clone()));
    map.insert(
        "phone".to_string(),
        employee.phone.clone().map_or(Json::Null, Json::String),
    );
    map.insert(
        "job_title".to_string(),
        employee.job_title.clone().map_or(Json::Null, Json::String),
    );
    map.insert("active".to_string(), Json::Bool(employee.active));
    map.insert(
        "updated_at".to_string(),
        millis_to_rfc3339(employee.updated_at).map_or(Json::Null, Json::String),
    );
    map
}

fn apply_patch(employee: &mut LocalEmployee, patch: &Map<String, Json>) {
    if let Some(name) = patch.get("name").and_then(Json::as_object) {
        if let Some(first) = name.get("first_name").and_then(Json::as_str) {
            employee.first_name = first.to_string();
        }
        if let Some(last) = name.get("last_name").and_then(Json::as_str) {
            employee.last_name = last.to_string();
        }
    }
    if let Some(email) = patch.get("email").and_then(Json::as_str) {
        let email = email.trim();
        if !email.is_empty() {
            employee.email = email.to_string();
        }
    }
    if let Some(phone) = patch.get("phone").and_then(Json::as_str) {
        employee.phone = Some(phone.to_string());
    }
    if let Some(job_title) = patch.get("job_title").and_then(Json::as_str) {
        employee.job_title = Some(job_title.to_string());
    }
    if let Some(active) = patch.get("active").and_then(Json::as_bool) {
        employee.active = active;
    }
    employee.updated_at = now_millis();
}

fn employee_from_patch(tenant_id: &str, email: &str, patch: &Map<String, Json>) -> LocalEmployee {
    let (first_name, last_name) = patch.get("name").and_then(Json::as_object).map_or_else(
        || (String::new(), String::new()),
        |name| {
            (
                name.get("first_name")
                    .and_then(Json::as_str)
                    .unwrap_or_default()
                    .to_string(),
                name.get("last_name")
                    .and_then(Json::as_str)
                    .unwrap_or_default()
                    .to_string(),
            )
        },
    );

    let mut employee = LocalEmployee::new(tenant_id, email, first_name, last_name);
    apply_patch(&mut employee, patch);
    employee
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::db::Database;
    use crate::hr::MemoryHrRepository;
    use crate::mapping::seed_defaults;
    use crate::models::{ConflictStrategy, ResolutionState};

    use super::super::SyncOrchestrator;
    use super::*;

    async fn setup(strategy: ConflictStrategy) -> (Database, MemoryHrRepository, ConnectionConfig) {
        let db = Database::open_in_memory().await.unwrap();
        let hr = MemoryHrRepository::new();

        let mut config = ConnectionConfig::new("t1", "https://erp.example.com", "db", "admin", "k");
        config.conflict_strategy = strategy;

        let field_mappings =
            crate::db::LibSqlFieldMappingRepository::new(db.connection());
        seed_defaults(&field_mappings, "t1").await.unwrap();

        (db, hr, config)
    }

    fn remote_employee(id: i64, name: &str, email: Json) -> Json {
        json!({
            "id": id,
            "name": name,
            "work_email": email,
            "mobile_phone": false,
            "work_phone": false,
            "job_title": false,
            "active": true,
            "write_date": "2024-06-01 10:00:00",
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mapped_employee_updates_and_unmapped_without_email_skips() {
        let (db, hr, config) = setup(ConflictStrategy::Manual).await;
        let orchestrator = SyncOrchestrator::new(&db, &hr).unwrap();

        // One mapped local employee whose fields agree with the remote
        let local = LocalEmployee::new("t1", "ali@example.com", "Ali", "Baba");
        hr.create_employee(&local).await.unwrap();
        orchestrator.map_employee("t1", &local.id, 10).await.unwrap();

        let records = vec![
            remote_employee(10, "Ali Baba", json!("ali@example.com")),
            remote_employee(11, "No Mail", json!(false)),
        ];

        let options = EmployeeSyncOptions {
            create_missing: true,
            ..EmployeeSyncOptions::default()
        };
        let report = orchestrator
            .import_employees(&config, &records, &options)
            .await
            .unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.imported, 0);
        assert!(report.errors.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unmapped_employee_with_email_is_imported_once() {
        let (db, hr, config) = setup(ConflictStrategy::Manual).await;
        let orchestrator = SyncOrchestrator::new(&db, &hr).unwrap();

        let records = vec![remote_employee(20, "New Person", json!("new@example.com"))];
        let options = EmployeeSyncOptions {
            create_missing: true,
            ..EmployeeSyncOptions::default()
        };

        let first = orchestrator
            .import_employees(&config, &records, &options)
            .await
            .unwrap();
        assert_eq!(first.imported, 1);
        assert_eq!(hr.employee_count(), 1);

        let imported = hr
            .employee_by_email("t1", "new@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(imported.first_name, "New");
        assert_eq!(imported.last_name, "Person");

        // Re-running refreshes in place instead of duplicating
        let second = orchestrator
            .import_employees(&config, &records, &options)
            .await
            .unwrap();
        assert_eq!(second.imported, 0);
        assert_eq!(second.updated, 1);
        assert_eq!(hr.employee_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn creation_disabled_skips_unmapped_employees() {
        let (db, hr, config) = setup(ConflictStrategy::Manual).await;
        let orchestrator = SyncOrchestrator::new(&db, &hr).unwrap();

        let records = vec![remote_employee(20, "New Person", json!("new@example.com"))];
        let report = orchestrator
            .import_employees(&config, &records, &EmployeeSyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(hr.employee_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn manual_strategy_records_conflict_and_skips() {
        let (db, hr, config) = setup(ConflictStrategy::Manual).await;
        let orchestrator = SyncOrchestrator::new(&db, &hr).unwrap();

        let mut local = LocalEmployee::new("t1", "ali@example.com", "Ali", "Baba");
        local.phone = Some("111".to_string());
        hr.create_employee(&local).await.unwrap();
        orchestrator.map_employee("t1", &local.id, 10).await.unwrap();

        let mut record = remote_employee(10, "Ali Baba", json!("ali@example.com"));
        record["mobile_phone"] = json!("222");

        let report = orchestrator
            .import_employees(&config, &[record], &EmployeeSyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.updated, 0);

        // The local value survived and the conflict is waiting for review
        let unchanged = hr.employee("t1", &local.id).await.unwrap().unwrap();
        assert_eq!(unchanged.phone.as_deref(), Some("111"));

        let conflicts = crate::db::LibSqlConflictRepository::new(db.connection());
        use crate::db::ConflictRepository;
        let open = conflicts.list_unresolved("t1").await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].resolution_state, ResolutionState::Unresolved);
        assert_eq!(open[0].entity_id, local.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn latest_wins_takes_newer_remote_edit() {
        let (db, hr, config) = setup(ConflictStrategy::LatestWins).await;
        let orchestrator = SyncOrchestrator::new(&db, &hr).unwrap();

        let mut local = LocalEmployee::new("t1", "ali@example.com", "Ali", "Baba");
        local.phone = Some("111".to_string());
        local.updated_at = 1_600_000_000_000; // 2020, far older than the remote edit
        hr.create_employee(&local).await.unwrap();
        orchestrator.map_employee("t1", &local.id, 10).await.unwrap();

        let mut record = remote_employee(10, "Ali Baba", json!("ali@example.com"));
        record["mobile_phone"] = json!("222");

        let report = orchestrator
            .import_employees(&config, &[record], &EmployeeSyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.updated, 1);

        let refreshed = hr.employee("t1", &local.id).await.unwrap().unwrap();
        assert_eq!(refreshed.phone.as_deref(), Some("222"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn odoo_wins_overwrites_without_recording_conflicts() {
        let (db, hr, config) = setup(ConflictStrategy::OdooWins).await;
        let orchestrator = SyncOrchestrator::new(&db, &hr).unwrap();

        let mut local = LocalEmployee::new("t1", "ali@example.com", "Ali", "Baba");
        local.job_title = Some("Clerk".to_string());
        hr.create_employee(&local).await.unwrap();
        orchestrator.map_employee("t1", &local.id, 10).await.unwrap();

        let mut record = remote_employee(10, "Ali Baba", json!("ali@example.com"));
        record["job_title"] = json!("Manager");

        orchestrator
            .import_employees(&config, &[record], &EmployeeSyncOptions::default())
            .await
            .unwrap();

        let refreshed = hr.employee("t1", &local.id).await.unwrap().unwrap();
        assert_eq!(refreshed.job_title.as_deref(), Some("Manager"));

        let conflicts = crate::db::LibSqlConflictRepository::new(db.connection());
        use crate::db::ConflictRepository;
        assert!(conflicts.list_unresolved("t1").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn record_without_id_is_collected_as_error() {
        let (db, hr, config) = setup(ConflictStrategy::Manual).await;
        let orchestrator = SyncOrchestrator::new(&db, &hr).unwrap();

        let records = vec![json!({"name": "Ghost"}), remote_employee(11, "No Mail", json!(false))];
        let report = orchestrator
            .import_employees(&config, &records, &EmployeeSyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.total, 2);
    }

    #[test]
    fn domain_includes_requested_filters() {
        let options = EmployeeSyncOptions {
            active_only: true,
            department_id: Some(4),
            create_missing: false,
        };
        let Value::Array(clauses) = employee_domain(&options) else {
            panic!("domain must be an array");
        };
        assert_eq!(clauses.len(), 2);
    }
}

//! Payroll export/push flow

use crate::db::{EntityMappingRepository, LibSqlEntityMappingRepository};
use crate::error::Result;
use crate::hr::HrRepository;
use crate::models::{
    AttendanceRecord, AttendanceStatus, ConnectionConfig, EntityType, PayrollSummary,
    SyncDirection, SyncLogEntry,
};
use crate::util::millis_to_rfc3339;
use crate::wire::Value;

use super::SyncOrchestrator;

const EXPORT_FLOW: &str = "payroll_export";
const PUSH_FLOW: &str = "payroll_push";

/// Attendance records per employee considered for one period.
const PERIOD_ATTENDANCE_LIMIT: usize = 1000;

/// Payroll aggregation period (unix ms, inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayrollPeriod {
    pub start: i64,
    pub end: i64,
}

/// Derived payroll data for one period.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayrollExport {
    /// Period start (unix ms)
    pub period_start: i64,
    /// Period end (unix ms)
    pub period_end: i64,
    /// One summary per mapped employee
    pub summaries: Vec<PayrollSummary>,
    /// Per-employee failures
    pub errors: Vec<String>,
}

/// Aggregate outcome of pushing an export to the remote system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayrollPushReport {
    /// Summaries considered
    pub total: u32,
    /// Work entries created remotely
    pub pushed: u32,
    /// Summaries that failed
    pub failed: u32,
    /// Per-record failures
    pub errors: Vec<String>,
}

impl<H: HrRepository> SyncOrchestrator<'_, H> {
    /// Aggregate local attendance into a payroll summary per mapped
    /// employee. Purely local; interruption between employees loses
    /// nothing.
    pub async fn export_payroll(
        &self,
        config: &ConnectionConfig,
        period: PayrollPeriod,
    ) -> Result<PayrollExport> {
        let guard = self.acquire_guard(&config.tenant_id, EXPORT_FLOW).await?;
        let mut log = SyncLogEntry::begin(&config.tenant_id, EXPORT_FLOW, SyncDirection::Outbound);
        self.save_log(&log).await?;

        let mappings = LibSqlEntityMappingRepository::new(self.database().connection());
        let links = mappings.list(&config.tenant_id, EntityType::Employee).await?;

        let mut export = PayrollExport {
            period_start: period.start,
            period_end: period.end,
            ..PayrollExport::default()
        };

        if links.is_empty() {
            export
                .errors
                .push("no employees are mapped to the remote system".to_string());
        }

        for link in &links {
            match self.summarize_employee(config, link.remote_id, &link.local_id, period).await {
                Ok(Some(summary)) => export.summaries.push(summary),
                Ok(None) => export
                    .errors
                    .push(format!("employee {}: local record is missing", link.local_id)),
                Err(error) => export
                    .errors
                    .push(format!("employee {}: {error}", link.local_id)),
            }
        }

        let total = u32::try_from(links.len()).unwrap_or(u32::MAX);
        let success = u32::try_from(export.summaries.len()).unwrap_or(u32::MAX);
        log.finish(total, success, export.errors.clone());
        self.save_log(&log).await?;
        self.release_guard(guard).await;

        Ok(export)
    }

    /// Push an export to the remote system as work-entry records.
    pub async fn push_payroll(
        &self,
        config: &ConnectionConfig,
        export: &PayrollExport,
    ) -> Result<PayrollPushReport> {
        let guard = self.acquire_guard(&config.tenant_id, PUSH_FLOW).await?;
        let mut log = SyncLogEntry::begin(&config.tenant_id, PUSH_FLOW, SyncDirection::Outbound);
        self.save_log(&log).await?;

        let mut report = PayrollPushReport {
            total: u32::try_from(export.summaries.len()).unwrap_or(u32::MAX),
            ..PayrollPushReport::default()
        };

        for summary in &export.summaries {
            let payload = work_entry_payload(summary, export.period_start, export.period_end);
            match self.remote().create(config, "hr.work.entry", payload).await {
                Ok(_) => report.pushed += 1,
                Err(error) => {
                    report.failed += 1;
                    report
                        .errors
                        .push(format!("employee {}: {error}", summary.employee_id));
                }
            }
        }

        log.finish(report.total, report.pushed, report.errors.clone());
        self.save_log(&log).await?;
        self.mark_synced(&config.tenant_id).await?;
        self.release_guard(guard).await;

        Ok(report)
    }

    async fn summarize_employee(
        &self,
        config: &ConnectionConfig,
        remote_employee_id: i64,
        local_id: &str,
        period: PayrollPeriod,
    ) -> Result<Option<PayrollSummary>> {
        let Some(employee) = self.hr().employee(&config.tenant_id, local_id).await? else {
            return Ok(None);
        };

        let records = self
            .hr()
            .attendance_between(
                &config.tenant_id,
                &[local_id.to_string()],
                period.start,
                period.end,
                PERIOD_ATTENDANCE_LIMIT,
            )
            .await?;

        let mut summary = summarize_attendance(&records);
        summary.employee_id = local_id.to_string();
        summary.remote_employee_id = remote_employee_id;
        summary.employee_name = employee.display_name();
        Ok(Some(summary))
    }
}

/// Fold a set of attendance records into period totals. Identity fields
/// are left for the caller to fill in.
#[must_use]
pub fn summarize_attendance(records: &[AttendanceRecord]) -> PayrollSummary {
    let mut summary = PayrollSummary {
        employee_id: String::new(),
        remote_employee_id: 0,
        employee_name: String::new(),
        worked_days: 0,
        worked_hours: 0.0,
        overtime_hours: 0.0,
        late_minutes: 0,
        early_leave_minutes: 0,
        absent_days: 0,
    };

    let mut worked_minutes = 0i64;
    let mut overtime_minutes = 0i64;

    for record in records {
        match record.status {
            AttendanceStatus::Present | AttendanceStatus::Late => summary.worked_days += 1,
            AttendanceStatus::Absent => summary.absent_days += 1,
        }
        worked_minutes += record.working_minutes;
        overtime_minutes += record.overtime_minutes;
        summary.late_minutes += record.late_minutes;
        summary.early_leave_minutes += record.early_leave_minutes;
    }

    summary.worked_hours = minutes_to_hours(worked_minutes);
    summary.overtime_hours = minutes_to_hours(overtime_minutes);
    summary
}

/// Minutes to hours, rounded to two decimals.
fn minutes_to_hours(minutes: i64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let hours = minutes as f64 / 60.0;
    (hours * 100.0).round() / 100.0
}

fn work_entry_payload(summary: &PayrollSummary, period_start: i64, period_end: i64) -> Value {
    Value::Struct(vec![
        ("employee_id".to_string(), Value::Int(summary.remote_employee_id)),
        ("work_entry_type_id".to_string(), Value::Int(1)),
        (
            "name".to_string(),
            Value::Str(format!("Attendance {}", summary.employee_name)),
        ),
        (
            "date_start".to_string(),
            millis_to_rfc3339(period_start).map_or(Value::Bool(false), Value::Str),
        ),
        (
            "date_stop".to_string(),
            millis_to_rfc3339(period_end).map_or(Value::Bool(false), Value::Str),
        ),
        ("duration".to_string(), Value::Double(summary.worked_hours)),
    ])
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::hr::MemoryHrRepository;
    use crate::models::LocalEmployee;

    use super::super::SyncOrchestrator;
    use super::*;

    fn record(
        employee_id: &str,
        check_in: i64,
        status: AttendanceStatus,
        working_minutes: i64,
        overtime_minutes: i64,
        late_minutes: i64,
    ) -> AttendanceRecord {
        AttendanceRecord {
            id: crate::util::new_id(),
            tenant_id: "t1".to_string(),
            employee_id: employee_id.to_string(),
            check_in,
            check_out: Some(check_in + working_minutes * 60_000),
            working_minutes,
            overtime_minutes,
            late_minutes,
            early_leave_minutes: 0,
            status,
        }
    }

    #[test]
    fn summarize_splits_worked_and_absent_days() {
        let records = vec![
            record("emp-1", 100, AttendanceStatus::Present, 480, 30, 0),
            record("emp-1", 200, AttendanceStatus::Late, 450, 0, 30),
            record("emp-1", 300, AttendanceStatus::Absent, 0, 0, 0),
        ];

        let summary = summarize_attendance(&records);
        assert_eq!(summary.worked_days, 2);
        assert_eq!(summary.absent_days, 1);
        assert_eq!(summary.worked_hours, 15.5); // 930 minutes
        assert_eq!(summary.overtime_hours, 0.5);
        assert_eq!(summary.late_minutes, 30);
    }

    #[test]
    fn summarize_rounds_to_two_decimals() {
        let records = vec![record("emp-1", 100, AttendanceStatus::Present, 433, 0, 0)];
        let summary = summarize_attendance(&records);
        assert_eq!(summary.worked_hours, 7.22); // 433 / 60 = 7.2166…
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn export_aggregates_per_mapped_employee() {
        let db = Database::open_in_memory().await.unwrap();
        let hr = MemoryHrRepository::new();
        let orchestrator = SyncOrchestrator::new(&db, &hr).unwrap();
        let config = ConnectionConfig::new("t1", "https://erp.example.com", "db", "admin", "k");

        let employee = LocalEmployee::new("t1", "ali@example.com", "Ali", "Baba");
        hr.create_employee(&employee).await.unwrap();
        orchestrator.map_employee("t1", &employee.id, 7).await.unwrap();

        hr.add_attendance(record(&employee.id, 1000, AttendanceStatus::Present, 480, 0, 0));
        hr.add_attendance(record(&employee.id, 2000, AttendanceStatus::Late, 470, 10, 15));
        // Outside the period
        hr.add_attendance(record(&employee.id, 99_000, AttendanceStatus::Present, 480, 0, 0));

        let export = orchestrator
            .export_payroll(&config, PayrollPeriod { start: 0, end: 10_000 })
            .await
            .unwrap();

        assert_eq!(export.summaries.len(), 1);
        let summary = &export.summaries[0];
        assert_eq!(summary.remote_employee_id, 7);
        assert_eq!(summary.employee_name, "Ali Baba");
        assert_eq!(summary.worked_days, 2);
        assert_eq!(summary.worked_hours, 15.83); // 950 minutes
        assert!(export.errors.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn export_without_mappings_reports_instead_of_failing() {
        let db = Database::open_in_memory().await.unwrap();
        let hr = MemoryHrRepository::new();
        let orchestrator = SyncOrchestrator::new(&db, &hr).unwrap();
        let config = ConnectionConfig::new("t1", "https://erp.example.com", "db", "admin", "k");

        let export = orchestrator
            .export_payroll(&config, PayrollPeriod { start: 0, end: 10 })
            .await
            .unwrap();

        assert!(export.summaries.is_empty());
        assert_eq!(export.errors.len(), 1);
    }

    #[test]
    fn work_entry_payload_carries_duration_and_period() {
        let summary = PayrollSummary {
            employee_id: "emp-1".to_string(),
            remote_employee_id: 7,
            employee_name: "Ali Baba".to_string(),
            worked_days: 2,
            worked_hours: 15.5,
            overtime_hours: 0.5,
            late_minutes: 0,
            early_leave_minutes: 0,
            absent_days: 0,
        };

        let payload = work_entry_payload(&summary, 1_709_280_000_000, 1_709_366_400_000);
        assert_eq!(payload.get("employee_id"), Some(&Value::Int(7)));
        assert_eq!(payload.get("duration"), Some(&Value::Double(15.5)));
        assert_eq!(payload.get("work_entry_type_id"), Some(&Value::Int(1)));
        assert!(payload.get("date_start").is_some());
    }
}

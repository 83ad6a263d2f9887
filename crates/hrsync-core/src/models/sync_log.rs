//! Sync run audit log model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::util::{new_id, now_millis};

/// Which way a flow moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncDirection {
    /// Remote → local
    Inbound,
    /// Local → remote
    Outbound,
}

impl SyncDirection {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "INBOUND",
            Self::Outbound => "OUTBOUND",
        }
    }
}

impl FromStr for SyncDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INBOUND" => Ok(Self::Inbound),
            "OUTBOUND" => Ok(Self::Outbound),
            other => Err(Error::InvalidInput(format!(
                "unknown sync direction: {other}"
            ))),
        }
    }
}

/// Outcome of one flow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncRunStatus {
    Running,
    Success,
    Partial,
    Failed,
}

impl SyncRunStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SyncRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncRunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "SUCCESS" => Ok(Self::Success),
            "PARTIAL" => Ok(Self::Partial),
            "FAILED" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!(
                "unknown sync run status: {other}"
            ))),
        }
    }
}

/// Append-only audit entry for one flow run.
///
/// Created when the flow starts and completed when it ends; never updated
/// after that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    /// Row identifier
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Flow name, e.g. `employee_sync`
    pub operation: String,
    /// Direction of the flow
    pub direction: SyncDirection,
    /// Run outcome
    pub status: SyncRunStatus,
    /// Records considered
    pub record_count: u32,
    /// Records handled successfully
    pub success_count: u32,
    /// Records that errored
    pub failed_count: u32,
    /// Wall-clock duration of the run
    pub duration_ms: i64,
    /// Per-record error messages
    pub errors: Vec<String>,
    /// Run start (unix ms)
    pub started_at: i64,
    /// Run end (unix ms), absent while running
    pub finished_at: Option<i64>,
}

impl SyncLogEntry {
    /// Open a running entry for a flow.
    #[must_use]
    pub fn begin(
        tenant_id: impl Into<String>,
        operation: impl Into<String>,
        direction: SyncDirection,
    ) -> Self {
        Self {
            id: new_id(),
            tenant_id: tenant_id.into(),
            operation: operation.into(),
            direction,
            status: SyncRunStatus::Running,
            record_count: 0,
            success_count: 0,
            failed_count: 0,
            duration_ms: 0,
            errors: Vec::new(),
            started_at: now_millis(),
            finished_at: None,
        }
    }

    /// Close the entry with final counts; the status is derived from the
    /// error tally (all failed ⇒ FAILED, some ⇒ PARTIAL, none ⇒ SUCCESS).
    pub fn finish(&mut self, record_count: u32, success_count: u32, errors: Vec<String>) {
        let now = now_millis();
        self.record_count = record_count;
        self.success_count = success_count;
        self.failed_count = u32::try_from(errors.len()).unwrap_or(u32::MAX);
        self.errors = errors;
        self.duration_ms = now - self.started_at;
        self.finished_at = Some(now);
        self.status = if self.failed_count == 0 {
            SyncRunStatus::Success
        } else if self.success_count == 0 && record_count > 0 {
            SyncRunStatus::Failed
        } else {
            SyncRunStatus::Partial
        };
    }

    /// Close the entry after a connection-level failure.
    pub fn fail(&mut self, error: impl Into<String>) {
        let now = now_millis();
        self.errors.push(error.into());
        self.failed_count = u32::try_from(self.errors.len()).unwrap_or(u32::MAX);
        self.duration_ms = now - self.started_at;
        self.finished_at = Some(now);
        self.status = SyncRunStatus::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_derives_status_from_errors() {
        let mut clean = SyncLogEntry::begin("t1", "employee_sync", SyncDirection::Inbound);
        clean.finish(3, 3, Vec::new());
        assert_eq!(clean.status, SyncRunStatus::Success);

        let mut partial = SyncLogEntry::begin("t1", "employee_sync", SyncDirection::Inbound);
        partial.finish(3, 2, vec!["emp-3: boom".to_string()]);
        assert_eq!(partial.status, SyncRunStatus::Partial);

        let mut broken = SyncLogEntry::begin("t1", "employee_sync", SyncDirection::Inbound);
        broken.finish(2, 0, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(broken.status, SyncRunStatus::Failed);
    }

    #[test]
    fn fail_marks_entry_failed() {
        let mut entry = SyncLogEntry::begin("t1", "attendance_push", SyncDirection::Outbound);
        entry.fail("auth failed");
        assert_eq!(entry.status, SyncRunStatus::Failed);
        assert!(entry.finished_at.is_some());
        assert_eq!(entry.errors.len(), 1);
    }

    #[test]
    fn empty_run_is_success() {
        let mut entry = SyncLogEntry::begin("t1", "leave_fetch", SyncDirection::Inbound);
        entry.finish(0, 0, Vec::new());
        assert_eq!(entry.status, SyncRunStatus::Success);
    }
}

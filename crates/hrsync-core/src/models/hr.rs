//! Local HR domain records
//!
//! These shapes belong to the external HR store; hrsync only reads and
//! writes them through the `HrRepository` contract.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::util::{new_id, now_millis};

/// An employee as the local HR system stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalEmployee {
    /// Local record id
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Work email; import requires one
    pub email: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Phone number, if known
    pub phone: Option<String>,
    /// Job title, if known
    pub job_title: Option<String>,
    /// Active employment flag
    pub active: bool,
    /// Last local modification (unix ms)
    pub updated_at: i64,
}

impl LocalEmployee {
    /// Create a new active employee.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            tenant_id: tenant_id.into(),
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            phone: None,
            job_title: None,
            active: true,
            updated_at: now_millis(),
        }
    }

    /// Display name as the remote system stores it.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Attendance day outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

impl AttendanceStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Present => "PRESENT",
            Self::Late => "LATE",
            Self::Absent => "ABSENT",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRESENT" => Ok(Self::Present),
            "LATE" => Ok(Self::Late),
            "ABSENT" => Ok(Self::Absent),
            other => Err(Error::InvalidInput(format!(
                "unknown attendance status: {other}"
            ))),
        }
    }
}

/// One local attendance record (a check-in, optionally closed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    /// Local record id
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Local employee id
    pub employee_id: String,
    /// Check-in time (unix ms)
    pub check_in: i64,
    /// Check-out time (unix ms), absent while open
    pub check_out: Option<i64>,
    /// Minutes worked
    pub working_minutes: i64,
    /// Minutes beyond the scheduled day
    pub overtime_minutes: i64,
    /// Minutes late
    pub late_minutes: i64,
    /// Minutes of early leave
    pub early_leave_minutes: i64,
    /// Day outcome
    pub status: AttendanceStatus,
}

/// One local leave request to be mirrored remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequest {
    /// Local record id
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Local employee id
    pub employee_id: String,
    /// Remote leave type id
    pub leave_type_id: i64,
    /// Leave start (unix ms)
    pub date_from: i64,
    /// Leave end (unix ms)
    pub date_to: i64,
    /// Free-text reason
    pub notes: Option<String>,
}

/// Attendance aggregated per employee for a payroll period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayrollSummary {
    /// Local employee id
    pub employee_id: String,
    /// Mapped remote employee id
    pub remote_employee_id: i64,
    /// Display name for the export
    pub employee_name: String,
    /// Days with a PRESENT or LATE record
    pub worked_days: u32,
    /// Total hours worked, rounded to 2 decimals
    pub worked_hours: f64,
    /// Total overtime hours, rounded to 2 decimals
    pub overtime_hours: f64,
    /// Total minutes late
    pub late_minutes: i64,
    /// Total minutes of early leave
    pub early_leave_minutes: i64,
    /// Days with an ABSENT record
    pub absent_days: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_joins_parts() {
        let employee = LocalEmployee::new("t1", "ali@example.com", "Ali", "Baba");
        assert_eq!(employee.display_name(), "Ali Baba");
    }

    #[test]
    fn display_name_trims_missing_last_name() {
        let employee = LocalEmployee::new("t1", "cher@example.com", "Cher", "");
        assert_eq!(employee.display_name(), "Cher");
    }
}

//! External HR store contract
//!
//! Employees, attendance, and leaves live in the surrounding HR system.
//! This crate only ever touches them through [`HrRepository`]; the
//! in-memory implementation backs tests and the CLI demo.

mod memory;

pub use memory::MemoryHrRepository;

use crate::error::Result;
use crate::models::{AttendanceRecord, LeaveRequest, LocalEmployee};

/// Narrow contract over the external HR store.
#[allow(async_fn_in_trait)]
pub trait HrRepository {
    /// Load an employee by local id
    async fn employee(&self, tenant_id: &str, id: &str) -> Result<Option<LocalEmployee>>;

    /// Load an employee by work email
    async fn employee_by_email(&self, tenant_id: &str, email: &str)
        -> Result<Option<LocalEmployee>>;

    /// Create a new employee record
    async fn create_employee(&self, employee: &LocalEmployee) -> Result<()>;

    /// Update an existing employee record
    async fn update_employee(&self, employee: &LocalEmployee) -> Result<()>;

    /// Attendance for the given employees inside a time window, oldest
    /// first, bounded by `limit`
    async fn attendance_between(
        &self,
        tenant_id: &str,
        employee_ids: &[String],
        from: i64,
        to: i64,
        limit: usize,
    ) -> Result<Vec<AttendanceRecord>>;

    /// Leave requests not yet mirrored to the remote system
    async fn pending_leaves(&self, tenant_id: &str) -> Result<Vec<LeaveRequest>>;
}

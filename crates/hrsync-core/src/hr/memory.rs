//! In-memory HR store for tests and demos

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::{AttendanceRecord, LeaveRequest, LocalEmployee};

use super::HrRepository;

/// `HrRepository` backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryHrRepository {
    employees: Mutex<HashMap<String, LocalEmployee>>,
    attendance: Mutex<Vec<AttendanceRecord>>,
    leaves: Mutex<Vec<LeaveRequest>>,
}

impl MemoryHrRepository {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an attendance record.
    pub fn add_attendance(&self, record: AttendanceRecord) {
        self.attendance
            .lock()
            .expect("attendance lock poisoned")
            .push(record);
    }

    /// Seed a leave request.
    pub fn add_leave(&self, leave: LeaveRequest) {
        self.leaves.lock().expect("leaves lock poisoned").push(leave);
    }

    /// Number of stored employees, across tenants.
    pub fn employee_count(&self) -> usize {
        self.employees.lock().expect("employees lock poisoned").len()
    }
}

impl HrRepository for MemoryHrRepository {
    async fn employee(&self, tenant_id: &str, id: &str) -> Result<Option<LocalEmployee>> {
        let employees = self.employees.lock().expect("employees lock poisoned");
        Ok(employees
            .get(id)
            .filter(|employee| employee.tenant_id == tenant_id)
            .cloned())
    }

    async fn employee_by_email(
        &self,
        tenant_id: &str,
        email: &str,
    ) -> Result<Option<LocalEmployee>> {
        let employees = self.employees.lock().expect("employees lock poisoned");
        Ok(employees
            .values()
            .find(|employee| employee.tenant_id == tenant_id && employee.email == email)
            .cloned())
    }

    async fn create_employee(&self, employee: &LocalEmployee) -> Result<()> {
        let mut employees = self.employees.lock().expect("employees lock poisoned");
        if employees.contains_key(&employee.id) {
            return Err(Error::InvalidInput(format!(
                "employee {} already exists",
                employee.id
            )));
        }
        employees.insert(employee.id.clone(), employee.clone());
        Ok(())
    }

    async fn update_employee(&self, employee: &LocalEmployee) -> Result<()> {
        let mut employees = self.employees.lock().expect("employees lock poisoned");
        if !employees.contains_key(&employee.id) {
            return Err(Error::NotFound(employee.id.clone()));
        }
        employees.insert(employee.id.clone(), employee.clone());
        Ok(())
    }

    async fn attendance_between(
        &self,
        tenant_id: &str,
        employee_ids: &[String],
        from: i64,
        to: i64,
        limit: usize,
    ) -> Result<Vec<AttendanceRecord>> {
        let attendance = self.attendance.lock().expect("attendance lock poisoned");
        let mut matching: Vec<AttendanceRecord> = attendance
            .iter()
            .filter(|record| {
                record.tenant_id == tenant_id
                    && employee_ids.contains(&record.employee_id)
                    && record.check_in >= from
                    && record.check_in <= to
            })
            .cloned()
            .collect();
        matching.sort_by_key(|record| record.check_in);
        matching.truncate(limit);
        Ok(matching)
    }

    async fn pending_leaves(&self, tenant_id: &str) -> Result<Vec<LeaveRequest>> {
        let leaves = self.leaves.lock().expect("leaves lock poisoned");
        Ok(leaves
            .iter()
            .filter(|leave| leave.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

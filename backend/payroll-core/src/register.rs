// src/register.rs
use chrono::Weekday;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::attendance::AttendanceMark;
use crate::clock::{Clock, SystemClock};
use crate::dataset::{Dataset, RegisterTotals};
use crate::employee::{EmployeeInput, EmployeeRecord, EmployeeUpdate};
use crate::salary::{SalaryError, SalaryRules};
use crate::sanitize::sanitize_text;
use crate::validation::{
    check_day, validate_attendance_update, validate_bulk_update, validate_employee_data,
    ValidationIssue, ValidationReport,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    #[error("Validation failed: {0}")]
    Invalid(ValidationReport),

    #[error("Employee '{0}' already exists")]
    DuplicateEmployee(String),

    #[error("Employee '{0}' not found")]
    UnknownEmployee(String),

    #[error(transparent)]
    Salary(#[from] SalaryError),
}

/// Result of adding a batch of employees. One bad row never blocks the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkAddReport {
    pub added: Vec<String>,
    /// `(row, empId, reason)`, rows counted from 1.
    pub rejected: Vec<(usize, String, String)>,
}

/// Mutation service over one month's [`Dataset`].
///
/// Every operation sanitizes its text input, runs the matching guard, applies
/// the change and recomputes the affected summaries and salaries before it
/// returns. Changes are staged on copies, so nothing is written on a failed
/// guard or a failed recomputation.
pub struct PayrollRegister {
    dataset: Dataset,
    rules: SalaryRules,
    clock: Box<dyn Clock>,
    accept_warnings: bool,
}

impl PayrollRegister {
    pub fn new(mut dataset: Dataset, rules: SalaryRules) -> Result<Self, RegisterError> {
        dataset.recompute_all(&rules)?;
        Ok(Self {
            dataset,
            rules,
            clock: Box::new(SystemClock),
            accept_warnings: false,
        })
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Lets employee data through when the guard only raised warning-level
    /// issues, such as an implausibly high gross the operator has confirmed.
    pub fn accept_warnings(mut self, accept: bool) -> Self {
        self.accept_warnings = accept;
        self
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn into_dataset(self) -> Dataset {
        self.dataset
    }

    pub fn rules(&self) -> &SalaryRules {
        &self.rules
    }

    pub fn employee(&self, emp_id: &str) -> Option<&EmployeeRecord> {
        self.dataset.employee(emp_id)
    }

    pub fn totals(&self) -> RegisterTotals {
        self.dataset.totals()
    }

    fn check(&self, report: ValidationReport) -> Result<ValidationReport, RegisterError> {
        if report.is_valid() || (self.accept_warnings && report.only_warnings()) {
            Ok(report)
        } else {
            Err(RegisterError::Invalid(report))
        }
    }

    fn position(&self, emp_id: &str) -> Result<usize, RegisterError> {
        self.dataset
            .employees
            .iter()
            .position(|e| e.emp_id() == emp_id)
            .ok_or_else(|| RegisterError::UnknownEmployee(emp_id.to_string()))
    }

    // --- Employees ---

    pub fn add_employee(&mut self, input: EmployeeInput) -> Result<&EmployeeRecord, RegisterError> {
        let input = input.sanitized();
        let report = self.check(validate_employee_data(&input))?;
        if !report.is_valid() {
            warn!("Adding {} despite: {}", input.emp_id, report);
        }
        let Some(profile) = input.to_profile() else {
            return Err(RegisterError::Invalid(ValidationReport {
                errors: vec![ValidationIssue::MissingGross],
                affected_count: None,
            }));
        };
        if self.dataset.employee(&profile.emp_id).is_some() {
            return Err(RegisterError::DuplicateEmployee(profile.emp_id));
        }

        let sno = self.dataset.employees.len() as u32 + 1;
        let record = EmployeeRecord::new(sno, profile, self.dataset.day_count(), &self.rules)?;
        info!("Added employee {} ({}) as #{}", record.emp_id(), record.profile.name, sno);
        self.dataset.employees.push(record);
        Ok(&self.dataset.employees[self.dataset.employees.len() - 1])
    }

    pub fn bulk_add(&mut self, inputs: Vec<EmployeeInput>) -> BulkAddReport {
        let mut report = BulkAddReport::default();
        for (row, input) in inputs.into_iter().enumerate() {
            let emp_id = sanitize_text(&input.emp_id);
            match self.add_employee(input) {
                Ok(record) => report.added.push(record.emp_id().to_string()),
                Err(e) => {
                    warn!("Row {} ({}) rejected: {}", row + 1, emp_id, e);
                    report.rejected.push((row + 1, emp_id, e.to_string()));
                }
            }
        }
        info!(
            "Bulk add finished: {} added, {} rejected",
            report.added.len(),
            report.rejected.len()
        );
        report
    }

    /// Applies field changes to an existing employee. The merged profile is
    /// re-validated as a whole before anything is replaced.
    pub fn update_employee(
        &mut self,
        emp_id: &str,
        update: &EmployeeUpdate,
    ) -> Result<&EmployeeRecord, RegisterError> {
        let index = self.position(emp_id)?;
        let updated = update.apply_to(&self.dataset.employees[index].profile);
        self.check(validate_employee_data(&EmployeeInput::from(&updated)))?;

        let mut record = self.dataset.employees[index].clone();
        record.profile = updated;
        record.recompute(&self.rules)?;
        self.dataset.employees[index] = record;
        info!("Updated employee {}", emp_id);
        Ok(&self.dataset.employees[index])
    }

    /// Removes an employee with their attendance and derived figures and
    /// closes the gap in serial numbers.
    pub fn delete_employee(&mut self, emp_id: &str) -> Result<EmployeeRecord, RegisterError> {
        let index = self.position(emp_id)?;
        let removed = self.dataset.employees.remove(index);
        for (i, record) in self.dataset.employees.iter_mut().enumerate() {
            record.sno = i as u32 + 1;
        }
        info!("Deleted employee {}", emp_id);
        Ok(removed)
    }

    // --- Attendance ---

    pub fn set_attendance(
        &mut self,
        emp_id: &str,
        day_index: usize,
        code: &str,
    ) -> Result<&EmployeeRecord, RegisterError> {
        let code = sanitize_text(code);
        let today = self.clock.today();
        self.check(validate_attendance_update(
            emp_id,
            day_index,
            &code,
            &self.dataset.dates,
            today,
        ))?;
        let index = self.position(emp_id)?;

        let mut staged = self.dataset.employees[index].clone();
        staged.attendance.set(day_index, AttendanceMark::parse(&code));
        staged.recompute(&self.rules)?;
        self.dataset.employees[index] = staged;
        let record = &self.dataset.employees[index];
        debug!(
            "{} day {} set to '{}', payable days now {}",
            emp_id, day_index, code, record.summary.payable_days
        );
        Ok(record)
    }

    /// Guards a set of days for a bulk write: the bulk guard plus range and
    /// future-date checks for each selected day.
    fn check_days(
        &self,
        day_indices: &[usize],
        code: &str,
        employee_count: usize,
    ) -> Result<ValidationReport, RegisterError> {
        let mut report = validate_bulk_update(day_indices, code, employee_count);
        let today = self.clock.today();
        for &day_index in day_indices {
            check_day(day_index, &self.dataset.dates, today, &mut report);
        }
        if !report.errors.is_empty() {
            report.affected_count = None;
        }
        self.check(report)
    }

    /// Writes `code` into the given days for every employee. Returns the
    /// number of cells written.
    /// Repeated indices count once.
    pub fn bulk_update(&mut self, day_indices: &[usize], code: &str) -> Result<usize, RegisterError> {
        let code = sanitize_text(code);
        let mut day_indices = day_indices.to_vec();
        day_indices.sort_unstable();
        day_indices.dedup();
        let report = self.check_days(&day_indices, &code, self.dataset.employees.len())?;
        let mark = AttendanceMark::parse(&code);

        let staged = self
            .dataset
            .employees
            .iter()
            .map(|record| {
                let mut record = record.clone();
                for &day_index in &day_indices {
                    record.attendance.set(day_index, mark.clone());
                }
                record.recompute(&self.rules).map(|_| record)
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.dataset.employees = staged;
        let affected = report.affected_count.unwrap_or_default();
        info!(
            "Bulk update: '{}' on {} day(s) for {} employee(s), {} cells",
            code,
            day_indices.len(),
            self.dataset.employees.len(),
            affected
        );
        Ok(affected)
    }

    /// Writes `code` into days `from..=to` for one employee. The bounds are
    /// checked against the month before any day is expanded.
    pub fn assign_range(
        &mut self,
        emp_id: &str,
        from: usize,
        to: usize,
        code: &str,
    ) -> Result<&EmployeeRecord, RegisterError> {
        let code = sanitize_text(code);
        let index = self.position(emp_id)?;
        let day_count = self.dataset.day_count();
        let bound_issue = if from > to {
            Some(ValidationIssue::NoDaysSelected)
        } else if to >= day_count {
            Some(ValidationIssue::DayOutOfRange {
                day_index: to,
                day_count,
            })
        } else {
            None
        };
        if let Some(issue) = bound_issue {
            return Err(RegisterError::Invalid(ValidationReport {
                errors: vec![issue],
                affected_count: None,
            }));
        }

        let day_indices: Vec<usize> = (from..=to).collect();
        self.check_days(&day_indices, &code, 1)?;
        let mark = AttendanceMark::parse(&code);

        let mut staged = self.dataset.employees[index].clone();
        for day_index in day_indices {
            staged.attendance.set(day_index, mark.clone());
        }
        staged.recompute(&self.rules)?;
        self.dataset.employees[index] = staged;
        info!("{}: days {}..={} set to '{}'", emp_id, from, to, code);
        Ok(&self.dataset.employees[index])
    }

    /// Writes `code` on every `weekday` of the month for every employee,
    /// e.g. `WO` on Sundays.
    pub fn assign_weekday(&mut self, weekday: Weekday, code: &str) -> Result<usize, RegisterError> {
        let day_indices = self.dataset.weekday_indices(weekday);
        self.bulk_update(&day_indices, code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;

    fn register() -> PayrollRegister {
        let dataset = Dataset::for_month(2026, 10).unwrap();
        PayrollRegister::new(dataset, SalaryRules::default())
            .unwrap()
            .with_clock(TestClock::new("2026-10-19 12:00:00"))
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut reg = register();
        reg.add_employee(EmployeeInput::new("E1", "Asha", "30000")).unwrap();
        assert_eq!(
            reg.add_employee(EmployeeInput::new(" E1 ", "Other", "20000"))
                .unwrap_err(),
            RegisterError::DuplicateEmployee("E1".to_string())
        );
    }

    #[test]
    fn warnings_block_unless_accepted() {
        let mut reg = register();
        let err = reg
            .add_employee(EmployeeInput::new("E1", "Asha", "20000000"))
            .unwrap_err();
        assert!(matches!(err, RegisterError::Invalid(report) if report.only_warnings()));

        let mut reg = register().accept_warnings(true);
        assert!(reg.add_employee(EmployeeInput::new("E1", "Asha", "20000000")).is_ok());
        assert!(reg.add_employee(EmployeeInput::new("E2", "", "20000000")).is_err());
    }

    #[test]
    fn unknown_employees_are_reported() {
        let mut reg = register();
        assert_eq!(
            reg.set_attendance("NOPE", 0, "P").unwrap_err(),
            RegisterError::UnknownEmployee("NOPE".to_string())
        );
        assert!(matches!(
            reg.delete_employee("NOPE"),
            Err(RegisterError::UnknownEmployee(_))
        ));
    }

    #[test]
    fn empty_register_rejects_bulk_updates() {
        let mut reg = register();
        let err = reg.bulk_update(&[0, 1], "P").unwrap_err();
        assert!(
            matches!(err, RegisterError::Invalid(report) if report.errors.contains(&ValidationIssue::NoEmployees))
        );
    }
}

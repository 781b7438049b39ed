// src/dataset.rs
use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::employee::EmployeeRecord;
use crate::salary::{SalaryError, SalaryRules};

/// Schema version written by this build. Bumped only together with a
/// migration step in `migration.rs`.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// The persisted unit: one month of register data for every employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub month: String,
    pub dates: Vec<NaiveDate>,
    pub days: Vec<String>,
    pub employees: Vec<EmployeeRecord>,
    /// Missing on the very first releases, which wrote schema 1.
    #[serde(default = "legacy_version")]
    pub version: u32,
}

fn legacy_version() -> u32 {
    1
}

/// Totals across the register, for the footer of a pay sheet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegisterTotals {
    pub employees: usize,
    pub payable_days: Decimal,
    pub total_earnings: Decimal,
    pub total_deduction: Decimal,
    pub net_salary: Decimal,
}

impl Dataset {
    /// Empty register for a calendar month. `None` if the month does not exist.
    pub fn for_month(year: i32, month: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let dates: Vec<NaiveDate> = first
            .iter_days()
            .take_while(|date| date.month() == month)
            .collect();
        let days = dates.iter().map(|date| weekday_label(date.weekday())).collect();
        Some(Self {
            month: first.format("%B %Y").to_string(),
            dates,
            days,
            employees: Vec::new(),
            version: CURRENT_SCHEMA_VERSION,
        })
    }

    pub fn day_count(&self) -> usize {
        self.dates.len()
    }

    pub fn employee(&self, emp_id: &str) -> Option<&EmployeeRecord> {
        self.employees.iter().find(|e| e.emp_id() == emp_id)
    }

    pub fn employee_mut(&mut self, emp_id: &str) -> Option<&mut EmployeeRecord> {
        self.employees.iter_mut().find(|e| e.emp_id() == emp_id)
    }

    /// Day indices falling on `weekday`, e.g. every Sunday for week-offs.
    pub fn weekday_indices(&self, weekday: Weekday) -> Vec<usize> {
        self.dates
            .iter()
            .enumerate()
            .filter(|(_, date)| date.weekday() == weekday)
            .map(|(index, _)| index)
            .collect()
    }

    /// Pads short records to the month length and re-derives every summary
    /// and salary from the stored marks. Stops at the first employee whose
    /// figures overflow.
    pub fn recompute_all(&mut self, rules: &SalaryRules) -> Result<(), SalaryError> {
        let days = self.day_count();
        for employee in &mut self.employees {
            employee.attendance.ensure_len(days);
            employee.recompute(rules)?;
        }
        Ok(())
    }

    pub fn totals(&self) -> RegisterTotals {
        self.employees
            .iter()
            .fold(RegisterTotals::default(), |mut totals, e| {
                totals.employees += 1;
                totals.payable_days = totals.payable_days.saturating_add(e.summary.payable_days);
                totals.total_earnings = totals.total_earnings.saturating_add(e.salary.total_earnings);
                totals.total_deduction = totals.total_deduction.saturating_add(e.salary.total_deduction);
                totals.net_salary = totals.net_salary.saturating_add(e.salary.net_salary);
                totals
            })
    }
}

pub fn weekday_label(weekday: Weekday) -> String {
    match weekday {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::employee::EmployeeProfile;
    use rust_decimal_macros::dec;

    #[test]
    fn month_scaffold_matches_the_calendar() {
        let dataset = Dataset::for_month(2026, 10).unwrap();
        assert_eq!(dataset.month, "October 2026");
        assert_eq!(dataset.day_count(), 31);
        assert_eq!(dataset.days[0], "Thu");
        assert_eq!(dataset.dates[30], NaiveDate::from_ymd_opt(2026, 10, 31).unwrap());
        assert_eq!(dataset.version, CURRENT_SCHEMA_VERSION);

        assert_eq!(Dataset::for_month(2024, 2).unwrap().day_count(), 29);
        assert_eq!(Dataset::for_month(2026, 2).unwrap().day_count(), 28);
        assert!(Dataset::for_month(2026, 13).is_none());
    }

    #[test]
    fn sundays_of_october_2026() {
        let dataset = Dataset::for_month(2026, 10).unwrap();
        assert_eq!(dataset.weekday_indices(Weekday::Sun), vec![3, 10, 17, 24]);
    }

    #[test]
    fn dates_serialize_as_iso_strings() {
        let dataset = Dataset::for_month(2026, 2).unwrap();
        let value = serde_json::to_value(&dataset).unwrap();
        assert_eq!(value["dates"][0], "2026-02-01");
        assert_eq!(value["days"][0], "Sun");
        assert_eq!(value["version"], 2);
    }

    #[test]
    fn missing_version_reads_as_schema_one() {
        let dataset: Dataset = serde_json::from_str(
            r#"{"month":"May 2024","dates":[],"days":[],"employees":[]}"#,
        )
        .unwrap();
        assert_eq!(dataset.version, 1);
    }

    #[test]
    fn recompute_pads_short_records() {
        let rules = SalaryRules::default();
        let mut dataset = Dataset::for_month(2026, 10).unwrap();
        let mut record = EmployeeRecord::new(1, EmployeeProfile::new("E1", "Asha", dec!(31000)), 20, &rules)
            .unwrap();
        record.attendance.set(0, crate::attendance::AttendanceCode::Present.into());
        dataset.employees.push(record);

        dataset.recompute_all(&rules).unwrap();
        let employee = dataset.employee("E1").unwrap();
        assert_eq!(employee.attendance.len(), 31);
        assert_eq!(employee.summary.payable_days, dec!(1));
        assert_eq!(employee.salary.earned_gross, dec!(1000));
        assert_eq!(dataset.totals().employees, 1);
    }
}

// src/validation.rs
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;
use thiserror::Error;

use crate::attendance::AttendanceCode;
use crate::employee::EmployeeInput;

/// Gross salaries above this are almost certainly typos (an extra zero).
pub const GROSS_CEILING: Decimal = dec!(10000000);

/// Hard upper bound on any entered amount. Salary figures derived from
/// amounts below it stay within `Decimal` range and within the 15
/// significant digits that survive storage as JSON numbers.
pub const AMOUNT_LIMIT: Decimal = dec!(1000000000000);

/// Amounts are entered in currency units with at most paise precision.
pub const MAX_AMOUNT_DECIMALS: u32 = 2;

// --- Validation Issues ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    #[error("Employee ID is required")]
    MissingEmployeeId,
    #[error("Employee name is required")]
    MissingName,
    #[error("Day index {day_index} is outside the month (0..{day_count})")]
    DayOutOfRange { day_index: usize, day_count: usize },
    #[error("Unknown attendance code '{code}'")]
    UnknownCode { code: String },
    #[error("Cannot mark attendance for a future date ({date}, today is {today})")]
    FutureDate { date: NaiveDate, today: NaiveDate },
    #[error("Gross salary is required")]
    MissingGross,
    #[error("Gross salary '{raw}' is not a number")]
    NonNumericGross { raw: String },
    #[error("Gross salary must be greater than zero (got {gross})")]
    NonPositiveGross { gross: Decimal },
    #[error("Gross salary {gross} is implausibly high (above {ceiling}); please double-check")]
    ImplausibleGross { gross: Decimal, ceiling: Decimal },
    #[error("{field} '{raw}' is not a valid non-negative amount")]
    InvalidAmount { field: &'static str, raw: String },
    #[error("{field} {amount} exceeds the supported maximum of {limit}")]
    AmountTooLarge {
        field: &'static str,
        amount: Decimal,
        limit: Decimal,
    },
    #[error("{field} '{raw}' has more than two decimal places")]
    TooManyDecimals { field: &'static str, raw: String },
    #[error("Select at least one day to update")]
    NoDaysSelected,
    #[error("There are no employees to update")]
    NoEmployees,
}

impl ValidationIssue {
    pub fn severity(&self) -> Severity {
        match self {
            Self::ImplausibleGross { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// Outcome of a guard. Guards never fail; every violation found is listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    /// Cells a bulk update would touch, filled in when the bulk guard passes.
    pub affected_count: Option<usize>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// True when the report failed only on warning-level issues.
    pub fn only_warnings(&self) -> bool {
        !self.errors.is_empty()
            && self
                .errors
                .iter()
                .all(|e| e.severity() == Severity::Warning)
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    fn push(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            return f.write_str("valid");
        }
        f.write_str(&self.messages().join("; "))
    }
}

// --- Guards ---

fn is_known_or_blank(code: &str) -> bool {
    code.trim().is_empty() || AttendanceCode::parse(code).is_some()
}

/// Range and future-date checks for one day of the active month.
pub fn check_day(
    day_index: usize,
    dates: &[NaiveDate],
    today: NaiveDate,
    report: &mut ValidationReport,
) {
    match dates.get(day_index) {
        None => report.push(ValidationIssue::DayOutOfRange {
            day_index,
            day_count: dates.len(),
        }),
        Some(date) if *date > today => report.push(ValidationIssue::FutureDate {
            date: *date,
            today,
        }),
        Some(_) => {}
    }
}

/// Guards a single attendance cell write. A blank `code` clears the cell and
/// is accepted.
pub fn validate_attendance_update(
    emp_id: &str,
    day_index: usize,
    code: &str,
    dates: &[NaiveDate],
    today: NaiveDate,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    if emp_id.trim().is_empty() {
        report.push(ValidationIssue::MissingEmployeeId);
    }
    check_day(day_index, dates, today, &mut report);
    if !is_known_or_blank(code) {
        report.push(ValidationIssue::UnknownCode {
            code: code.to_string(),
        });
    }
    report
}

/// Guards an employee record before it is added or after an update is
/// applied. An implausibly high gross fails with a warning-level issue.
pub fn validate_employee_data(input: &EmployeeInput) -> ValidationReport {
    let mut report = ValidationReport::default();
    if input.emp_id.trim().is_empty() {
        report.push(ValidationIssue::MissingEmployeeId);
    }
    if input.name.trim().is_empty() {
        report.push(ValidationIssue::MissingName);
    }

    match input.gross.as_deref().map(str::trim) {
        None | Some("") => report.push(ValidationIssue::MissingGross),
        Some(raw) => match raw.replace(',', "").parse::<Decimal>() {
            Err(_) => report.push(ValidationIssue::NonNumericGross {
                raw: raw.to_string(),
            }),
            Ok(gross) if gross <= Decimal::ZERO => {
                report.push(ValidationIssue::NonPositiveGross { gross })
            }
            Ok(gross) => {
                check_magnitude("Gross salary", raw, gross, &mut report);
                if gross > GROSS_CEILING && gross <= AMOUNT_LIMIT {
                    report.push(ValidationIssue::ImplausibleGross {
                        gross,
                        ceiling: GROSS_CEILING,
                    });
                }
            }
        },
    }

    let optional_amounts = [
        ("Opening CL", &input.opening_cl),
        ("Bonus", &input.bonus),
        ("Other allowance", &input.other_allowance),
        ("OT", &input.ot),
        ("Other deduction", &input.other_deduction),
    ];
    for (field, raw) in optional_amounts {
        let Some(raw) = raw.as_deref().map(str::trim).filter(|r| !r.is_empty()) else {
            continue;
        };
        match raw.replace(',', "").parse::<Decimal>() {
            Ok(amount) if amount >= Decimal::ZERO => {
                check_magnitude(field, raw, amount, &mut report)
            }
            _ => report.push(ValidationIssue::InvalidAmount {
                field,
                raw: raw.to_string(),
            }),
        }
    }
    report
}

fn check_magnitude(field: &'static str, raw: &str, amount: Decimal, report: &mut ValidationReport) {
    if amount > AMOUNT_LIMIT {
        report.push(ValidationIssue::AmountTooLarge {
            field,
            amount,
            limit: AMOUNT_LIMIT,
        });
    }
    if amount.normalize().scale() > MAX_AMOUNT_DECIMALS {
        report.push(ValidationIssue::TooManyDecimals {
            field,
            raw: raw.to_string(),
        });
    }
}

/// Guards a bulk status assignment across `employee_count` employees.
/// Repeated day indices are counted once.
pub fn validate_bulk_update(
    day_indices: &[usize],
    code: &str,
    employee_count: usize,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    if day_indices.is_empty() {
        report.push(ValidationIssue::NoDaysSelected);
    }
    if !is_known_or_blank(code) {
        report.push(ValidationIssue::UnknownCode {
            code: code.to_string(),
        });
    }
    if employee_count == 0 {
        report.push(ValidationIssue::NoEmployees);
    }
    if report.is_valid() {
        let mut distinct = day_indices.to_vec();
        distinct.sort_unstable();
        distinct.dedup();
        report.affected_count = Some(distinct.len() * employee_count);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(date_str: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .unwrap_or_else(|_| panic!("Invalid date string format: {}", date_str))
    }

    fn october() -> Vec<NaiveDate> {
        (1..=31).map(|day| NaiveDate::from_ymd_opt(2026, 10, day).unwrap()).collect()
    }

    #[test]
    fn attendance_update_accepts_known_and_blank_codes() {
        let dates = october();
        for code in ["P", "pH", "WFH", "", "  "] {
            let report = validate_attendance_update("E1", 3, code, &dates, d("2026-10-19"));
            assert!(report.is_valid(), "code {:?} should pass: {}", code, report);
        }
    }

    #[test]
    fn attendance_update_rejects_future_dates() {
        let report = validate_attendance_update("E1", 25, "P", &october(), d("2026-10-19"));
        assert!(!report.is_valid());
        assert!(report.messages().iter().any(|m| m.contains("future date")));
    }

    #[test]
    fn attendance_update_today_is_not_future() {
        let report = validate_attendance_update("E1", 18, "P", &october(), d("2026-10-19"));
        assert!(report.is_valid());
    }

    #[test]
    fn attendance_update_collects_every_violation() {
        let report = validate_attendance_update(" ", 31, "XX", &october(), d("2026-10-19"));
        assert_eq!(
            report.errors,
            vec![
                ValidationIssue::MissingEmployeeId,
                ValidationIssue::DayOutOfRange {
                    day_index: 31,
                    day_count: 31
                },
                ValidationIssue::UnknownCode {
                    code: "XX".to_string()
                },
            ]
        );
    }

    #[test]
    fn employee_data_requires_id_name_and_positive_gross() {
        let report = validate_employee_data(&EmployeeInput::default());
        assert_eq!(
            report.errors,
            vec![
                ValidationIssue::MissingEmployeeId,
                ValidationIssue::MissingName,
                ValidationIssue::MissingGross,
            ]
        );

        let report = validate_employee_data(&EmployeeInput::new("E1", "Asha", "thirty"));
        assert!(matches!(report.errors[..], [ValidationIssue::NonNumericGross { .. }]));

        let report = validate_employee_data(&EmployeeInput::new("E1", "Asha", "0"));
        assert!(matches!(report.errors[..], [ValidationIssue::NonPositiveGross { .. }]));

        let report = validate_employee_data(&EmployeeInput::new("E1", "Asha", "-5"));
        assert!(!report.is_valid());

        assert!(validate_employee_data(&EmployeeInput::new("E1", "Asha", "30,000")).is_valid());
    }

    #[test]
    fn implausible_gross_is_a_warning_level_failure() {
        let report = validate_employee_data(&EmployeeInput::new("E1", "Asha", "250000000"));
        assert!(!report.is_valid());
        assert!(report.only_warnings());
        assert_eq!(report.errors[0].severity(), Severity::Warning);
    }

    #[test]
    fn amounts_beyond_the_hard_limit_are_errors_not_warnings() {
        let report = validate_employee_data(&EmployeeInput::new(
            "E1",
            "Asha",
            "30000000000000000000000000000",
        ));
        assert!(!report.only_warnings());
        assert_eq!(
            report.errors,
            vec![ValidationIssue::AmountTooLarge {
                field: "Gross salary",
                amount: dec!(30000000000000000000000000000),
                limit: AMOUNT_LIMIT,
            }]
        );

        let mut input = EmployeeInput::new("E1", "Asha", "30000");
        input.other_deduction = Some("5000000000000".to_string());
        let report = validate_employee_data(&input);
        assert!(matches!(
            report.errors[..],
            [ValidationIssue::AmountTooLarge { field: "Other deduction", .. }]
        ));

        assert!(validate_employee_data(&EmployeeInput::new("E1", "Asha", "1000000000000")).only_warnings());
    }

    #[test]
    fn amounts_are_limited_to_two_decimal_places() {
        assert!(validate_employee_data(&EmployeeInput::new("E1", "Asha", "30000.12")).is_valid());
        assert!(validate_employee_data(&EmployeeInput::new("E1", "Asha", "30000.1200")).is_valid());

        let report =
            validate_employee_data(&EmployeeInput::new("E1", "Asha", "30000.123456789012345"));
        assert_eq!(
            report.errors,
            vec![ValidationIssue::TooManyDecimals {
                field: "Gross salary",
                raw: "30000.123456789012345".to_string(),
            }]
        );

        let mut input = EmployeeInput::new("E1", "Asha", "30000");
        input.opening_cl = Some("7.125".to_string());
        assert!(matches!(
            validate_employee_data(&input).errors[..],
            [ValidationIssue::TooManyDecimals { field: "Opening CL", .. }]
        ));
    }

    #[test]
    fn employee_data_flags_bad_manual_amounts() {
        let mut input = EmployeeInput::new("E1", "Asha", "30000");
        input.bonus = Some("-10".to_string());
        input.ot = Some("lots".to_string());
        input.other_allowance = Some(" ".to_string());
        let report = validate_employee_data(&input);
        assert_eq!(report.errors.len(), 2);
        assert!(!report.only_warnings());
    }

    #[test]
    fn bulk_update_reports_affected_cells() {
        let report = validate_bulk_update(&[0, 7, 14, 21, 28], "WO", 4);
        assert!(report.is_valid());
        assert_eq!(report.affected_count, Some(20));
    }

    #[test]
    fn repeated_days_count_once() {
        let report = validate_bulk_update(&[3, 3, 5], "WO", 2);
        assert_eq!(report.affected_count, Some(4));
    }

    #[test]
    fn bulk_update_rejects_empty_selection_bad_code_and_no_employees() {
        let report = validate_bulk_update(&[], "ZZ", 0);
        assert_eq!(
            report.errors,
            vec![
                ValidationIssue::NoDaysSelected,
                ValidationIssue::UnknownCode {
                    code: "ZZ".to_string()
                },
                ValidationIssue::NoEmployees,
            ]
        );
        assert_eq!(report.affected_count, None);
    }
}

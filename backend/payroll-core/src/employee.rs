// src/employee.rs
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::attendance::{aggregate, AttendanceRecord, AttendanceSummary};
use crate::salary::{compute, SalaryError, SalaryProfile, SalaryRules};
use crate::sanitize::{sanitize_optional, sanitize_text};

/// Casual leave granted at the start of the year when nothing else is known.
pub const DEFAULT_OPENING_CL: Decimal = dec!(8);

// --- Profiles ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeProfile {
    pub emp_id: String,
    pub name: String,
    pub gross: Decimal,
    pub opening_cl: Decimal,
    pub bonus: Decimal,
    pub other_allowance: Decimal,
    pub ot: Decimal,
    pub other_deduction: Decimal,
    pub epf_number: Option<String>,
    pub esi_number: Option<String>,
}

impl EmployeeProfile {
    pub fn new(emp_id: &str, name: &str, gross: Decimal) -> Self {
        Self {
            emp_id: emp_id.to_string(),
            name: name.to_string(),
            gross,
            opening_cl: DEFAULT_OPENING_CL,
            bonus: Decimal::ZERO,
            other_allowance: Decimal::ZERO,
            ot: Decimal::ZERO,
            other_deduction: Decimal::ZERO,
            epf_number: None,
            esi_number: None,
        }
    }
}

/// Employee data as typed into a form or read from an import sheet.
/// Numeric fields stay raw text until validation has looked at them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmployeeInput {
    pub emp_id: String,
    pub name: String,
    pub gross: Option<String>,
    #[serde(rename = "openingCL")]
    pub opening_cl: Option<String>,
    pub bonus: Option<String>,
    pub other_allowance: Option<String>,
    pub ot: Option<String>,
    pub other_deduction: Option<String>,
    #[serde(rename = "epfNo")]
    pub epf_number: Option<String>,
    #[serde(rename = "esiNo")]
    pub esi_number: Option<String>,
}

impl EmployeeInput {
    pub fn new(emp_id: &str, name: &str, gross: &str) -> Self {
        Self {
            emp_id: emp_id.to_string(),
            name: name.to_string(),
            gross: Some(gross.to_string()),
            ..Default::default()
        }
    }

    /// Strips markup from every free-text field. Numeric fields are left to
    /// validation.
    pub fn sanitized(self) -> Self {
        Self {
            emp_id: sanitize_text(&self.emp_id),
            name: sanitize_text(&self.name),
            epf_number: sanitize_optional(self.epf_number.as_deref()),
            esi_number: sanitize_optional(self.esi_number.as_deref()),
            ..self
        }
    }

    /// Builds a profile from input that already passed
    /// [`validate_employee_data`](crate::validation::validate_employee_data).
    /// Unparsable optional amounts fall back to their defaults.
    pub fn to_profile(&self) -> Option<EmployeeProfile> {
        let gross = parse_amount(self.gross.as_deref())?;
        let amount_or = |raw: Option<&str>, fallback: Decimal| parse_amount(raw).unwrap_or(fallback);
        Some(EmployeeProfile {
            emp_id: self.emp_id.trim().to_string(),
            name: self.name.trim().to_string(),
            gross,
            opening_cl: amount_or(self.opening_cl.as_deref(), DEFAULT_OPENING_CL),
            bonus: amount_or(self.bonus.as_deref(), Decimal::ZERO),
            other_allowance: amount_or(self.other_allowance.as_deref(), Decimal::ZERO),
            ot: amount_or(self.ot.as_deref(), Decimal::ZERO),
            other_deduction: amount_or(self.other_deduction.as_deref(), Decimal::ZERO),
            epf_number: self.epf_number.clone(),
            esi_number: self.esi_number.clone(),
        })
    }
}

impl From<&EmployeeProfile> for EmployeeInput {
    fn from(profile: &EmployeeProfile) -> Self {
        Self {
            emp_id: profile.emp_id.clone(),
            name: profile.name.clone(),
            gross: Some(profile.gross.to_string()),
            opening_cl: Some(profile.opening_cl.to_string()),
            bonus: Some(profile.bonus.to_string()),
            other_allowance: Some(profile.other_allowance.to_string()),
            ot: Some(profile.ot.to_string()),
            other_deduction: Some(profile.other_deduction.to_string()),
            epf_number: profile.epf_number.clone(),
            esi_number: profile.esi_number.clone(),
        }
    }
}

/// Parses a blank-tolerant amount. `None` for missing, blank or non-numeric text.
pub fn parse_amount(raw: Option<&str>) -> Option<Decimal> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    raw.replace(',', "").parse::<Decimal>().ok()
}

/// Field-by-field changes to an existing employee. The employee ID is not
/// updatable; fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmployeeUpdate {
    pub name: Option<String>,
    pub gross: Option<Decimal>,
    pub opening_cl: Option<Decimal>,
    pub bonus: Option<Decimal>,
    pub other_allowance: Option<Decimal>,
    pub ot: Option<Decimal>,
    pub other_deduction: Option<Decimal>,
    pub epf_number: Option<String>,
    pub esi_number: Option<String>,
}

impl EmployeeUpdate {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
    pub fn gross(mut self, gross: Decimal) -> Self {
        self.gross = Some(gross);
        self
    }
    pub fn opening_cl(mut self, opening_cl: Decimal) -> Self {
        self.opening_cl = Some(opening_cl);
        self
    }
    pub fn bonus(mut self, bonus: Decimal) -> Self {
        self.bonus = Some(bonus);
        self
    }
    pub fn other_allowance(mut self, amount: Decimal) -> Self {
        self.other_allowance = Some(amount);
        self
    }
    pub fn ot(mut self, ot: Decimal) -> Self {
        self.ot = Some(ot);
        self
    }
    pub fn other_deduction(mut self, amount: Decimal) -> Self {
        self.other_deduction = Some(amount);
        self
    }
    pub fn epf_number(mut self, number: &str) -> Self {
        self.epf_number = Some(number.to_string());
        self
    }
    pub fn esi_number(mut self, number: &str) -> Self {
        self.esi_number = Some(number.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns the profile with this update applied. Free text is sanitized.
    pub fn apply_to(&self, profile: &EmployeeProfile) -> EmployeeProfile {
        let mut updated = profile.clone();
        if let Some(name) = &self.name {
            updated.name = sanitize_text(name);
        }
        if let Some(gross) = self.gross {
            updated.gross = gross;
        }
        if let Some(opening_cl) = self.opening_cl {
            updated.opening_cl = opening_cl;
        }
        if let Some(bonus) = self.bonus {
            updated.bonus = bonus;
        }
        if let Some(amount) = self.other_allowance {
            updated.other_allowance = amount;
        }
        if let Some(ot) = self.ot {
            updated.ot = ot;
        }
        if let Some(amount) = self.other_deduction {
            updated.other_deduction = amount;
        }
        if let Some(number) = &self.epf_number {
            updated.epf_number = sanitize_optional(Some(number));
        }
        if let Some(number) = &self.esi_number {
            updated.esi_number = sanitize_optional(Some(number));
        }
        updated
    }
}

// --- Register Rows ---

/// One row of the monthly register: the profile, its raw marks and the two
/// derived blocks computed from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EmployeeRow", into = "EmployeeRow")]
pub struct EmployeeRecord {
    pub sno: u32,
    pub profile: EmployeeProfile,
    pub attendance: AttendanceRecord,
    pub summary: AttendanceSummary,
    pub salary: SalaryProfile,
}

impl EmployeeRecord {
    pub fn new(
        sno: u32,
        profile: EmployeeProfile,
        days: usize,
        rules: &SalaryRules,
    ) -> Result<Self, SalaryError> {
        let mut record = Self {
            sno,
            profile,
            attendance: AttendanceRecord::with_days(days),
            summary: AttendanceSummary::default(),
            salary: SalaryProfile::default(),
        };
        record.recompute(rules)?;
        Ok(record)
    }

    pub fn emp_id(&self) -> &str {
        &self.profile.emp_id
    }

    /// Re-derives the summary from the marks and the salary from the summary.
    /// On overflow the record keeps its previous derived blocks.
    pub fn recompute(&mut self, rules: &SalaryRules) -> Result<(), SalaryError> {
        let summary = aggregate(&self.attendance);
        self.salary = compute(&self.profile, &summary, rules)?;
        self.summary = summary;
        Ok(())
    }
}

/// Flat persisted shape of an [`EmployeeRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmployeeRow {
    #[serde(default)]
    sno: u32,
    emp_id: String,
    name: String,
    #[serde(with = "rust_decimal::serde::float")]
    gross: Decimal,
    #[serde(rename = "openingCL", with = "rust_decimal::serde::float")]
    opening_cl: Decimal,
    #[serde(rename = "epfNo", default, skip_serializing_if = "Option::is_none")]
    epf_number: Option<String>,
    #[serde(rename = "esiNo", default, skip_serializing_if = "Option::is_none")]
    esi_number: Option<String>,
    #[serde(default)]
    attendance: AttendanceRecord,

    #[serde(default, with = "rust_decimal::serde::float")]
    present_days: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    paid_holiday: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    week_off: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    on_duty: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    casual_leave: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    loss_of_pay: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    payable_days: Decimal,

    #[serde(default, with = "rust_decimal::serde::float")]
    earned_gross: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    basic: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    da: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    hra: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    bonus: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    other_allowance: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    ot: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    total_earnings: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    epf: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    esi: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    prof_tax: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    other_deduction: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    total_deduction: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    net_salary: Decimal,
}

impl From<EmployeeRow> for EmployeeRecord {
    fn from(row: EmployeeRow) -> Self {
        Self {
            sno: row.sno,
            profile: EmployeeProfile {
                emp_id: row.emp_id,
                name: row.name,
                gross: row.gross,
                opening_cl: row.opening_cl,
                bonus: row.bonus,
                other_allowance: row.other_allowance,
                ot: row.ot,
                other_deduction: row.other_deduction,
                epf_number: row.epf_number,
                esi_number: row.esi_number,
            },
            attendance: row.attendance,
            summary: AttendanceSummary {
                present_days: row.present_days,
                casual_leave: row.casual_leave,
                week_off: row.week_off,
                paid_holiday: row.paid_holiday,
                on_duty: row.on_duty,
                loss_of_pay: row.loss_of_pay,
                payable_days: row.payable_days,
            },
            salary: SalaryProfile {
                earned_gross: row.earned_gross,
                basic: row.basic,
                da: row.da,
                hra: row.hra,
                total_earnings: row.total_earnings,
                epf: row.epf,
                esi: row.esi,
                prof_tax: row.prof_tax,
                total_deduction: row.total_deduction,
                net_salary: row.net_salary,
            },
        }
    }
}

impl From<EmployeeRecord> for EmployeeRow {
    fn from(record: EmployeeRecord) -> Self {
        let EmployeeRecord {
            sno,
            profile,
            attendance,
            summary,
            salary,
        } = record;
        Self {
            sno,
            emp_id: profile.emp_id,
            name: profile.name,
            gross: profile.gross,
            opening_cl: profile.opening_cl,
            epf_number: profile.epf_number,
            esi_number: profile.esi_number,
            attendance,
            present_days: summary.present_days,
            paid_holiday: summary.paid_holiday,
            week_off: summary.week_off,
            on_duty: summary.on_duty,
            casual_leave: summary.casual_leave,
            loss_of_pay: summary.loss_of_pay,
            payable_days: summary.payable_days,
            earned_gross: salary.earned_gross,
            basic: salary.basic,
            da: salary.da,
            hra: salary.hra,
            bonus: profile.bonus,
            other_allowance: profile.other_allowance,
            ot: profile.ot,
            total_earnings: salary.total_earnings,
            epf: salary.epf,
            esi: salary.esi,
            prof_tax: salary.prof_tax,
            other_deduction: profile.other_deduction,
            total_deduction: salary.total_deduction,
            net_salary: salary.net_salary,
        }
    }
}

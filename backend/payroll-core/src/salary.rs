// src/salary.rs
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::attendance::AttendanceSummary;
use crate::employee::EmployeeProfile;

// --- Statutory Defaults ---

pub const DEFAULT_DAYS_IN_MONTH: Decimal = dec!(31);
pub const DEFAULT_BASIC_PCT: Decimal = dec!(0.50);
pub const DEFAULT_DA_PCT: Decimal = dec!(0.25);
pub const DEFAULT_HRA_PCT: Decimal = dec!(0.25);
pub const DEFAULT_EPF_MAX_BASE: Decimal = dec!(15000);
pub const DEFAULT_EPF_RATE: Decimal = dec!(0.12);
pub const DEFAULT_EPF_THRESHOLD: Decimal = dec!(21000);
pub const DEFAULT_ESI_THRESHOLD: Decimal = dec!(21000);
pub const DEFAULT_ESI_RATE: Decimal = dec!(0.0075);
pub const DEFAULT_PROF_TAX_THRESHOLD: Decimal = dec!(15000);
pub const DEFAULT_FLAT_PROF_TAX: Decimal = dec!(200);

/// Rates and thresholds for the monthly salary computation.
///
/// Percentages are fractions (`0.50` is 50%). `days_in_month` is a fixed
/// divisor and deliberately not the calendar length of the active month.
/// Loaded and checked once at startup, see `config::load_salary_rules`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SalaryRules {
    pub days_in_month: Decimal,
    pub basic_pct: Decimal,
    pub da_pct: Decimal,
    pub hra_pct: Decimal,
    pub epf_max_base: Decimal,
    pub epf_rate: Decimal,
    pub epf_threshold: Decimal,
    pub esi_threshold: Decimal,
    pub esi_rate: Decimal,
    pub prof_tax_threshold: Decimal,
    pub flat_prof_tax: Decimal,
}

impl Default for SalaryRules {
    fn default() -> Self {
        Self {
            days_in_month: DEFAULT_DAYS_IN_MONTH,
            basic_pct: DEFAULT_BASIC_PCT,
            da_pct: DEFAULT_DA_PCT,
            hra_pct: DEFAULT_HRA_PCT,
            epf_max_base: DEFAULT_EPF_MAX_BASE,
            epf_rate: DEFAULT_EPF_RATE,
            epf_threshold: DEFAULT_EPF_THRESHOLD,
            esi_threshold: DEFAULT_ESI_THRESHOLD,
            esi_rate: DEFAULT_ESI_RATE,
            prof_tax_threshold: DEFAULT_PROF_TAX_THRESHOLD,
            flat_prof_tax: DEFAULT_FLAT_PROF_TAX,
        }
    }
}

/// Derived pay figures for one employee and month. Never edited by hand.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SalaryProfile {
    pub earned_gross: Decimal,
    pub basic: Decimal,
    pub da: Decimal,
    pub hra: Decimal,
    pub total_earnings: Decimal,
    pub epf: Decimal,
    pub esi: Decimal,
    pub prof_tax: Decimal,
    pub total_deduction: Decimal,
    pub net_salary: Decimal,
}

/// Rounds to whole currency units, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SalaryError {
    #[error("Salary figures for employee '{emp_id}' are outside the supported numeric range")]
    Overflow { emp_id: String },
}

fn checked_sum(parts: &[Decimal]) -> Option<Decimal> {
    parts
        .iter()
        .try_fold(Decimal::ZERO, |acc, part| acc.checked_add(*part))
}

/// Computes the salary profile from monthly gross, payable days and the
/// manual components on the profile.
///
/// EPF and ESI are gated on the unmodified monthly `gross`, not on earned
/// gross. `net_salary` is not clamped and goes negative when manual
/// deductions exceed earnings. Amounts too large for `Decimal` give
/// [`SalaryError::Overflow`] instead of a partial profile.
pub fn compute(
    profile: &EmployeeProfile,
    summary: &AttendanceSummary,
    rules: &SalaryRules,
) -> Result<SalaryProfile, SalaryError> {
    let gross = profile.gross;
    let overflow = || SalaryError::Overflow {
        emp_id: profile.emp_id.clone(),
    };
    let share = |amount: Decimal, pct: Decimal| {
        amount
            .checked_mul(pct)
            .map(round_money)
            .ok_or_else(overflow)
    };

    let earned_gross = if rules.days_in_month.is_zero() {
        Decimal::ZERO
    } else {
        gross
            .checked_mul(summary.payable_days)
            .and_then(|scaled| scaled.checked_div(rules.days_in_month))
            .map(round_money)
            .ok_or_else(overflow)?
    };

    let basic = share(earned_gross, rules.basic_pct)?;
    let da = share(earned_gross, rules.da_pct)?;
    let hra = share(earned_gross, rules.hra_pct)?;

    let total_earnings = checked_sum(&[
        basic,
        da,
        hra,
        profile.bonus,
        profile.other_allowance,
        profile.ot,
    ])
    .ok_or_else(overflow)?;

    let epf = if gross > rules.epf_threshold {
        let epf_base = basic
            .checked_add(da)
            .ok_or_else(overflow)?
            .min(rules.epf_max_base);
        share(epf_base, rules.epf_rate)?
    } else {
        Decimal::ZERO
    };

    let esi = if gross <= rules.esi_threshold {
        share(earned_gross, rules.esi_rate)?
    } else {
        Decimal::ZERO
    };

    let prof_tax = if earned_gross > rules.prof_tax_threshold {
        rules.flat_prof_tax
    } else {
        Decimal::ZERO
    };

    let total_deduction =
        checked_sum(&[epf, esi, prof_tax, profile.other_deduction]).ok_or_else(overflow)?;
    let net_salary = total_earnings
        .checked_sub(total_deduction)
        .ok_or_else(overflow)?;

    debug!(
        "Computed salary for {}: earned_gross={}, epf={}, esi={}, net={}",
        profile.emp_id, earned_gross, epf, esi, net_salary
    );

    Ok(SalaryProfile {
        earned_gross,
        basic,
        da,
        hra,
        total_earnings,
        epf,
        esi,
        prof_tax,
        total_deduction,
        net_salary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::{aggregate, AttendanceCode, AttendanceMark, AttendanceRecord};
    use proptest::prelude::*;

    fn profile(gross: Decimal) -> EmployeeProfile {
        EmployeeProfile::new("E1", "Asha Verma", gross)
    }

    fn all_present(days: usize) -> AttendanceSummary {
        aggregate(&AttendanceRecord::from_marks(vec![
            AttendanceMark::Code(AttendanceCode::Present);
            days
        ]))
    }

    #[test]
    fn above_threshold_pays_epf_capped_at_max_base() {
        let salary = compute(&profile(dec!(30000)), &all_present(31), &SalaryRules::default()).unwrap();
        assert_eq!(salary.earned_gross, dec!(30000));
        assert_eq!(salary.basic, dec!(15000));
        assert_eq!(salary.da, dec!(7500));
        assert_eq!(salary.hra, dec!(7500));
        assert_eq!(salary.epf, dec!(1800));
        assert_eq!(salary.esi, dec!(0));
        assert_eq!(salary.prof_tax, dec!(200));
        assert_eq!(salary.total_earnings, dec!(30000));
        assert_eq!(salary.net_salary, dec!(28000));
    }

    #[test]
    fn at_or_below_threshold_pays_esi_only() {
        let salary = compute(&profile(dec!(20000)), &all_present(31), &SalaryRules::default()).unwrap();
        assert_eq!(salary.epf, dec!(0));
        assert_eq!(salary.esi, dec!(150));
        assert!(salary.esi > Decimal::ZERO);

        let boundary = compute(&profile(dec!(21000)), &all_present(31), &SalaryRules::default()).unwrap();
        assert_eq!(boundary.epf, dec!(0));
        assert_eq!(boundary.esi, round_money(dec!(21000) * DEFAULT_ESI_RATE));
    }

    #[test]
    fn thresholds_use_monthly_gross_not_earned_gross() {
        // Ten payable days pull earned gross well under 21000, EPF still applies.
        let salary = compute(&profile(dec!(40000)), &all_present(10), &SalaryRules::default()).unwrap();
        assert_eq!(salary.earned_gross, round_money(dec!(40000) * dec!(10) / dec!(31)));
        assert!(salary.epf > Decimal::ZERO);
        assert_eq!(salary.esi, dec!(0));
    }

    #[test]
    fn professional_tax_follows_earned_gross() {
        let salary = compute(&profile(dec!(30000)), &all_present(15), &SalaryRules::default()).unwrap();
        assert_eq!(salary.earned_gross, dec!(14516));
        assert_eq!(salary.prof_tax, dec!(0));
    }

    #[test]
    fn divisor_is_the_configured_constant() {
        // A 28-day month still divides by 31.
        let salary = compute(&profile(dec!(31000)), &all_present(28), &SalaryRules::default()).unwrap();
        assert_eq!(salary.earned_gross, dec!(28000));
    }

    #[test]
    fn manual_components_flow_into_totals() {
        let mut p = profile(dec!(30000));
        p.bonus = dec!(1000);
        p.other_allowance = dec!(500);
        p.ot = dec!(250);
        p.other_deduction = dec!(300);
        let salary = compute(&p, &all_present(31), &SalaryRules::default()).unwrap();
        assert_eq!(salary.total_earnings, dec!(31750));
        assert_eq!(salary.total_deduction, dec!(2300));
        assert_eq!(salary.net_salary, dec!(29450));
    }

    #[test]
    fn net_salary_is_not_clamped() {
        let mut p = profile(dec!(10000));
        p.other_deduction = dec!(50000);
        let salary = compute(&p, &all_present(31), &SalaryRules::default()).unwrap();
        assert!(salary.net_salary < Decimal::ZERO);
    }

    #[test]
    fn no_payable_days_earns_nothing() {
        let salary = compute(&profile(dec!(30000)), &AttendanceSummary::default(), &SalaryRules::default()).unwrap();
        assert_eq!(salary.earned_gross, dec!(0));
        assert_eq!(salary.epf, dec!(0));
        assert_eq!(salary.net_salary, dec!(0));
    }

    #[test]
    fn oversized_amounts_fail_instead_of_panicking() {
        let huge = profile(Decimal::MAX);
        assert_eq!(
            compute(&huge, &all_present(31), &SalaryRules::default()),
            Err(SalaryError::Overflow {
                emp_id: "E1".to_string()
            })
        );

        let mut p = profile(dec!(30000));
        p.bonus = Decimal::MAX;
        assert!(compute(&p, &all_present(31), &SalaryRules::default()).is_err());

        let mut p = profile(dec!(30000));
        p.other_deduction = Decimal::MIN;
        assert!(compute(&p, &all_present(31), &SalaryRules::default()).is_err());
    }

    proptest! {
        #[test]
        fn epf_and_esi_are_mutually_exclusive(
            gross in 1u32..200_000,
            days in 0usize..32,
            other_deduction in 0u32..100_000,
        ) {
            let mut p = profile(Decimal::from(gross));
            p.other_deduction = Decimal::from(other_deduction);
            let salary = compute(&p, &all_present(days), &SalaryRules::default()).unwrap();
            prop_assert!(!(salary.epf > Decimal::ZERO && salary.esi > Decimal::ZERO));
            prop_assert_eq!(salary.net_salary, salary.total_earnings - salary.total_deduction);
        }
    }
}

// src/config.rs
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use crate::persistence::{
    StorageLimits, DEFAULT_BACKUP_EVERY, DEFAULT_BACKUP_RETENTION, DEFAULT_MAX_DATASET_BYTES,
    DEFAULT_MAX_STORAGE_BYTES, DEFAULT_WARN_RATIO,
};
use crate::salary::SalaryRules;

pub const SALARY_ENV_PREFIX: &str = "PAYROLL_";
pub const STORAGE_ENV_PREFIX: &str = "PAYROLL_STORAGE_";
pub const DEFAULT_DATA_DIR: &str = "./payroll_data";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid salary rules: {0}")]
    InvalidRules(String),

    #[error("Invalid storage settings: {0}")]
    InvalidStorage(String),
}

// --- Salary Rules ---

impl SalaryRules {
    /// Checks the contract the computation relies on: a positive divisor,
    /// fractions within 0..=1, a component split summing to exactly 1, and
    /// thresholds that keep EPF and ESI mutually exclusive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidRules(msg));

        if self.days_in_month <= Decimal::ZERO {
            return invalid(format!("days_in_month must be positive, got {}", self.days_in_month));
        }

        for (name, value) in [
            ("basic_pct", self.basic_pct),
            ("da_pct", self.da_pct),
            ("hra_pct", self.hra_pct),
            ("epf_rate", self.epf_rate),
            ("esi_rate", self.esi_rate),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return invalid(format!("{} must be between 0 and 1, got {}", name, value));
            }
        }

        let split = self.basic_pct + self.da_pct + self.hra_pct;
        if split != Decimal::ONE {
            return invalid(format!(
                "basic_pct + da_pct + hra_pct must equal 1, got {}",
                split
            ));
        }

        for (name, value) in [
            ("epf_max_base", self.epf_max_base),
            ("epf_threshold", self.epf_threshold),
            ("esi_threshold", self.esi_threshold),
            ("prof_tax_threshold", self.prof_tax_threshold),
            ("flat_prof_tax", self.flat_prof_tax),
        ] {
            if value < Decimal::ZERO {
                return invalid(format!("{} must not be negative, got {}", name, value));
            }
        }

        // EPF applies strictly above its threshold, ESI at or below its own.
        if self.epf_threshold < self.esi_threshold {
            return invalid(format!(
                "epf_threshold ({}) below esi_threshold ({}) would charge both EPF and ESI",
                self.epf_threshold, self.esi_threshold
            ));
        }
        Ok(())
    }
}

/// Reads `PAYROLL_*` overrides (e.g. `PAYROLL_ESI_RATE=0.0075`) on top of the
/// statutory defaults and validates the result.
pub fn load_salary_rules() -> Result<SalaryRules, ConfigError> {
    dotenv::dotenv().ok();
    salary_rules_from(std::env::vars())
}

fn salary_rules_from<I>(vars: I) -> Result<SalaryRules, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let rules: SalaryRules = envy::prefixed(SALARY_ENV_PREFIX).from_iter(vars)?;
    rules.validate()?;
    info!(
        "Salary rules loaded (divisor {}, EPF above {}, ESI up to {})",
        rules.days_in_month, rules.epf_threshold, rules.esi_threshold
    );
    Ok(rules)
}

// --- Storage ---

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub max_dataset_bytes: u64,
    pub max_storage_bytes: u64,
    pub warn_ratio: f64,
    pub backup_every: u64,
    pub backup_retention: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            max_dataset_bytes: DEFAULT_MAX_DATASET_BYTES,
            max_storage_bytes: DEFAULT_MAX_STORAGE_BYTES,
            warn_ratio: DEFAULT_WARN_RATIO,
            backup_every: DEFAULT_BACKUP_EVERY,
            backup_retention: DEFAULT_BACKUP_RETENTION,
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenv::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: StorageConfig = envy::prefixed(STORAGE_ENV_PREFIX).from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.warn_ratio > 0.0 && self.warn_ratio <= 1.0) {
            return Err(ConfigError::InvalidStorage(format!(
                "warn_ratio must be in (0, 1], got {}",
                self.warn_ratio
            )));
        }
        if self.max_dataset_bytes > self.max_storage_bytes {
            return Err(ConfigError::InvalidStorage(format!(
                "max_dataset_bytes ({}) exceeds max_storage_bytes ({})",
                self.max_dataset_bytes, self.max_storage_bytes
            )));
        }
        if self.backup_retention == 0 {
            return Err(ConfigError::InvalidStorage(
                "backup_retention must keep at least one snapshot".to_string(),
            ));
        }
        Ok(())
    }

    pub fn limits(&self) -> StorageLimits {
        StorageLimits {
            max_dataset_bytes: self.max_dataset_bytes,
            max_storage_bytes: self.max_storage_bytes,
            warn_ratio: self.warn_ratio,
            backup_every: self.backup_every,
            backup_retention: self.backup_retention,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_valid() {
        assert!(SalaryRules::default().validate().is_ok());
        assert_eq!(salary_rules_from(vars(&[])).unwrap(), SalaryRules::default());
        assert_eq!(StorageConfig::from_vars(vars(&[])).unwrap(), StorageConfig::default());
    }

    #[test]
    fn environment_overrides_individual_rates() {
        let rules = salary_rules_from(vars(&[
            ("PAYROLL_ESI_RATE", "0.0075"),
            ("PAYROLL_FLAT_PROF_TAX", "250"),
            ("PAYROLL_DAYS_IN_MONTH", "30"),
            ("UNRELATED", "x"),
        ]))
        .unwrap();
        assert_eq!(rules.flat_prof_tax, dec!(250));
        assert_eq!(rules.days_in_month, dec!(30));
        assert_eq!(rules.basic_pct, dec!(0.50));
    }

    #[test]
    fn component_split_must_sum_to_one() {
        let err = salary_rules_from(vars(&[("PAYROLL_HRA_PCT", "0.30")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRules(msg) if msg.contains("must equal 1")));
    }

    #[test]
    fn overlapping_statutory_thresholds_are_refused() {
        let rules = SalaryRules {
            epf_threshold: dec!(18000),
            ..SalaryRules::default()
        };
        assert!(matches!(rules.validate(), Err(ConfigError::InvalidRules(_))));

        let rules = SalaryRules {
            days_in_month: Decimal::ZERO,
            ..SalaryRules::default()
        };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn storage_settings_come_from_their_own_prefix() {
        let config = StorageConfig::from_vars(vars(&[
            ("PAYROLL_STORAGE_DATA_DIR", "/tmp/payroll"),
            ("PAYROLL_STORAGE_BACKUP_RETENTION", "3"),
            ("PAYROLL_STORAGE_WARN_RATIO", "0.9"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/payroll"));
        assert_eq!(config.limits().backup_retention, 3);
        assert_eq!(config.limits().warn_ratio, 0.9);
        assert_eq!(config.max_dataset_bytes, DEFAULT_MAX_DATASET_BYTES);

        assert!(StorageConfig::from_vars(vars(&[("PAYROLL_STORAGE_WARN_RATIO", "1.5")])).is_err());
        assert!(StorageConfig::from_vars(vars(&[("PAYROLL_STORAGE_BACKUP_EVERY", "often")])).is_err());
    }

    #[test]
    fn zero_backup_retention_is_refused() {
        let err = StorageConfig::from_vars(vars(&[("PAYROLL_STORAGE_BACKUP_RETENTION", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStorage(msg) if msg.contains("backup_retention")));
        assert!(StorageConfig::from_vars(vars(&[("PAYROLL_STORAGE_BACKUP_RETENTION", "1")])).is_ok());
    }
}

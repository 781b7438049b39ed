// src/lib.rs
//! Attendance register and payroll engine: turns daily attendance marks into
//! monthly salary figures and keeps the register in versioned, quota-checked
//! storage with rotating backups.

pub mod attendance;
pub mod clock;
pub mod config;
pub mod dataset;
pub mod employee;
pub mod import;
pub mod migration;
pub mod persistence;
pub mod register;
pub mod salary;
pub mod sanitize;
pub mod storage;
pub mod validation;


pub use attendance::{aggregate, AttendanceCode, AttendanceMark, AttendanceRecord, AttendanceSummary};
pub use clock::{Clock, SystemClock, TestClock};
pub use config::{load_salary_rules, ConfigError, StorageConfig};
pub use dataset::{Dataset, RegisterTotals, CURRENT_SCHEMA_VERSION};
pub use employee::{EmployeeInput, EmployeeProfile, EmployeeRecord, EmployeeUpdate};
pub use persistence::{LoadOutcome, PersistenceError, PersistenceManager, SaveOutcome, StorageLimits};
pub use register::{BulkAddReport, PayrollRegister, RegisterError};
pub use salary::{compute, SalaryError, SalaryProfile, SalaryRules};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use validation::{ValidationIssue, ValidationReport};

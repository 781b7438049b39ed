// src/migration.rs
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use crate::dataset::CURRENT_SCHEMA_VERSION;
use crate::employee::DEFAULT_OPENING_CL;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MigrationError {
    #[error("Stored data is not a JSON object")]
    NotAnObject,
    #[error("Schema version field is not a valid version number: {0}")]
    InvalidVersion(String),
    #[error("Stored schema version {found} is newer than this build supports ({supported})")]
    NewerThanSupported { found: u32, supported: u32 },
    #[error("No migration step registered from schema version {0}")]
    MissingStep(u32),
}

type Step = fn(&mut Map<String, Value>) -> Result<(), MigrationError>;

/// `(from_version, step)`; each step upgrades `from_version` to `from_version + 1`.
const STEPS: &[(u32, Step)] = &[(1, default_opening_cl as Step)];

/// Schema version of a stored document. A missing field means schema 1.
pub fn stored_version(doc: &Value) -> Result<u32, MigrationError> {
    let object = doc.as_object().ok_or(MigrationError::NotAnObject)?;
    match object.get("version") {
        None | Some(Value::Null) => Ok(1),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v >= 1)
            .ok_or_else(|| MigrationError::InvalidVersion(n.to_string())),
        Some(other) => Err(MigrationError::InvalidVersion(other.to_string())),
    }
}

/// Upgrades a stored document to [`CURRENT_SCHEMA_VERSION`].
///
/// Steps only add or default fields, so running this on an already current
/// document returns it unchanged. On error the input is not returned: the
/// caller never sees a half-migrated document.
pub fn migrate(mut doc: Value) -> Result<Value, MigrationError> {
    let mut version = stored_version(&doc)?;
    if version > CURRENT_SCHEMA_VERSION {
        return Err(MigrationError::NewerThanSupported {
            found: version,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }
    let object = doc.as_object_mut().ok_or(MigrationError::NotAnObject)?;
    while version < CURRENT_SCHEMA_VERSION {
        let step = STEPS
            .iter()
            .find(|(from, _)| *from == version)
            .map(|(_, step)| *step)
            .ok_or(MigrationError::MissingStep(version))?;
        step(object)?;
        info!("Migrated stored dataset from schema v{} to v{}", version, version + 1);
        version += 1;
    }
    object.insert("version".to_string(), Value::from(version));
    Ok(doc)
}

/// v1 → v2: employees without an opening casual-leave balance get the default.
fn default_opening_cl(doc: &mut Map<String, Value>) -> Result<(), MigrationError> {
    let Some(Value::Array(employees)) = doc.get_mut("employees") else {
        return Ok(());
    };
    let default_cl = Value::from(DEFAULT_OPENING_CL.to_u64().unwrap_or(8));
    for employee in employees.iter_mut().filter_map(Value::as_object_mut) {
        let missing = matches!(employee.get("openingCL"), None | Some(Value::Null));
        if missing {
            employee.insert("openingCL".to_string(), default_cl.clone());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy_doc() -> Value {
        json!({
            "month": "March 2024",
            "dates": ["2024-03-01"],
            "days": ["Fri"],
            "employees": [
                { "empId": "E1", "name": "Asha", "gross": 30000, "attendance": ["P"] },
                { "empId": "E2", "name": "Ravi", "gross": 18000, "openingCL": 4, "attendance": ["A"] },
                { "empId": "E3", "name": "Meera", "gross": 22000, "openingCL": null, "attendance": [""] }
            ]
        })
    }

    #[test]
    fn v1_gets_default_opening_cl_and_current_version() {
        let migrated = migrate(legacy_doc()).unwrap();
        assert_eq!(migrated["version"], CURRENT_SCHEMA_VERSION);
        assert_eq!(migrated["employees"][0]["openingCL"], 8);
        assert_eq!(migrated["employees"][1]["openingCL"], 4);
        assert_eq!(migrated["employees"][2]["openingCL"], 8);
    }

    #[test]
    fn migration_never_drops_existing_fields() {
        let mut doc = legacy_doc();
        doc["employees"][0]["customNote"] = json!("keep me");
        doc["extra"] = json!({ "branch": "Pune" });
        let migrated = migrate(doc).unwrap();
        assert_eq!(migrated["employees"][0]["customNote"], "keep me");
        assert_eq!(migrated["extra"]["branch"], "Pune");
        assert_eq!(migrated["employees"][0]["attendance"], json!(["P"]));
    }

    #[test]
    fn migration_is_idempotent() {
        let once = migrate(legacy_doc()).unwrap();
        let twice = migrate(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn newer_or_garbled_versions_are_refused() {
        let mut doc = legacy_doc();
        doc["version"] = json!(CURRENT_SCHEMA_VERSION + 1);
        assert!(matches!(
            migrate(doc),
            Err(MigrationError::NewerThanSupported { .. })
        ));

        let mut doc = legacy_doc();
        doc["version"] = json!("two");
        assert!(matches!(migrate(doc), Err(MigrationError::InvalidVersion(_))));

        assert_eq!(migrate(json!([1, 2])), Err(MigrationError::NotAnObject));
    }

    #[test]
    fn explicit_version_one_is_migrated() {
        let mut doc = legacy_doc();
        doc["version"] = json!(1);
        assert_eq!(stored_version(&doc), Ok(1));
        assert_eq!(migrate(doc).unwrap()["version"], 2);
    }
}

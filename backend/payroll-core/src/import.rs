// src/import.rs
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::employee::EmployeeInput;

/// Columns an employee sheet must carry. The rest (`openingCL`, `bonus`,
/// `otherAllowance`, `ot`, `otherDeduction`, `epfNo`, `esiNo`) are optional.
pub const REQUIRED_COLUMNS: [&str; 3] = ["empId", "name", "gross"];

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("File I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Employee sheet is missing the '{0}' column")]
    MissingColumn(&'static str),
}

/// Reads an employee sheet into raw inputs. Rows are not validated here;
/// they go through the register's sanitize and validate path like any
/// hand-entered employee.
pub fn read_employees<R: Read>(reader: R) -> Result<Vec<EmployeeInput>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(ImportError::MissingColumn(column));
        }
    }

    let mut inputs = Vec::new();
    for row in csv_reader.deserialize::<EmployeeInput>() {
        inputs.push(row?);
    }
    Ok(inputs)
}

pub fn read_employees_from_path(path: &Path) -> Result<Vec<EmployeeInput>, ImportError> {
    let file = File::open(path).map_err(|e| ImportError::Io {
        source: e,
        context: format!("Failed to open employee sheet {:?}", path),
    })?;
    let inputs = read_employees(file)?;
    info!("Read {} employee rows from {:?}", inputs.len(), path);
    Ok(inputs)
}

//! Outcome export
//!
//! The serialized outcome records are the only contract with renderers.
//! JSON carries the full audit record; CSV flattens one row per athlete-day.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::engine::DailyOutcome;

pub mod csv;
pub mod json;

/// Export format types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl std::str::FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl ExportFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self, ExportError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        ext.parse()
    }
}

/// Export errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] ::csv::Error),
}

/// Write outcomes in the given format
pub fn export_outcomes<P: AsRef<Path>>(
    outcomes: &[DailyOutcome],
    format: ExportFormat,
    output_path: P,
) -> Result<(), ExportError> {
    match format {
        ExportFormat::Json => json::export_json(outcomes, output_path),
        ExportFormat::Csv => csv::export_outcomes_csv(outcomes, output_path),
    }
}

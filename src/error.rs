//! Unified error hierarchy for readyrs
//!
//! Two families live here. `ReadyError` covers conditions that stop the run for
//! one athlete: an intensity decision built on them could be wrong, so they are
//! returned as `Err`. `DataQualityIssue` covers recoverable problems with daily
//! inputs; those are handled where they occur and travel with the day's outcome
//! so renderers can show reduced confidence.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::MetricKind;

/// Top-level error type for all readyrs operations
#[derive(Debug, Error)]
pub enum ReadyError {
    /// Health gate result is internally inconsistent
    #[error("Gate evaluation conflict for {athlete_id} on {date}: {reason}")]
    GateEvaluationConflict {
        athlete_id: String,
        date: NaiveDate,
        reason: String,
    },

    /// Configuration errors (weights, thresholds, profiles)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Day submitted out of chronological order
    #[error("Chronology violation for {athlete_id}: {attempted} is before last processed day {last}")]
    Chronology {
        athlete_id: String,
        last: NaiveDate,
        attempted: NaiveDate,
    },

    /// Mutation attempted on a weekly intent that has already been closed
    #[error("Weekly intent for week of {week_start} is closed")]
    WeekClosed { week_start: NaiveDate },

    /// Calculation errors
    #[error("Calculation error: {0}")]
    Calculation(#[from] CalculationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Calculation errors
#[derive(Debug, Error)]
pub enum CalculationError {
    /// Insufficient data for calculation
    #[error("Insufficient data for {calculation}: {reason}")]
    InsufficientData { calculation: String, reason: String },

    /// Invalid parameter
    #[error("Invalid parameter for {calculation}: {parameter}={value}")]
    InvalidParameter {
        calculation: String,
        parameter: String,
        value: String,
    },
}

/// Result type alias for readyrs operations
pub type Result<T> = std::result::Result<T, ReadyError>;

impl ReadyError {
    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ReadyError::GateEvaluationConflict { .. } => ErrorSeverity::Critical,
            ReadyError::Internal(_) => ErrorSeverity::Critical,
            ReadyError::Chronology { .. } => ErrorSeverity::Error,
            ReadyError::Configuration(_) => ErrorSeverity::Error,
            ReadyError::WeekClosed { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            ReadyError::GateEvaluationConflict { athlete_id, date, .. } => format!(
                "Health gates for {} on {} could not be evaluated consistently. No recommendation was produced.",
                athlete_id, date
            ),
            ReadyError::Chronology { attempted, last, .. } => format!(
                "Days must be processed in order: {} comes before the last processed day {}.",
                attempted, last
            ),
            ReadyError::Calculation(CalculationError::InsufficientData { calculation, .. }) => {
                format!("Not enough history to calculate {}.", calculation)
            }
            _ => self.to_string(),
        }
    }
}

/// Recoverable data-quality issue raised while processing one day
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityIssue {
    /// Not enough history to normalize this metric
    #[error("Missing baseline for {metric}: {available} of {required} days")]
    MissingBaselineData {
        metric: MetricKind,
        available: usize,
        required: usize,
    },

    /// Input value rejected as implausible
    #[error("Invalid value for {metric}: {value} ({reason})")]
    InvalidMetricValue {
        metric: MetricKind,
        value: f64,
        reason: String,
    },

    /// Value carried forward from an earlier day
    #[error("Stale value for {metric} carried from {from}")]
    StaleValue { metric: MetricKind, from: NaiveDate },

    /// Blindspot tag without a known combination rule; resolved fail-closed
    #[error("Unrecognized blindspot tag '{tag}', applying most restrictive parameters")]
    BlindspotStackingAmbiguity { tag: String },

    /// Training stress rejected and treated as zero
    #[error("Invalid training stress {value} ({reason})")]
    InvalidTrainingStress { value: String, reason: String },
}

impl DataQualityIssue {
    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DataQualityIssue::StaleValue { .. } => ErrorSeverity::Info,
            DataQualityIssue::MissingBaselineData { .. } => ErrorSeverity::Info,
            DataQualityIssue::BlindspotStackingAmbiguity { .. } => ErrorSeverity::Error,
            _ => ErrorSeverity::Warning,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 23).unwrap()
    }

    #[test]
    fn test_error_severity() {
        let err = ReadyError::GateEvaluationConflict {
            athlete_id: "a1".to_string(),
            date: date(),
            reason: "overall flag disagrees with domains".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Critical);

        let err = ReadyError::WeekClosed { week_start: date() };
        assert_eq!(err.severity(), ErrorSeverity::Warning);
    }

    #[test]
    fn test_user_messages() {
        let err = ReadyError::Chronology {
            athlete_id: "a1".to_string(),
            last: date(),
            attempted: date().pred_opt().unwrap(),
        };
        assert!(err.user_message().contains("must be processed in order"));
    }

    #[test]
    fn test_data_quality_severity() {
        let issue = DataQualityIssue::InvalidMetricValue {
            metric: MetricKind::SleepHours,
            value: -1.0,
            reason: "negative".to_string(),
        };
        assert_eq!(issue.severity(), ErrorSeverity::Warning);
        assert_eq!(
            issue.severity().to_tracing_level(),
            tracing::Level::WARN
        );

        let issue = DataQualityIssue::BlindspotStackingAmbiguity {
            tag: "Mystery".to_string(),
        };
        assert_eq!(issue.severity(), ErrorSeverity::Error);
    }

    #[test]
    fn test_data_quality_serialization() {
        let issue = DataQualityIssue::MissingBaselineData {
            metric: MetricKind::Hrv,
            available: 2,
            required: 5,
        };
        let json = serde_json::to_string(&issue).unwrap();
        assert!(json.contains("missing_baseline_data"));
        let back: DataQualityIssue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, issue);
    }
}

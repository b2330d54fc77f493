// Library interface for readyrs modules
// This allows integration tests and benches to access the core functionality

pub mod alerts;
pub mod ans;
pub mod baseline;
pub mod blindspot;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod health_gates;
pub mod import;
pub mod logging;
pub mod models;
pub mod normalizer;
pub mod pmc;
pub mod readiness;
pub mod session;
pub mod weekly;

// Re-export commonly used types for convenience
pub use models::*;
pub use config::{AthleteProfile, EngineConfig};
pub use engine::{AthleteContext, DailyOutcome, DecisionEngine, ReplayResult};
pub use error::{DataQualityIssue, ReadyError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use pmc::{LoadLedger, LoadState, PmcCalculator};
pub use readiness::{ReadinessModel, TreeReadinessModel, WeightedReadinessModel};

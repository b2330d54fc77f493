use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::alerts::AlertConfig;
use crate::ans::AnsConfig;
use crate::baseline::BaselineConfig;
use crate::blindspot::{resolve_tags, EffectiveParameters, ParameterSet};
use crate::error::{DataQualityIssue, ReadyError};
use crate::health_gates::GateConfig;
use crate::logging::LogConfig;
use crate::models::TrainingPhase;
use crate::pmc::PmcConfig;
use crate::readiness::{FactorWeights, ReadinessConfig};
use crate::weekly::PlannerConfig;

/// Main engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Configuration metadata
    pub metadata: ConfigMetadata,

    /// Load accumulator settings
    #[serde(default)]
    pub pmc: PmcConfig,

    /// Rolling baseline windows
    #[serde(default)]
    pub baseline: BaselineConfig,

    /// ANS quadrant thresholds and modifiers
    #[serde(default)]
    pub ans: AnsConfig,

    /// Readiness strategy, weights and curves
    #[serde(default)]
    pub readiness: ReadinessConfig,

    /// Health gate limits
    #[serde(default)]
    pub gates: GateConfig,

    /// Weekly planner thresholds
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Alert thresholds
    #[serde(default)]
    pub alerts: AlertConfig,

    /// Logging output
    #[serde(default)]
    pub logging: LogConfig,

    /// Athlete profiles keyed by id
    #[serde(default)]
    pub athletes: BTreeMap<String, AthleteProfile>,

    /// Athlete used when none is named
    pub default_athlete_id: Option<String>,
}

/// Configuration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// Per-athlete profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AthleteProfile {
    /// Unique athlete identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Blindspot tags, e.g. "Masters Recovery" or "time_crunched"
    #[serde(default)]
    pub blindspots: Vec<String>,

    /// Manual parameter overrides by snake_case name, applied before stacking
    #[serde(default)]
    pub overrides: BTreeMap<String, f64>,

    /// Readiness weights replacing the engine defaults
    #[serde(default)]
    pub readiness_weights: Option<FactorWeights>,

    /// Current training phase
    #[serde(default)]
    pub phase: TrainingPhase,

    /// Hours available per week
    #[serde(default = "default_weekly_hours")]
    pub weekly_hours: f64,

    /// Individual fatigue decay constant in days; defaults to the ATL constant
    #[serde(default)]
    pub fatigue_time_constant: Option<f64>,
}

fn default_weekly_hours() -> f64 {
    10.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        let now = Utc::now();

        EngineConfig {
            metadata: ConfigMetadata {
                version: "1.0".to_string(),
                created_at: now,
                updated_at: now,
            },
            pmc: PmcConfig::default(),
            baseline: BaselineConfig::default(),
            ans: AnsConfig::default(),
            readiness: ReadinessConfig::default(),
            gates: GateConfig::default(),
            planner: PlannerConfig::default(),
            alerts: AlertConfig::default(),
            logging: LogConfig::default(),
            athletes: BTreeMap::new(),
            default_athlete_id: None,
        }
    }
}

/// Configuration management implementation
impl EngineConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: EngineConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".readyrs")
            .join("config.toml")
    }

    /// Load from the default path, falling back to defaults if it is missing
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path();
        if !config_path.exists() {
            tracing::info!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }
        Self::load_from_file(&config_path)
    }

    /// Check every section and profile
    pub fn validate(&self) -> std::result::Result<(), ReadyError> {
        self.pmc.validate()?;
        self.baseline.validate()?;
        self.ans.validate()?;
        self.readiness.validate()?;
        self.gates.validate()?;
        self.planner.validate()?;

        for (key, profile) in &self.athletes {
            if key != &profile.id {
                return Err(ReadyError::Configuration(format!(
                    "athlete table key {} does not match profile id {}",
                    key, profile.id
                )));
            }
            profile.validate()?;
        }
        if let Some(id) = &self.default_athlete_id {
            if !self.athletes.contains_key(id) {
                return Err(ReadyError::Configuration(format!(
                    "default athlete {} is not configured",
                    id
                )));
            }
        }
        Ok(())
    }

    /// Add a new athlete to the configuration
    pub fn add_athlete(&mut self, profile: AthleteProfile) -> Result<()> {
        profile.validate()?;
        let athlete_id = profile.id.clone();

        if self.athletes.is_empty() {
            self.default_athlete_id = Some(athlete_id.clone());
        }

        self.athletes.insert(athlete_id, profile);
        self.metadata.updated_at = Utc::now();

        Ok(())
    }

    /// Remove an athlete from the configuration
    pub fn remove_athlete(&mut self, athlete_id: &str) -> Result<()> {
        if self.athletes.remove(athlete_id).is_none() {
            return Err(anyhow::anyhow!("Athlete not found: {}", athlete_id));
        }

        if self.default_athlete_id.as_deref() == Some(athlete_id) {
            self.default_athlete_id = self.athletes.keys().next().cloned();
        }

        self.metadata.updated_at = Utc::now();
        Ok(())
    }

    /// Get athlete profile by ID
    pub fn get_athlete(&self, athlete_id: &str) -> Option<&AthleteProfile> {
        self.athletes.get(athlete_id)
    }

    /// Get the default athlete
    pub fn get_default_athlete(&self) -> Option<&AthleteProfile> {
        self.default_athlete_id
            .as_ref()
            .and_then(|id| self.athletes.get(id))
    }
}

impl AthleteProfile {
    /// Create a profile, generating an id when none is given
    pub fn new(name: String, athlete_id: Option<String>) -> Self {
        let id = athlete_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        AthleteProfile {
            id,
            name,
            blindspots: Vec::new(),
            overrides: BTreeMap::new(),
            readiness_weights: None,
            phase: TrainingPhase::default(),
            weekly_hours: default_weekly_hours(),
            fatigue_time_constant: None,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ReadyError> {
        if self.id.trim().is_empty() {
            return Err(ReadyError::Configuration(
                "athlete id must not be empty".to_string(),
            ));
        }
        if !self.weekly_hours.is_finite() || self.weekly_hours < 0.0 {
            return Err(ReadyError::Configuration(format!(
                "weekly_hours for {} must be non-negative, got {}",
                self.id, self.weekly_hours
            )));
        }
        if let Some(tau) = self.fatigue_time_constant {
            if !tau.is_finite() || tau <= 0.0 {
                return Err(ReadyError::Configuration(format!(
                    "fatigue_time_constant for {} must be positive, got {}",
                    self.id, tau
                )));
            }
        }
        if let Some(weights) = &self.readiness_weights {
            weights.validate()?;
        }
        self.base_parameters()?;
        Ok(())
    }

    /// Default parameter values with this athlete's overrides applied
    pub fn base_parameters(&self) -> std::result::Result<ParameterSet, ReadyError> {
        ParameterSet::with_overrides(&self.overrides)
    }

    /// Overrides plus stacked blindspots
    pub fn effective_parameters(
        &self,
    ) -> std::result::Result<(EffectiveParameters, Vec<DataQualityIssue>), ReadyError> {
        let base = self.base_parameters()?;
        Ok(resolve_tags(&self.blindspots, &base))
    }

    /// Fatigue constant used for key-session spacing
    pub fn fatigue_constant(&self, pmc: &PmcConfig) -> f64 {
        self.fatigue_time_constant
            .unwrap_or_else(|| f64::from(pmc.atl_time_constant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blindspot::{BlindspotKind, Parameter};
    use tempfile::tempdir;

    #[test]
    fn test_config_serialization() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: EngineConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
            default_athlete_id = "rider"

            [metadata]
            version = "1.0"
            created_at = "2024-01-01T00:00:00Z"
            updated_at = "2024-01-01T00:00:00Z"

            [athletes.rider]
            id = "rider"
            name = "Rider"
            blindspots = ["Masters Recovery"]
            phase = "build"

            [athletes.rider.overrides]
            key_session_threshold = 60.0
        "#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();

        let rider = config.get_default_athlete().unwrap();
        assert_eq!(rider.weekly_hours, 10.0);
        assert_eq!(rider.phase, TrainingPhase::Build);
        assert_eq!(rider.fatigue_constant(&config.pmc), 7.0);

        let (params, issues) = rider.effective_parameters().unwrap();
        assert!(issues.is_empty());
        assert!(params.has(BlindspotKind::MastersRecovery));
        assert_eq!(params.get(Parameter::KeySessionThreshold), 68.0);
    }

    #[test]
    fn test_validate_rejects_bad_profile() {
        let mut config = EngineConfig::default();
        let mut athlete = AthleteProfile::new("Test".to_string(), Some("a".to_string()));
        athlete.overrides.insert("not_a_parameter".to_string(), 1.0);
        assert!(config.add_athlete(athlete).is_err());

        let mut athlete = AthleteProfile::new("Test".to_string(), Some("b".to_string()));
        athlete.weekly_hours = -1.0;
        assert!(athlete.validate().is_err());

        config.default_athlete_id = Some("ghost".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_athlete_management() {
        let mut config = EngineConfig::default();
        let athlete = AthleteProfile::new("Test Athlete".to_string(), Some("test-id".to_string()));

        config.add_athlete(athlete).unwrap();
        assert_eq!(config.default_athlete_id, Some("test-id".to_string()));
        assert_eq!(config.get_athlete("test-id").unwrap().name, "Test Athlete");

        config.remove_athlete("test-id").unwrap();
        assert!(config.default_athlete_id.is_none());
        assert!(config.remove_athlete("test-id").is_err());
    }

    #[test]
    fn test_config_file_io() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original = EngineConfig::default();
        let mut athlete = AthleteProfile::new("Test Athlete".to_string(), None);
        athlete.blindspots.push("time_crunched".to_string());
        original.add_athlete(athlete).unwrap();

        original.save_to_file(&config_path).unwrap();
        let loaded = EngineConfig::load_from_file(&config_path).unwrap();

        assert_eq!(loaded.athletes.len(), 1);
        assert_eq!(loaded.athletes, original.athletes);
        assert!(loaded.default_athlete_id.is_some());
    }
}

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Daily metrics tracked by the baselines and normalizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Heart rate variability (RMSSD, ms)
    Hrv,
    /// Resting heart rate (bpm)
    RestingHr,
    /// Sleep duration last night (hours)
    SleepHours,
    /// Device recovery score (0-100)
    RecoveryScore,
    /// Standing minus lying heart rate (bpm)
    OrthostaticDelta,
    /// Subjective sleep quality (1-10, higher is better)
    SleepQuality,
    /// Subjective fatigue (1-10, higher is worse)
    Fatigue,
    /// Subjective life stress (1-10, higher is worse)
    LifeStress,
    /// Subjective soreness (1-10, higher is worse)
    Soreness,
    /// Subjective motivation (1-10, higher is better)
    Motivation,
}

impl MetricKind {
    /// Metrics that keep rolling baselines
    pub const BASELINED: [MetricKind; 5] = [
        MetricKind::Hrv,
        MetricKind::RestingHr,
        MetricKind::SleepHours,
        MetricKind::RecoveryScore,
        MetricKind::OrthostaticDelta,
    ];

    /// Subjective 1-10 ratings
    pub const SUBJECTIVE: [MetricKind; 5] = [
        MetricKind::SleepQuality,
        MetricKind::Fatigue,
        MetricKind::LifeStress,
        MetricKind::Soreness,
        MetricKind::Motivation,
    ];

    /// Physiologically plausible input range (inclusive)
    pub fn valid_range(&self) -> (f64, f64) {
        match self {
            MetricKind::Hrv => (10.0, 250.0),
            MetricKind::RestingHr => (25.0, 120.0),
            MetricKind::SleepHours => (0.0, 16.0),
            MetricKind::RecoveryScore => (0.0, 100.0),
            MetricKind::OrthostaticDelta => (-10.0, 80.0),
            _ => (1.0, 10.0),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::Hrv => "HRV",
            MetricKind::RestingHr => "Resting HR",
            MetricKind::SleepHours => "Sleep Hours",
            MetricKind::RecoveryScore => "Recovery Score",
            MetricKind::OrthostaticDelta => "Orthostatic Delta",
            MetricKind::SleepQuality => "Sleep Quality",
            MetricKind::Fatigue => "Fatigue",
            MetricKind::LifeStress => "Life Stress",
            MetricKind::Soreness => "Soreness",
            MetricKind::Motivation => "Motivation",
        };
        write!(f, "{}", name)
    }
}

/// Morning check-in ratings, each 1-10
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectiveRatings {
    pub sleep_quality: Option<u8>,
    pub fatigue: Option<u8>,
    pub life_stress: Option<u8>,
    pub soreness: Option<u8>,
    pub motivation: Option<u8>,
}

impl SubjectiveRatings {
    pub fn get(&self, metric: MetricKind) -> Option<u8> {
        match metric {
            MetricKind::SleepQuality => self.sleep_quality,
            MetricKind::Fatigue => self.fatigue,
            MetricKind::LifeStress => self.life_stress,
            MetricKind::Soreness => self.soreness,
            MetricKind::Motivation => self.motivation,
            _ => None,
        }
    }
}

/// Orthostatic heart rate test: lying still, then 60s after standing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrthostaticPair {
    pub lying_hr: f64,
    pub standing_hr: f64,
}

impl OrthostaticPair {
    /// Heart rate rise on standing (sympathetic response)
    pub fn delta(&self) -> f64 {
        self.standing_hr - self.lying_hr
    }
}

/// Body weight trend reported upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightTrend {
    #[default]
    Stable,
    Declining,
    DecliningFast,
}

/// Appetite reported at check-in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Appetite {
    #[default]
    Normal,
    Reduced,
    Poor,
}

/// Cognitive fatigue level reported at check-in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveFatigue {
    #[default]
    Low,
    Moderate,
    High,
}

/// Energy availability signals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergySignals {
    pub weight_trend: Option<WeightTrend>,
    pub appetite: Option<Appetite>,
}

/// Musculoskeletal signals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MusculoskeletalSignals {
    /// Free-text injury flags (e.g., "left knee pain"); any entry blocks intensity
    pub injury_signals: Vec<String>,
    pub soreness_asymmetry: bool,
}

/// One day's metric record, already normalized into units by upstream adapters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetricRecord {
    pub date: NaiveDate,
    pub hrv_ms: Option<f64>,
    pub resting_hr: Option<f64>,
    pub sleep_hours: Option<f64>,
    pub recovery_score: Option<f64>,
    #[serde(default)]
    pub subjective: SubjectiveRatings,
    pub orthostatic: Option<OrthostaticPair>,
    #[serde(default)]
    pub musculoskeletal: MusculoskeletalSignals,
    #[serde(default)]
    pub energy: EnergySignals,
    pub cognitive_fatigue: Option<CognitiveFatigue>,
}

impl DailyMetricRecord {
    /// Empty record for a date (every signal missing)
    pub fn new(date: NaiveDate) -> Self {
        DailyMetricRecord {
            date,
            hrv_ms: None,
            resting_hr: None,
            sleep_hours: None,
            recovery_score: None,
            subjective: SubjectiveRatings::default(),
            orthostatic: None,
            musculoskeletal: MusculoskeletalSignals::default(),
            energy: EnergySignals::default(),
            cognitive_fatigue: None,
        }
    }

    /// Raw value of a baselined or subjective metric
    pub fn value(&self, metric: MetricKind) -> Option<f64> {
        match metric {
            MetricKind::Hrv => self.hrv_ms,
            MetricKind::RestingHr => self.resting_hr,
            MetricKind::SleepHours => self.sleep_hours,
            MetricKind::RecoveryScore => self.recovery_score,
            MetricKind::OrthostaticDelta => self.orthostatic.map(|o| o.delta()),
            other => self.subjective.get(other).map(f64::from),
        }
    }
}

/// Session class produced by the daily gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionClass {
    /// High-intensity session, rationed per week
    Key,
    /// Volume without intensity stress
    Support,
    /// Active recovery or rest
    Recovery,
}

impl fmt::Display for SessionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionClass::Key => write!(f, "Key"),
            SessionClass::Support => write!(f, "Support"),
            SessionClass::Recovery => write!(f, "Recovery"),
        }
    }
}

impl std::str::FromStr for SessionClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "key" => Ok(SessionClass::Key),
            "support" => Ok(SessionClass::Support),
            "recovery" | "rest" => Ok(SessionClass::Recovery),
            _ => Err(format!("Invalid session class: {}", s)),
        }
    }
}

/// Training phase of the athlete's season
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingPhase {
    #[default]
    Base,
    Build,
    Peak,
    Taper,
    Recovery,
}

impl TrainingPhase {
    /// Upper bound on weekly key sessions for the phase
    pub fn key_session_limit(&self) -> u8 {
        match self {
            TrainingPhase::Base => 2,
            TrainingPhase::Build => 3,
            TrainingPhase::Peak => 2,
            TrainingPhase::Taper => 1,
            TrainingPhase::Recovery => 0,
        }
    }

    /// Multiplier applied to available hours when sizing weekly volume
    pub fn volume_bias(&self) -> f64 {
        match self {
            TrainingPhase::Base => 1.1,
            TrainingPhase::Build => 1.0,
            TrainingPhase::Peak => 0.9,
            TrainingPhase::Taper => 0.6,
            TrainingPhase::Recovery => 0.5,
        }
    }
}

impl std::str::FromStr for TrainingPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "base" => Ok(TrainingPhase::Base),
            "build" => Ok(TrainingPhase::Build),
            "peak" => Ok(TrainingPhase::Peak),
            "taper" => Ok(TrainingPhase::Taper),
            "recovery" => Ok(TrainingPhase::Recovery),
            _ => Err(format!("Invalid training phase: {}", s)),
        }
    }
}

/// Everything supplied by upstream collaborators for one athlete-day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyInput {
    pub date: NaiveDate,
    /// Total training stress for the day (0 for rest days)
    pub training_stress: Decimal,
    pub metrics: DailyMetricRecord,
    /// Session the athlete actually completed that day, if reported
    pub completed_session: Option<SessionClass>,
}

impl DailyInput {
    /// Rest day with no metrics
    pub fn rest_day(date: NaiveDate) -> Self {
        DailyInput {
            date,
            training_stress: Decimal::ZERO,
            metrics: DailyMetricRecord::new(date),
            completed_session: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orthostatic_delta() {
        let pair = OrthostaticPair {
            lying_hr: 52.0,
            standing_hr: 68.0,
        };
        assert_eq!(pair.delta(), 16.0);
    }

    #[test]
    fn test_record_value_lookup() {
        let mut record = DailyMetricRecord::new(NaiveDate::from_ymd_opt(2024, 9, 23).unwrap());
        record.hrv_ms = Some(55.0);
        record.subjective.soreness = Some(4);
        record.orthostatic = Some(OrthostaticPair {
            lying_hr: 50.0,
            standing_hr: 70.0,
        });

        assert_eq!(record.value(MetricKind::Hrv), Some(55.0));
        assert_eq!(record.value(MetricKind::Soreness), Some(4.0));
        assert_eq!(record.value(MetricKind::OrthostaticDelta), Some(20.0));
        assert_eq!(record.value(MetricKind::RestingHr), None);
    }

    #[test]
    fn test_session_class_parsing() {
        assert_eq!("key".parse::<SessionClass>().unwrap(), SessionClass::Key);
        assert_eq!("Rest".parse::<SessionClass>().unwrap(), SessionClass::Recovery);
        assert!("tempo".parse::<SessionClass>().is_err());
    }

    #[test]
    fn test_phase_limits() {
        assert_eq!(TrainingPhase::Build.key_session_limit(), 3);
        assert_eq!(TrainingPhase::Recovery.key_session_limit(), 0);
        assert_eq!("taper".parse::<TrainingPhase>().unwrap(), TrainingPhase::Taper);
    }
}

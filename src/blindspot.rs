//! Blindspot rule engine
//!
//! Athlete blindspots tighten coaching parameters. Every parameter carries an
//! explicit conservative rule, and the effective value is an element-wise
//! aggregate over the active set, so stacking is commutative and idempotent.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::{DataQualityIssue, ReadyError};

/// Known athlete blindspots
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BlindspotKind {
    MovementQualityGap,
    InjuryManagement,
    OvertrainingRisk,
    AlcoholRecoveryImpact,
    WeightManagementStress,
    CaffeineDependency,
    RecoveryDeficit,
    LifeStressOverload,
    TimeCrunched,
    MastersRecovery,
    ExtendedRecoveryNeeds,
    SleepDisorder,
}

/// Situations a coaching prompt applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptContext {
    Daily,
    Checkin,
    PreRide,
    PostRide,
    Weekly,
    Recovery,
}

impl FromStr for PromptContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "daily" => Ok(PromptContext::Daily),
            "checkin" | "check_in" => Ok(PromptContext::Checkin),
            "pre_ride" => Ok(PromptContext::PreRide),
            "post_ride" => Ok(PromptContext::PostRide),
            "weekly" => Ok(PromptContext::Weekly),
            "recovery" => Ok(PromptContext::Recovery),
            _ => Err(format!("Invalid prompt context: {}", s)),
        }
    }
}

impl BlindspotKind {
    pub const ALL: [BlindspotKind; 12] = [
        BlindspotKind::MovementQualityGap,
        BlindspotKind::InjuryManagement,
        BlindspotKind::OvertrainingRisk,
        BlindspotKind::AlcoholRecoveryImpact,
        BlindspotKind::WeightManagementStress,
        BlindspotKind::CaffeineDependency,
        BlindspotKind::RecoveryDeficit,
        BlindspotKind::LifeStressOverload,
        BlindspotKind::TimeCrunched,
        BlindspotKind::MastersRecovery,
        BlindspotKind::ExtendedRecoveryNeeds,
        BlindspotKind::SleepDisorder,
    ];

    /// Human-readable label as written in athlete profiles
    pub fn label(&self) -> &'static str {
        match self {
            BlindspotKind::MovementQualityGap => "Movement Quality Gap",
            BlindspotKind::InjuryManagement => "Injury Management",
            BlindspotKind::OvertrainingRisk => "Overtraining Risk",
            BlindspotKind::AlcoholRecoveryImpact => "Alcohol Recovery Impact",
            BlindspotKind::WeightManagementStress => "Weight Management Stress",
            BlindspotKind::CaffeineDependency => "Caffeine Dependency",
            BlindspotKind::RecoveryDeficit => "Recovery Deficit",
            BlindspotKind::LifeStressOverload => "Life Stress Overload",
            BlindspotKind::TimeCrunched => "Time-Crunched",
            BlindspotKind::MastersRecovery => "Masters Recovery",
            BlindspotKind::ExtendedRecoveryNeeds => "Extended Recovery Needs",
            BlindspotKind::SleepDisorder => "Sleep Disorder",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BlindspotKind::MovementQualityGap => "No consistent strength training",
            BlindspotKind::InjuryManagement => "Active injury requiring management",
            BlindspotKind::OvertrainingRisk => "History of overtraining episodes",
            BlindspotKind::AlcoholRecoveryImpact => "Alcohol affects recovery quality",
            BlindspotKind::WeightManagementStress => {
                "Chronic dieting or weight concerns affect performance"
            }
            BlindspotKind::CaffeineDependency => "Regular caffeine use shifts resting HR",
            BlindspotKind::RecoveryDeficit => "Chronic poor sleep or recovery",
            BlindspotKind::LifeStressOverload => "High external stress load",
            BlindspotKind::TimeCrunched => "Limited training time available",
            BlindspotKind::MastersRecovery => "Age 45+ requires extended recovery",
            BlindspotKind::ExtendedRecoveryNeeds => "Age 55+ requires significant recovery time",
            BlindspotKind::SleepDisorder => "Chronic sleep issues or medication",
        }
    }

    /// Parameter adjustments contributed by this blindspot
    pub fn adjustments(&self) -> Vec<Adjustment> {
        use Parameter::*;
        let list: &[(Parameter, f64)] = match self {
            BlindspotKind::MovementQualityGap => &[(MusculoskeletalGateWeight, 1.2)],
            BlindspotKind::InjuryManagement => {
                &[(MusculoskeletalGateWeight, 1.5), (MaxWeeklyHours, 14.0)]
            }
            BlindspotKind::OvertrainingRisk => &[
                (KeySessionThreshold, 70.0),
                (RampRateCeiling, 5.0),
                (TsbFloor, -20.0),
                (MinRestDaysPerWeek, 2.0),
                (FreshnessWeightMultiplier, 1.25),
            ],
            BlindspotKind::AlcoholRecoveryImpact => &[(SleepGateWeight, 1.3)],
            BlindspotKind::WeightManagementStress => &[
                (FastedRideCapMinutes, 60.0),
                (StressGateWeight, 1.2),
                (EnergyGateWeight, 1.2),
            ],
            BlindspotKind::CaffeineDependency => {
                &[(RhrBaselineOffset, 4.0), (SleepGateWeight, 1.2)]
            }
            BlindspotKind::RecoveryDeficit => &[
                (KeySessionThreshold, 70.0),
                (SleepGateWeight, 1.5),
                (SleepWeightMultiplier, 1.25),
            ],
            BlindspotKind::LifeStressOverload => &[
                (KeySessionThreshold, 70.0),
                (StressGateWeight, 1.5),
                (RampRateCeiling, 5.0),
            ],
            BlindspotKind::TimeCrunched => &[(MaxWeeklyHours, 8.0)],
            BlindspotKind::MastersRecovery => &[
                (MinRestDaysPerWeek, 2.0),
                (KeySessionThreshold, 68.0),
                (RampRateCeiling, 5.0),
            ],
            BlindspotKind::ExtendedRecoveryNeeds => &[
                (MinRestDaysPerWeek, 2.0),
                (KeySessionThreshold, 72.0),
                (RampRateCeiling, 4.0),
            ],
            BlindspotKind::SleepDisorder => {
                &[(SleepGateWeight, 2.0), (KeySessionThreshold, 70.0)]
            }
        };
        list.iter()
            .map(|(parameter, value)| Adjustment {
                parameter: *parameter,
                value: *value,
            })
            .collect()
    }

    /// Context-specific coaching prompts
    pub fn prompts(&self) -> &'static [(PromptContext, &'static str)] {
        use PromptContext::*;
        match self {
            BlindspotKind::MovementQualityGap => &[
                (Daily, "Include 10-15min mobility/strength work today"),
                (Weekly, "Schedule 2 dedicated strength sessions this week"),
            ],
            BlindspotKind::InjuryManagement => &[
                (PreRide, "Hip flexor mobility check before riding"),
                (PostRide, "Targeted hip/QL stretching protocol"),
            ],
            BlindspotKind::OvertrainingRisk => &[
                (Daily, "Listen to fatigue signals. You have OT history."),
                (Recovery, "Full recovery is non-negotiable with your history"),
            ],
            BlindspotKind::AlcoholRecoveryImpact => &[
                (Checkin, "Any alcohol last night? It affects HRV interpretation"),
                (Weekly, "Each drink costs about 1hr of quality recovery"),
            ],
            BlindspotKind::WeightManagementStress => &[
                (PreRide, "Eat before rides over 90min. No fasted long rides."),
                (Daily, "Fuel the work. Performance over the scale."),
            ],
            BlindspotKind::CaffeineDependency => &[
                (Daily, "Caffeine cutoff: noon. Affects sleep quality."),
            ],
            BlindspotKind::RecoveryDeficit => &[
                (Daily, "Sleep is your #1 performance enhancer"),
            ],
            BlindspotKind::LifeStressOverload => &[
                (Daily, "Training should be a stress outlet, not another source"),
            ],
            BlindspotKind::TimeCrunched => &[
                (Daily, "Quality over quantity. Make every minute count."),
                (Weekly, "2 key sessions plus endurance."),
            ],
            BlindspotKind::MastersRecovery => &[
                (Daily, "Recovery takes longer. Respect the process."),
                (Recovery, "48-72hrs before next intensity"),
            ],
            BlindspotKind::ExtendedRecoveryNeeds => &[
                (Daily, "One hard day, two easy days."),
                (Weekly, "Max 2 intensity sessions per week"),
            ],
            BlindspotKind::SleepDisorder => &[
                (Daily, "Sleep quality gates everything. Prioritize it."),
                (Checkin, "How was sleep? This is critical for you."),
            ],
        }
    }
}

impl fmt::Display for BlindspotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl FromStr for BlindspotKind {
    type Err = String;

    /// Accepts the profile label, snake_case or CamelCase spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = squash(s);
        BlindspotKind::ALL
            .iter()
            .find(|kind| squash(kind.label()) == wanted)
            .copied()
            .ok_or_else(|| format!("Unknown blindspot: {}", s))
    }
}

/// How stacked values combine toward the conservative side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConservativeRule {
    /// Larger is stricter
    Max,
    /// Smaller is stricter
    Min,
    /// Multipliers compound
    Product,
    /// Smallest value among kinds that set it replaces the base
    MinOverSetters,
}

/// Tunable coaching parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    KeySessionThreshold,
    SupportThreshold,
    TsbFloor,
    MinRestDaysPerWeek,
    RampRateCeiling,
    MaxWeeklyHours,
    FastedRideCapMinutes,
    SleepGateWeight,
    EnergyGateWeight,
    AutonomicGateWeight,
    MusculoskeletalGateWeight,
    StressGateWeight,
    HrvWeightMultiplier,
    SleepWeightMultiplier,
    RecoveryWeightMultiplier,
    FreshnessWeightMultiplier,
    RestingHrWeightMultiplier,
    RhrBaselineOffset,
}

impl Parameter {
    pub const ALL: [Parameter; 18] = [
        Parameter::KeySessionThreshold,
        Parameter::SupportThreshold,
        Parameter::TsbFloor,
        Parameter::MinRestDaysPerWeek,
        Parameter::RampRateCeiling,
        Parameter::MaxWeeklyHours,
        Parameter::FastedRideCapMinutes,
        Parameter::SleepGateWeight,
        Parameter::EnergyGateWeight,
        Parameter::AutonomicGateWeight,
        Parameter::MusculoskeletalGateWeight,
        Parameter::StressGateWeight,
        Parameter::HrvWeightMultiplier,
        Parameter::SleepWeightMultiplier,
        Parameter::RecoveryWeightMultiplier,
        Parameter::FreshnessWeightMultiplier,
        Parameter::RestingHrWeightMultiplier,
        Parameter::RhrBaselineOffset,
    ];

    pub fn rule(&self) -> ConservativeRule {
        match self {
            Parameter::KeySessionThreshold
            | Parameter::SupportThreshold
            | Parameter::TsbFloor
            | Parameter::MinRestDaysPerWeek => ConservativeRule::Max,
            Parameter::RampRateCeiling
            | Parameter::MaxWeeklyHours
            | Parameter::FastedRideCapMinutes => ConservativeRule::Min,
            Parameter::RhrBaselineOffset => ConservativeRule::MinOverSetters,
            _ => ConservativeRule::Product,
        }
    }

    /// Readiness reweighting and baseline calibration. These shift the
    /// score in either direction and are not restrictions.
    pub fn is_calibration(&self) -> bool {
        matches!(
            self,
            Parameter::HrvWeightMultiplier
                | Parameter::SleepWeightMultiplier
                | Parameter::RecoveryWeightMultiplier
                | Parameter::FreshnessWeightMultiplier
                | Parameter::RestingHrWeightMultiplier
                | Parameter::RhrBaselineOffset
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Parameter::KeySessionThreshold => "key_session_threshold",
            Parameter::SupportThreshold => "support_threshold",
            Parameter::TsbFloor => "tsb_floor",
            Parameter::MinRestDaysPerWeek => "min_rest_days_per_week",
            Parameter::RampRateCeiling => "ramp_rate_ceiling",
            Parameter::MaxWeeklyHours => "max_weekly_hours",
            Parameter::FastedRideCapMinutes => "fasted_ride_cap_minutes",
            Parameter::SleepGateWeight => "sleep_gate_weight",
            Parameter::EnergyGateWeight => "energy_gate_weight",
            Parameter::AutonomicGateWeight => "autonomic_gate_weight",
            Parameter::MusculoskeletalGateWeight => "musculoskeletal_gate_weight",
            Parameter::StressGateWeight => "stress_gate_weight",
            Parameter::HrvWeightMultiplier => "hrv_weight_multiplier",
            Parameter::SleepWeightMultiplier => "sleep_weight_multiplier",
            Parameter::RecoveryWeightMultiplier => "recovery_weight_multiplier",
            Parameter::FreshnessWeightMultiplier => "freshness_weight_multiplier",
            Parameter::RestingHrWeightMultiplier => "resting_hr_weight_multiplier",
            Parameter::RhrBaselineOffset => "rhr_baseline_offset",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Parameter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Parameter::ALL
            .iter()
            .find(|p| p.name() == wanted)
            .copied()
            .ok_or_else(|| format!("Unknown parameter: {}", s))
    }
}

/// One parameter change contributed by a blindspot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub parameter: Parameter,
    pub value: f64,
}

/// Full coaching parameter set, keyed by parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    values: BTreeMap<Parameter, f64>,
}

impl Default for ParameterSet {
    fn default() -> Self {
        let values = Parameter::ALL
            .iter()
            .map(|p| {
                let value = match p {
                    Parameter::KeySessionThreshold => 65.0,
                    Parameter::SupportThreshold => 40.0,
                    Parameter::TsbFloor => -30.0,
                    Parameter::MinRestDaysPerWeek => 1.0,
                    Parameter::RampRateCeiling => 7.0,
                    Parameter::MaxWeeklyHours => 20.0,
                    Parameter::FastedRideCapMinutes => 90.0,
                    Parameter::RhrBaselineOffset => 0.0,
                    _ => 1.0,
                };
                (*p, value)
            })
            .collect();
        ParameterSet { values }
    }
}

impl ParameterSet {
    pub fn get(&self, parameter: Parameter) -> f64 {
        self.values.get(&parameter).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, parameter: Parameter, value: f64) {
        self.values.insert(parameter, value);
    }

    /// Defaults with manual profile overrides applied
    pub fn with_overrides(overrides: &BTreeMap<String, f64>) -> Result<Self, ReadyError> {
        let mut set = ParameterSet::default();
        for (name, value) in overrides {
            let parameter: Parameter = name.parse().map_err(ReadyError::Configuration)?;
            if !value.is_finite() {
                return Err(ReadyError::Configuration(format!(
                    "override {} must be finite",
                    name
                )));
            }
            if parameter.rule() == ConservativeRule::Product && *value <= 0.0 {
                return Err(ReadyError::Configuration(format!(
                    "override {} must be positive, got {}",
                    name, value
                )));
            }
            set.set(parameter, *value);
        }
        Ok(set)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Parameter, &f64)> {
        self.values.iter()
    }
}

/// Parameter set after blindspot stacking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveParameters {
    pub values: ParameterSet,
    pub active: BTreeSet<BlindspotKind>,
    /// True if an unrecognized tag forced the most restrictive set
    pub failed_closed: bool,
}

impl Default for EffectiveParameters {
    fn default() -> Self {
        resolve_kinds(&BTreeSet::new(), &ParameterSet::default())
    }
}

impl EffectiveParameters {
    pub fn get(&self, parameter: Parameter) -> f64 {
        self.values.get(parameter)
    }

    pub fn key_session_threshold(&self) -> f64 {
        self.get(Parameter::KeySessionThreshold)
    }

    pub fn support_threshold(&self) -> f64 {
        self.get(Parameter::SupportThreshold)
    }

    pub fn has(&self, kind: BlindspotKind) -> bool {
        self.active.contains(&kind)
    }

    /// Prompts from every active blindspot for the given context
    pub fn prompts(&self, context: PromptContext) -> Vec<&'static str> {
        self.active
            .iter()
            .flat_map(|kind| kind.prompts().iter())
            .filter(|(ctx, _)| *ctx == context)
            .map(|(_, text)| *text)
            .collect()
    }
}

/// Stack a set of blindspots over base values
pub fn resolve_kinds(active: &BTreeSet<BlindspotKind>, base: &ParameterSet) -> EffectiveParameters {
    let mut contributions: BTreeMap<Parameter, Vec<f64>> = BTreeMap::new();
    for kind in active {
        for adjustment in kind.adjustments() {
            contributions
                .entry(adjustment.parameter)
                .or_default()
                .push(adjustment.value);
        }
    }

    let mut values = base.clone();
    for (parameter, adjusted) in contributions {
        let base_value = base.get(parameter);
        let resolved = match parameter.rule() {
            ConservativeRule::Max => adjusted.iter().fold(base_value, |acc, v| acc.max(*v)),
            ConservativeRule::Min => adjusted.iter().fold(base_value, |acc, v| acc.min(*v)),
            ConservativeRule::Product => adjusted.iter().fold(base_value, |acc, v| acc * v),
            ConservativeRule::MinOverSetters => adjusted
                .iter()
                .copied()
                .fold(f64::INFINITY, f64::min),
        };
        values.set(parameter, resolved);
    }

    EffectiveParameters {
        values,
        active: active.clone(),
        failed_closed: false,
    }
}

/// Parse profile tags and stack them. Unknown tags fail closed.
pub fn resolve_tags(
    tags: &[String],
    base: &ParameterSet,
) -> (EffectiveParameters, Vec<DataQualityIssue>) {
    let mut active = BTreeSet::new();
    let mut issues = Vec::new();

    for tag in tags {
        match tag.parse::<BlindspotKind>() {
            Ok(kind) => {
                active.insert(kind);
            }
            Err(_) => {
                warn!(tag = %tag, "unrecognized blindspot tag, applying most restrictive set");
                issues.push(DataQualityIssue::BlindspotStackingAmbiguity { tag: tag.clone() });
            }
        }
    }

    if issues.is_empty() {
        return (resolve_kinds(&active, base), issues);
    }

    let all: BTreeSet<BlindspotKind> = BlindspotKind::ALL.iter().copied().collect();
    let mut params = resolve_kinds(&all, base);
    // A positive RHR offset would relax the autonomic check
    for parameter in Parameter::ALL.iter().filter(|p| p.is_calibration()) {
        let base_value = base.get(*parameter);
        let value = match parameter {
            Parameter::RhrBaselineOffset => base_value.min(0.0),
            _ => base_value,
        };
        params.values.set(*parameter, value);
    }
    params.failed_closed = true;
    (params, issues)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(list: &[BlindspotKind]) -> BTreeSet<BlindspotKind> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_no_blindspots_keeps_defaults() {
        let params = EffectiveParameters::default();
        assert_eq!(params.key_session_threshold(), 65.0);
        assert_eq!(params.support_threshold(), 40.0);
        assert_eq!(params.get(Parameter::RampRateCeiling), 7.0);
        assert_eq!(params.get(Parameter::SleepGateWeight), 1.0);
        assert!(!params.failed_closed);
    }

    #[test]
    fn test_most_conservative_threshold_wins() {
        let params = resolve_kinds(
            &kinds(&[BlindspotKind::MastersRecovery, BlindspotKind::ExtendedRecoveryNeeds]),
            &ParameterSet::default(),
        );
        assert_eq!(params.key_session_threshold(), 72.0);
        assert_eq!(params.get(Parameter::RampRateCeiling), 4.0);
        assert_eq!(params.get(Parameter::MinRestDaysPerWeek), 2.0);
    }

    #[test]
    fn test_gate_weights_multiply() {
        let params = resolve_kinds(
            &kinds(&[BlindspotKind::RecoveryDeficit, BlindspotKind::SleepDisorder]),
            &ParameterSet::default(),
        );
        assert!((params.get(Parameter::SleepGateWeight) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_order_and_duplicates_do_not_matter() {
        let base = ParameterSet::default();
        let a = resolve_tags(
            &["Overtraining Risk".to_string(), "Time-Crunched".to_string()],
            &base,
        )
        .0;
        let b = resolve_tags(
            &[
                "time_crunched".to_string(),
                "OvertrainingRisk".to_string(),
                "overtraining risk".to_string(),
            ],
            &base,
        )
        .0;
        assert_eq!(a, b);
    }

    #[test]
    fn test_unknown_tag_fails_closed() {
        let (params, issues) = resolve_tags(
            &["Caffeine Dependency".to_string(), "Mystery".to_string()],
            &ParameterSet::default(),
        );
        assert!(params.failed_closed);
        assert_eq!(params.active.len(), 12);
        assert_eq!(params.key_session_threshold(), 72.0);
        assert_eq!(params.get(Parameter::MaxWeeklyHours), 8.0);
        assert_eq!(issues.len(), 1);

        // calibration stays at base, never the caffeine offset
        assert_eq!(params.get(Parameter::RhrBaselineOffset), 0.0);
        assert_eq!(params.get(Parameter::FreshnessWeightMultiplier), 1.0);
        assert_eq!(params.get(Parameter::SleepWeightMultiplier), 1.0);
        assert!((params.get(Parameter::SleepGateWeight) - 2.0 * 1.5 * 1.3 * 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_tag_clamps_positive_rhr_offset() {
        let mut overrides = BTreeMap::new();
        overrides.insert("rhr_baseline_offset".to_string(), 3.0);
        let base = ParameterSet::with_overrides(&overrides).unwrap();
        let (params, _) = resolve_tags(&["Mystery".to_string()], &base);
        assert_eq!(params.get(Parameter::RhrBaselineOffset), 0.0);

        overrides.insert("rhr_baseline_offset".to_string(), -2.0);
        let base = ParameterSet::with_overrides(&overrides).unwrap();
        let (params, _) = resolve_tags(&["Mystery".to_string()], &base);
        assert_eq!(params.get(Parameter::RhrBaselineOffset), -2.0);
    }

    #[test]
    fn test_unknown_tag_never_loosens_autonomic_gate() {
        use crate::health_gates::{GateConfig, GateDomain, HealthGateEvaluator};
        use crate::models::{DailyMetricRecord, MetricKind};
        use crate::normalizer::{NormalizedMetric, NormalizedSignals, SignalSource};
        use chrono::NaiveDate;

        let date = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        let metric = |raw: f64, ratio: f64| NormalizedMetric {
            raw,
            ratio_to_baseline: Some(ratio),
            z_score: None,
            acute_mean: None,
            stale: false,
            source: SignalSource::Measured,
        };
        let mut metrics = BTreeMap::new();
        metrics.insert(MetricKind::Hrv, metric(60.0, 1.0));
        metrics.insert(MetricKind::RestingHr, metric(56.0, 1.12));
        let signals = NormalizedSignals {
            date,
            metrics,
            recent_sleep: Vec::new(),
            issues: Vec::new(),
        };
        let record = DailyMetricRecord::new(date);
        let gates = HealthGateEvaluator::new(GateConfig::default());
        let base = ParameterSet::default();

        let plain = gates.evaluate(&record, &signals, &resolve_tags(&[], &base).0);
        let (fail_closed, _) = resolve_tags(&["Mystery".to_string()], &base);
        let closed = gates.evaluate(&record, &signals, &fail_closed);

        let autonomic = |r: &crate::health_gates::HealthGateResult| {
            r.domain(GateDomain::Autonomic).map(|d| d.pass)
        };
        assert_eq!(autonomic(&plain), Some(false));
        assert_eq!(autonomic(&closed), Some(false));
        assert!(!closed.overall_pass);
    }

    #[test]
    fn test_rhr_offset_only_from_setters() {
        let params = resolve_kinds(
            &kinds(&[BlindspotKind::CaffeineDependency]),
            &ParameterSet::default(),
        );
        assert_eq!(params.get(Parameter::RhrBaselineOffset), 4.0);

        let params = resolve_kinds(
            &kinds(&[BlindspotKind::TimeCrunched]),
            &ParameterSet::default(),
        );
        assert_eq!(params.get(Parameter::RhrBaselineOffset), 0.0);
    }

    #[test]
    fn test_overrides_replace_base_before_stacking() {
        let mut overrides = BTreeMap::new();
        overrides.insert("key_session_threshold".to_string(), 75.0);
        overrides.insert("max_weekly_hours".to_string(), 12.0);
        let base = ParameterSet::with_overrides(&overrides).unwrap();

        let params = resolve_kinds(&kinds(&[BlindspotKind::OvertrainingRisk]), &base);
        assert_eq!(params.key_session_threshold(), 75.0);
        assert_eq!(params.get(Parameter::MaxWeeklyHours), 12.0);

        overrides.insert("made_up".to_string(), 1.0);
        assert!(ParameterSet::with_overrides(&overrides).is_err());
    }

    #[test]
    fn test_prompts_by_context() {
        let params = resolve_kinds(
            &kinds(&[BlindspotKind::InjuryManagement, BlindspotKind::SleepDisorder]),
            &ParameterSet::default(),
        );
        assert_eq!(
            params.prompts(PromptContext::PreRide),
            vec!["Hip flexor mobility check before riding"]
        );
        assert_eq!(params.prompts(PromptContext::Daily).len(), 1);
    }

    #[test]
    fn test_label_round_trip() {
        for kind in BlindspotKind::ALL {
            assert_eq!(kind.label().parse::<BlindspotKind>().unwrap(), kind);
        }
    }
}

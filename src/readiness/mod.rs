//! Readiness scoring
//!
//! A readiness model turns the day's normalized signals, ANS state and
//! morning load into a 0-100 score with a per-factor breakdown. Models are
//! pluggable through [`ReadinessModel`]; the weighted sum is the default and a
//! learned regression tree is the alternate.
//!
//! Factor sub-scores are shared by every model and follow piecewise curves:
//!
//! | Factor | 100 when | Falls off |
//! |---|---|---|
//! | HRV | at or above baseline | 2 points per % down to 70 %, then steeply |
//! | Sleep | at or above target | steeper below 87.5 % and 75 % of target |
//! | Recovery | at or above baseline | in 20 % bands of baseline |
//! | Freshness | TSB in the optimal band | linearly to 0 at -30, to 70 at +30 |
//! | Resting HR | at or below baseline | in 5 % elevation bands |

pub mod tree;
pub mod weighted;

pub use tree::{FeelSample, TreeConfig, TreeReadinessModel};
pub use weighted::WeightedReadinessModel;

use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ans::{AnsClassification, AnsState, Confidence};
use crate::blindspot::{EffectiveParameters, Parameter};
use crate::error::ReadyError;
use crate::models::MetricKind;
use crate::normalizer::NormalizedSignals;
use crate::pmc::LoadState;

/// Readiness factors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    Hrv,
    Sleep,
    Recovery,
    Freshness,
    RestingHr,
}

impl Factor {
    pub const ALL: [Factor; 5] = [
        Factor::Hrv,
        Factor::Sleep,
        Factor::Recovery,
        Factor::Freshness,
        Factor::RestingHr,
    ];

    /// Blindspot multiplier applied to this factor's weight
    pub fn multiplier_parameter(&self) -> Parameter {
        match self {
            Factor::Hrv => Parameter::HrvWeightMultiplier,
            Factor::Sleep => Parameter::SleepWeightMultiplier,
            Factor::Recovery => Parameter::RecoveryWeightMultiplier,
            Factor::Freshness => Parameter::FreshnessWeightMultiplier,
            Factor::RestingHr => Parameter::RestingHrWeightMultiplier,
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Factor::Hrv => "HRV",
            Factor::Sleep => "Sleep",
            Factor::Recovery => "Recovery",
            Factor::Freshness => "Freshness (TSB)",
            Factor::RestingHr => "Resting HR",
        };
        write!(f, "{}", name)
    }
}

/// Relative factor weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorWeights {
    pub hrv: f64,
    pub sleep: f64,
    pub recovery: f64,
    pub freshness: f64,
    pub resting_hr: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        FactorWeights {
            hrv: 0.25,
            sleep: 0.20,
            recovery: 0.20,
            freshness: 0.20,
            resting_hr: 0.15,
        }
    }
}

impl FactorWeights {
    pub fn get(&self, factor: Factor) -> f64 {
        match factor {
            Factor::Hrv => self.hrv,
            Factor::Sleep => self.sleep,
            Factor::Recovery => self.recovery,
            Factor::Freshness => self.freshness,
            Factor::RestingHr => self.resting_hr,
        }
    }

    /// Weight after blindspot multipliers
    pub fn effective(&self, factor: Factor, params: &EffectiveParameters) -> f64 {
        self.get(factor) * params.get(factor.multiplier_parameter())
    }

    pub fn validate(&self) -> Result<(), ReadyError> {
        let mut total = 0.0;
        for factor in Factor::ALL {
            let weight = self.get(factor);
            if !weight.is_finite() || weight < 0.0 {
                return Err(ReadyError::Configuration(format!(
                    "readiness weight for {} must be non-negative, got {}",
                    factor, weight
                )));
            }
            total += weight;
        }
        if total <= 0.0 {
            return Err(ReadyError::Configuration(
                "readiness weights must not all be zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// TSB band used by the freshness factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsbBand {
    pub optimal_min: f64,
    pub optimal_max: f64,
    pub worst_low: f64,
    pub worst_high: f64,
}

impl Default for TsbBand {
    fn default() -> Self {
        TsbBand {
            optimal_min: -5.0,
            optimal_max: 15.0,
            worst_low: -30.0,
            worst_high: 30.0,
        }
    }
}

/// Readiness scorer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessConfig {
    pub strategy: ReadinessStrategy,
    pub weights: FactorWeights,
    pub sleep_target_hours: f64,
    /// Weekly debt above this trims the sleep sub-score by 10 %
    pub sleep_debt_penalty_hours: f64,
    /// Recovery baseline used until the personal baseline is usable
    pub recovery_baseline_default: f64,
    pub tsb: TsbBand,
    pub tree: TreeConfig,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        ReadinessConfig {
            strategy: ReadinessStrategy::Weighted,
            weights: FactorWeights::default(),
            sleep_target_hours: 8.0,
            sleep_debt_penalty_hours: 5.0,
            recovery_baseline_default: 65.0,
            tsb: TsbBand::default(),
            tree: TreeConfig::default(),
        }
    }
}

impl ReadinessConfig {
    pub fn validate(&self) -> Result<(), ReadyError> {
        self.weights.validate()?;
        if self.sleep_target_hours <= 0.0 || self.recovery_baseline_default <= 0.0 {
            return Err(ReadyError::Configuration(
                "sleep target and recovery baseline must be positive".to_string(),
            ));
        }
        let band = &self.tsb;
        if !(band.worst_low < band.optimal_min
            && band.optimal_min <= band.optimal_max
            && band.optimal_max < band.worst_high)
        {
            return Err(ReadyError::Configuration(
                "TSB band must satisfy worst_low < optimal_min <= optimal_max < worst_high"
                    .to_string(),
            ));
        }
        self.tree.validate()
    }
}

/// Which readiness model to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStrategy {
    #[default]
    Weighted,
    Tree,
}

impl std::str::FromStr for ReadinessStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weighted" => Ok(ReadinessStrategy::Weighted),
            "tree" => Ok(ReadinessStrategy::Tree),
            _ => Err(format!("Invalid readiness strategy: {}", s)),
        }
    }
}

/// Everything a readiness model may look at
#[derive(Debug, Clone, Copy)]
pub struct ReadinessInput<'a> {
    pub signals: &'a NormalizedSignals,
    pub ans: &'a AnsClassification,
    /// Load at the end of yesterday
    pub morning_load: &'a LoadState,
    /// False when the athlete has no load history yet
    pub load_known: bool,
    pub params: &'a EffectiveParameters,
    /// Athlete's base weights before blindspot multipliers
    pub weights: &'a FactorWeights,
}

/// One factor's share of the score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorContribution {
    pub factor: Factor,
    pub sub_score: Option<f64>,
    /// Normalized weight; None for models without fixed weights
    pub weight: Option<f64>,
    /// Points this factor added to the raw score
    pub contribution: f64,
}

/// Daily readiness record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessResult {
    pub score: f64,
    /// Score before the ANS modifier
    pub raw_score: f64,
    pub factors: Vec<FactorContribution>,
    pub excluded: Vec<Factor>,
    pub ans_state: AnsState,
    pub ans_modifier: f64,
    pub strategy: String,
    pub confidence: Confidence,
}

/// Pluggable readiness strategy
pub trait ReadinessModel: Send + Sync {
    fn name(&self) -> &str;

    /// Pure function of the input
    fn score(&self, input: &ReadinessInput<'_>) -> ReadinessResult;
}

/// Sub-score for every factor; None where inputs are unavailable
pub fn factor_scores(
    input: &ReadinessInput<'_>,
    config: &ReadinessConfig,
) -> BTreeMap<Factor, Option<f64>> {
    let signals = input.signals;
    let mut scores = BTreeMap::new();

    scores.insert(Factor::Hrv, signals.ratio(MetricKind::Hrv).map(hrv_score));

    let sleep = signals.raw(MetricKind::SleepHours).map(|hours| {
        let debt = signals.sleep_debt(config.sleep_target_hours).unwrap_or(0.0);
        sleep_score(
            hours,
            debt,
            config.sleep_target_hours,
            config.sleep_debt_penalty_hours,
        )
    });
    scores.insert(Factor::Sleep, sleep);

    let recovery = signals.get(MetricKind::RecoveryScore).map(|m| {
        let baseline = m
            .ratio_to_baseline
            .filter(|r| *r > 0.0)
            .map(|r| m.raw / r)
            .unwrap_or(config.recovery_baseline_default);
        recovery_score(m.raw, baseline)
    });
    scores.insert(Factor::Recovery, recovery);

    let freshness = if input.load_known {
        input
            .morning_load
            .tsb()
            .to_f64()
            .map(|tsb| tsb_score(tsb, &config.tsb))
    } else {
        None
    };
    scores.insert(Factor::Freshness, freshness);

    let offset = input.params.get(Parameter::RhrBaselineOffset);
    let resting_hr = signals.get(MetricKind::RestingHr).and_then(|m| {
        let ratio = m.ratio_to_baseline.filter(|r| *r > 0.0)?;
        let baseline = m.raw / ratio + offset;
        if baseline <= 0.0 {
            return None;
        }
        Some(rhr_score((m.raw - baseline) / baseline * 100.0))
    });
    scores.insert(Factor::RestingHr, resting_hr);

    scores
}

/// HRV sub-score from the ratio to baseline
pub fn hrv_score(ratio: f64) -> f64 {
    let pct = ratio * 100.0;
    if pct >= 100.0 {
        100.0
    } else if pct >= 90.0 {
        80.0 + (pct - 90.0) * 2.0
    } else if pct >= 80.0 {
        60.0 + (pct - 80.0) * 2.0
    } else if pct >= 70.0 {
        40.0 + (pct - 70.0) * 2.0
    } else {
        (pct * 0.57).max(0.0)
    }
}

/// Sleep sub-score from last night against target, trimmed for weekly debt
pub fn sleep_score(hours: f64, debt_hours: f64, target: f64, debt_penalty_hours: f64) -> f64 {
    let pct = hours / target * 100.0;
    let score = if pct >= 100.0 {
        100.0
    } else if pct >= 87.5 {
        80.0 + (pct - 87.5) * 1.6
    } else if pct >= 75.0 {
        50.0 + (pct - 75.0) * 2.4
    } else {
        (pct * 0.67).max(0.0)
    };

    if debt_hours > debt_penalty_hours {
        score * 0.9
    } else {
        score
    }
}

/// Device recovery sub-score against the athlete's usual recovery
pub fn recovery_score(current: f64, baseline: f64) -> f64 {
    let band = baseline * 0.2;
    if current >= baseline {
        (70.0 + (current - baseline)).min(100.0)
    } else if current >= baseline * 0.8 {
        50.0 + (current - baseline * 0.8) / band * 20.0
    } else if current >= baseline * 0.6 {
        30.0 + (current - baseline * 0.6) / band * 20.0
    } else if current >= baseline * 0.4 {
        10.0 + (current - baseline * 0.4) / band * 20.0
    } else {
        (current / baseline * 10.0).max(0.0)
    }
}

/// Freshness sub-score; being fresh is penalized less than being fatigued
pub fn tsb_score(tsb: f64, band: &TsbBand) -> f64 {
    if tsb >= band.optimal_min && tsb <= band.optimal_max {
        100.0
    } else if tsb < band.optimal_min {
        if tsb >= band.worst_low {
            100.0 * (tsb - band.worst_low) / (band.optimal_min - band.worst_low)
        } else {
            0.0
        }
    } else if tsb <= band.worst_high {
        100.0 - 30.0 * (tsb - band.optimal_max) / (band.worst_high - band.optimal_max)
    } else {
        70.0
    }
}

/// Resting HR sub-score from % elevation over baseline
pub fn rhr_score(elevation_pct: f64) -> f64 {
    if elevation_pct <= 0.0 {
        100.0
    } else if elevation_pct <= 5.0 {
        90.0 - elevation_pct * 2.0
    } else if elevation_pct <= 10.0 {
        80.0 - (elevation_pct - 5.0) * 4.0
    } else if elevation_pct <= 15.0 {
        60.0 - (elevation_pct - 10.0) * 4.0
    } else {
        (40.0 - (elevation_pct - 15.0) * 2.0).max(0.0)
    }
}

/// Confidence shared by all models
pub(crate) fn result_confidence(
    input: &ReadinessInput<'_>,
    available: usize,
    excluded: usize,
) -> Confidence {
    if available == 0 {
        Confidence::None
    } else if excluded > 0
        || input.signals.has_stale()
        || input.ans.confidence != Confidence::Full
    {
        Confidence::Reduced
    } else {
        Confidence::Full
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_hrv_curve() {
        assert_eq!(hrv_score(1.05), 100.0);
        assert!((hrv_score(0.95) - 90.0).abs() < 1e-9);
        assert!((hrv_score(0.85) - 70.0).abs() < 1e-9);
        assert!((hrv_score(0.75) - 50.0).abs() < 1e-9);
        assert!((hrv_score(0.5) - 28.5).abs() < 1e-9);
    }

    #[test]
    fn test_sleep_curve_and_debt_penalty() {
        assert_eq!(sleep_score(8.0, 0.0, 8.0, 5.0), 100.0);
        assert!((sleep_score(7.0, 0.0, 8.0, 5.0) - 80.0).abs() < 1e-9);
        assert!((sleep_score(6.0, 0.0, 8.0, 5.0) - 50.0).abs() < 1e-9);
        assert!((sleep_score(6.0, 6.0, 8.0, 5.0) - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_recovery_curve() {
        assert_eq!(recovery_score(65.0, 65.0), 70.0);
        assert_eq!(recovery_score(100.0, 65.0), 100.0);
        assert!((recovery_score(52.0, 65.0) - 50.0).abs() < 1e-9);
        assert!(recovery_score(10.0, 65.0) < 10.0);
    }

    #[test]
    fn test_tsb_curve() {
        let band = TsbBand::default();
        assert_eq!(tsb_score(0.0, &band), 100.0);
        assert_eq!(tsb_score(-30.0, &band), 0.0);
        assert_eq!(tsb_score(-45.0, &band), 0.0);
        assert!((tsb_score(-17.5, &band) - 50.0).abs() < 1e-9);
        assert!((tsb_score(30.0, &band) - 70.0).abs() < 1e-9);
        assert_eq!(tsb_score(50.0, &band), 70.0);
    }

    #[test]
    fn test_rhr_curve() {
        assert_eq!(rhr_score(-3.0), 100.0);
        assert!((rhr_score(5.0) - 80.0).abs() < 1e-9);
        assert!((rhr_score(10.0) - 60.0).abs() < 1e-9);
        assert!((rhr_score(15.0) - 40.0).abs() < 1e-9);
        assert_eq!(rhr_score(40.0), 0.0);
    }

    #[test]
    fn test_factor_scores_with_rhr_offset() {
        let signals = baseline_signals();
        let ans = ans(AnsState::Ready, 10.0);
        let load = LoadState::zero(date());
        let weights = FactorWeights::default();
        let params = crate::blindspot::resolve_kinds(
            &[crate::blindspot::BlindspotKind::CaffeineDependency]
                .into_iter()
                .collect(),
            &crate::blindspot::ParameterSet::default(),
        );
        let input = ReadinessInput {
            signals: &signals,
            ans: &ans,
            morning_load: &load,
            load_known: false,
            params: &params,
            weights: &weights,
        };

        let scores = factor_scores(&input, &ReadinessConfig::default());
        assert_eq!(scores[&Factor::Hrv], Some(100.0));
        assert_eq!(scores[&Factor::Freshness], None);
        // 50 bpm against an offset baseline of 54 is below baseline
        assert_eq!(scores[&Factor::RestingHr], Some(100.0));
    }

    #[test]
    fn test_freshness_from_morning_load() {
        let signals = baseline_signals();
        let ans = ans(AnsState::Ready, 10.0);
        let mut load = LoadState::zero(date());
        load.ctl = dec!(40);
        load.atl = dec!(57.5);
        let weights = FactorWeights::default();
        let params = EffectiveParameters::default();
        let input = ReadinessInput {
            signals: &signals,
            ans: &ans,
            morning_load: &load,
            load_known: true,
            params: &params,
            weights: &weights,
        };

        let scores = factor_scores(&input, &ReadinessConfig::default());
        assert!((scores[&Factor::Freshness].unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_weight_validation() {
        let weights = FactorWeights {
            hrv: -0.1,
            ..FactorWeights::default()
        };
        assert!(weights.validate().is_err());
        assert!(FactorWeights::default().validate().is_ok());
    }
}

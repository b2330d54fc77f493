//! Health gates
//!
//! Five independent domains that can block intensity regardless of the
//! readiness score. Each domain computes a strain where 1.0 sits exactly at
//! the hard limit; it fails when `strain × sensitivity_weight > 1.0`. Weights
//! come from the blindspot-adjusted parameter set, so a sensitive athlete
//! fails earlier on the same signal.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::blindspot::{EffectiveParameters, Parameter};
use crate::error::ReadyError;
use crate::models::{Appetite, CognitiveFatigue, DailyMetricRecord, MetricKind, WeightTrend};
use crate::normalizer::NormalizedSignals;

/// Gate thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    pub sleep_target_hours: f64,
    /// Shortfall below target that reaches the hard limit
    pub sleep_tolerance_hours: f64,
    pub sleep_debt_max_hours: f64,
    pub hrv_min_ratio: f64,
    pub rhr_max_ratio: f64,
    pub soreness_max: f64,
    pub stress_max: f64,
    /// Weighted strain above this marks a passing domain marginal
    pub marginal_fraction: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig {
            sleep_target_hours: 8.0,
            sleep_tolerance_hours: 1.0,
            sleep_debt_max_hours: 5.0,
            hrv_min_ratio: 0.80,
            rhr_max_ratio: 1.10,
            soreness_max: 7.0,
            stress_max: 7.0,
            marginal_fraction: 0.8,
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> Result<(), ReadyError> {
        let positive = [
            ("sleep_target_hours", self.sleep_target_hours),
            ("sleep_tolerance_hours", self.sleep_tolerance_hours),
            ("sleep_debt_max_hours", self.sleep_debt_max_hours),
            ("soreness_max", self.soreness_max),
            ("stress_max", self.stress_max),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ReadyError::Configuration(format!(
                    "gates.{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if !(self.hrv_min_ratio > 0.0 && self.hrv_min_ratio < 1.0) {
            return Err(ReadyError::Configuration(
                "gates.hrv_min_ratio must be between 0 and 1".to_string(),
            ));
        }
        if self.rhr_max_ratio <= 1.0 {
            return Err(ReadyError::Configuration(
                "gates.rhr_max_ratio must exceed 1".to_string(),
            ));
        }
        if !(self.marginal_fraction > 0.0 && self.marginal_fraction < 1.0) {
            return Err(ReadyError::Configuration(
                "gates.marginal_fraction must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Health gate domains
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDomain {
    Sleep,
    EnergyAvailability,
    Autonomic,
    Musculoskeletal,
    PsychologicalStress,
}

impl GateDomain {
    pub const ALL: [GateDomain; 5] = [
        GateDomain::Sleep,
        GateDomain::EnergyAvailability,
        GateDomain::Autonomic,
        GateDomain::Musculoskeletal,
        GateDomain::PsychologicalStress,
    ];

    pub fn weight_parameter(&self) -> Parameter {
        match self {
            GateDomain::Sleep => Parameter::SleepGateWeight,
            GateDomain::EnergyAvailability => Parameter::EnergyGateWeight,
            GateDomain::Autonomic => Parameter::AutonomicGateWeight,
            GateDomain::Musculoskeletal => Parameter::MusculoskeletalGateWeight,
            GateDomain::PsychologicalStress => Parameter::StressGateWeight,
        }
    }
}

impl fmt::Display for GateDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GateDomain::Sleep => "Sleep",
            GateDomain::EnergyAvailability => "Energy",
            GateDomain::Autonomic => "Autonomic",
            GateDomain::Musculoskeletal => "Musculoskeletal",
            GateDomain::PsychologicalStress => "Stress",
        };
        write!(f, "{}", name)
    }
}

/// Why a domain is strained
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    NoData,
    SleepShort,
    SleepDebt,
    WeightDeclining,
    AppetiteReduced,
    HrvSuppressed,
    RhrElevated,
    InjurySignal,
    SorenessHigh,
    SorenessAsymmetry,
    LifeStressHigh,
    CognitiveFatigueModerate,
    CognitiveFatigueHigh,
}

impl ReasonCode {
    /// Reasons that fail a domain regardless of strain
    pub fn is_hard_failure(&self) -> bool {
        matches!(self, ReasonCode::InjurySignal | ReasonCode::CognitiveFatigueHigh)
    }

    /// Reasons that mark a passing domain marginal regardless of strain
    pub fn is_marginal_flag(&self) -> bool {
        matches!(
            self,
            ReasonCode::SorenessAsymmetry | ReasonCode::CognitiveFatigueModerate
        )
    }
}

/// Result for one domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainResult {
    pub domain: GateDomain,
    pub pass: bool,
    pub strain: f64,
    pub weight: f64,
    pub reasons: Vec<ReasonCode>,
    pub marginal: bool,
}

impl DomainResult {
    pub fn weighted_strain(&self) -> f64 {
        self.strain * self.weight
    }
}

/// How much intensity the gates allow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityAllowance {
    Full,
    Moderate,
    Low,
    RecoveryOnly,
}

impl fmt::Display for IntensityAllowance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntensityAllowance::Full => write!(f, "full"),
            IntensityAllowance::Moderate => write!(f, "moderate"),
            IntensityAllowance::Low => write!(f, "low"),
            IntensityAllowance::RecoveryOnly => write!(f, "recovery only"),
        }
    }
}

/// Daily health gate record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthGateResult {
    pub domains: Vec<DomainResult>,
    pub overall_pass: bool,
    pub marginal: Vec<GateDomain>,
    pub intensity: IntensityAllowance,
}

impl HealthGateResult {
    fn from_domains(domains: Vec<DomainResult>) -> Self {
        let overall_pass = domains.iter().all(|d| d.pass);
        let marginal: Vec<GateDomain> = domains
            .iter()
            .filter(|d| d.marginal)
            .map(|d| d.domain)
            .collect();
        let intensity = if !overall_pass {
            IntensityAllowance::RecoveryOnly
        } else if marginal.len() >= 2 {
            IntensityAllowance::Low
        } else if marginal.len() == 1 {
            IntensityAllowance::Moderate
        } else {
            IntensityAllowance::Full
        };
        HealthGateResult {
            domains,
            overall_pass,
            marginal,
            intensity,
        }
    }

    pub fn domain(&self, domain: GateDomain) -> Option<&DomainResult> {
        self.domains.iter().find(|d| d.domain == domain)
    }

    pub fn failed(&self) -> Vec<GateDomain> {
        self.domains
            .iter()
            .filter(|d| !d.pass)
            .map(|d| d.domain)
            .collect()
    }

    /// Reject internally inconsistent results
    pub fn verify(&self, athlete_id: &str, date: NaiveDate) -> Result<(), ReadyError> {
        let conflict = |reason: String| ReadyError::GateEvaluationConflict {
            athlete_id: athlete_id.to_string(),
            date,
            reason,
        };

        if self.domains.len() != GateDomain::ALL.len() {
            return Err(conflict(format!(
                "expected {} domains, found {}",
                GateDomain::ALL.len(),
                self.domains.len()
            )));
        }
        let all_pass = self.domains.iter().all(|d| d.pass);
        if self.overall_pass != all_pass {
            return Err(conflict(format!(
                "overall_pass {} but domain AND is {}",
                self.overall_pass, all_pass
            )));
        }
        for d in &self.domains {
            if !d.strain.is_finite() || !d.weight.is_finite() || d.weight <= 0.0 {
                return Err(conflict(format!(
                    "{} has non-finite strain or weight",
                    d.domain
                )));
            }
            let hard = d.reasons.iter().any(|r| r.is_hard_failure());
            let expected_pass = !(hard || d.weighted_strain() > 1.0);
            if d.pass != expected_pass {
                return Err(conflict(format!(
                    "{} pass flag disagrees with strain {:.2} and reasons {:?}",
                    d.domain,
                    d.weighted_strain(),
                    d.reasons
                )));
            }
            if d.marginal && !d.pass {
                return Err(conflict(format!("{} is both failed and marginal", d.domain)));
            }
        }
        Ok(())
    }
}

/// Evaluates the five health gates for one day
#[derive(Debug, Clone, Default)]
pub struct HealthGateEvaluator {
    config: GateConfig,
}

impl HealthGateEvaluator {
    pub fn new(config: GateConfig) -> Self {
        HealthGateEvaluator { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn evaluate(
        &self,
        record: &DailyMetricRecord,
        signals: &NormalizedSignals,
        params: &EffectiveParameters,
    ) -> HealthGateResult {
        let domains = GateDomain::ALL
            .iter()
            .map(|domain| {
                let (strain, reasons) = match domain {
                    GateDomain::Sleep => self.sleep_strain(signals),
                    GateDomain::EnergyAvailability => self.energy_strain(record),
                    GateDomain::Autonomic => self.autonomic_strain(signals, params),
                    GateDomain::Musculoskeletal => self.musculoskeletal_strain(record, signals),
                    GateDomain::PsychologicalStress => self.stress_strain(record, signals),
                };
                self.finish(*domain, strain, reasons, params.get(domain.weight_parameter()))
            })
            .collect();

        let result = HealthGateResult::from_domains(domains);
        debug!(
            overall_pass = result.overall_pass,
            marginal = result.marginal.len(),
            intensity = %result.intensity,
            "health gates evaluated"
        );
        result
    }

    /// Apply the weight and keep only reasons that matter at this strain
    fn finish(
        &self,
        domain: GateDomain,
        strain: f64,
        components: Vec<(ReasonCode, f64)>,
        weight: f64,
    ) -> DomainResult {
        let weighted = strain * weight;
        let reasons: Vec<ReasonCode> = components
            .iter()
            .filter(|(code, part)| {
                *code == ReasonCode::NoData
                    || code.is_hard_failure()
                    || code.is_marginal_flag()
                    || part * weight > self.config.marginal_fraction
            })
            .map(|(code, _)| *code)
            .collect();

        let hard = reasons.iter().any(|r| r.is_hard_failure());
        let pass = !(hard || weighted > 1.0);
        let marginal = pass
            && (weighted > self.config.marginal_fraction
                || reasons.iter().any(|r| r.is_marginal_flag()));

        DomainResult {
            domain,
            pass,
            strain,
            weight,
            reasons,
            marginal,
        }
    }

    fn sleep_strain(&self, signals: &NormalizedSignals) -> (f64, Vec<(ReasonCode, f64)>) {
        let Some(hours) = signals.raw(MetricKind::SleepHours) else {
            return (0.0, vec![(ReasonCode::NoData, 0.0)]);
        };
        let c = &self.config;
        let deficit = ((c.sleep_target_hours - hours).max(0.0)) / c.sleep_tolerance_hours;
        let debt = signals.sleep_debt(c.sleep_target_hours).unwrap_or(0.0) / c.sleep_debt_max_hours;
        (
            deficit.max(debt),
            vec![(ReasonCode::SleepShort, deficit), (ReasonCode::SleepDebt, debt)],
        )
    }

    fn energy_strain(&self, record: &DailyMetricRecord) -> (f64, Vec<(ReasonCode, f64)>) {
        let energy = &record.energy;
        if energy.weight_trend.is_none() && energy.appetite.is_none() {
            return (0.0, vec![(ReasonCode::NoData, 0.0)]);
        }
        let trend = match energy.weight_trend.unwrap_or_default() {
            WeightTrend::Stable => 0.0,
            WeightTrend::Declining => 0.85,
            WeightTrend::DecliningFast => 1.2,
        };
        let appetite = match energy.appetite.unwrap_or_default() {
            Appetite::Normal => 0.0,
            Appetite::Reduced => 0.3,
            Appetite::Poor => 0.85,
        };
        (
            trend + appetite,
            vec![
                (ReasonCode::WeightDeclining, trend),
                (ReasonCode::AppetiteReduced, appetite),
            ],
        )
    }

    fn autonomic_strain(
        &self,
        signals: &NormalizedSignals,
        params: &EffectiveParameters,
    ) -> (f64, Vec<(ReasonCode, f64)>) {
        let c = &self.config;
        let hrv = signals
            .ratio(MetricKind::Hrv)
            .map(|ratio| ((1.0 - ratio) / (1.0 - c.hrv_min_ratio)).max(0.0));

        let offset = params.get(Parameter::RhrBaselineOffset);
        let rhr = signals.get(MetricKind::RestingHr).and_then(|m| {
            let ratio = m.ratio_to_baseline.filter(|r| *r > 0.0)?;
            let baseline = m.raw / ratio + offset;
            if baseline <= 0.0 {
                return None;
            }
            Some(((m.raw / baseline - 1.0) / (c.rhr_max_ratio - 1.0)).max(0.0))
        });

        match (hrv, rhr) {
            (None, None) => (0.0, vec![(ReasonCode::NoData, 0.0)]),
            (hrv, rhr) => {
                let hrv = hrv.unwrap_or(0.0);
                let rhr = rhr.unwrap_or(0.0);
                (
                    hrv.max(rhr),
                    vec![(ReasonCode::HrvSuppressed, hrv), (ReasonCode::RhrElevated, rhr)],
                )
            }
        }
    }

    fn musculoskeletal_strain(
        &self,
        record: &DailyMetricRecord,
        signals: &NormalizedSignals,
    ) -> (f64, Vec<(ReasonCode, f64)>) {
        let msk = &record.musculoskeletal;
        let soreness = signals.raw(MetricKind::Soreness);
        if soreness.is_none() && msk.injury_signals.is_empty() && !msk.soreness_asymmetry {
            return (0.0, vec![(ReasonCode::NoData, 0.0)]);
        }

        let strain = soreness.map(|s| s / self.config.soreness_max).unwrap_or(0.0);
        let mut components = vec![(ReasonCode::SorenessHigh, strain)];
        if !msk.injury_signals.is_empty() {
            components.push((ReasonCode::InjurySignal, strain));
        }
        if msk.soreness_asymmetry {
            components.push((ReasonCode::SorenessAsymmetry, strain));
        }
        (strain, components)
    }

    fn stress_strain(
        &self,
        record: &DailyMetricRecord,
        signals: &NormalizedSignals,
    ) -> (f64, Vec<(ReasonCode, f64)>) {
        let stress = signals.raw(MetricKind::LifeStress);
        if stress.is_none() && record.cognitive_fatigue.is_none() {
            return (0.0, vec![(ReasonCode::NoData, 0.0)]);
        }

        let strain = stress.map(|s| s / self.config.stress_max).unwrap_or(0.0);
        let mut components = vec![(ReasonCode::LifeStressHigh, strain)];
        match record.cognitive_fatigue {
            Some(CognitiveFatigue::High) => {
                components.push((ReasonCode::CognitiveFatigueHigh, strain))
            }
            Some(CognitiveFatigue::Moderate) => {
                components.push((ReasonCode::CognitiveFatigueModerate, strain))
            }
            _ => {}
        }
        (strain, components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blindspot::{resolve_kinds, BlindspotKind, ParameterSet};
    use crate::normalizer::{NormalizedMetric, SignalSource};
    use std::collections::BTreeMap;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    fn metric(raw: f64, ratio: Option<f64>) -> NormalizedMetric {
        NormalizedMetric {
            raw,
            ratio_to_baseline: ratio,
            z_score: None,
            acute_mean: None,
            stale: false,
            source: SignalSource::Measured,
        }
    }

    fn signals(entries: &[(MetricKind, f64, Option<f64>)]) -> NormalizedSignals {
        let metrics: BTreeMap<MetricKind, NormalizedMetric> = entries
            .iter()
            .map(|(kind, raw, ratio)| (*kind, metric(*raw, *ratio)))
            .collect();
        let recent_sleep = metrics
            .get(&MetricKind::SleepHours)
            .map(|m| vec![8.0, 8.0, 8.0, 8.0, 8.0, 8.0, m.raw])
            .unwrap_or_default();
        NormalizedSignals {
            date: date(),
            metrics,
            recent_sleep,
            issues: Vec::new(),
        }
    }

    fn evaluate(
        record: &DailyMetricRecord,
        signals: &NormalizedSignals,
        params: &EffectiveParameters,
    ) -> HealthGateResult {
        let result = HealthGateEvaluator::default().evaluate(record, signals, params);
        result.verify("a1", date()).unwrap();
        result
    }

    #[test]
    fn test_no_data_passes() {
        let result = evaluate(
            &DailyMetricRecord::new(date()),
            &signals(&[]),
            &EffectiveParameters::default(),
        );
        assert!(result.overall_pass);
        assert_eq!(result.intensity, IntensityAllowance::Full);
        for domain in &result.domains {
            assert_eq!(domain.reasons, vec![ReasonCode::NoData]);
        }
    }

    #[test]
    fn test_sleep_limit() {
        let params = EffectiveParameters::default();
        let record = DailyMetricRecord::new(date());

        let ok = evaluate(&record, &signals(&[(MetricKind::SleepHours, 7.0, None)]), &params);
        let sleep = ok.domain(GateDomain::Sleep).unwrap();
        assert!(sleep.pass);
        assert!(sleep.marginal);
        assert_eq!(ok.intensity, IntensityAllowance::Moderate);

        let short = evaluate(&record, &signals(&[(MetricKind::SleepHours, 6.5, None)]), &params);
        assert!(!short.overall_pass);
        assert_eq!(short.failed(), vec![GateDomain::Sleep]);
        assert_eq!(short.intensity, IntensityAllowance::RecoveryOnly);
    }

    #[test]
    fn test_blindspot_weight_tightens_gate() {
        let record = DailyMetricRecord::new(date());
        let input = signals(&[(MetricKind::SleepHours, 7.4, None)]);

        let plain = evaluate(&record, &input, &EffectiveParameters::default());
        assert!(plain.overall_pass);

        let disorder = resolve_kinds(
            &[BlindspotKind::SleepDisorder].into_iter().collect(),
            &ParameterSet::default(),
        );
        let tightened = evaluate(&record, &input, &disorder);
        assert!(!tightened.overall_pass);
        let sleep = tightened.domain(GateDomain::Sleep).unwrap();
        assert_eq!(sleep.weight, 2.0);
        assert!(sleep.reasons.contains(&ReasonCode::SleepShort));
    }

    #[test]
    fn test_injury_fails_outright() {
        let mut record = DailyMetricRecord::new(date());
        record
            .musculoskeletal
            .injury_signals
            .push("left knee pain".to_string());
        let input = signals(&[(MetricKind::Soreness, 2.0, None)]);

        let result = evaluate(&record, &input, &EffectiveParameters::default());
        let msk = result.domain(GateDomain::Musculoskeletal).unwrap();
        assert!(!msk.pass);
        assert!(msk.reasons.contains(&ReasonCode::InjurySignal));
        assert!(!result.overall_pass);
    }

    #[test]
    fn test_asymmetry_and_cognitive_fatigue_marginal() {
        let mut record = DailyMetricRecord::new(date());
        record.musculoskeletal.soreness_asymmetry = true;
        record.cognitive_fatigue = Some(CognitiveFatigue::Moderate);

        let result = evaluate(&record, &signals(&[]), &EffectiveParameters::default());
        assert!(result.overall_pass);
        assert_eq!(
            result.marginal,
            vec![GateDomain::Musculoskeletal, GateDomain::PsychologicalStress]
        );
        assert_eq!(result.intensity, IntensityAllowance::Low);

        record.cognitive_fatigue = Some(CognitiveFatigue::High);
        let result = evaluate(&record, &signals(&[]), &EffectiveParameters::default());
        assert_eq!(result.failed(), vec![GateDomain::PsychologicalStress]);
    }

    #[test]
    fn test_autonomic_uses_rhr_offset() {
        let record = DailyMetricRecord::new(date());
        // RHR 12% above a 50 bpm baseline
        let input = signals(&[
            (MetricKind::Hrv, 60.0, Some(1.0)),
            (MetricKind::RestingHr, 56.0, Some(1.12)),
        ]);

        let plain = evaluate(&record, &input, &EffectiveParameters::default());
        assert_eq!(plain.failed(), vec![GateDomain::Autonomic]);

        let caffeine = resolve_kinds(
            &[BlindspotKind::CaffeineDependency].into_iter().collect(),
            &ParameterSet::default(),
        );
        let adjusted = evaluate(&record, &input, &caffeine);
        assert!(adjusted.domain(GateDomain::Autonomic).unwrap().pass);
    }

    #[test]
    fn test_hrv_suppression_fails() {
        let record = DailyMetricRecord::new(date());
        let input = signals(&[(MetricKind::Hrv, 45.0, Some(0.75))]);
        let result = evaluate(&record, &input, &EffectiveParameters::default());
        let autonomic = result.domain(GateDomain::Autonomic).unwrap();
        assert!(!autonomic.pass);
        assert_eq!(autonomic.reasons, vec![ReasonCode::HrvSuppressed]);
    }

    #[test]
    fn test_energy_domain() {
        let mut record = DailyMetricRecord::new(date());
        record.energy.weight_trend = Some(WeightTrend::Declining);
        let result = evaluate(&record, &signals(&[]), &EffectiveParameters::default());
        assert_eq!(result.marginal, vec![GateDomain::EnergyAvailability]);

        record.energy.appetite = Some(Appetite::Reduced);
        let result = evaluate(&record, &signals(&[]), &EffectiveParameters::default());
        assert_eq!(result.failed(), vec![GateDomain::EnergyAvailability]);
    }

    #[test]
    fn test_verify_detects_conflict() {
        let mut result = evaluate(
            &DailyMetricRecord::new(date()),
            &signals(&[]),
            &EffectiveParameters::default(),
        );
        result.overall_pass = false;
        assert!(matches!(
            result.verify("a1", date()),
            Err(ReadyError::GateEvaluationConflict { .. })
        ));

        let mut result = evaluate(
            &DailyMetricRecord::new(date()),
            &signals(&[]),
            &EffectiveParameters::default(),
        );
        result.domains[0].strain = f64::NAN;
        assert!(result.verify("a1", date()).is_err());
    }
}

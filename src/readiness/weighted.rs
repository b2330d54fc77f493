use tracing::debug;

use super::{
    factor_scores, result_confidence, Factor, FactorContribution, ReadinessConfig,
    ReadinessInput, ReadinessModel, ReadinessResult,
};

/// Score reported when no factor is available
const NEUTRAL_SCORE: f64 = 50.0;

/// Weighted mean of factor sub-scores plus the ANS modifier
#[derive(Debug, Clone, Default)]
pub struct WeightedReadinessModel {
    config: ReadinessConfig,
}

impl WeightedReadinessModel {
    pub fn new(config: ReadinessConfig) -> Self {
        WeightedReadinessModel { config }
    }
}

impl ReadinessModel for WeightedReadinessModel {
    fn name(&self) -> &str {
        "weighted"
    }

    fn score(&self, input: &ReadinessInput<'_>) -> ReadinessResult {
        let scores = factor_scores(input, &self.config);

        let available_weight: f64 = scores
            .iter()
            .filter(|(_, score)| score.is_some())
            .map(|(factor, _)| input.weights.effective(*factor, input.params))
            .sum();

        let mut factors = Vec::with_capacity(Factor::ALL.len());
        let mut excluded = Vec::new();
        let mut weighted_sum = 0.0;

        for factor in Factor::ALL {
            let sub_score = scores.get(&factor).copied().flatten();
            let share = match sub_score {
                Some(_) if available_weight > 0.0 => {
                    input.weights.effective(factor, input.params) / available_weight
                }
                _ => 0.0,
            };
            if sub_score.is_none() {
                excluded.push(factor);
            }
            let contribution = sub_score.map(|s| s * share).unwrap_or(0.0);
            weighted_sum += contribution;
            factors.push(FactorContribution {
                factor,
                sub_score,
                weight: Some(share),
                contribution,
            });
        }

        let available = Factor::ALL.len() - excluded.len();
        let raw_score = if available == 0 || available_weight <= 0.0 {
            NEUTRAL_SCORE
        } else {
            weighted_sum
        };
        let score = (raw_score + input.ans.modifier).clamp(0.0, 100.0);

        debug!(
            raw_score,
            score,
            excluded = excluded.len(),
            ans = %input.ans.state,
            "weighted readiness scored"
        );

        ReadinessResult {
            score,
            raw_score,
            factors,
            excluded: excluded.clone(),
            ans_state: input.ans.state,
            ans_modifier: input.ans.modifier,
            strategy: self.name().to_string(),
            confidence: result_confidence(input, available, excluded.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ans::{AnsState, Confidence};
    use crate::blindspot::{resolve_kinds, BlindspotKind, EffectiveParameters, ParameterSet};
    use crate::models::MetricKind;
    use crate::normalizer::NormalizedSignals;
    use crate::pmc::LoadState;
    use crate::readiness::test_support::*;
    use crate::readiness::FactorWeights;
    use std::collections::BTreeMap;

    fn score_with(
        signals: &NormalizedSignals,
        state: AnsState,
        modifier: f64,
        params: &EffectiveParameters,
    ) -> ReadinessResult {
        let ans = ans(state, modifier);
        let load = LoadState::zero(date());
        let weights = FactorWeights::default();
        let input = ReadinessInput {
            signals,
            ans: &ans,
            morning_load: &load,
            load_known: true,
            params,
            weights: &weights,
        };
        WeightedReadinessModel::default().score(&input)
    }

    #[test]
    fn test_all_factors_at_baseline() {
        let result = score_with(
            &baseline_signals(),
            AnsState::DeepRecovery,
            0.0,
            &EffectiveParameters::default(),
        );
        // recovery at baseline scores 70; others 100
        assert!((result.raw_score - 94.0).abs() < 1e-9);
        assert!((result.score - 94.0).abs() < 1e-9);
        assert!(result.excluded.is_empty());
        assert_eq!(result.confidence, Confidence::Full);
        assert_eq!(result.strategy, "weighted");
    }

    #[test]
    fn test_ans_modifier_clamped() {
        let result = score_with(
            &baseline_signals(),
            AnsState::Ready,
            10.0,
            &EffectiveParameters::default(),
        );
        assert_eq!(result.score, 100.0);
        assert!((result.raw_score - 94.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_factors_renormalized() {
        let mut signals = baseline_signals();
        signals.metrics.remove(&MetricKind::RecoveryScore);
        signals.metrics.remove(&MetricKind::RestingHr);

        let result = score_with(
            &signals,
            AnsState::DeepRecovery,
            0.0,
            &EffectiveParameters::default(),
        );
        assert_eq!(result.excluded, vec![Factor::Recovery, Factor::RestingHr]);
        assert!((result.raw_score - 100.0).abs() < 1e-9);
        let total: f64 = result.factors.iter().filter_map(|f| f.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(result.confidence, Confidence::Reduced);
    }

    #[test]
    fn test_no_factors_is_neutral() {
        let signals = NormalizedSignals {
            date: date(),
            metrics: BTreeMap::new(),
            recent_sleep: Vec::new(),
            issues: Vec::new(),
        };
        let ans = ans(AnsState::Unclassified, 0.0);
        let load = LoadState::zero(date());
        let weights = FactorWeights::default();
        let params = EffectiveParameters::default();
        let input = ReadinessInput {
            signals: &signals,
            ans: &ans,
            morning_load: &load,
            load_known: false,
            params: &params,
            weights: &weights,
        };

        let result = WeightedReadinessModel::default().score(&input);
        assert_eq!(result.score, 50.0);
        assert_eq!(result.confidence, Confidence::None);
        assert_eq!(result.excluded.len(), 5);
    }

    #[test]
    fn test_blindspot_multiplier_shifts_weight() {
        let mut signals = baseline_signals();
        signals
            .metrics
            .insert(MetricKind::SleepHours, metric(6.0, Some(0.75)));
        signals.recent_sleep = vec![8.0; 6];
        signals.recent_sleep.push(6.0);

        let plain = score_with(
            &signals,
            AnsState::DeepRecovery,
            0.0,
            &EffectiveParameters::default(),
        );
        let deficit = resolve_kinds(
            &[BlindspotKind::RecoveryDeficit].into_iter().collect(),
            &ParameterSet::default(),
        );
        let weighted = score_with(&signals, AnsState::DeepRecovery, 0.0, &deficit);
        assert!(weighted.raw_score < plain.raw_score);
    }
}

//! Autonomic nervous system quadrant classifier
//!
//! Parasympathetic tone comes from the HRV ratio to baseline; the sympathetic
//! proxy is the orthostatic heart rate rise relative to the athlete's usual
//! rise. Each is "high" at or above the configured threshold.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ReadyError;
use crate::models::MetricKind;
use crate::normalizer::NormalizedSignals;

/// ANS classifier configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnsConfig {
    /// Ratio at or above which a branch counts as high (default: 0.90)
    pub high_ratio: f64,
    pub ready_modifier: f64,
    pub deep_recovery_modifier: f64,
    pub overreach_modifier: f64,
    pub overtrained_modifier: f64,
}

impl Default for AnsConfig {
    fn default() -> Self {
        AnsConfig {
            high_ratio: 0.90,
            ready_modifier: 10.0,
            deep_recovery_modifier: 0.0,
            overreach_modifier: -15.0,
            overtrained_modifier: -25.0,
        }
    }
}

impl AnsConfig {
    pub fn validate(&self) -> Result<(), ReadyError> {
        if !(self.high_ratio > 0.0 && self.high_ratio.is_finite()) {
            return Err(ReadyError::Configuration(format!(
                "ans.high_ratio must be positive, got {}",
                self.high_ratio
            )));
        }
        Ok(())
    }
}

/// Parasympathetic reading when only HRV is available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PnsOnly {
    Recovered,
    NotRecovered,
}

/// ANS state for the day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "pns", rename_all = "snake_case")]
pub enum AnsState {
    /// PNS high, SNS high
    Ready,
    /// PNS high, SNS low
    DeepRecovery,
    /// PNS low, SNS high
    Overreach,
    /// PNS low, SNS low
    Overtrained,
    /// No sympathetic proxy; PNS branch only
    Degraded(PnsOnly),
    /// No parasympathetic reading
    Unclassified,
}

impl fmt::Display for AnsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnsState::Ready => write!(f, "Ready"),
            AnsState::DeepRecovery => write!(f, "Deep Recovery"),
            AnsState::Overreach => write!(f, "Overreach"),
            AnsState::Overtrained => write!(f, "Overtrained"),
            AnsState::Degraded(PnsOnly::Recovered) => write!(f, "Degraded (recovered)"),
            AnsState::Degraded(PnsOnly::NotRecovered) => write!(f, "Degraded (not recovered)"),
            AnsState::Unclassified => write!(f, "Unclassified"),
        }
    }
}

/// How much of the required input backed a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    None,
    Reduced,
    Full,
}

/// ANS classification with the ratios used
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnsClassification {
    pub state: AnsState,
    pub confidence: Confidence,
    pub pns_ratio: Option<f64>,
    pub sns_ratio: Option<f64>,
    /// Score modifier for the readiness scorer
    pub modifier: f64,
}

#[derive(Debug, Clone, Default)]
pub struct AnsClassifier {
    config: AnsConfig,
}

impl AnsClassifier {
    pub fn new(config: AnsConfig) -> Self {
        AnsClassifier { config }
    }

    pub fn classify(&self, signals: &NormalizedSignals) -> AnsClassification {
        let pns = signals.get(MetricKind::Hrv);
        let sns = signals.get(MetricKind::OrthostaticDelta);
        let pns_ratio = pns.and_then(|m| m.ratio_to_baseline);
        let sns_ratio = sns.and_then(|m| m.ratio_to_baseline);
        let stale = pns.map(|m| m.stale).unwrap_or(false) || sns.map(|m| m.stale).unwrap_or(false);

        let high = |ratio: f64| ratio >= self.config.high_ratio;

        let (state, confidence) = match (pns_ratio, sns_ratio) {
            (None, _) => (AnsState::Unclassified, Confidence::None),
            (Some(p), None) => {
                let branch = if high(p) {
                    PnsOnly::Recovered
                } else {
                    PnsOnly::NotRecovered
                };
                (AnsState::Degraded(branch), Confidence::Reduced)
            }
            (Some(p), Some(s)) => {
                let state = match (high(p), high(s)) {
                    (true, true) => AnsState::Ready,
                    (true, false) => AnsState::DeepRecovery,
                    (false, true) => AnsState::Overreach,
                    (false, false) => AnsState::Overtrained,
                };
                let confidence = if stale {
                    Confidence::Reduced
                } else {
                    Confidence::Full
                };
                (state, confidence)
            }
        };

        AnsClassification {
            state,
            confidence,
            pns_ratio,
            sns_ratio,
            modifier: self.modifier(state),
        }
    }

    pub fn modifier(&self, state: AnsState) -> f64 {
        match state {
            AnsState::Ready => self.config.ready_modifier,
            AnsState::DeepRecovery => self.config.deep_recovery_modifier,
            AnsState::Overreach => self.config.overreach_modifier,
            AnsState::Overtrained => self.config.overtrained_modifier,
            AnsState::Degraded(_) | AnsState::Unclassified => 0.0,
        }
    }
}

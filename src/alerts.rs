//! Load and blindspot alerts
//!
//! Alerts are advisory. They never change the session class; they ride along
//! in the daily outcome for the renderer to surface.

use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::blindspot::{BlindspotKind, EffectiveParameters, Parameter};
use crate::models::MetricKind;
use crate::normalizer::NormalizedSignals;
use crate::pmc::LoadState;

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Info => write!(f, "info"),
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// What an alert is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    TsbLow,
    RampRateHigh,
    HrvSuppressed,
    RecoveryScoreLow,
    LifeStressHigh,
    CaffeineSleepQuality,
    SleepAverageLow,
    OvertrainingPattern,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub recommendation: String,
}

/// Alert thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    pub tsb_warning: f64,
    pub tsb_critical: f64,
    pub ramp_warning: f64,
    pub ramp_critical: f64,
    pub hrv_low_ratio: f64,
    pub hrv_streak_days: u32,
    pub recovery_low_score: f64,
    pub recovery_streak_days: u32,
    pub life_stress_high: f64,
    pub sleep_quality_low: f64,
    pub sleep_average_low: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        AlertConfig {
            tsb_warning: -20.0,
            tsb_critical: -30.0,
            ramp_warning: 5.0,
            ramp_critical: 7.0,
            hrv_low_ratio: 0.85,
            hrv_streak_days: 3,
            recovery_low_score: 33.0,
            recovery_streak_days: 2,
            life_stress_high: 7.0,
            sleep_quality_low: 5.0,
            sleep_average_low: 6.0,
        }
    }
}

/// Consecutive-day counters, owned by the athlete context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStreaks {
    pub hrv_low_days: u32,
    pub recovery_low_days: u32,
}

/// Inputs for one day's checks. Metric values come from the normalized
/// signals, so values the normalizer rejected never raise an alert.
#[derive(Debug, Clone, Copy)]
pub struct AlertInput<'a> {
    /// End-of-day load
    pub load: &'a LoadState,
    pub signals: &'a NormalizedSignals,
    pub params: &'a EffectiveParameters,
}

#[derive(Debug, Clone, Default)]
pub struct AlertChecker {
    config: AlertConfig,
}

impl AlertChecker {
    pub fn new(config: AlertConfig) -> Self {
        AlertChecker { config }
    }

    /// Run every check, updating the streak counters
    pub fn check(&self, input: &AlertInput<'_>, streaks: &mut AlertStreaks) -> Vec<Alert> {
        let c = &self.config;
        let mut alerts = Vec::new();
        let tsb = input.load.tsb().to_f64().unwrap_or(0.0);
        let ramp = input.load.ramp_rate.and_then(|r| r.to_f64());

        let tsb_warning = c.tsb_warning.max(input.params.get(Parameter::TsbFloor));
        if tsb < c.tsb_critical {
            alerts.push(Alert {
                kind: AlertKind::TsbLow,
                severity: AlertSeverity::Critical,
                message: format!("TSB critically low at {:.1}", tsb),
                value: tsb,
                threshold: c.tsb_critical,
                recommendation: "Immediate recovery needed - reduce training load significantly"
                    .to_string(),
            });
        } else if tsb < tsb_warning {
            alerts.push(Alert {
                kind: AlertKind::TsbLow,
                severity: AlertSeverity::Warning,
                message: format!("TSB low at {:.1}", tsb),
                value: tsb,
                threshold: tsb_warning,
                recommendation: "Consider reducing intensity and adding recovery days".to_string(),
            });
        }

        let ramp_warning = c.ramp_warning.min(input.params.get(Parameter::RampRateCeiling));
        if let Some(ramp) = ramp {
            if ramp > c.ramp_critical {
                alerts.push(Alert {
                    kind: AlertKind::RampRateHigh,
                    severity: AlertSeverity::Critical,
                    message: format!("Ramp rate critically high at {:.1}/week", ramp),
                    value: ramp,
                    threshold: c.ramp_critical,
                    recommendation: "High injury/illness risk - back off immediately".to_string(),
                });
            } else if ramp > ramp_warning {
                alerts.push(Alert {
                    kind: AlertKind::RampRateHigh,
                    severity: AlertSeverity::Warning,
                    message: format!("Ramp rate elevated at {:.1}/week", ramp),
                    value: ramp,
                    threshold: ramp_warning,
                    recommendation: "Monitor closely - avoid adding more load this week"
                        .to_string(),
                });
            }
        }

        // A day without a fresh value breaks the streak
        let hrv_ratio = input
            .signals
            .get(MetricKind::Hrv)
            .filter(|m| !m.stale)
            .and_then(|m| m.ratio_to_baseline);
        match hrv_ratio {
            Some(ratio) if ratio < c.hrv_low_ratio => streaks.hrv_low_days += 1,
            _ => streaks.hrv_low_days = 0,
        }
        if let Some(ratio) = hrv_ratio.filter(|_| streaks.hrv_low_days >= c.hrv_streak_days) {
            alerts.push(Alert {
                kind: AlertKind::HrvSuppressed,
                severity: AlertSeverity::Warning,
                message: format!(
                    "HRV below {:.0}% of baseline for {} days",
                    c.hrv_low_ratio * 100.0,
                    streaks.hrv_low_days
                ),
                value: ratio,
                threshold: c.hrv_low_ratio,
                recommendation: "Prioritize recovery - the autonomic system is not bouncing back"
                    .to_string(),
            });
        }

        let recovery = input
            .signals
            .get(MetricKind::RecoveryScore)
            .filter(|m| !m.stale)
            .map(|m| m.raw);
        match recovery {
            Some(score) if score < c.recovery_low_score => streaks.recovery_low_days += 1,
            _ => streaks.recovery_low_days = 0,
        }
        if let Some(score) = recovery {
            if streaks.recovery_low_days >= c.recovery_streak_days {
                alerts.push(Alert {
                    kind: AlertKind::RecoveryScoreLow,
                    severity: AlertSeverity::Warning,
                    message: format!(
                        "Recovery score below {:.0} for {} days",
                        c.recovery_low_score, streaks.recovery_low_days
                    ),
                    value: score,
                    threshold: c.recovery_low_score,
                    recommendation: "Keep sessions easy until recovery rebounds".to_string(),
                });
            }
        }

        self.blindspot_alerts(input, tsb, ramp, &mut alerts);

        for alert in &alerts {
            warn!(kind = ?alert.kind, severity = %alert.severity, "{}", alert.message);
        }
        alerts
    }

    fn blindspot_alerts(
        &self,
        input: &AlertInput<'_>,
        tsb: f64,
        ramp: Option<f64>,
        alerts: &mut Vec<Alert>,
    ) {
        let c = &self.config;
        let params = input.params;
        let signals = input.signals;

        if params.has(BlindspotKind::LifeStressOverload) {
            if let Some(stress) = signals.raw(MetricKind::LifeStress) {
                if stress > c.life_stress_high {
                    alerts.push(Alert {
                        kind: AlertKind::LifeStressHigh,
                        severity: AlertSeverity::Warning,
                        message: format!("Life stress high at {:.0}/10", stress),
                        value: stress,
                        threshold: c.life_stress_high,
                        recommendation: "Keep today's session short and easy".to_string(),
                    });
                }
            }
        }

        if params.has(BlindspotKind::CaffeineDependency) {
            if let Some(quality) = signals.raw(MetricKind::SleepQuality) {
                if quality < c.sleep_quality_low {
                    alerts.push(Alert {
                        kind: AlertKind::CaffeineSleepQuality,
                        severity: AlertSeverity::Info,
                        message: format!("Sleep quality {:.0}/10 with regular caffeine use", quality),
                        value: quality,
                        threshold: c.sleep_quality_low,
                        recommendation: "Move the last caffeine earlier in the day".to_string(),
                    });
                }
            }
        }

        if params.has(BlindspotKind::RecoveryDeficit) {
            if let Some(average) = signals.sleep_average() {
                if average < c.sleep_average_low {
                    alerts.push(Alert {
                        kind: AlertKind::SleepAverageLow,
                        severity: AlertSeverity::Warning,
                        message: format!("7-day sleep average {:.1} h", average),
                        value: average,
                        threshold: c.sleep_average_low,
                        recommendation: "Protect sleep before adding any load".to_string(),
                    });
                }
            }
        }

        if params.has(BlindspotKind::OvertrainingRisk) {
            if let Some(ramp) = ramp.filter(|r| *r > c.ramp_warning) {
                if tsb < c.tsb_warning {
                    alerts.push(Alert {
                        kind: AlertKind::OvertrainingPattern,
                        severity: AlertSeverity::Critical,
                        message: format!(
                            "Deep fatigue (TSB {:.1}) while ramping {:.1}/week",
                            tsb, ramp
                        ),
                        value: tsb,
                        threshold: c.tsb_warning,
                        recommendation: "Matches a past overtraining pattern - take a recovery block"
                            .to_string(),
                    });
                }
            }
        }
    }
}

//! Signal normalizer
//!
//! Validates one day's raw metrics, expresses each against the athlete's own
//! baseline (ratio and z-score) and carries recent good values forward when a
//! reading is missing or rejected. Only baselines built from earlier days are
//! consulted.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::baseline::AthleteBaseline;
use crate::error::DataQualityIssue;
use crate::models::{DailyMetricRecord, MetricKind};

/// Where a normalized value came from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalSource {
    /// Measured today
    Measured,
    /// Last known good value from an earlier day
    CarriedForward { from: NaiveDate },
}

/// One metric expressed against the athlete's baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMetric {
    pub raw: f64,
    /// value / long-window mean; None until the baseline is usable
    pub ratio_to_baseline: Option<f64>,
    pub z_score: Option<f64>,
    /// Acute (7-day) mean of earlier days
    pub acute_mean: Option<f64>,
    pub stale: bool,
    pub source: SignalSource,
}

/// Normalized view of one athlete-day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSignals {
    pub date: NaiveDate,
    pub metrics: BTreeMap<MetricKind, NormalizedMetric>,
    /// Sleep hours for the acute window, oldest first, today last when measured
    pub recent_sleep: Vec<f64>,
    pub issues: Vec<DataQualityIssue>,
}

impl NormalizedSignals {
    pub fn get(&self, metric: MetricKind) -> Option<&NormalizedMetric> {
        self.metrics.get(&metric)
    }

    pub fn ratio(&self, metric: MetricKind) -> Option<f64> {
        self.get(metric).and_then(|m| m.ratio_to_baseline)
    }

    pub fn raw(&self, metric: MetricKind) -> Option<f64> {
        self.get(metric).map(|m| m.raw)
    }

    /// True if any used value was carried forward
    pub fn has_stale(&self) -> bool {
        self.metrics.values().any(|m| m.stale)
    }

    /// Accumulated sleep shortfall against `target_hours` over the acute window
    pub fn sleep_debt(&self, target_hours: f64) -> Option<f64> {
        if self.recent_sleep.is_empty() {
            return None;
        }
        Some(
            self.recent_sleep
                .iter()
                .map(|h| (target_hours - h).max(0.0))
                .sum(),
        )
    }

    /// Mean sleep over the acute window
    pub fn sleep_average(&self) -> Option<f64> {
        if self.recent_sleep.is_empty() {
            return None;
        }
        Some(self.recent_sleep.iter().sum::<f64>() / self.recent_sleep.len() as f64)
    }

    /// Today's measured values for baselined metrics, ready to push
    pub fn measured_values(&self) -> Vec<(MetricKind, f64)> {
        MetricKind::BASELINED
            .iter()
            .filter_map(|metric| {
                self.metrics
                    .get(metric)
                    .filter(|m| m.source == SignalSource::Measured)
                    .map(|m| (*metric, m.raw))
            })
            .collect()
    }
}

/// Last known good normalized value per metric
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarryForwardState {
    last_good: BTreeMap<MetricKind, (NaiveDate, NormalizedMetric)>,
}

impl CarryForwardState {
    pub fn last_good(&self, metric: MetricKind) -> Option<&(NaiveDate, NormalizedMetric)> {
        self.last_good.get(&metric)
    }
}

/// Stateless normalizer; carry-forward state lives in the athlete context
#[derive(Debug, Clone, Default)]
pub struct SignalNormalizer;

impl SignalNormalizer {
    pub fn new() -> Self {
        SignalNormalizer
    }

    pub fn normalize(
        &self,
        record: &DailyMetricRecord,
        baseline: &AthleteBaseline,
        carry: &mut CarryForwardState,
    ) -> NormalizedSignals {
        let mut metrics = BTreeMap::new();
        let mut issues = Vec::new();
        let date = record.date;

        for metric in MetricKind::BASELINED {
            let measured = match self.validated_value(record, metric) {
                Ok(value) => value,
                Err(issue) => {
                    issues.push(issue);
                    None
                }
            };

            match measured {
                Some(raw) => {
                    let normalized = self.against_baseline(metric, raw, baseline, &mut issues);
                    carry.last_good.insert(metric, (date, normalized.clone()));
                    metrics.insert(metric, normalized);
                }
                None => {
                    if let Some(carried) =
                        self.carried(metric, date, baseline.config().max_carry_forward_days, carry)
                    {
                        if let SignalSource::CarriedForward { from } = carried.source {
                            issues.push(DataQualityIssue::StaleValue { metric, from });
                        }
                        metrics.insert(metric, carried);
                    }
                }
            }
        }

        for metric in MetricKind::SUBJECTIVE {
            if let Some(value) = record.value(metric) {
                if (1.0..=10.0).contains(&value) {
                    metrics.insert(
                        metric,
                        NormalizedMetric {
                            raw: value,
                            ratio_to_baseline: None,
                            z_score: None,
                            acute_mean: None,
                            stale: false,
                            source: SignalSource::Measured,
                        },
                    );
                } else {
                    issues.push(DataQualityIssue::InvalidMetricValue {
                        metric,
                        value,
                        reason: "subjective ratings must be 1-10".to_string(),
                    });
                }
            }
        }

        // Nights inside the acute window ending today
        let mut recent_sleep: Vec<f64> = baseline
            .get(MetricKind::SleepHours)
            .map(|b| b.acute().values_as_of(date).collect())
            .unwrap_or_default();
        if let Some(m) = metrics.get(&MetricKind::SleepHours) {
            if m.source == SignalSource::Measured {
                recent_sleep.push(m.raw);
            }
        }

        debug!(
            date = %date,
            metrics = metrics.len(),
            issues = issues.len(),
            "normalized daily signals"
        );

        NormalizedSignals {
            date,
            metrics,
            recent_sleep,
            issues,
        }
    }

    /// Range-checked raw value; Err carries the rejection reason
    fn validated_value(
        &self,
        record: &DailyMetricRecord,
        metric: MetricKind,
    ) -> Result<Option<f64>, DataQualityIssue> {
        if metric == MetricKind::OrthostaticDelta {
            let Some(pair) = record.orthostatic else {
                return Ok(None);
            };
            let in_range = |hr: f64| hr.is_finite() && (25.0..=220.0).contains(&hr);
            if !in_range(pair.lying_hr) || !in_range(pair.standing_hr) {
                return Err(DataQualityIssue::InvalidMetricValue {
                    metric,
                    value: pair.delta(),
                    reason: "orthostatic heart rate outside 25-220 bpm".to_string(),
                });
            }
            if pair.standing_hr < pair.lying_hr - 10.0 {
                return Err(DataQualityIssue::InvalidMetricValue {
                    metric,
                    value: pair.delta(),
                    reason: "standing heart rate implausibly below lying".to_string(),
                });
            }
            return Ok(Some(pair.delta()));
        }

        let Some(value) = record.value(metric) else {
            return Ok(None);
        };
        let (min, max) = metric.valid_range();
        if !value.is_finite() || value < min || value > max {
            return Err(DataQualityIssue::InvalidMetricValue {
                metric,
                value,
                reason: format!("outside plausible range {}-{}", min, max),
            });
        }
        Ok(Some(value))
    }

    fn against_baseline(
        &self,
        metric: MetricKind,
        raw: f64,
        baseline: &AthleteBaseline,
        issues: &mut Vec<DataQualityIssue>,
    ) -> NormalizedMetric {
        let mut normalized = NormalizedMetric {
            raw,
            ratio_to_baseline: None,
            z_score: None,
            acute_mean: None,
            stale: false,
            source: SignalSource::Measured,
        };

        match baseline.usable(metric) {
            Some(history) => {
                normalized.acute_mean = history.acute_mean();
                if let Some(mean) = history.long_mean().filter(|m| m.abs() > f64::EPSILON) {
                    normalized.ratio_to_baseline = Some(raw / mean);
                    normalized.z_score = history
                        .long_std()
                        .filter(|s| *s > 0.0)
                        .map(|s| (raw - mean) / s);
                }
            }
            None => issues.push(DataQualityIssue::MissingBaselineData {
                metric,
                available: baseline.get(metric).map(|b| b.samples()).unwrap_or(0),
                required: baseline.config().min_baseline_days,
            }),
        }

        normalized
    }

    fn carried(
        &self,
        metric: MetricKind,
        date: NaiveDate,
        max_days: i64,
        carry: &CarryForwardState,
    ) -> Option<NormalizedMetric> {
        let (from, value) = carry.last_good(metric)?;
        let age = (date - *from).num_days();
        if age <= 0 || age > max_days {
            return None;
        }
        Some(NormalizedMetric {
            stale: true,
            source: SignalSource::CarriedForward { from: *from },
            ..value.clone()
        })
    }
}

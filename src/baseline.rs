//! Rolling personal baselines for daily metrics
//!
//! Each tracked metric keeps an acute window (7 days) and a long window
//! (60 days). Windows span calendar days ending at the latest recorded day,
//! so missing nights shrink a window instead of stretching it back in time.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, VecDeque};

use crate::error::{CalculationError, ReadyError};
use crate::models::MetricKind;

/// Baseline window configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineConfig {
    /// Acute window length in days (default: 7)
    pub acute_window: usize,

    /// Long window length in days (default: 60)
    pub long_window: usize,

    /// Samples required before a baseline is usable (default: 5)
    pub min_baseline_days: usize,

    /// Days a last-known-good value may be carried forward (default: 3)
    pub max_carry_forward_days: i64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        BaselineConfig {
            acute_window: 7,
            long_window: 60,
            min_baseline_days: 5,
            max_carry_forward_days: 3,
        }
    }
}

impl BaselineConfig {
    pub fn validate(&self) -> Result<(), ReadyError> {
        if self.acute_window == 0 || self.long_window < self.acute_window {
            return Err(ReadyError::Configuration(format!(
                "baseline windows invalid: acute {} long {}",
                self.acute_window, self.long_window
            )));
        }
        if self.min_baseline_days == 0 || self.min_baseline_days > self.long_window {
            return Err(ReadyError::Configuration(format!(
                "min_baseline_days must be between 1 and {}",
                self.long_window
            )));
        }
        if self.max_carry_forward_days < 0 {
            return Err(ReadyError::Configuration(
                "max_carry_forward_days cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Dated values covering the last `span_days` calendar days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingWindow {
    span_days: usize,
    entries: VecDeque<(NaiveDate, f64)>,
}

impl RollingWindow {
    pub fn new(span_days: usize) -> Self {
        RollingWindow {
            span_days,
            entries: VecDeque::with_capacity(span_days),
        }
    }

    /// Append a value; dates must not decrease
    pub fn push(&mut self, date: NaiveDate, value: f64) {
        self.entries.push_back((date, value));
        self.expire(date);
    }

    /// Drop values older than the window as seen from `today`
    pub fn expire(&mut self, today: NaiveDate) {
        while let Some((date, _)) = self.entries.front() {
            if Self::within(self.span_days, *date, today) {
                break;
            }
            self.entries.pop_front();
        }
    }

    fn within(span_days: usize, date: NaiveDate, today: NaiveDate) -> bool {
        (today - date).num_days() < span_days as i64
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.values().mean())
        }
    }

    /// Sample standard deviation; needs at least two values
    pub fn std_dev(&self) -> Option<f64> {
        if self.entries.len() < 2 {
            None
        } else {
            Some(self.values().std_dev())
        }
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(_, value)| *value)
    }

    /// Values whose date falls inside the window ending on `today`
    pub fn values_as_of(&self, today: NaiveDate) -> impl Iterator<Item = f64> + '_ {
        let span = self.span_days;
        self.entries
            .iter()
            .filter(move |(date, _)| *date <= today && Self::within(span, *date, today))
            .map(|(_, value)| *value)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.entries.front().map(|(date, _)| *date)
    }
}

/// Acute and long windows for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricBaseline {
    acute: RollingWindow,
    long: RollingWindow,
}

impl MetricBaseline {
    pub fn new(config: &BaselineConfig) -> Self {
        MetricBaseline {
            acute: RollingWindow::new(config.acute_window),
            long: RollingWindow::new(config.long_window),
        }
    }

    pub fn push(&mut self, date: NaiveDate, value: f64) {
        self.acute.push(date, value);
        self.long.push(date, value);
    }

    pub fn expire(&mut self, today: NaiveDate) {
        self.acute.expire(today);
        self.long.expire(today);
    }

    /// Number of samples in the long window
    pub fn samples(&self) -> usize {
        self.long.len()
    }

    pub fn acute_mean(&self) -> Option<f64> {
        self.acute.mean()
    }

    pub fn long_mean(&self) -> Option<f64> {
        self.long.mean()
    }

    pub fn long_std(&self) -> Option<f64> {
        self.long.std_dev()
    }

    pub fn acute(&self) -> &RollingWindow {
        &self.acute
    }
}

/// Per-athlete baselines for every tracked metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AthleteBaseline {
    config: BaselineConfig,
    metrics: BTreeMap<MetricKind, MetricBaseline>,
    last_date: Option<NaiveDate>,
}

impl AthleteBaseline {
    pub fn new(config: BaselineConfig) -> Self {
        let metrics = MetricKind::BASELINED
            .iter()
            .map(|metric| (*metric, MetricBaseline::new(&config)))
            .collect();
        AthleteBaseline {
            config,
            metrics,
            last_date: None,
        }
    }

    pub fn config(&self) -> &BaselineConfig {
        &self.config
    }

    pub fn get(&self, metric: MetricKind) -> Option<&MetricBaseline> {
        self.metrics.get(&metric)
    }

    /// Baseline with enough samples to normalize against
    pub fn usable(&self, metric: MetricKind) -> Option<&MetricBaseline> {
        self.get(metric)
            .filter(|b| b.samples() >= self.config.min_baseline_days)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.last_date
    }

    /// Append one day of values. Days must strictly increase.
    pub fn push_day(
        &mut self,
        date: NaiveDate,
        values: &[(MetricKind, f64)],
    ) -> Result<(), CalculationError> {
        if let Some(last) = self.last_date {
            if date <= last {
                return Err(CalculationError::InvalidParameter {
                    calculation: "athlete baseline".to_string(),
                    parameter: "date".to_string(),
                    value: format!("{} is not after {}", date, last),
                });
            }
        }

        for (metric, baseline) in self.metrics.iter_mut() {
            match values.iter().find(|(m, _)| m == metric) {
                Some((_, value)) => baseline.push(date, *value),
                None => baseline.expire(date),
            }
        }
        self.last_date = Some(date);
        Ok(())
    }
}

impl Default for AthleteBaseline {
    fn default() -> Self {
        Self::new(BaselineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn test_rolling_window_evicts_oldest() {
        let mut window = RollingWindow::new(3);
        for (day, value) in [(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0)] {
            window.push(date(day), value);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.first_date(), Some(date(2)));
        assert!((window.mean().unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_spans_calendar_days() {
        let mut window = RollingWindow::new(7);
        // nights 3 and 5-8 missing
        for (day, value) in [(1, 6.0), (2, 7.0), (4, 8.0), (9, 5.0)] {
            window.push(date(day), value);
        }
        assert_eq!(window.values().collect::<Vec<_>>(), vec![8.0, 5.0]);

        // as of day 12 only the day-9 value is inside the last 7 days
        assert_eq!(window.values_as_of(date(12)).collect::<Vec<_>>(), vec![5.0]);
        assert_eq!(window.values_as_of(date(17)).count(), 0);
    }

    #[test]
    fn test_std_dev_needs_two_values() {
        let mut window = RollingWindow::new(5);
        window.push(date(1), 10.0);
        assert!(window.std_dev().is_none());
        window.push(date(2), 14.0);
        // sample std of [10, 14]
        assert!((window.std_dev().unwrap() - 2.828_427).abs() < 1e-5);
    }

    #[test]
    fn test_acute_and_long_windows() {
        let config = BaselineConfig {
            acute_window: 2,
            long_window: 4,
            min_baseline_days: 2,
            max_carry_forward_days: 3,
        };
        let mut baseline = MetricBaseline::new(&config);
        for (day, value) in [(1, 10.0), (2, 20.0), (3, 30.0), (4, 40.0), (5, 50.0)] {
            baseline.push(date(day), value);
        }
        assert_eq!(baseline.samples(), 4);
        assert!((baseline.acute_mean().unwrap() - 45.0).abs() < 1e-9);
        assert!((baseline.long_mean().unwrap() - 35.0).abs() < 1e-9);
    }

    #[test]
    fn test_usable_after_min_days() {
        let mut baseline = AthleteBaseline::default();
        for day in 1..=4 {
            baseline
                .push_day(date(day), &[(MetricKind::Hrv, 60.0)])
                .unwrap();
        }
        assert!(baseline.usable(MetricKind::Hrv).is_none());

        baseline
            .push_day(date(5), &[(MetricKind::Hrv, 60.0)])
            .unwrap();
        assert!(baseline.usable(MetricKind::Hrv).is_some());
        assert!(baseline.usable(MetricKind::RestingHr).is_none());
    }

    #[test]
    fn test_push_day_expires_metrics_without_a_value() {
        let mut baseline = AthleteBaseline::default();
        baseline
            .push_day(date(1), &[(MetricKind::SleepHours, 7.0)])
            .unwrap();
        baseline.push_day(date(8), &[(MetricKind::Hrv, 60.0)]).unwrap();

        let sleep = baseline.get(MetricKind::SleepHours).unwrap();
        assert!(sleep.acute().is_empty());
        assert_eq!(sleep.samples(), 1);
    }

    #[test]
    fn test_push_day_is_chronological() {
        let mut baseline = AthleteBaseline::default();
        baseline.push_day(date(10), &[]).unwrap();
        assert!(baseline.push_day(date(10), &[]).is_err());
        assert!(baseline.push_day(date(9), &[]).is_err());
        assert!(baseline.push_day(date(11), &[]).is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = BaselineConfig {
            acute_window: 10,
            long_window: 5,
            min_baseline_days: 3,
            max_carry_forward_days: 3,
        };
        assert!(config.validate().is_err());
    }
}

//! Load accumulator: chronic and acute training load
//!
//! Classic impulse-response model. CTL and ATL are exponentially weighted
//! averages of daily training stress with 42 and 7 day time constants by
//! default. TSB is always derived as `ctl - atl` and never stored.
//!
//! All arithmetic uses `Decimal` so a replay of the same inputs yields
//! bit-identical load states.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CalculationError, DataQualityIssue, ReadyError};

/// PMC configuration with customizable time constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmcConfig {
    /// CTL time constant in days (default: 42)
    pub ctl_time_constant: u16,

    /// ATL time constant in days (default: 7)
    pub atl_time_constant: u16,

    /// Ramp rate calculation period in days
    pub ramp_rate_days: u16,

    /// Daily stress above this is rejected as implausible
    pub max_daily_stress: Decimal,
}

impl Default for PmcConfig {
    fn default() -> Self {
        PmcConfig {
            ctl_time_constant: 42,
            atl_time_constant: 7,
            ramp_rate_days: 7,
            max_daily_stress: Decimal::from(1000),
        }
    }
}

impl PmcConfig {
    pub fn validate(&self) -> Result<(), ReadyError> {
        if self.ctl_time_constant == 0 || self.atl_time_constant == 0 {
            return Err(ReadyError::Configuration(
                "PMC time constants must be at least one day".to_string(),
            ));
        }
        if self.ramp_rate_days == 0 {
            return Err(ReadyError::Configuration(
                "ramp_rate_days must be at least one day".to_string(),
            ));
        }
        if self.max_daily_stress <= Decimal::ZERO {
            return Err(ReadyError::Configuration(
                "max_daily_stress must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load state at the end of one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadState {
    /// Date these values are computed for
    pub date: NaiveDate,

    /// Chronic Training Load (fitness)
    pub ctl: Decimal,

    /// Acute Training Load (fatigue)
    pub atl: Decimal,

    /// Stress value used for this day
    pub daily_stress: Decimal,

    /// CTL change per week; None until a full ramp window of history exists
    pub ramp_rate: Option<Decimal>,
}

impl LoadState {
    /// Empty load state (no history)
    pub fn zero(date: NaiveDate) -> Self {
        LoadState {
            date,
            ctl: Decimal::ZERO,
            atl: Decimal::ZERO,
            daily_stress: Decimal::ZERO,
            ramp_rate: None,
        }
    }

    /// Training Stress Balance (form)
    pub fn tsb(&self) -> Decimal {
        self.ctl - self.atl
    }

    pub fn interpretation(&self) -> TsbInterpretation {
        TsbInterpretation::from_tsb(self.tsb())
    }
}

/// Training Stress Balance interpretation ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TsbInterpretation {
    VeryFresh,    // +25 and above
    Fresh,        // +5 to +25
    Neutral,      // -10 to +5
    Fatigued,     // -30 to -10
    VeryFatigued, // Below -30
}

impl TsbInterpretation {
    /// Get TSB interpretation from numeric value
    pub fn from_tsb(tsb: Decimal) -> Self {
        if tsb >= Decimal::from(25) {
            TsbInterpretation::VeryFresh
        } else if tsb >= Decimal::from(5) {
            TsbInterpretation::Fresh
        } else if tsb >= Decimal::from(-10) {
            TsbInterpretation::Neutral
        } else if tsb >= Decimal::from(-30) {
            TsbInterpretation::Fatigued
        } else {
            TsbInterpretation::VeryFatigued
        }
    }

    /// Get interpretation description
    pub fn description(&self) -> &'static str {
        match self {
            TsbInterpretation::VeryFresh => "Very fresh (may be losing fitness)",
            TsbInterpretation::Fresh => "Fresh and ready for hard training",
            TsbInterpretation::Neutral => "Neutral (normal training)",
            TsbInterpretation::Fatigued => "Fatigued (monitor closely)",
            TsbInterpretation::VeryFatigued => "Very fatigued (rest needed)",
        }
    }
}

/// Core PMC calculation engine
#[derive(Debug, Clone)]
pub struct PmcCalculator {
    config: PmcConfig,
}

impl PmcCalculator {
    /// Create new PMC calculator with default configuration
    pub fn new() -> Self {
        PmcCalculator {
            config: PmcConfig::default(),
        }
    }

    /// Create new PMC calculator with custom configuration
    pub fn with_config(config: PmcConfig) -> Self {
        PmcCalculator { config }
    }

    pub fn config(&self) -> &PmcConfig {
        &self.config
    }

    /// Reject negative or implausible stress; rejected values count as zero
    pub fn sanitize_stress(&self, stress: Decimal) -> (Decimal, Option<DataQualityIssue>) {
        if stress < Decimal::ZERO {
            return (
                Decimal::ZERO,
                Some(DataQualityIssue::InvalidTrainingStress {
                    value: stress.to_string(),
                    reason: "negative training stress".to_string(),
                }),
            );
        }
        if stress > self.config.max_daily_stress {
            return (
                Decimal::ZERO,
                Some(DataQualityIssue::InvalidTrainingStress {
                    value: stress.to_string(),
                    reason: format!("exceeds daily cap of {}", self.config.max_daily_stress),
                }),
            );
        }
        (stress, None)
    }

    /// Advance one day from `previous` with today's stress.
    ///
    /// `ctl_window_start` is the CTL at the start of the ramp window, if known.
    pub fn next_state(
        &self,
        previous: &LoadState,
        date: NaiveDate,
        stress: Decimal,
        ctl_window_start: Option<Decimal>,
    ) -> LoadState {
        // CTL_today = CTL_yesterday + (TSS_today - CTL_yesterday) × (1/time_constant)
        let ctl_factor = Decimal::ONE / Decimal::from(self.config.ctl_time_constant);
        let ctl = previous.ctl + (stress - previous.ctl) * ctl_factor;

        let atl_factor = Decimal::ONE / Decimal::from(self.config.atl_time_constant);
        let atl = previous.atl + (stress - previous.atl) * atl_factor;

        let ramp_rate = ctl_window_start.map(|past_ctl| {
            let weeks = Decimal::from(self.config.ramp_rate_days) / Decimal::from(7);
            (ctl - past_ctl) / weeks
        });

        LoadState {
            date,
            ctl,
            atl,
            daily_stress: stress,
            ramp_rate,
        }
    }
}

impl Default for PmcCalculator {
    fn default() -> Self {
        Self::new()
    }
}

/// Append-only per-athlete history of daily load states
#[derive(Debug, Clone)]
pub struct LoadLedger {
    calculator: PmcCalculator,
    days: BTreeMap<NaiveDate, LoadState>,
}

impl LoadLedger {
    pub fn new(config: PmcConfig) -> Self {
        LoadLedger {
            calculator: PmcCalculator::with_config(config),
            days: BTreeMap::new(),
        }
    }

    pub fn latest(&self) -> Option<&LoadState> {
        self.days.values().next_back()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&LoadState> {
        self.days.get(&date)
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadState> {
        self.days.values()
    }

    /// Decay the ledger with zero-stress days through the day before `date`
    /// and return that morning's load.
    pub fn advance_to(&mut self, date: NaiveDate) -> LoadState {
        let yesterday = match date.pred_opt() {
            Some(d) => d,
            None => return LoadState::zero(date),
        };

        let Some(latest) = self.latest().map(|s| s.date) else {
            return LoadState::zero(yesterday);
        };

        if latest < yesterday {
            self.fill_gap(latest, yesterday);
        }

        self.days
            .range(..=yesterday)
            .next_back()
            .map(|(_, state)| state.clone())
            .unwrap_or_else(|| LoadState::zero(yesterday))
    }

    /// Record today's stress, filling any gap with zero-stress days.
    ///
    /// Dates before the latest recorded day are rejected. Re-recording the
    /// latest day recomputes it from the day before.
    pub fn record(
        &mut self,
        date: NaiveDate,
        stress: Decimal,
    ) -> Result<(LoadState, Option<DataQualityIssue>), CalculationError> {
        if let Some(latest) = self.latest().map(|s| s.date) {
            if date < latest {
                return Err(CalculationError::InvalidParameter {
                    calculation: "load ledger".to_string(),
                    parameter: "date".to_string(),
                    value: format!("{} precedes latest recorded day {}", date, latest),
                });
            }
            if date == latest {
                self.days.remove(&date);
            } else if let Some(yesterday) = date.pred_opt() {
                if latest < yesterday {
                    self.fill_gap(latest, yesterday);
                }
            }
        }

        let (stress, issue) = self.calculator.sanitize_stress(stress);
        let state = self.compute(date, stress);
        self.days.insert(date, state.clone());
        Ok((state, issue))
    }

    fn fill_gap(&mut self, from_exclusive: NaiveDate, to_inclusive: NaiveDate) {
        let mut current = from_exclusive.succ_opt();
        while let Some(day) = current {
            if day > to_inclusive {
                break;
            }
            let state = self.compute(day, Decimal::ZERO);
            self.days.insert(day, state);
            current = day.succ_opt();
        }
    }

    fn compute(&self, date: NaiveDate, stress: Decimal) -> LoadState {
        let previous = date
            .pred_opt()
            .and_then(|d| self.days.get(&d).cloned())
            .unwrap_or_else(|| LoadState::zero(date));

        let window = u64::from(self.calculator.config().ramp_rate_days);
        let window_start = date
            .checked_sub_days(Days::new(window))
            .and_then(|d| self.days.get(&d))
            .map(|s| s.ctl);

        self.calculator.next_state(&previous, date, stress, window_start)
    }
}

impl Default for LoadLedger {
    fn default() -> Self {
        Self::new(PmcConfig::default())
    }
}

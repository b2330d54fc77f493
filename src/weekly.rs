//! Weekly planner
//!
//! A weekly intent is not a schedule. It sets how many key sessions the week
//! may hold, a volume range and a load ceiling, generated from the athlete's
//! state on the first processed day of the week (Monday start). Key sessions
//! are spent as they are completed; missed ones are not carried into the next
//! week. At the boundary the old intent is closed and reviewed, and the review
//! reports recalibration signals without changing any threshold itself.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::blindspot::{EffectiveParameters, Parameter};
use crate::error::{ReadyError, Result};
use crate::models::{SessionClass, TrainingPhase};

/// Planner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    pub base_key_sessions: u8,
    /// TSB above this is fresh
    pub fresh_tsb: f64,
    /// TSB above this (and not fresh) is normal
    pub normal_tsb: f64,
    /// TSB above this (and not normal) is tired; below is exhausted
    pub tired_tsb: f64,
    pub high_readiness: f64,
    pub moderate_readiness: f64,
    pub low_readiness: f64,
    /// Readiness assumed before any score exists
    pub initial_readiness: f64,
    /// Training stress per available hour for the load ceiling
    pub load_per_hour: f64,
    /// Half-width of the volume range as a fraction
    pub volume_spread: f64,
    /// Points below the key threshold that count as a near miss
    pub near_miss_margin: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            base_key_sessions: 2,
            fresh_tsb: 5.0,
            normal_tsb: -5.0,
            tired_tsb: -15.0,
            high_readiness: 75.0,
            moderate_readiness: 60.0,
            low_readiness: 45.0,
            initial_readiness: 70.0,
            load_per_hour: 50.0,
            volume_spread: 0.15,
            near_miss_margin: 5.0,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> std::result::Result<(), ReadyError> {
        if !(self.fresh_tsb > self.normal_tsb && self.normal_tsb > self.tired_tsb) {
            return Err(ReadyError::Configuration(
                "planner TSB thresholds must satisfy fresh > normal > tired".to_string(),
            ));
        }
        if !(self.high_readiness > self.moderate_readiness
            && self.moderate_readiness > self.low_readiness)
        {
            return Err(ReadyError::Configuration(
                "planner readiness thresholds must satisfy high > moderate > low".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.volume_spread) || self.load_per_hour <= 0.0 {
            return Err(ReadyError::Configuration(
                "planner volume_spread must be in [0, 1) and load_per_hour positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fatigue status from TSB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatigueStatus {
    Fresh,
    Normal,
    Tired,
    Exhausted,
}

impl FatigueStatus {
    pub fn from_tsb(tsb: f64, config: &PlannerConfig) -> Self {
        if tsb > config.fresh_tsb {
            FatigueStatus::Fresh
        } else if tsb > config.normal_tsb {
            FatigueStatus::Normal
        } else if tsb > config.tired_tsb {
            FatigueStatus::Tired
        } else {
            FatigueStatus::Exhausted
        }
    }

    pub fn key_adjustment(&self) -> i16 {
        match self {
            FatigueStatus::Fresh => 1,
            FatigueStatus::Normal => 0,
            FatigueStatus::Tired => -1,
            FatigueStatus::Exhausted => -2,
        }
    }

    pub fn volume_factor(&self) -> f64 {
        match self {
            FatigueStatus::Fresh => 1.1,
            FatigueStatus::Normal => 1.0,
            FatigueStatus::Tired => 0.85,
            FatigueStatus::Exhausted => 0.7,
        }
    }
}

/// Readiness status from the latest score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStatus {
    High,
    Moderate,
    Low,
    VeryLow,
}

impl ReadinessStatus {
    pub fn from_score(score: f64, config: &PlannerConfig) -> Self {
        if score >= config.high_readiness {
            ReadinessStatus::High
        } else if score >= config.moderate_readiness {
            ReadinessStatus::Moderate
        } else if score >= config.low_readiness {
            ReadinessStatus::Low
        } else {
            ReadinessStatus::VeryLow
        }
    }

    pub fn key_adjustment(&self) -> i16 {
        match self {
            ReadinessStatus::High | ReadinessStatus::Moderate => 0,
            ReadinessStatus::Low => -1,
            ReadinessStatus::VeryLow => -2,
        }
    }
}

/// Order in which competing goals are honored this week
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityRule {
    RecoverRespondComplete,
    RespondComplete,
}

impl fmt::Display for PriorityRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityRule::RecoverRespondComplete => write!(f, "recover > respond > complete"),
            PriorityRule::RespondComplete => write!(f, "respond > complete"),
        }
    }
}

/// State the planner reads when generating an intent
#[derive(Debug, Clone, Copy)]
pub struct PlanningContext<'a> {
    pub phase: TrainingPhase,
    pub weekly_hours: f64,
    /// Morning TSB on the first processed day of the week
    pub tsb: f64,
    pub ramp_rate: Option<f64>,
    pub params: &'a EffectiveParameters,
}

/// One processed day, as seen by the weekly review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayObservation {
    pub date: NaiveDate,
    pub score: f64,
    pub overall_pass: bool,
    pub recommended: SessionClass,
    /// Gates passed and a key session remained, but the score fell just short
    pub near_miss: bool,
    pub ramp_rate: Option<f64>,
    pub sleep_hours: Option<f64>,
    pub sleep_debt_exceeded: bool,
    /// End-of-day TSB
    pub tsb: f64,
}

/// Running tallies for the week under way
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeekStats {
    pub days: u8,
    pub key_recommended: u8,
    pub gate_blocked_days: u8,
    pub near_misses: u8,
    pub sleep_debt_days: u8,
    pub score_total: f64,
    pub sleep_total: f64,
    pub sleep_days: u8,
    pub max_ramp: Option<f64>,
    pub last_tsb: Option<f64>,
}

/// Weekly intent record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyIntent {
    pub week_start: NaiveDate,
    pub key_sessions_target: u8,
    key_sessions_completed: u8,
    key_sessions_remaining: u8,
    pub volume_target_range_hours: (f64, f64),
    pub max_weekly_load_ceiling: f64,
    pub priority: PriorityRule,
    pub constraints: Vec<String>,
    pub notes: Vec<String>,
    pub phase: TrainingPhase,
    pub fatigue_status: FatigueStatus,
    pub readiness_status: ReadinessStatus,
    pub last_key_session: Option<NaiveDate>,
    closed: bool,
    stats: WeekStats,
}

impl WeeklyIntent {
    pub fn key_sessions_completed(&self) -> u8 {
        self.key_sessions_completed
    }

    pub fn key_sessions_remaining(&self) -> u8 {
        self.key_sessions_remaining
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn stats(&self) -> &WeekStats {
        &self.stats
    }

    /// Sunday of this intent's week
    pub fn week_end(&self) -> NaiveDate {
        self.week_start
            .checked_add_days(Days::new(6))
            .unwrap_or(self.week_start)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.week_start && date <= self.week_end()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ReadyError::WeekClosed {
                week_start: self.week_start,
            });
        }
        Ok(())
    }

    /// Record a completed session
    pub fn record_session(&mut self, date: NaiveDate, class: SessionClass) -> Result<()> {
        self.ensure_open()?;
        if class == SessionClass::Key {
            self.key_sessions_completed = self.key_sessions_completed.saturating_add(1);
            self.key_sessions_remaining = self
                .key_sessions_target
                .saturating_sub(self.key_sessions_completed);
            self.last_key_session = Some(date);
        }
        Ok(())
    }

    /// Fold one processed day into the week's tallies
    pub fn observe(&mut self, day: &DayObservation) -> Result<()> {
        self.ensure_open()?;
        let stats = &mut self.stats;
        stats.days = stats.days.saturating_add(1);
        stats.score_total += day.score;
        if day.recommended == SessionClass::Key {
            stats.key_recommended = stats.key_recommended.saturating_add(1);
        }
        if !day.overall_pass {
            stats.gate_blocked_days = stats.gate_blocked_days.saturating_add(1);
        }
        if day.near_miss {
            stats.near_misses = stats.near_misses.saturating_add(1);
        }
        if day.sleep_debt_exceeded {
            stats.sleep_debt_days = stats.sleep_debt_days.saturating_add(1);
        }
        if let Some(hours) = day.sleep_hours {
            stats.sleep_total += hours;
            stats.sleep_days = stats.sleep_days.saturating_add(1);
        }
        if let Some(ramp) = day.ramp_rate {
            stats.max_ramp = Some(stats.max_ramp.map_or(ramp, |m| m.max(ramp)));
        }
        stats.last_tsb = Some(day.tsb);
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Signal to the caller that a setting may need recalibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum RecalibrationSignal {
    /// Several days fell just short of the key threshold with gates clear
    KeyThresholdTooStrict { near_misses: u8, threshold: f64 },
    /// The week's key target was missed by two or more sessions
    KeyTargetTooHigh { target: u8, completed: u8 },
    /// CTL ramp exceeded the effective ceiling
    RampCeilingExceeded { max_ramp: f64, ceiling: f64 },
    /// Sleep debt stayed above the gate limit on most days
    SleepDebtPersistent { days: u8 },
    /// Gates blocked intensity on most days
    GateBlockedWeek { days: u8 },
}

/// End-of-week review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyReview {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub key_sessions_target: u8,
    pub key_sessions_completed: u8,
    pub days_recorded: u8,
    pub mean_readiness: Option<f64>,
    pub average_sleep: Option<f64>,
    pub end_tsb: Option<f64>,
    pub max_ramp: Option<f64>,
    pub wins: Vec<String>,
    pub flags: Vec<String>,
    pub suggestions: Vec<String>,
    pub signals: Vec<RecalibrationSignal>,
}

/// Start of the Monday-based week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = u64::from(date.weekday().num_days_from_monday());
    date.checked_sub_days(Days::new(offset)).unwrap_or(date)
}

/// Owns the current intent for one athlete
#[derive(Debug, Clone)]
pub struct WeeklyPlanner {
    config: PlannerConfig,
    current: Option<WeeklyIntent>,
    last_key_session: Option<NaiveDate>,
    last_readiness: Option<f64>,
}

impl WeeklyPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        WeeklyPlanner {
            config,
            current: None,
            last_key_session: None,
            last_readiness: None,
        }
    }

    pub fn current(&self) -> Option<&WeeklyIntent> {
        self.current.as_ref()
    }

    pub fn last_key_session(&self) -> Option<NaiveDate> {
        self.last_key_session
    }

    /// Make sure an open intent covers `date`. Crossing a week boundary
    /// closes the old intent and returns its review.
    pub fn roll_to(
        &mut self,
        date: NaiveDate,
        context: &PlanningContext<'_>,
    ) -> Option<WeeklyReview> {
        let start = week_start(date);
        if self.current.as_ref().is_some_and(|i| i.week_start == start) {
            return None;
        }

        let review = self.current.take().map(|mut previous| {
            previous.close();
            let review = self.review(&previous, context.params);
            info!(
                week_start = %previous.week_start,
                completed = previous.key_sessions_completed,
                target = previous.key_sessions_target,
                signals = review.signals.len(),
                "closed weekly intent"
            );
            review
        });

        let intent = self.generate(start, context);
        info!(
            week_start = %intent.week_start,
            key_target = intent.key_sessions_target,
            priority = %intent.priority,
            "generated weekly intent"
        );
        self.current = Some(intent);
        review
    }

    /// Generate an intent for the week starting `start`
    pub fn generate(&self, start: NaiveDate, context: &PlanningContext<'_>) -> WeeklyIntent {
        let config = &self.config;
        let params = context.params;
        let readiness = self.last_readiness.unwrap_or(config.initial_readiness);
        let fatigue = FatigueStatus::from_tsb(context.tsb, config);
        let readiness_status = ReadinessStatus::from_score(readiness, config);

        let mut constraints = Vec::new();
        let mut notes = Vec::new();

        let mut target = i16::from(config.base_key_sessions)
            + fatigue.key_adjustment()
            + readiness_status.key_adjustment();

        let ceiling = params.get(Parameter::RampRateCeiling);
        if let Some(ramp) = context.ramp_rate.filter(|r| *r > ceiling) {
            target -= 1;
            constraints.push("Ramp rate elevated - avoid adding load".to_string());
            notes.push(format!(
                "Ramp rate {:.1}/week exceeds the {:.1}/week ceiling",
                ramp, ceiling
            ));
        }

        let min_rest = params.get(Parameter::MinRestDaysPerWeek).max(0.0).round() as i16;
        let target = target
            .min(i16::from(context.phase.key_session_limit()))
            .min(7 - min_rest)
            .max(0) as u8;

        match fatigue {
            FatigueStatus::Exhausted => {
                constraints.push(format!(
                    "No key sessions until TSB > {}",
                    config.tired_tsb
                ));
                notes.push("Recovery week - focus on sleep and easy spinning".to_string());
            }
            FatigueStatus::Tired => {
                constraints.push("Max 1 key session early in week".to_string());
                notes.push("Accumulating fatigue - protect recovery".to_string());
            }
            _ => {}
        }
        if readiness_status == ReadinessStatus::VeryLow {
            constraints.push(format!(
                "All sessions recovery until readiness > {}",
                config.low_readiness
            ));
        }
        constraints.push(format!("At least {} rest days", min_rest));
        let fasted_cap = params.get(Parameter::FastedRideCapMinutes);
        constraints.push(format!("No fasted rides over {} min", fasted_cap));

        let hours = context
            .weekly_hours
            .min(params.get(Parameter::MaxWeeklyHours))
            .max(0.0);
        let adjusted = hours * fatigue.volume_factor() * context.phase.volume_bias();
        let round = |v: f64| (v * 10.0).round() / 10.0;
        let volume = (
            round(adjusted * (1.0 - config.volume_spread)),
            round(adjusted * (1.0 + config.volume_spread)),
        );
        let ceiling_load = (hours * config.load_per_hour * fatigue.volume_factor()).floor();

        let priority = if matches!(fatigue, FatigueStatus::Tired | FatigueStatus::Exhausted)
            || matches!(readiness_status, ReadinessStatus::Low | ReadinessStatus::VeryLow)
        {
            PriorityRule::RecoverRespondComplete
        } else {
            PriorityRule::RespondComplete
        };

        debug!(
            ?fatigue,
            ?readiness_status,
            target,
            hours,
            "weekly intent inputs"
        );

        WeeklyIntent {
            week_start: start,
            key_sessions_target: target,
            key_sessions_completed: 0,
            key_sessions_remaining: target,
            volume_target_range_hours: volume,
            max_weekly_load_ceiling: ceiling_load,
            priority,
            constraints,
            notes,
            phase: context.phase,
            fatigue_status: fatigue,
            readiness_status,
            last_key_session: self.last_key_session,
            closed: false,
            stats: WeekStats::default(),
        }
    }

    /// Record a completed session on the open intent
    pub fn record_session(&mut self, date: NaiveDate, class: SessionClass) -> Result<()> {
        let intent = self.open_intent(date)?;
        intent.record_session(date, class)?;
        if class == SessionClass::Key {
            self.last_key_session = Some(date);
        }
        Ok(())
    }

    /// Fold a processed day into the open intent
    pub fn observe(&mut self, day: &DayObservation) -> Result<()> {
        self.open_intent(day.date)?.observe(day)?;
        self.last_readiness = Some(day.score);
        Ok(())
    }

    fn open_intent(&mut self, date: NaiveDate) -> Result<&mut WeeklyIntent> {
        match self.current.as_mut() {
            Some(intent) if intent.contains(date) => Ok(intent),
            Some(intent) => Err(ReadyError::WeekClosed {
                week_start: intent.week_start,
            }),
            None => Err(ReadyError::Internal(format!(
                "no weekly intent covers {}",
                date
            ))),
        }
    }

    /// Review a closed week
    pub fn review(&self, intent: &WeeklyIntent, params: &EffectiveParameters) -> WeeklyReview {
        let stats = &intent.stats;
        let mean_readiness =
            (stats.days > 0).then(|| stats.score_total / f64::from(stats.days));
        let average_sleep =
            (stats.sleep_days > 0).then(|| stats.sleep_total / f64::from(stats.sleep_days));

        let mut wins = Vec::new();
        let mut flags = Vec::new();
        let mut suggestions = Vec::new();
        let mut signals = Vec::new();

        if intent.key_sessions_target > 0
            && intent.key_sessions_completed >= intent.key_sessions_target
        {
            wins.push(format!(
                "All {} key sessions completed",
                intent.key_sessions_target
            ));
        }
        if let Some(tsb) = stats.last_tsb {
            if tsb > -10.0 && tsb < 10.0 {
                wins.push("TSB in optimal training range".to_string());
            }
            if tsb < -20.0 {
                flags.push(format!("TSB critically low at {:.1}", tsb));
            } else if tsb < -10.0 {
                flags.push(format!("TSB low at {:.1} - fatigue accumulating", tsb));
            }
            if tsb < -15.0 {
                suggestions
                    .push("Consider a recovery-focused week - reduce volume 20-30%".to_string());
            } else if tsb > 10.0 {
                suggestions
                    .push("Fresh legs available - good week for a key session block".to_string());
            }
        }
        if let Some(mean) = mean_readiness {
            if mean >= 80.0 {
                wins.push(format!("High average readiness ({:.0})", mean));
            } else if mean < 50.0 {
                flags.push(format!("Low average readiness ({:.0})", mean));
            }
        }
        if let Some(sleep) = average_sleep {
            if sleep >= 8.0 {
                wins.push(format!("Strong sleep averaging {:.1} hours", sleep));
            } else if sleep < 7.0 {
                flags.push(format!("Sleep deficit - averaging only {:.1} hours", sleep));
            }
            if sleep < 7.5 {
                suggestions
                    .push("Prioritize sleep - aim for 8+ hours for better adaptation".to_string());
            }
        }

        let ceiling = params.get(Parameter::RampRateCeiling);
        if let Some(max_ramp) = stats.max_ramp {
            if max_ramp > ceiling {
                flags.push(format!("Ramp rate elevated at {:.1}/week", max_ramp));
                signals.push(RecalibrationSignal::RampCeilingExceeded { max_ramp, ceiling });
            }
        }
        if stats.near_misses >= 3 && intent.key_sessions_completed < intent.key_sessions_target {
            signals.push(RecalibrationSignal::KeyThresholdTooStrict {
                near_misses: stats.near_misses,
                threshold: params.key_session_threshold(),
            });
        }
        if intent.key_sessions_completed.saturating_add(2) <= intent.key_sessions_target {
            signals.push(RecalibrationSignal::KeyTargetTooHigh {
                target: intent.key_sessions_target,
                completed: intent.key_sessions_completed,
            });
        }
        if stats.sleep_debt_days >= 4 {
            signals.push(RecalibrationSignal::SleepDebtPersistent {
                days: stats.sleep_debt_days,
            });
        }
        if stats.gate_blocked_days >= 4 {
            flags.push(format!(
                "Health gates blocked intensity on {} days",
                stats.gate_blocked_days
            ));
            signals.push(RecalibrationSignal::GateBlockedWeek {
                days: stats.gate_blocked_days,
            });
        }

        WeeklyReview {
            week_start: intent.week_start,
            week_end: intent.week_end(),
            key_sessions_target: intent.key_sessions_target,
            key_sessions_completed: intent.key_sessions_completed,
            days_recorded: stats.days,
            mean_readiness,
            average_sleep,
            end_tsb: stats.last_tsb,
            max_ramp: stats.max_ramp,
            wins,
            flags,
            suggestions,
            signals,
        }
    }
}

impl Default for WeeklyPlanner {
    fn default() -> Self {
        Self::new(PlannerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blindspot::{resolve_kinds, BlindspotKind, ParameterSet};

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 23).unwrap()
    }

    fn plus(days: u64) -> NaiveDate {
        monday().checked_add_days(Days::new(days)).unwrap()
    }

    fn context(params: &EffectiveParameters) -> PlanningContext<'_> {
        PlanningContext {
            phase: TrainingPhase::Build,
            weekly_hours: 10.0,
            tsb: 0.0,
            ramp_rate: None,
            params,
        }
    }

    fn observation(date: NaiveDate) -> DayObservation {
        DayObservation {
            date,
            score: 70.0,
            overall_pass: true,
            recommended: SessionClass::Support,
            near_miss: false,
            ramp_rate: Some(3.0),
            sleep_hours: Some(7.5),
            sleep_debt_exceeded: false,
            tsb: -5.0,
        }
    }

    #[test]
    fn test_week_start_is_monday() {
        assert_eq!(week_start(monday()), monday());
        assert_eq!(week_start(plus(6)), monday());
        assert_eq!(week_start(plus(7)), plus(7));
    }

    #[test]
    fn test_generate_normal_week() {
        let params = EffectiveParameters::default();
        let planner = WeeklyPlanner::default();
        let intent = planner.generate(monday(), &context(&params));

        assert_eq!(intent.key_sessions_target, 2);
        assert_eq!(intent.key_sessions_remaining(), 2);
        assert_eq!(intent.priority, PriorityRule::RespondComplete);
        assert_eq!(intent.volume_target_range_hours, (8.5, 11.5));
        assert_eq!(intent.max_weekly_load_ceiling, 500.0);
    }

    #[test]
    fn test_fresh_build_week_and_phase_limit() {
        let params = EffectiveParameters::default();
        let planner = WeeklyPlanner::default();
        let mut ctx = context(&params);
        ctx.tsb = 12.0;
        assert_eq!(planner.generate(monday(), &ctx).key_sessions_target, 3);

        ctx.phase = TrainingPhase::Taper;
        assert_eq!(planner.generate(monday(), &ctx).key_sessions_target, 1);
    }

    #[test]
    fn test_exhausted_week_has_no_key_sessions() {
        let params = EffectiveParameters::default();
        let planner = WeeklyPlanner::default();
        let mut ctx = context(&params);
        ctx.tsb = -25.0;
        let intent = planner.generate(monday(), &ctx);

        assert_eq!(intent.key_sessions_target, 0);
        assert_eq!(intent.priority, PriorityRule::RecoverRespondComplete);
        assert!(intent.constraints.iter().any(|c| c.contains("No key sessions")));
    }

    #[test]
    fn test_ramp_ceiling_and_hours_cap() {
        let params = resolve_kinds(
            &[BlindspotKind::OvertrainingRisk, BlindspotKind::TimeCrunched]
                .into_iter()
                .collect(),
            &ParameterSet::default(),
        );
        let planner = WeeklyPlanner::default();
        let mut ctx = context(&params);
        ctx.ramp_rate = Some(6.0);
        let intent = planner.generate(monday(), &ctx);

        assert_eq!(intent.key_sessions_target, 1);
        assert!(intent.constraints.iter().any(|c| c.contains("Ramp rate")));
        assert!(intent.constraints.iter().any(|c| c == "At least 2 rest days"));
        assert_eq!(intent.max_weekly_load_ceiling, 400.0);
    }

    #[test]
    fn test_remaining_clamped() {
        let params = EffectiveParameters::default();
        let mut planner = WeeklyPlanner::default();
        planner.roll_to(monday(), &context(&params));

        for day in 0..3 {
            planner.record_session(plus(day), SessionClass::Key).unwrap();
        }
        let intent = planner.current().unwrap();
        assert_eq!(intent.key_sessions_completed(), 3);
        assert_eq!(intent.key_sessions_remaining(), 0);
        assert_eq!(planner.last_key_session(), Some(plus(2)));
    }

    #[test]
    fn test_roll_closes_and_reviews() {
        let params = EffectiveParameters::default();
        let mut planner = WeeklyPlanner::default();
        assert!(planner.roll_to(monday(), &context(&params)).is_none());
        assert!(planner.roll_to(plus(3), &context(&params)).is_none());

        for day in 0..7 {
            let mut obs = observation(plus(day));
            obs.overall_pass = day >= 4;
            planner.observe(&obs).unwrap();
        }

        let review = planner.roll_to(plus(7), &context(&params)).unwrap();
        assert_eq!(review.week_start, monday());
        assert_eq!(review.days_recorded, 7);
        assert!(review
            .signals
            .contains(&RecalibrationSignal::GateBlockedWeek { days: 4 }));
        assert!(review
            .signals
            .contains(&RecalibrationSignal::KeyTargetTooHigh {
                target: 2,
                completed: 0
            }));

        let next = planner.current().unwrap();
        assert_eq!(next.week_start, plus(7));
        assert_eq!(next.key_sessions_remaining(), next.key_sessions_target);
    }

    #[test]
    fn test_closed_intent_rejects_mutation() {
        let params = EffectiveParameters::default();
        let planner = WeeklyPlanner::default();
        let mut intent = planner.generate(monday(), &context(&params));
        intent.close();

        assert!(matches!(
            intent.record_session(monday(), SessionClass::Key),
            Err(ReadyError::WeekClosed { .. })
        ));
        assert!(intent.observe(&observation(monday())).is_err());
        assert_eq!(intent.key_sessions_remaining(), 2);
    }

    #[test]
    fn test_low_readiness_reduces_next_week() {
        let params = EffectiveParameters::default();
        let mut planner = WeeklyPlanner::default();
        planner.roll_to(monday(), &context(&params));
        let mut obs = observation(plus(6));
        obs.score = 40.0;
        planner.observe(&obs).unwrap();

        planner.roll_to(plus(7), &context(&params));
        let intent = planner.current().unwrap();
        assert_eq!(intent.readiness_status, ReadinessStatus::VeryLow);
        assert_eq!(intent.key_sessions_target, 0);
    }
}

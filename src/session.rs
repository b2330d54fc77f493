//! Daily session gate
//!
//! Combines the readiness score, the health gates and the weekly intent into
//! one session class. The decision runs in a fixed order and a failed gate is
//! terminal: no score can buy back intensity on a day the body said no.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::blindspot::EffectiveParameters;
use crate::health_gates::{HealthGateResult, IntensityAllowance};
use crate::models::SessionClass;
use crate::pmc::LoadState;
use crate::readiness::ReadinessResult;
use crate::weekly::WeeklyIntent;

/// Days of recovery per unit of fatigue time constant
const GAP_DIVISOR: f64 = 3.5;

/// Rest days required between key sessions for a fatigue time constant.
///
/// Longer constants mean slower recovery and a longer gap, clamped to a week.
pub fn required_gap_days(fatigue_time_constant: f64) -> u32 {
    if !fatigue_time_constant.is_finite() || fatigue_time_constant <= 0.0 {
        return 1;
    }
    (fatigue_time_constant / GAP_DIVISOR).ceil().clamp(1.0, 7.0) as u32
}

/// Spacing since the last key session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpacingStatus {
    pub required_gap_days: u32,
    pub days_since_last_key: Option<i64>,
    pub satisfied: bool,
}

impl SpacingStatus {
    pub fn evaluate(
        date: NaiveDate,
        last_key_session: Option<NaiveDate>,
        required_gap_days: u32,
    ) -> Self {
        let days_since_last_key = last_key_session.map(|last| (date - last).num_days());
        let satisfied =
            days_since_last_key.map_or(true, |days| days >= i64::from(required_gap_days));
        SpacingStatus {
            required_gap_days,
            days_since_last_key,
            satisfied,
        }
    }
}

/// The day's session recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecommendation {
    pub date: NaiveDate,
    pub class: SessionClass,
    pub rationale: Vec<String>,
    pub spacing: SpacingStatus,
    pub intensity: IntensityAllowance,
}

/// Everything the gate reads for one day
#[derive(Debug, Clone, Copy)]
pub struct SessionContext<'a> {
    pub date: NaiveDate,
    pub readiness: &'a ReadinessResult,
    pub gates: &'a HealthGateResult,
    pub intent: &'a WeeklyIntent,
    pub params: &'a EffectiveParameters,
    pub morning_load: &'a LoadState,
    pub fatigue_time_constant: f64,
}

/// Decides the session class
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionGate;

impl SessionGate {
    pub fn new() -> Self {
        SessionGate
    }

    pub fn decide(&self, ctx: &SessionContext<'_>) -> SessionRecommendation {
        let score = ctx.readiness.score;
        let key_threshold = ctx.params.key_session_threshold();
        let support_threshold = ctx.params.support_threshold();
        let remaining = ctx.intent.key_sessions_remaining();
        let spacing = SpacingStatus::evaluate(
            ctx.date,
            ctx.intent.last_key_session,
            required_gap_days(ctx.fatigue_time_constant),
        );

        let mut rationale = Vec::new();

        let class = if !ctx.gates.overall_pass {
            let failed: Vec<String> = ctx.gates.failed().iter().map(|d| d.to_string()).collect();
            rationale.push(format!(
                "Health gate failed ({}) - recovery only regardless of readiness {:.0}",
                failed.join(", "),
                score
            ));
            SessionClass::Recovery
        } else if score >= key_threshold && remaining > 0 && spacing.satisfied {
            rationale.push(format!(
                "Readiness {:.0} meets the key threshold {:.0}",
                score, key_threshold
            ));
            rationale.push(format!(
                "{} key session(s) remaining this week",
                remaining
            ));
            SessionClass::Key
        } else if score >= support_threshold {
            if score < key_threshold {
                rationale.push(format!(
                    "Readiness {:.0} below the key threshold {:.0}",
                    score, key_threshold
                ));
            } else if remaining == 0 {
                rationale.push("No key sessions remaining this week".to_string());
            } else if let Some(days) = spacing.days_since_last_key {
                rationale.push(format!(
                    "Last key session {} day(s) ago; {} required",
                    days, spacing.required_gap_days
                ));
            }
            rationale.push(format!(
                "Readiness {:.0} supports endurance work",
                score
            ));
            SessionClass::Support
        } else {
            rationale.push(format!(
                "Readiness {:.0} below the support threshold {:.0}",
                score, support_threshold
            ));
            SessionClass::Recovery
        };

        if class != SessionClass::Recovery && !ctx.gates.marginal.is_empty() {
            let marginal: Vec<String> =
                ctx.gates.marginal.iter().map(|d| d.to_string()).collect();
            rationale.push(format!(
                "Marginal: {} - intensity {}",
                marginal.join(", "),
                ctx.gates.intensity
            ));
        }
        rationale.push(format!(
            "TSB {:.1}: {}",
            ctx.morning_load.tsb(),
            ctx.morning_load.interpretation().description()
        ));

        info!(
            date = %ctx.date,
            class = %class,
            score,
            remaining,
            spacing_ok = spacing.satisfied,
            "session decided"
        );

        SessionRecommendation {
            date: ctx.date,
            class,
            rationale,
            spacing,
            intensity: ctx.gates.intensity,
        }
    }
}

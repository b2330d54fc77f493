use rust_decimal::Decimal;
use serde::Serialize;
use std::path::Path;

use super::ExportError;
use crate::engine::DailyOutcome;

/// Flat per-day record for spreadsheets
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeRow {
    pub athlete_id: String,
    pub date: String,
    pub class: String,
    pub readiness: f64,
    pub raw_readiness: f64,
    pub strategy: String,
    pub confidence: String,
    pub ans_state: String,
    pub gates_pass: bool,
    pub failed_domains: String,
    pub marginal_domains: String,
    pub intensity: String,
    pub key_target: u8,
    pub key_completed: u8,
    pub key_remaining: u8,
    pub ctl: Decimal,
    pub atl: Decimal,
    pub tsb: Decimal,
    pub ramp_rate: Option<Decimal>,
    pub daily_stress: Decimal,
    pub alerts: usize,
    pub issues: usize,
    pub rationale: String,
}

impl From<&DailyOutcome> for OutcomeRow {
    fn from(outcome: &DailyOutcome) -> Self {
        let join = |items: Vec<String>| items.join(";");
        let dp = |d: Decimal| d.round_dp(2);

        OutcomeRow {
            athlete_id: outcome.athlete_id.clone(),
            date: outcome.date.format("%Y-%m-%d").to_string(),
            class: outcome.recommendation.class.to_string(),
            readiness: (outcome.readiness.score * 10.0).round() / 10.0,
            raw_readiness: (outcome.readiness.raw_score * 10.0).round() / 10.0,
            strategy: outcome.readiness.strategy.clone(),
            confidence: format!("{:?}", outcome.readiness.confidence),
            ans_state: outcome.ans.state.to_string(),
            gates_pass: outcome.gates.overall_pass,
            failed_domains: join(outcome.gates.failed().iter().map(|d| d.to_string()).collect()),
            marginal_domains: join(outcome.gates.marginal.iter().map(|d| d.to_string()).collect()),
            intensity: outcome.gates.intensity.to_string(),
            key_target: outcome.intent.key_sessions_target,
            key_completed: outcome.intent.key_sessions_completed(),
            key_remaining: outcome.intent.key_sessions_remaining(),
            ctl: dp(outcome.load.ctl),
            atl: dp(outcome.load.atl),
            tsb: dp(outcome.load.tsb()),
            ramp_rate: outcome.load.ramp_rate.map(dp),
            daily_stress: outcome.load.daily_stress,
            alerts: outcome.alerts.len(),
            issues: outcome.issues.len(),
            rationale: join(outcome.recommendation.rationale.clone()),
        }
    }
}

/// Export outcomes as one CSV row per athlete-day
pub fn export_outcomes_csv<P: AsRef<Path>>(
    outcomes: &[DailyOutcome],
    output_path: P,
) -> Result<(), ExportError> {
    let mut writer = ::csv::Writer::from_path(output_path)?;
    for outcome in outcomes {
        writer.serialize(OutcomeRow::from(outcome))?;
    }
    writer.flush()?;
    Ok(())
}

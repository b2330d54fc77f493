//! Per-athlete orchestration
//!
//! `DecisionEngine` holds the stateless evaluators and the readiness model.
//! Everything that accumulates over time (baselines, load ledger, weekly
//! planner, carry-forward values, alert streaks) lives in an
//! [`AthleteContext`] owned by the caller, one per athlete, so several
//! athletes can be replayed in parallel without sharing mutable state.
//!
//! A day is processed against a working copy of the athlete's state and only
//! committed when every step succeeds. The state from before the latest day
//! is kept as a checkpoint so that day can be re-submitted and recomputed.

use chrono::NaiveDate;
use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use crate::alerts::{Alert, AlertChecker, AlertInput, AlertStreaks};
use crate::ans::{AnsClassification, AnsClassifier};
use crate::baseline::AthleteBaseline;
use crate::blindspot::{EffectiveParameters, PromptContext};
use crate::config::{AthleteProfile, EngineConfig};
use crate::error::{DataQualityIssue, ErrorSeverity, ReadyError, Result};
use crate::health_gates::{HealthGateEvaluator, HealthGateResult};
use crate::models::{DailyInput, SessionClass};
use crate::normalizer::{CarryForwardState, NormalizedSignals, SignalNormalizer};
use crate::pmc::{LoadLedger, LoadState};
use crate::readiness::{
    FactorWeights, FeelSample, ReadinessInput, ReadinessModel, ReadinessResult,
    ReadinessStrategy, WeightedReadinessModel,
};
use crate::session::{SessionContext, SessionGate, SessionRecommendation};
use crate::weekly::{DayObservation, PlanningContext, WeeklyIntent, WeeklyPlanner, WeeklyReview};

/// State that accumulates day over day
#[derive(Debug, Clone)]
struct AthleteState {
    baseline: AthleteBaseline,
    ledger: LoadLedger,
    planner: WeeklyPlanner,
    carry: CarryForwardState,
    streaks: AlertStreaks,
    last_processed: Option<NaiveDate>,
}

/// Everything the engine knows about one athlete
#[derive(Debug, Clone)]
pub struct AthleteContext {
    profile: AthleteProfile,
    params: EffectiveParameters,
    param_issues: Vec<DataQualityIssue>,
    weights: FactorWeights,
    fatigue_time_constant: f64,
    state: AthleteState,
    /// State before the latest processed day
    checkpoint: Option<AthleteState>,
}

impl AthleteContext {
    pub fn new(profile: AthleteProfile, config: &EngineConfig) -> Result<Self> {
        profile.validate()?;
        let (params, param_issues) = profile.effective_parameters()?;
        for issue in &param_issues {
            warn!(athlete = %profile.id, "{}", issue);
        }
        let weights = profile
            .readiness_weights
            .clone()
            .unwrap_or_else(|| config.readiness.weights.clone());
        let fatigue_time_constant = profile.fatigue_constant(&config.pmc);

        Ok(AthleteContext {
            profile,
            params,
            param_issues,
            weights,
            fatigue_time_constant,
            state: AthleteState {
                baseline: AthleteBaseline::new(config.baseline.clone()),
                ledger: LoadLedger::new(config.pmc.clone()),
                planner: WeeklyPlanner::new(config.planner.clone()),
                carry: CarryForwardState::default(),
                streaks: AlertStreaks::default(),
                last_processed: None,
            },
            checkpoint: None,
        })
    }

    pub fn athlete_id(&self) -> &str {
        &self.profile.id
    }

    pub fn profile(&self) -> &AthleteProfile {
        &self.profile
    }

    pub fn params(&self) -> &EffectiveParameters {
        &self.params
    }

    pub fn last_processed(&self) -> Option<NaiveDate> {
        self.state.last_processed
    }

    pub fn ledger(&self) -> &LoadLedger {
        &self.state.ledger
    }

    pub fn baseline(&self) -> &AthleteBaseline {
        &self.state.baseline
    }

    pub fn current_intent(&self) -> Option<&WeeklyIntent> {
        self.state.planner.current()
    }
}

/// Audit record for one athlete-day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyOutcome {
    pub athlete_id: String,
    pub date: NaiveDate,
    /// Load at the end of the previous day, used for today's decision
    pub morning_load: LoadState,
    /// Load after today's stress
    pub load: LoadState,
    pub signals: NormalizedSignals,
    pub ans: AnsClassification,
    pub readiness: ReadinessResult,
    pub gates: HealthGateResult,
    pub recommendation: SessionRecommendation,
    /// Intent after today's completed session was recorded
    pub intent: WeeklyIntent,
    pub alerts: Vec<Alert>,
    pub issues: Vec<DataQualityIssue>,
    pub prompts: Vec<String>,
    /// Review of the previous week, emitted on the first day of a new week
    pub review: Option<WeeklyReview>,
}

/// Outcomes of one athlete's replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayResult {
    pub athlete_id: String,
    pub outcomes: Vec<DailyOutcome>,
    /// SHA-256 over the serialized outcomes
    pub digest: String,
}

/// The decision engine
pub struct DecisionEngine {
    config: EngineConfig,
    model: Box<dyn ReadinessModel>,
    normalizer: SignalNormalizer,
    ans: AnsClassifier,
    gates: HealthGateEvaluator,
    session: SessionGate,
    alerts: AlertChecker,
}

impl std::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("model", &self.model.name())
            .finish_non_exhaustive()
    }
}

impl DecisionEngine {
    /// Engine using the configured strategy. The tree strategy needs a
    /// trained model and must go through [`DecisionEngine::with_model`].
    pub fn new(config: EngineConfig) -> Result<Self> {
        match config.readiness.strategy {
            ReadinessStrategy::Weighted => {
                let model = WeightedReadinessModel::new(config.readiness.clone());
                Self::with_model(config, Box::new(model))
            }
            ReadinessStrategy::Tree => Err(ReadyError::Configuration(
                "tree readiness strategy needs a model trained from feel history".to_string(),
            )),
        }
    }

    pub fn with_model(config: EngineConfig, model: Box<dyn ReadinessModel>) -> Result<Self> {
        config.validate()?;
        info!(model = model.name(), athletes = config.athletes.len(), "engine ready");
        Ok(DecisionEngine {
            normalizer: SignalNormalizer::new(),
            ans: AnsClassifier::new(config.ans.clone()),
            gates: HealthGateEvaluator::new(config.gates.clone()),
            session: SessionGate::new(),
            alerts: AlertChecker::new(config.alerts.clone()),
            config,
            model,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Fresh context for a configured athlete
    pub fn context_for(&self, athlete_id: &str) -> Result<AthleteContext> {
        let profile = self.config.get_athlete(athlete_id).ok_or_else(|| {
            ReadyError::Configuration(format!("athlete {} is not configured", athlete_id))
        })?;
        AthleteContext::new(profile.clone(), &self.config)
    }

    /// Process one athlete-day
    pub fn process_day(&self, ctx: &mut AthleteContext, input: &DailyInput) -> Result<DailyOutcome> {
        let athlete_id = ctx.profile.id.clone();
        let date = input.date;

        if input.metrics.date != date {
            return Err(ReadyError::Configuration(format!(
                "metric record dated {} submitted for {}",
                input.metrics.date, date
            )));
        }

        let rerun = match ctx.state.last_processed {
            Some(last) if date < last => {
                let err = ReadyError::Chronology {
                    athlete_id: athlete_id.clone(),
                    last,
                    attempted: date,
                };
                error!(athlete = %athlete_id, %date, %last, "{}", err);
                return Err(err);
            }
            Some(last) => date == last,
            None => false,
        };

        let mut working = if rerun {
            debug!(athlete = %athlete_id, %date, "recomputing latest day from checkpoint");
            ctx.checkpoint
                .clone()
                .ok_or_else(|| ReadyError::Internal("missing checkpoint for rerun".to_string()))?
        } else {
            ctx.state.clone()
        };

        let outcome = self.evaluate(ctx, &mut working, input).map_err(|err| {
            error!(athlete = %athlete_id, %date, severity = ?err.severity(), "{}", err);
            err
        })?;

        working.last_processed = Some(date);
        if rerun {
            ctx.state = working;
        } else {
            ctx.checkpoint = Some(std::mem::replace(&mut ctx.state, working));
        }

        info!(
            athlete = %athlete_id,
            %date,
            class = %outcome.recommendation.class,
            score = outcome.readiness.score,
            gates_pass = outcome.gates.overall_pass,
            "day processed"
        );
        Ok(outcome)
    }

    fn evaluate(
        &self,
        ctx: &AthleteContext,
        state: &mut AthleteState,
        input: &DailyInput,
    ) -> Result<DailyOutcome> {
        let date = input.date;
        let params = &ctx.params;

        let load_known = !state.ledger.is_empty();
        let morning_load = state.ledger.advance_to(date);
        let morning_tsb = morning_load.tsb().to_f64().unwrap_or(0.0);
        let morning_ramp = morning_load.ramp_rate.and_then(|r| r.to_f64());

        let review = state.planner.roll_to(
            date,
            &PlanningContext {
                phase: ctx.profile.phase,
                weekly_hours: ctx.profile.weekly_hours,
                tsb: morning_tsb,
                ramp_rate: morning_ramp,
                params,
            },
        );

        let signals = self
            .normalizer
            .normalize(&input.metrics, &state.baseline, &mut state.carry);
        let ans = self.ans.classify(&signals);

        let readiness = self.model.score(&ReadinessInput {
            signals: &signals,
            ans: &ans,
            morning_load: &morning_load,
            load_known,
            params,
            weights: &ctx.weights,
        });

        let gates = self.gates.evaluate(&input.metrics, &signals, params);
        gates.verify(&ctx.profile.id, date)?;

        let intent_before = state
            .planner
            .current()
            .cloned()
            .ok_or_else(|| ReadyError::Internal(format!("no weekly intent for {}", date)))?;

        let recommendation = self.session.decide(&SessionContext {
            date,
            readiness: &readiness,
            gates: &gates,
            intent: &intent_before,
            params,
            morning_load: &morning_load,
            fatigue_time_constant: ctx.fatigue_time_constant,
        });

        if let Some(class) = input.completed_session {
            state.planner.record_session(date, class)?;
        }

        let (load, stress_issue) = state.ledger.record(date, input.training_stress)?;
        state.baseline.push_day(date, &signals.measured_values())?;

        let alerts = self.alerts.check(
            &AlertInput {
                load: &load,
                signals: &signals,
                params,
            },
            &mut state.streaks,
        );

        let key_threshold = params.key_session_threshold();
        let gate_config = self.gates.config();
        let near_miss = gates.overall_pass
            && intent_before.key_sessions_remaining() > 0
            && readiness.score < key_threshold
            && readiness.score >= key_threshold - self.config.planner.near_miss_margin;
        let sleep_debt_exceeded = signals
            .sleep_debt(gate_config.sleep_target_hours)
            .is_some_and(|debt| debt > gate_config.sleep_debt_max_hours);

        state.planner.observe(&DayObservation {
            date,
            score: readiness.score,
            overall_pass: gates.overall_pass,
            recommended: recommendation.class,
            near_miss,
            ramp_rate: load.ramp_rate.and_then(|r| r.to_f64()),
            sleep_hours: input.metrics.sleep_hours,
            sleep_debt_exceeded,
            tsb: load.tsb().to_f64().unwrap_or(0.0),
        })?;

        let intent = state
            .planner
            .current()
            .cloned()
            .ok_or_else(|| ReadyError::Internal(format!("no weekly intent for {}", date)))?;

        let mut issues = ctx.param_issues.clone();
        issues.extend(signals.issues.iter().cloned());
        issues.extend(stress_issue);
        for issue in &issues {
            log_issue(&ctx.profile.id, date, issue);
        }

        let mut prompts: Vec<String> = params
            .prompts(PromptContext::Daily)
            .into_iter()
            .map(str::to_string)
            .collect();
        if recommendation.class == SessionClass::Key {
            prompts.extend(params.prompts(PromptContext::PreRide).into_iter().map(str::to_string));
        }
        if recommendation.class == SessionClass::Recovery {
            prompts.extend(params.prompts(PromptContext::Recovery).into_iter().map(str::to_string));
        }
        if review.is_some() {
            prompts.extend(params.prompts(PromptContext::Weekly).into_iter().map(str::to_string));
        }

        Ok(DailyOutcome {
            athlete_id: ctx.profile.id.clone(),
            date,
            morning_load,
            load,
            signals,
            ans,
            readiness,
            gates,
            recommendation,
            intent,
            alerts,
            issues,
            prompts,
            review,
        })
    }

    /// Replay an ordered input sequence for one athlete from a fresh context
    pub fn replay(&self, athlete_id: &str, inputs: &[DailyInput]) -> Result<ReplayResult> {
        let mut ctx = self.context_for(athlete_id)?;
        self.replay_context(&mut ctx, inputs)
    }

    /// Replay into an existing context
    pub fn replay_context(
        &self,
        ctx: &mut AthleteContext,
        inputs: &[DailyInput],
    ) -> Result<ReplayResult> {
        let outcomes = inputs
            .iter()
            .map(|input| self.process_day(ctx, input))
            .collect::<Result<Vec<_>>>()?;
        let digest = replay_digest(&outcomes)?;
        info!(
            athlete = %ctx.athlete_id(),
            days = outcomes.len(),
            digest = %digest,
            "replay complete"
        );
        Ok(ReplayResult {
            athlete_id: ctx.athlete_id().to_string(),
            outcomes,
            digest,
        })
    }

    /// Replay several athletes in parallel. Each athlete gets its own
    /// context; one athlete's failure does not stop the others.
    pub fn replay_many(
        &self,
        runs: &BTreeMap<String, Vec<DailyInput>>,
    ) -> BTreeMap<String, Result<ReplayResult>> {
        runs.par_iter()
            .map(|(athlete_id, inputs)| (athlete_id.clone(), self.replay(athlete_id, inputs)))
            .collect()
    }
}

fn log_issue(athlete_id: &str, date: NaiveDate, issue: &DataQualityIssue) {
    match issue.severity() {
        ErrorSeverity::Critical | ErrorSeverity::Error => {
            error!(athlete = %athlete_id, %date, "{}", issue)
        }
        ErrorSeverity::Warning => warn!(athlete = %athlete_id, %date, "{}", issue),
        ErrorSeverity::Info => debug!(athlete = %athlete_id, %date, "{}", issue),
    }
}

/// Hex SHA-256 over the JSON serialization of each outcome in order
pub fn replay_digest(outcomes: &[DailyOutcome]) -> Result<String> {
    let mut hasher = Sha256::new();
    for outcome in outcomes {
        hasher.update(serde_json::to_vec(outcome)?);
        hasher.update(b"\n");
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect())
}

/// Pair each day's factor sub-scores with the athlete's reported feel score,
/// producing training data for the tree readiness model
pub fn training_samples(
    outcomes: &[DailyOutcome],
    feel: &BTreeMap<NaiveDate, f64>,
) -> Vec<FeelSample> {
    outcomes
        .iter()
        .filter_map(|outcome| {
            let feel = *feel.get(&outcome.date)?;
            let factors = outcome
                .readiness
                .factors
                .iter()
                .filter_map(|f| f.sub_score.map(|s| (f.factor, s)))
                .collect();
            Some(FeelSample {
                date: outcome.date,
                factors,
                feel,
            })
        })
        .collect()
}

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use tempfile::{NamedTempFile, TempDir};

use readyrs::blindspot::BlindspotKind;
use readyrs::engine::DecisionEngine;
use readyrs::export::{export_outcomes, ExportFormat};
use readyrs::import::DailyCsvImporter;
use readyrs::{
    AthleteProfile, DailyInput, DailyMetricRecord, EngineConfig, MusculoskeletalSignals,
    OrthostaticPair, ReadyError, SessionClass,
};

/// Integration tests that drive whole replays through the public API

#[cfg(test)]
mod integration_tests {
    use super::*;

    fn start() -> NaiveDate {
        // Monday
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn day(offset: u64) -> NaiveDate {
        start().checked_add_days(Days::new(offset)).unwrap()
    }

    /// A healthy, consistent athlete-day with a gentle wobble in HRV
    fn healthy_day(offset: u64, stress: Decimal) -> DailyInput {
        let date = day(offset);
        let mut metrics = DailyMetricRecord::new(date);
        metrics.hrv_ms = Some(62.0 + (offset % 4) as f64);
        metrics.resting_hr = Some(48.0 + (offset % 2) as f64);
        metrics.sleep_hours = Some(8.0);
        metrics.recovery_score = Some(75.0);
        metrics.subjective.life_stress = Some(3);
        metrics.subjective.sleep_quality = Some(8);
        metrics.orthostatic = Some(OrthostaticPair {
            lying_hr: 48.0,
            standing_hr: 68.0,
        });
        DailyInput {
            date,
            training_stress: stress,
            metrics,
            completed_session: None,
        }
    }

    fn engine_with(profiles: Vec<AthleteProfile>) -> DecisionEngine {
        let mut config = EngineConfig::default();
        for profile in profiles {
            config.add_athlete(profile).unwrap();
        }
        DecisionEngine::new(config).unwrap()
    }

    fn rider() -> AthleteProfile {
        AthleteProfile::new("Rider".to_string(), Some("rider".to_string()))
    }

    #[test]
    fn test_steady_load_converges() {
        let engine = engine_with(vec![rider()]);
        let inputs: Vec<DailyInput> = (0..60).map(|n| healthy_day(n, dec!(50))).collect();
        let result = engine.replay("rider", &inputs).unwrap();

        let last = &result.outcomes.last().unwrap().load;
        assert!((last.atl - dec!(50)).abs() < dec!(0.01));
        assert!(last.ctl > dec!(35) && last.ctl < dec!(50));
        assert!(last.tsb() < Decimal::ZERO);

        // fitness only ever grows under constant load
        for pair in result.outcomes.windows(2) {
            assert!(pair[1].load.ctl > pair[0].load.ctl);
        }
    }

    #[test]
    fn test_spike_after_rest_moves_fatigue_faster() {
        let engine = engine_with(vec![rider()]);
        let mut inputs: Vec<DailyInput> = (0..42).map(|n| DailyInput::rest_day(day(n))).collect();
        inputs.push(healthy_day(42, dec!(300)));
        let result = engine.replay("rider", &inputs).unwrap();

        let before = &result.outcomes[41].load;
        let after = &result.outcomes[42].load;
        let ratio = (after.atl - before.atl) / (after.ctl - before.ctl);
        assert!((ratio - dec!(6)).abs() < dec!(0.0001));

        // the spike is visible the next morning, not the same morning
        assert_eq!(result.outcomes[42].morning_load, *before);
    }

    #[test]
    fn test_gate_failure_is_terminal_for_every_day() {
        let engine = engine_with(vec![rider()]);
        let inputs: Vec<DailyInput> = (0..28)
            .map(|n| {
                let mut input = healthy_day(n, dec!(60));
                if n % 5 == 4 {
                    input.metrics.musculoskeletal = MusculoskeletalSignals {
                        injury_signals: vec!["achilles".to_string()],
                        soreness_asymmetry: false,
                    };
                }
                input
            })
            .collect();
        let result = engine.replay("rider", &inputs).unwrap();

        for outcome in &result.outcomes {
            if !outcome.gates.overall_pass {
                assert_eq!(outcome.recommendation.class, SessionClass::Recovery);
            }
            if outcome.date.signed_duration_since(start()).num_days() % 5 == 4 {
                assert!(!outcome.gates.overall_pass);
            }
        }
    }

    #[test]
    fn test_key_days_respect_threshold_and_gates() {
        let engine = engine_with(vec![rider()]);
        let inputs: Vec<DailyInput> = (0..42)
            .map(|n| healthy_day(n, if n % 7 == 2 { dec!(110) } else { dec!(40) }))
            .collect();
        let result = engine.replay("rider", &inputs).unwrap();
        let threshold = engine
            .context_for("rider")
            .unwrap()
            .params()
            .key_session_threshold();

        for outcome in &result.outcomes {
            if outcome.recommendation.class == SessionClass::Key {
                assert!(outcome.gates.overall_pass);
                assert!(outcome.readiness.score >= threshold);
                assert!(outcome.recommendation.spacing.satisfied);
            }
        }
    }

    #[test]
    fn test_completed_key_blocks_next_day() {
        let engine = engine_with(vec![rider()]);
        let mut inputs: Vec<DailyInput> = (0..16).map(|n| healthy_day(n, dec!(45))).collect();
        inputs[14].completed_session = Some(SessionClass::Key);
        let result = engine.replay("rider", &inputs).unwrap();

        let next = &result.outcomes[15];
        assert_ne!(next.recommendation.class, SessionClass::Key);
        assert!(!next.recommendation.spacing.satisfied);
        assert_eq!(next.recommendation.spacing.days_since_last_key, Some(1));
    }

    #[test]
    fn test_weekly_lifecycle() {
        let engine = engine_with(vec![rider()]);
        let inputs: Vec<DailyInput> = (0..21)
            .map(|n| {
                let mut input = healthy_day(n, dec!(55));
                // one key session every Wednesday
                if n % 7 == 2 {
                    input.completed_session = Some(SessionClass::Key);
                }
                input
            })
            .collect();
        let result = engine.replay("rider", &inputs).unwrap();

        for outcome in &result.outcomes {
            let intent = &outcome.intent;
            assert!(intent.key_sessions_remaining() <= intent.key_sessions_target);
            assert!(intent.contains(outcome.date));
            let (low, high) = intent.volume_target_range_hours;
            assert!(low <= high);
        }

        let reviews: Vec<_> = result
            .outcomes
            .iter()
            .filter_map(|o| o.review.as_ref().map(|r| (o.date, r)))
            .collect();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].0, day(7));
        assert_eq!(reviews[0].1.week_start, day(0));
        assert_eq!(reviews[1].1.week_start, day(7));
        for (_, review) in &reviews {
            assert_eq!(review.days_recorded, 7);
            assert!(review.key_sessions_completed <= 1);
        }
    }

    #[test]
    fn test_replay_many_matches_sequential_replays() {
        let masters = {
            let mut profile = AthleteProfile::new("Masters".to_string(), Some("masters".to_string()));
            profile.blindspots = vec!["Masters Recovery".to_string()];
            profile
        };
        let engine = engine_with(vec![rider(), masters]);

        let mut runs = BTreeMap::new();
        runs.insert(
            "rider".to_string(),
            (0..20).map(|n| healthy_day(n, dec!(60))).collect::<Vec<_>>(),
        );
        runs.insert(
            "masters".to_string(),
            (0..20).map(|n| healthy_day(n, dec!(40))).collect::<Vec<_>>(),
        );

        let parallel = engine.replay_many(&runs);
        for (id, inputs) in &runs {
            let sequential = engine.replay(id, inputs).unwrap();
            let from_pool = parallel[id].as_ref().unwrap();
            assert_eq!(sequential.digest, from_pool.digest);
            assert_eq!(sequential.outcomes, from_pool.outcomes);
        }
        assert_ne!(
            parallel["rider"].as_ref().unwrap().digest,
            parallel["masters"].as_ref().unwrap().digest
        );
    }

    #[test]
    fn test_blindspots_tighten_effective_parameters() {
        let mut masters = AthleteProfile::new("Masters".to_string(), Some("masters".to_string()));
        masters.blindspots = vec![
            "Masters Recovery".to_string(),
            "Overtraining Risk".to_string(),
        ];
        let engine = engine_with(vec![rider(), masters]);

        let base = engine.context_for("rider").unwrap();
        let tight = engine.context_for("masters").unwrap();
        assert!(tight.params().has(BlindspotKind::MastersRecovery));
        assert_eq!(tight.params().key_session_threshold(), 70.0);
        assert!(tight.params().key_session_threshold() > base.params().key_session_threshold());
    }

    #[test]
    fn test_unknown_athlete_is_configuration_error() {
        let engine = engine_with(vec![rider()]);
        let err = engine.replay("ghost", &[healthy_day(0, dec!(10))]).unwrap_err();
        assert!(matches!(err, ReadyError::Configuration(_)));
    }

    #[test]
    fn test_csv_to_export_pipeline() {
        let csv = "\
date,athlete,tss,hrv,rhr,sleep,recovery,lying_hr,standing_hr,session
2024-01-01,rider,60,62,48,8,75,48,68,
2024-01-02,rider,40,63,49,7.5,72,48,69,
2024-01-03,rider,90,61,48,8,74,49,70,key
2024-01-04,rider,0,64,48,8.5,80,48,67,recovery
";
        let runs = DailyCsvImporter::new().read(csv.as_bytes(), "rider").unwrap();
        let engine = engine_with(vec![rider()]);
        let result = engine.replay("rider", &runs["rider"]).unwrap();
        assert_eq!(result.outcomes.len(), 4);
        assert_eq!(result.outcomes[2].intent.key_sessions_completed(), 1);

        let dir = TempDir::new().unwrap();
        let json_path = dir.path().join("outcomes.json");
        let csv_path = dir.path().join("outcomes.csv");
        export_outcomes(&result.outcomes, ExportFormat::from_path(&json_path).unwrap(), &json_path)
            .unwrap();
        export_outcomes(&result.outcomes, ExportFormat::Csv, &csv_path).unwrap();

        let json = std::fs::read_to_string(&json_path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 4);
        assert_eq!(parsed[0]["athlete_id"], "rider");

        let flat = std::fs::read_to_string(&csv_path).unwrap();
        assert_eq!(flat.lines().count(), 5);
    }

    #[test]
    fn test_config_file_drives_engine() {
        let mut config = EngineConfig::default();
        let mut profile = rider();
        profile.blindspots = vec!["Sleep Disorder".to_string()];
        config.add_athlete(profile).unwrap();

        let file = NamedTempFile::new().unwrap();
        config.save_to_file(file.path()).unwrap();
        let loaded = EngineConfig::load_from_file(file.path()).unwrap();

        let engine = DecisionEngine::new(loaded).unwrap();
        let ctx = engine.context_for("rider").unwrap();
        assert!(ctx.params().has(BlindspotKind::SleepDisorder));

        let inputs: Vec<DailyInput> = (0..10).map(|n| healthy_day(n, dec!(50))).collect();
        let from_file = engine.replay("rider", &inputs).unwrap();
        let again = engine.replay("rider", &inputs).unwrap();
        assert_eq!(from_file.digest, again.digest);
    }
}

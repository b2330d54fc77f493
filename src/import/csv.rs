use anyhow::{Context, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::models::{
    Appetite, CognitiveFatigue, DailyInput, DailyMetricRecord, EnergySignals,
    MusculoskeletalSignals, OrthostaticPair, SessionClass, SubjectiveRatings, WeightTrend,
};

/// One row of the daily input CSV. Every column except `date` may be empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DailyInputRow {
    pub date: NaiveDate,
    pub athlete_id: Option<String>,
    pub training_stress: Option<Decimal>,
    pub hrv_ms: Option<f64>,
    pub resting_hr: Option<f64>,
    pub sleep_hours: Option<f64>,
    pub recovery_score: Option<f64>,
    pub sleep_quality: Option<u8>,
    pub fatigue: Option<u8>,
    pub life_stress: Option<u8>,
    pub soreness: Option<u8>,
    pub motivation: Option<u8>,
    pub lying_hr: Option<f64>,
    pub standing_hr: Option<f64>,
    /// Semicolon-separated injury notes
    pub injury_signals: Option<String>,
    pub soreness_asymmetry: Option<bool>,
    pub weight_trend: Option<WeightTrend>,
    pub appetite: Option<Appetite>,
    pub cognitive_fatigue: Option<CognitiveFatigue>,
    pub completed_session: Option<String>,
}

impl DailyInputRow {
    pub fn into_input(self) -> Result<DailyInput> {
        let date = self.date;
        let completed_session = self
            .completed_session
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<SessionClass>().map_err(anyhow::Error::msg))
            .transpose()
            .with_context(|| format!("Invalid completed_session on {}", date))?;

        let orthostatic = match (self.lying_hr, self.standing_hr) {
            (Some(lying_hr), Some(standing_hr)) => Some(OrthostaticPair {
                lying_hr,
                standing_hr,
            }),
            _ => None,
        };

        let injury_signals = self
            .injury_signals
            .map(|s| {
                s.split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(DailyInput {
            date,
            training_stress: self.training_stress.unwrap_or(Decimal::ZERO),
            metrics: DailyMetricRecord {
                date,
                hrv_ms: self.hrv_ms,
                resting_hr: self.resting_hr,
                sleep_hours: self.sleep_hours,
                recovery_score: self.recovery_score,
                subjective: SubjectiveRatings {
                    sleep_quality: self.sleep_quality,
                    fatigue: self.fatigue,
                    life_stress: self.life_stress,
                    soreness: self.soreness,
                    motivation: self.motivation,
                },
                orthostatic,
                musculoskeletal: MusculoskeletalSignals {
                    injury_signals,
                    soreness_asymmetry: self.soreness_asymmetry.unwrap_or(false),
                },
                energy: EnergySignals {
                    weight_trend: self.weight_trend,
                    appetite: self.appetite,
                },
                cognitive_fatigue: self.cognitive_fatigue,
            },
            completed_session,
        })
    }
}

/// CSV importer with flexible column names
pub struct DailyCsvImporter {
    column_mapping: HashMap<String, String>,
}

impl DailyCsvImporter {
    pub fn new() -> Self {
        let mut column_mapping = HashMap::new();

        Self::add_mapping(&mut column_mapping, "date", &["date", "day"]);
        Self::add_mapping(&mut column_mapping, "athlete_id", &["athlete_id", "athlete"]);
        Self::add_mapping(
            &mut column_mapping,
            "training_stress",
            &["training_stress", "tss", "stress", "load"],
        );
        Self::add_mapping(&mut column_mapping, "hrv_ms", &["hrv_ms", "hrv", "rmssd"]);
        Self::add_mapping(
            &mut column_mapping,
            "resting_hr",
            &["resting_hr", "rhr", "resting_heart_rate"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "sleep_hours",
            &["sleep_hours", "sleep", "sleep_duration"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "recovery_score",
            &["recovery_score", "recovery"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "completed_session",
            &["completed_session", "session", "completed"],
        );

        Self { column_mapping }
    }

    fn add_mapping(mapping: &mut HashMap<String, String>, standard: &str, variations: &[&str]) {
        for variation in variations {
            mapping.insert(variation.to_lowercase(), standard.to_string());
        }
    }

    fn normalize_column_name(&self, name: &str) -> String {
        let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");

        self.column_mapping
            .get(&normalized)
            .cloned()
            .unwrap_or(normalized)
    }

    /// Read rows from any reader, keyed by athlete (rows without an athlete
    /// column go to `default_athlete`) and sorted by date
    pub fn read<R: Read>(
        &self,
        reader: R,
        default_athlete: &str,
    ) -> Result<BTreeMap<String, Vec<DailyInput>>> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(false)
            .from_reader(reader);

        let headers = csv_reader.headers().context("Failed to read CSV headers")?;
        let normalized: StringRecord = headers
            .iter()
            .map(|h| self.normalize_column_name(h))
            .collect();
        debug!(columns = ?normalized, "daily CSV columns");
        csv_reader.set_headers(normalized);

        let mut by_athlete: BTreeMap<String, Vec<DailyInput>> = BTreeMap::new();
        for (line, row) in csv_reader.deserialize::<DailyInputRow>().enumerate() {
            let row = row.with_context(|| format!("Invalid daily input on data row {}", line + 1))?;
            let athlete = row
                .athlete_id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| default_athlete.to_string());
            by_athlete.entry(athlete).or_default().push(row.into_input()?);
        }

        for (athlete, inputs) in by_athlete.iter_mut() {
            inputs.sort_by_key(|input| input.date);
            if let Some(pair) = inputs.windows(2).find(|w| w[0].date == w[1].date) {
                anyhow::bail!("Duplicate date {} for athlete {}", pair[0].date, athlete);
            }
        }

        Ok(by_athlete)
    }
}

impl Default for DailyCsvImporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Import a daily input CSV file
pub fn import_daily_inputs<P: AsRef<Path>>(
    path: P,
    default_athlete: &str,
) -> Result<BTreeMap<String, Vec<DailyInput>>> {
    let file = std::fs::File::open(&path)
        .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;
    let inputs = DailyCsvImporter::new()
        .read(file, default_athlete)
        .with_context(|| format!("Failed to import {}", path.as_ref().display()))?;
    info!(
        path = %path.as_ref().display(),
        athletes = inputs.len(),
        days = inputs.values().map(Vec::len).sum::<usize>(),
        "imported daily inputs"
    );
    Ok(inputs)
}

#[derive(Debug, Deserialize)]
struct FeelRow {
    date: NaiveDate,
    feel: f64,
}

/// Import a `date,feel` CSV of subjective feel scores
pub fn import_feel_history<P: AsRef<Path>>(path: P) -> Result<BTreeMap<NaiveDate, f64>> {
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(&path)
        .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;

    let mut history = BTreeMap::new();
    for row in reader.deserialize::<FeelRow>() {
        let row = row.context("Invalid feel history row")?;
        if !row.feel.is_finite() {
            anyhow::bail!("Feel score on {} is not a number", row.date);
        }
        history.insert(row.date, row.feel);
    }
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "\
Date,TSS,HRV,RHR,Sleep,Recovery,life_stress,lying_hr,standing_hr,injury_signals,weight_trend,Session
2024-09-03,45,58,52,7.5,70,4,50,72,,stable,support
2024-09-02,80,61,50,8.0,,3,,,knee; ankle,declining,key
";

    #[test]
    fn test_read_with_aliases_sorted() {
        let inputs = DailyCsvImporter::new()
            .read(SAMPLE.as_bytes(), "rider")
            .unwrap();
        let days = &inputs["rider"];
        assert_eq!(days.len(), 2);

        let first = &days[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 9, 2).unwrap());
        assert_eq!(first.training_stress, dec!(80));
        assert_eq!(first.metrics.hrv_ms, Some(61.0));
        assert_eq!(first.metrics.recovery_score, None);
        assert_eq!(first.metrics.orthostatic, None);
        assert_eq!(
            first.metrics.musculoskeletal.injury_signals,
            vec!["knee".to_string(), "ankle".to_string()]
        );
        assert_eq!(first.metrics.energy.weight_trend, Some(WeightTrend::Declining));
        assert_eq!(first.completed_session, Some(SessionClass::Key));

        let second = &days[1];
        assert_eq!(second.metrics.subjective.life_stress, Some(4));
        assert_eq!(second.metrics.orthostatic.as_ref().unwrap().delta(), 22.0);
    }

    #[test]
    fn test_rows_split_by_athlete() {
        let data = "date,athlete,tss\n2024-09-02,a,50\n2024-09-02,b,60\n2024-09-03,,0\n";
        let inputs = DailyCsvImporter::new().read(data.as_bytes(), "default").unwrap();
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs["b"][0].training_stress, dec!(60));
        assert_eq!(inputs["default"].len(), 1);
    }

    #[test]
    fn test_duplicate_dates_rejected() {
        let data = "date,tss\n2024-09-02,50\n2024-09-02,60\n";
        assert!(DailyCsvImporter::new().read(data.as_bytes(), "x").is_err());
    }

    #[test]
    fn test_bad_session_rejected() {
        let data = "date,session\n2024-09-02,sprint\n";
        assert!(DailyCsvImporter::new().read(data.as_bytes(), "x").is_err());
    }

    #[test]
    fn test_import_feel_history() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "date,feel\n2024-09-02,7\n2024-09-03,5.5").unwrap();

        let history = import_feel_history(file.path()).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(
            history[&NaiveDate::from_ymd_opt(2024, 9, 3).unwrap()],
            5.5
        );
    }
}

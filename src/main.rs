use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};

use readyrs::blindspot::{resolve_tags, ParameterSet};
use readyrs::config::{AthleteProfile, EngineConfig};
use readyrs::engine::{training_samples, DailyOutcome, DecisionEngine, ReplayResult};
use readyrs::export::{export_outcomes, ExportFormat};
use readyrs::import::{import_daily_inputs, import_feel_history};
use readyrs::logging::{init_logging, LogLevel};
use readyrs::models::SessionClass;
use readyrs::readiness::TreeReadinessModel;

/// readyrs - Readiness and intensity gating for endurance athletes
///
/// Replays daily physiological and load inputs, scores readiness, evaluates
/// health gates and decides whether each day may hold a key session.
#[derive(Parser)]
#[command(name = "readyrs")]
#[command(version)]
#[command(about = "Training readiness decision engine", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a daily input CSV through the engine
    Replay {
        /// Daily input CSV
        #[arg(short, long)]
        input: PathBuf,

        /// Athlete for rows without an athlete column; also limits the replay
        #[arg(short, long)]
        athlete: Option<String>,

        /// Feel-score history (date,feel) to train the tree readiness model
        #[arg(long)]
        feel: Option<PathBuf>,

        /// Write outcomes to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export format (json, csv); defaults to the output extension
        #[arg(short = 'f', long)]
        format: Option<String>,

        /// Number of most recent days to show
        #[arg(short, long, default_value = "14")]
        last: usize,
    },

    /// Show effective parameters after blindspot stacking
    Params {
        /// Configured athlete
        #[arg(short, long)]
        athlete: Option<String>,

        /// Comma-separated blindspot tags, instead of a configured athlete
        #[arg(short, long)]
        tags: Option<String>,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default configuration with one example athlete
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the active configuration
    Show,
}

#[derive(Tabled)]
struct DayRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Session")]
    class: String,
    #[tabled(rename = "Readiness")]
    readiness: String,
    #[tabled(rename = "ANS")]
    ans: String,
    #[tabled(rename = "Gates")]
    gates: String,
    #[tabled(rename = "TSB")]
    tsb: String,
    #[tabled(rename = "Key left")]
    key_left: String,
    #[tabled(rename = "Alerts")]
    alerts: usize,
}

impl From<&DailyOutcome> for DayRow {
    fn from(outcome: &DailyOutcome) -> Self {
        let gates = if outcome.gates.overall_pass {
            format!("pass ({})", outcome.gates.intensity)
        } else {
            let failed: Vec<String> = outcome.gates.failed().iter().map(|d| d.to_string()).collect();
            format!("FAIL {}", failed.join(","))
        };
        DayRow {
            date: outcome.date.format("%a %Y-%m-%d").to_string(),
            class: outcome.recommendation.class.to_string(),
            readiness: format!("{:.0}", outcome.readiness.score),
            ans: outcome.ans.state.to_string(),
            gates,
            tsb: format!("{:.1}", outcome.morning_load.tsb()),
            key_left: format!(
                "{}/{}",
                outcome.intent.key_sessions_remaining(),
                outcome.intent.key_sessions_target
            ),
            alerts: outcome.alerts.len(),
        }
    }
}

#[derive(Tabled)]
struct ParamRow {
    #[tabled(rename = "Parameter")]
    name: String,
    #[tabled(rename = "Default")]
    default: String,
    #[tabled(rename = "Effective")]
    effective: String,
    #[tabled(rename = "Rule")]
    rule: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(EngineConfig::default_config_path);

    if let Commands::Config { action } = &cli.command {
        return run_config(action, &config_path);
    }

    let config = if config_path.exists() {
        EngineConfig::load_from_file(&config_path)?
    } else {
        EngineConfig::default()
    };

    let mut log_config = config.logging.clone();
    log_config.level = match cli.verbose {
        0 => log_config.level,
        1 => LogLevel::Info,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };
    init_logging(&log_config)?;

    match cli.command {
        Commands::Replay {
            input,
            athlete,
            feel,
            output,
            format,
            last,
        } => run_replay(
            config,
            &input,
            athlete,
            feel.as_deref(),
            output.as_deref(),
            format.as_deref(),
            last,
        ),
        Commands::Params { athlete, tags } => run_params(&config, athlete, tags),
        Commands::Config { .. } => Ok(()),
    }
}

fn run_config(action: &ConfigAction, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists; use --force to overwrite",
                    path.display()
                );
            }
            let mut config = EngineConfig::default();
            let mut athlete = AthleteProfile::new("Example Athlete".to_string(), None);
            athlete.blindspots.push("Masters Recovery".to_string());
            config.add_athlete(athlete)?;
            config.save_to_file(path)?;
            println!(
                "{} {}",
                "✓ Wrote configuration to".green(),
                path.display()
            );
        }
        ConfigAction::Show => {
            let config = if path.exists() {
                EngineConfig::load_from_file(path)?
            } else {
                println!("{}", format!("No config at {}, showing defaults", path.display()).dimmed());
                EngineConfig::default()
            };
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

fn run_replay(
    mut config: EngineConfig,
    input: &Path,
    athlete: Option<String>,
    feel: Option<&Path>,
    output: Option<&Path>,
    format: Option<&str>,
    last: usize,
) -> Result<()> {
    let default_athlete = athlete
        .clone()
        .or_else(|| config.default_athlete_id.clone())
        .unwrap_or_else(|| "athlete".to_string());
    let mut runs = import_daily_inputs(input, &default_athlete)?;
    if let Some(id) = &athlete {
        runs.retain(|key, _| key == id);
        if runs.is_empty() {
            anyhow::bail!("No rows for athlete {} in {}", id, input.display());
        }
    }

    // Athletes in the file but not the config get a default profile
    for id in runs.keys() {
        if !config.athletes.contains_key(id) {
            config.add_athlete(AthleteProfile::new(id.clone(), Some(id.clone())))?;
        }
    }

    let engine = DecisionEngine::new(config.clone())?;
    let mut results: BTreeMap<String, ReplayResult> = BTreeMap::new();

    if let Some(feel_path) = feel {
        let history = import_feel_history(feel_path)?;
        for (id, inputs) in &runs {
            let first_pass = engine.replay(id, inputs)?;
            let samples = training_samples(&first_pass.outcomes, &history);
            let model = TreeReadinessModel::train(&samples, config.readiness.clone())
                .with_context(|| format!("Cannot train readiness tree for {}", id))?;
            let tree_engine = DecisionEngine::with_model(config.clone(), Box::new(model))?;
            results.insert(id.clone(), tree_engine.replay(id, inputs)?);
        }
    } else {
        for (id, result) in engine.replay_many(&runs) {
            match result {
                Ok(result) => {
                    results.insert(id, result);
                }
                Err(err) => {
                    eprintln!("{} {}: {}", "✗".red(), id, err.user_message());
                }
            }
        }
    }

    for result in results.values() {
        print_replay(result, last);
    }

    if let Some(path) = output {
        let format = match format {
            Some(f) => f.parse::<ExportFormat>()?,
            None => ExportFormat::from_path(path)?,
        };
        let outcomes: Vec<DailyOutcome> = results
            .into_values()
            .flat_map(|r| r.outcomes)
            .collect();
        export_outcomes(&outcomes, format, path)?;
        println!(
            "{} {} days to {}",
            "✓ Exported".green(),
            outcomes.len(),
            path.display()
        );
    }

    Ok(())
}

fn print_replay(result: &ReplayResult, last: usize) {
    println!();
    println!(
        "{} {} ({} days)",
        "Athlete".bold(),
        result.athlete_id.cyan().bold(),
        result.outcomes.len()
    );

    let skip = result.outcomes.len().saturating_sub(last);
    let rows: Vec<DayRow> = result.outcomes[skip..].iter().map(DayRow::from).collect();
    println!("{}", Table::new(rows).with(Style::rounded()));

    if let Some(today) = result.outcomes.last() {
        let class = today.recommendation.class.to_string();
        let class = match today.recommendation.class {
            SessionClass::Key => class.green().bold(),
            SessionClass::Support => class.yellow().bold(),
            SessionClass::Recovery => class.red().bold(),
        };
        println!("{} {} {}", "Latest:".bold(), today.date, class);
        for line in &today.recommendation.rationale {
            println!("  - {}", line);
        }
        for alert in &today.alerts {
            println!("  {} {}", format!("[{}]", alert.severity).red(), alert.message);
        }
        for prompt in &today.prompts {
            println!("  {} {}", "?".cyan(), prompt);
        }
    }

    if let Some(review) = result.outcomes.iter().rev().find_map(|o| o.review.as_ref()) {
        println!(
            "{} week of {}: {}/{} key sessions",
            "Last review".bold(),
            review.week_start,
            review.key_sessions_completed,
            review.key_sessions_target
        );
        for win in &review.wins {
            println!("  {} {}", "+".green(), win);
        }
        for flag in &review.flags {
            println!("  {} {}", "!".yellow(), flag);
        }
        for signal in &review.signals {
            println!("  {} {:?}", "~".magenta(), signal);
        }
    }

    println!("{} {}", "Digest".dimmed(), result.digest.dimmed());
}

fn run_params(config: &EngineConfig, athlete: Option<String>, tags: Option<String>) -> Result<()> {
    let (base, tag_list) = match (athlete, tags) {
        (_, Some(tags)) => (
            ParameterSet::default(),
            tags.split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>(),
        ),
        (Some(id), None) => {
            let profile = config
                .get_athlete(&id)
                .with_context(|| format!("Athlete not found: {}", id))?;
            (profile.base_parameters()?, profile.blindspots.clone())
        }
        (None, None) => {
            let profile = config
                .get_default_athlete()
                .context("No default athlete configured; pass --athlete or --tags")?;
            (profile.base_parameters()?, profile.blindspots.clone())
        }
    };

    let (effective, issues) = resolve_tags(&tag_list, &base);
    for issue in &issues {
        eprintln!("{} {}", "!".yellow(), issue);
    }
    if effective.failed_closed {
        println!("{}", "Unrecognized tag: applying every blindspot".red().bold());
    }

    let defaults = ParameterSet::default();
    let rows: Vec<ParamRow> = effective
        .values
        .iter()
        .map(|(parameter, value)| ParamRow {
            name: parameter.name().to_string(),
            default: format!("{}", defaults.get(*parameter)),
            effective: format!("{}", value),
            rule: format!("{:?}", parameter.rule()),
        })
        .collect();

    let active: Vec<&str> = effective.active.iter().map(|k| k.label()).collect();
    println!("{} {}", "Active blindspots:".bold(), active.join(", "));
    println!("{}", Table::new(rows).with(Style::rounded()));
    Ok(())
}

//! introspect-cli - run and analyze temperature-introspection experiments
//!
//! Every stage is resumable: records that already exist are skipped unless
//! `--force` is given. Configuration problems are reported together and exit
//! with status 2 before any model is called.

use clap::{Args, Parser, Subcommand, ValueEnum};
use introspection::config::{EnvConfig, ExperimentConfig, RunSettings};
use introspection::core::{ModelId, DEFAULT_HIGH_MIN, DEFAULT_LOW_MAX};
use introspection::events::{EventBus, LoggingObserver};
use introspection::executor::{Executor, RunCounts};
use introspection::experiments::{
    experiment_a, experiment_d, generators_of, study1, study2, ExperimentError,
};
use introspection::llm::ProviderRouter;
use introspection::prompt::PromptLibrary;
use introspection::store::{ResultStore, Study1Corpus};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Temperature introspection experiments
#[derive(Parser)]
#[command(name = "introspect-cli")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format for stage reports
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Options shared by every stage
#[derive(Args, Clone)]
struct RunArgs {
    /// Temperatures at or below this are labelled LOW
    #[arg(long, default_value_t = DEFAULT_LOW_MAX)]
    low_max: f64,

    /// Temperatures at or above this are labelled HIGH
    #[arg(long, default_value_t = DEFAULT_HIGH_MIN)]
    high_min: f64,

    /// Stage-1 corpus directory
    #[arg(long, default_value = "output")]
    study1_dir: PathBuf,

    /// Result directory of this stage
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Comma-separated generator allow-list
    #[arg(long)]
    generator_models: Option<String>,

    /// Comma-separated predictors (default: the generators of the candidates)
    #[arg(long)]
    predictor_models: Option<String>,

    /// Use only the first N candidate samples
    #[arg(long)]
    limit_samples: Option<usize>,

    /// Re-run conditions whose results already exist
    #[arg(long)]
    force: bool,

    /// Directory with prompt templates overriding the built-ins
    #[arg(long)]
    prompts_dir: Option<PathBuf>,
}

impl RunArgs {
    fn settings(&self, default_output: &str) -> RunSettings {
        RunSettings {
            low_max: self.low_max,
            high_min: self.high_min,
            study1_dir: self.study1_dir.clone(),
            output_dir: self
                .output_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(default_output)),
            generator_models: self.generator_models.clone(),
            predictor_models: self.predictor_models.clone(),
            limit_samples: self.limit_samples,
            force: self.force,
            prompts_dir: self.prompts_dir.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Study 1: generate sentences over the condition matrix
    Generate {
        #[command(flatten)]
        run: RunArgs,

        /// Repetitions per cell
        #[arg(long, default_value_t = 3)]
        repeats: u32,
    },

    /// Study 2: self-reflection, within-model and across-model prediction
    Study2 {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Experiment A: Info+/Info− rewrites and predictions
    ExperimentA {
        #[command(flatten)]
        run: RunArgs,

        /// Model producing the rewrites
        #[arg(long, default_value = "NOVA_2_LITE")]
        editor_model: ModelId,

        /// Only run predictions on existing pairs
        #[arg(long)]
        skip_edit: bool,
    },

    /// Experiment D: blind and wrong-label prediction
    ExperimentD {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Compute analysis tables from stored results
    Analyze {
        #[arg(value_enum)]
        target: AnalysisTarget,

        #[arg(long, default_value = "output/study2")]
        study2_dir: PathBuf,

        #[arg(long, default_value = "output/experiment_a")]
        experiment_a_dir: PathBuf,

        #[arg(long, default_value = "output/experiment_d")]
        experiment_d_dir: PathBuf,

        #[arg(long, default_value = "output/analysis")]
        analysis_dir: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
enum AnalysisTarget {
    Study2,
    ExperimentA,
    ExperimentD,
    All,
}

enum CliError {
    /// Reported together, exit status 2
    Config(Vec<String>),
    Run(String),
}

impl From<ExperimentError> for CliError {
    fn from(e: ExperimentError) -> Self {
        CliError::Run(e.to_string())
    }
}

#[derive(Serialize)]
struct StageReport {
    stage: &'static str,
    saved: usize,
    skipped: usize,
    failed: usize,
}

impl StageReport {
    fn new(stage: &'static str, counts: RunCounts) -> Self {
        Self {
            stage,
            saved: counts.saved,
            skipped: counts.skipped,
            failed: counts.failed,
        }
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Generate { run, repeats } => execute_generate(cli.format, &run, repeats).await,
        Commands::Study2 { run } => execute_study2(cli.format, &run).await,
        Commands::ExperimentA {
            run,
            editor_model,
            skip_edit,
        } => execute_experiment_a(cli.format, &run, editor_model, skip_edit).await,
        Commands::ExperimentD { run } => execute_experiment_d(cli.format, &run).await,
        Commands::Analyze {
            target,
            study2_dir,
            experiment_a_dir,
            experiment_d_dir,
            analysis_dir,
        } => execute_analyze(
            target,
            &study2_dir,
            &experiment_a_dir,
            &experiment_d_dir,
            &analysis_dir,
        ),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Config(problems)) => {
            eprintln!("Configuration errors:");
            for problem in problems {
                eprintln!("  - {}", problem);
            }
            ExitCode::from(2)
        }
        Err(CliError::Run(message)) => {
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

/// Environment and run settings, validated together
fn load_config(
    run: &RunArgs,
    default_output: &str,
    extra_models: &[ModelId],
) -> Result<(EnvConfig, ExperimentConfig), CliError> {
    let env = EnvConfig::from_env();
    let config = ExperimentConfig::from_settings(run.settings(default_output), &[]);

    let (env, config) = match (env, config) {
        (Ok(env), Ok(config)) => (env, config),
        (env, config) => {
            let mut problems = Vec::new();
            if let Err(e) = env {
                problems.extend(e.problems);
            }
            if let Err(e) = config {
                problems.extend(e.problems);
            }
            return Err(CliError::Config(problems));
        }
    };

    let mut extra = extra_models.to_vec();
    if let Some(generators) = &config.generators {
        extra.extend_from_slice(generators);
    }
    config.validate(&env, &extra).map_err(CliError::Config)?;
    Ok((env, config))
}

fn prompt_library(config: &ExperimentConfig) -> PromptLibrary {
    match &config.prompts_dir {
        Some(dir) => PromptLibrary::new().with_dir(dir),
        None => PromptLibrary::new(),
    }
}

fn router(env: &EnvConfig) -> Result<ProviderRouter, CliError> {
    ProviderRouter::from_env(env).map_err(|e| CliError::Run(e.to_string()))
}

/// Run `body` with a logging observer attached to the executor's bus
async fn with_observer<F, Fut, T>(body: F) -> T
where
    F: FnOnce(EventBus) -> Fut,
    Fut: std::future::Future<Output = T>,
{
    let bus = EventBus::with_default_capacity();
    let observer = tokio::spawn(LoggingObserver::new(&bus).run());
    let out = body(bus).await;
    // Every bus handle is gone once `body` returns, which stops the observer
    let _ = observer.await;
    out
}

fn print_reports(format: OutputFormat, reports: &[StageReport]) -> Result<(), CliError> {
    match format {
        OutputFormat::Text => {
            for r in reports {
                println!(
                    "{}: saved={} skipped={} failed={}",
                    r.stage, r.saved, r.skipped, r.failed
                );
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(reports)
                .map_err(|e| CliError::Run(format!("Failed to serialize report: {}", e)))?;
            println!("{}", json);
        }
    }
    Ok(())
}

async fn execute_generate(format: OutputFormat, run: &RunArgs, repeats: u32) -> Result<(), CliError> {
    let matrix = study1::matrix(None);
    let (env, config) = load_config(run, "output", &matrix.models)?;
    let matrix = study1::matrix(config.generators.as_deref()).with_repeats(repeats);
    let invoker = router(&env)?;
    let prompts = prompt_library(&config);
    let corpus = Study1Corpus::open(&config.study1_dir);

    let counts = with_observer(|bus| async {
        let executor =
            Executor::new(&invoker, &prompts, bus).with_skip_existing(config.skip_existing());
        study1::run(&executor, &corpus, &matrix).await
    })
    .await;
    print_reports(format, &[StageReport::new("study1", counts)])
}

async fn execute_study2(format: OutputFormat, run: &RunArgs) -> Result<(), CliError> {
    let (env, config) = load_config(run, "output/study2", &[])?;
    let mut candidates = Study1Corpus::open(&config.study1_dir)
        .load_candidates(&config.thresholds, config.generators.as_deref())
        .map_err(ExperimentError::from)?;
    candidates.truncate(config.limit_samples);
    if candidates.is_empty() {
        tracing::info!("No eligible Study 1 samples found");
        return Ok(());
    }

    let predictors = config.predictors_for(&generators_of(&candidates.samples));
    config
        .validate(&env, &predictors)
        .map_err(CliError::Config)?;
    let invoker = router(&env)?;
    let prompts = prompt_library(&config);
    let store = ResultStore::open(&config.output_dir);

    let counts = with_observer(|bus| async {
        let executor =
            Executor::new(&invoker, &prompts, bus).with_skip_existing(config.skip_existing());
        study2::run(&executor, &store, &candidates.samples, &predictors).await
    })
    .await;

    study2::write_summary(&store, &config.output_dir.join(study2::SUMMARY_FILE))?;
    print_reports(
        format,
        &[
            StageReport::new("self_reflection", counts.self_reflection),
            StageReport::new("within_model", counts.within_model),
            StageReport::new("across_model", counts.across_model),
        ],
    )
}

async fn execute_experiment_a(
    format: OutputFormat,
    run: &RunArgs,
    editor: ModelId,
    skip_edit: bool,
) -> Result<(), CliError> {
    let extra = if skip_edit { Vec::new() } else { vec![editor] };
    let (env, config) = load_config(run, "output/experiment_a", &extra)?;
    let (pairs, store) = experiment_a::open_stores(&config.output_dir);

    let samples = if skip_edit {
        Vec::new()
    } else {
        let mut candidates = Study1Corpus::open(&config.study1_dir)
            .load_candidates(&config.thresholds, config.generators.as_deref())
            .map_err(ExperimentError::from)?;
        candidates.truncate(config.limit_samples);
        candidates.samples
    };
    let generators =
        experiment_a::pair_generators(&pairs, &samples, config.generators.as_deref())?;
    config
        .validate(&env, &config.predictors_for(&generators))
        .map_err(CliError::Config)?;
    let invoker = router(&env)?;
    let prompts = prompt_library(&config);

    let (edit_counts, predict_counts) = with_observer(|bus| async {
        let executor =
            Executor::new(&invoker, &prompts, bus).with_skip_existing(config.skip_existing());
        let edited = if skip_edit {
            None
        } else {
            Some(experiment_a::edit(&executor, &pairs, editor, &samples).await)
        };
        let predicted = experiment_a::predict(
            &executor,
            &pairs,
            &store,
            &config.predictors,
            config.generators.as_deref(),
        )
        .await;
        (edited, predicted)
    })
    .await;

    let mut reports = Vec::new();
    if let Some(counts) = edit_counts {
        reports.push(StageReport::new("edit", counts));
    }
    reports.push(StageReport::new("predict", predict_counts?));
    print_reports(format, &reports)
}

async fn execute_experiment_d(format: OutputFormat, run: &RunArgs) -> Result<(), CliError> {
    let (env, config) = load_config(run, "output/experiment_d", &[])?;
    let mut candidates = Study1Corpus::open(&config.study1_dir)
        .load_candidates(&config.thresholds, config.generators.as_deref())
        .map_err(ExperimentError::from)?;
    candidates.truncate(config.limit_samples);
    if candidates.is_empty() {
        tracing::info!("No eligible Study 1 samples found");
        return Ok(());
    }

    let predictors = config.predictors_for(&generators_of(&candidates.samples));
    config
        .validate(&env, &predictors)
        .map_err(CliError::Config)?;
    let invoker = router(&env)?;
    let prompts = prompt_library(&config);
    let store = ResultStore::open(&config.output_dir);

    let counts = with_observer(|bus| async {
        let executor =
            Executor::new(&invoker, &prompts, bus).with_skip_existing(config.skip_existing());
        experiment_d::run(&executor, &store, &candidates.samples, &predictors).await
    })
    .await;
    print_reports(
        format,
        &[
            StageReport::new("blind", counts.blind),
            StageReport::new("wrong_label", counts.wrong_label),
        ],
    )
}

fn execute_analyze(
    target: AnalysisTarget,
    study2_dir: &Path,
    experiment_a_dir: &Path,
    experiment_d_dir: &Path,
    analysis_dir: &Path,
) -> Result<(), CliError> {
    let all = target == AnalysisTarget::All;
    if all || target == AnalysisTarget::Study2 {
        study2::analyze(&ResultStore::open(study2_dir), analysis_dir)?;
    }
    if all || target == AnalysisTarget::ExperimentA {
        let (_, predictions) = experiment_a::open_stores(experiment_a_dir);
        experiment_a::analyze(&predictions, analysis_dir)?;
    }
    if all || target == AnalysisTarget::ExperimentD {
        experiment_d::analyze(
            &ResultStore::open(study2_dir),
            &ResultStore::open(experiment_d_dir),
            analysis_dir,
        )?;
    }
    println!("Analysis tables written to {}", analysis_dir.display());
    Ok(())
}

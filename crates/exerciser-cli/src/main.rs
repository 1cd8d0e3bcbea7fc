//! # exerciser-cli
//!
//! Binary entry point for the pool exerciser.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - Configuration loading with command-line overrides
//! - `exerciser run` to fan tests out across the pool
//! - `exerciser monitor` to report on the latest (or a chosen) run
//! - HTCondor-backed resource directory and submission gateway

mod condor;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use condor::{CondorStatusDirectory, CondorSubmitGateway};
use exerciser_core::{
    ConfigError, ExerciserConfig, Orchestrator, ResourceSnapshot, RunHandle, RunSettings,
    flush_all, flush_before, list_tests, monitor_run, parse_flush_date, select_tests,
    write_header, write_status,
};
use std::io::{Write, stdout};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Output format for the monitor command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable report
    #[default]
    Table,
    /// JSON format for programmatic access
    Json,
}

/// Pool exerciser - run test jobs across every resource in an HTCondor pool
#[derive(Parser, Debug)]
#[command(name = "exerciser", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    // ─────────────────────────────────────────────────────────────────────────
    // Global options (available for all subcommands)
    // ─────────────────────────────────────────────────────────────────────────

    /// Path to configuration file
    #[arg(short, long, default_value = "exerciser.yml", global = true)]
    config: PathBuf,

    /// Directory holding one subdirectory per run (must exist if given)
    #[arg(short = 'w', long, global = true)]
    working_dir: Option<PathBuf>,

    /// Directory holding one subdirectory per test (must exist if given)
    #[arg(short = 't', long = "test-dir", global = true)]
    tests_dir: Option<PathBuf>,

    /// Address of the pool's central manager
    #[arg(long, visible_alias = "cm", global = true)]
    central_manager: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a run and submit the selected tests to the pool
    Run(RunArgs),

    /// Report the outcome of a run from its shared log
    Monitor(MonitorArgs),

    /// List every resource currently visible in the pool
    Snapshot,

    /// List every test in the tests directory
    ListTests,
}

/// Arguments for the run subcommand.
#[derive(Parser, Debug)]
struct RunArgs {
    /// Tests to run, as names or comma-separated lists. All tests if omitted.
    tests: Vec<String>,

    /// Remove every previous run from the working directory first
    #[arg(short = 'f', long, conflicts_with = "flush_by_date")]
    flush_all: bool,

    /// Remove runs older than this date first (YYYY[-MM[-DD[_hh[-mm]]]])
    #[arg(short = 'd', long, value_name = "YYYY-MM-DD_hh-mm")]
    flush_by_date: Option<String>,

    /// Do everything except submitting jobs
    #[arg(short = 'b', long)]
    block_run: bool,

    /// Fraction of each resource's instances to target, in (0.0, 1.0]
    #[arg(short = 'r', long)]
    resource_sample_size: Option<f64>,
}

/// Arguments for the monitor subcommand.
#[derive(Parser, Debug)]
struct MonitorArgs {
    /// Run to report on, by directory name (default: most recent)
    #[arg(long, value_name = "YYYY-MM-DD_hh-mm")]
    run: Option<String>,

    /// List failed and aborted resources (repeat for more detail)
    #[arg(short = 'd', long, action = clap::ArgAction::Count)]
    detail: u8,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for reports
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    match cli.command {
        Commands::Run(args) => run_command(config, args).await,
        Commands::Monitor(args) => monitor_command(&config, &args),
        Commands::Snapshot => snapshot_command(&config).await,
        Commands::ListTests => list_tests_command(&config),
    }
}

/// Loads the configuration file, if any, and applies global overrides.
fn load_config(cli: &Cli) -> Result<ExerciserConfig> {
    let mut config = if cli.config.exists() {
        ExerciserConfig::from_file(&cli.config)
            .with_context(|| format!("Failed to load config from {:?}", cli.config))?
    } else {
        warn!("Config file {:?} not found, using defaults", cli.config);
        ExerciserConfig::default()
    };

    if let Some(dir) = &cli.working_dir {
        config.working_dir = dir.clone();
    }
    if let Some(dir) = &cli.tests_dir {
        config.tests_dir = dir.clone();
    }
    if let Some(cm) = &cli.central_manager {
        config.central_manager = cm.clone();
    }
    Ok(config)
}

/// The working directory, created on first use only when it is the default.
fn ensure_working_dir(config: &ExerciserConfig) -> Result<&Path> {
    let dir = config.working_dir.as_path();
    if !dir.is_dir() {
        if !config.uses_default_working_dir() {
            return Err(ConfigError::MissingDirectory {
                kind: "working",
                path: dir.to_path_buf(),
            }
            .into());
        }
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create working directory {}", dir.display()))?;
        info!(dir = %dir.display(), "Created working directory");
    }
    Ok(dir)
}

fn ensure_tests_dir(config: &ExerciserConfig) -> Result<&Path> {
    let dir = config.tests_dir.as_path();
    if !dir.is_dir() {
        return Err(ConfigError::MissingDirectory {
            kind: "tests",
            path: dir.to_path_buf(),
        }
        .into());
    }
    Ok(dir)
}

fn directory_for(config: &ExerciserConfig) -> CondorStatusDirectory {
    CondorStatusDirectory::new(config.central_manager.clone(), config.resource_attribute())
}

async fn run_command(mut config: ExerciserConfig, args: RunArgs) -> Result<()> {
    if let Some(size) = args.resource_sample_size {
        config.sample_percent = size;
    }
    config.validate().context("Configuration validation failed")?;

    let working_dir = ensure_working_dir(&config)?;
    let tests_dir = ensure_tests_dir(&config)?;

    if args.flush_all {
        let removed = flush_all(working_dir)?;
        println!("Flushed entire working directory ({} entries removed)", removed.len());
    } else if let Some(date) = &args.flush_by_date {
        let cutoff = parse_flush_date(date)?;
        let removed = flush_before(working_dir, cutoff)?;
        println!(
            "Flushed working directory by date ({} runs older than {cutoff} removed)",
            removed.len()
        );
    }

    if args.block_run {
        info!("Run blocked, nothing submitted");
        return Ok(());
    }

    let tests = select_tests(tests_dir, &args.tests)?;
    if tests.is_empty() {
        anyhow::bail!("No tests to run in {}", tests_dir.display());
    }

    let settings = RunSettings::from_config(&config)?;
    let orchestrator = Orchestrator::new(directory_for(&config), CondorSubmitGateway::new(), settings);
    let (prepared, submissions) = orchestrator
        .execute(&tests, Local::now().naive_local())
        .await
        .context("Run failed")?;

    println!(
        "Run {} created in {} against {} resources",
        prepared.run.key(),
        prepared.run.dir().display(),
        prepared.snapshot.len()
    );
    for submission in &submissions {
        match submission.batch {
            Some(batch) => println!(
                "  {}: {} jobs submitted to cluster {}",
                submission.test_name, batch.jobs, batch.cluster
            ),
            None => println!("  {}: nothing submitted", submission.test_name),
        }
    }
    Ok(())
}

fn monitor_command(config: &ExerciserConfig, args: &MonitorArgs) -> Result<()> {
    let working_dir = config.working_dir.as_path();
    if !working_dir.is_dir() {
        return Err(ConfigError::MissingDirectory {
            kind: "working",
            path: working_dir.to_path_buf(),
        }
        .into());
    }

    let run = match &args.run {
        Some(key) => RunHandle::open(working_dir, key)?,
        None => RunHandle::latest(working_dir)?,
    };
    let now = Local::now().naive_local();

    let mut out = stdout().lock();
    match args.format {
        OutputFormat::Table => {
            write_header(&mut out, run.timestamp(), now)?;
            let status = monitor_run(&run)?;
            write_status(&mut out, &status, args.detail)?;
        }
        OutputFormat::Json => {
            let status = monitor_run(&run)?;
            let report = serde_json::json!({
                "run": run.key(),
                "evaluated_at": now.format("%Y-%m-%d %H:%M:%S").to_string(),
                "status": status,
            });
            writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        }
    }
    Ok(())
}

async fn snapshot_command(config: &ExerciserConfig) -> Result<()> {
    config.validate().context("Configuration validation failed")?;
    let snapshot = ResourceSnapshot::capture(&directory_for(config))
        .await
        .context("Failed to query the pool")?;
    if snapshot.is_empty() {
        warn!(central_manager = %config.central_manager, "No resources visible");
    }

    println!("Here is a list of all currently available resources:");
    for name in snapshot.names() {
        println!("  {name}");
    }
    println!("End of resource list");
    Ok(())
}

fn list_tests_command(config: &ExerciserConfig) -> Result<()> {
    let tests = list_tests(ensure_tests_dir(config)?)?;

    println!("Here is a list of all tests in the test dir:");
    for test in tests {
        println!("  {test}");
    }
    println!("End of test list");
    Ok(())
}

//! dcmsort2nii - DICOM tree to NIfTI batch converter
//!
//! Walks a tree of DICOM slice files, converts every acquisition sequence
//! into a NIfTI volume under a mirrored output tree, and writes
//! `nifti_dicom_mapping.parquet` (plus an optional `error_log.csv`).
//!
//! The same binary doubles as the worker process: `dcmsort2nii worker`
//! reads one job as JSON on stdin and answers on stdout.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dcmsort_common::config::{load_or_default, write_toml_config, TomlConfig};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

use dcmsort2nii::config::{CliOverrides, RunSettings};
use dcmsort2nii::models::ProcessingStep;
use dcmsort2nii::services::{CommandConverter, DicomMetadataExtractor, SequenceConverter};
use dcmsort2nii::workflow::{serve_job, TaskExecutor, WorkerMode};
use dcmsort2nii::{PipelineConfig, PipelineEvent, PipelineOrchestrator};

/// Command-line arguments for dcmsort2nii
#[derive(Parser, Debug)]
#[command(name = "dcmsort2nii")]
#[command(about = "Convert DICOM series trees into NIfTI volumes with a provenance mapping")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the default configuration to a TOML file
    InitConfig {
        /// Destination file
        path: PathBuf,
    },

    /// Run one sequence task described as JSON on stdin
    #[command(hide = true)]
    Worker,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Root directory of the DICOM tree
    #[arg(required = true)]
    input_root: Option<PathBuf>,

    /// Root directory for NIfTI volumes and the mapping file
    #[arg(short = 'o', long = "output", required = true)]
    output_root: Option<PathBuf>,

    /// Concurrent workers (default: logical CPUs)
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// Split 4D volumes into numbered 3D volumes
    #[arg(short = 's', long, overrides_with = "no_split")]
    split: bool,

    /// Keep 4D volumes as converted
    #[arg(long, overrides_with = "split")]
    no_split: bool,

    /// Write error_log.csv when any step failed
    #[arg(short = 'e', long)]
    error_log: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Converter executable (overrides the configured one)
    #[arg(long)]
    converter: Option<PathBuf>,

    /// Kill a conversion after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Run tasks on threads instead of worker processes
    #[arg(long)]
    in_process: bool,
}

impl RunArgs {
    fn overrides(&self) -> CliOverrides {
        let split = if self.split {
            Some(true)
        } else if self.no_split {
            Some(false)
        } else {
            None
        };

        CliOverrides {
            workers: self.workers,
            split,
            error_log: self.error_log.then_some(true),
            converter_program: self.converter.clone(),
            timeout_secs: self.timeout,
            verbose: self.verbose,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Worker) => run_worker(),
        Some(Command::InitConfig { path }) => init_config(&path),
        None => run_pipeline(cli.run),
    }
}

/// `RUST_LOG` wins over `level` unless `force` is set
fn make_filter(level: &str, force: bool) -> EnvFilter {
    if force {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    }
}

/// Install the stderr subscriber; stdout belongs to the worker protocol
///
/// The returned handle swaps the filter once the configured level is known.
fn init_tracing(level: &str, force: bool) -> reload::Handle<EnvFilter, Registry> {
    let (filter, handle) = reload::Layer::new(make_filter(level, force));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    handle
}

fn run_worker() -> Result<()> {
    init_tracing("warn", false);

    let stdin = std::io::stdin().lock();
    let mut stdout = std::io::stdout().lock();
    serve_job(stdin, &mut stdout).context("Worker protocol failure")?;
    stdout.flush().context("Failed to flush worker reply")?;
    Ok(())
}

fn init_config(path: &Path) -> Result<()> {
    init_tracing("info", false);

    if path.exists() {
        bail!("Refusing to overwrite existing file {}", path.display());
    }
    write_toml_config(&TomlConfig::default(), path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Default configuration written to {}", path.display());
    Ok(())
}

fn run_pipeline(args: RunArgs) -> Result<()> {
    let (Some(input_root), Some(output_root)) = (args.input_root.clone(), args.output_root.clone()) else {
        bail!("INPUT_ROOT and --output are required");
    };

    // Provisional level so config loading can report what it found
    let log_handle = init_tracing(if args.verbose { "debug" } else { "info" }, args.verbose);

    let toml = load_or_default(args.config.as_deref()).context("Failed to load configuration")?;
    let settings = RunSettings::resolve(&args.overrides(), &toml);

    if let Err(e) = log_handle.reload(make_filter(&settings.log_level, args.verbose)) {
        warn!(error = %e, "Cannot apply configured log level");
    }

    info!(
        "Starting dcmsort2nii {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    debug!(?settings, "Resolved settings");

    let executor = if args.in_process {
        let converter = SequenceConverter::new(Arc::new(CommandConverter::new(settings.converter.clone())))
            .with_scratch_dir(settings.converter.scratch_dir.clone());
        TaskExecutor::new(WorkerMode::InProcess {
            converter,
            extractor: Arc::new(DicomMetadataExtractor),
        })
    } else {
        // Workers inherit RUST_LOG when the user set one
        let log_filter = match std::env::var("RUST_LOG") {
            Ok(_) if !args.verbose => None,
            _ => Some(settings.log_level.clone()),
        };
        TaskExecutor::current_exe(settings.converter.clone(), log_filter)
            .context("Cannot locate worker executable")?
    };

    let config = PipelineConfig {
        input_root,
        output_root,
        workers: settings.workers,
        split: settings.split,
        error_log: settings.error_log,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let (event_tx, mut event_rx) = mpsc::channel(100);
    let orchestrator = PipelineOrchestrator::with_events(config, executor, event_tx);

    let summary = runtime.block_on(async move {
        let progress = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                log_event(&event);
            }
        });

        let result = orchestrator.run().await;
        // Closes the event channel
        drop(orchestrator);
        let _ = progress.await;
        result
    })?;

    if let Some(path) = &summary.mapping_file {
        info!("Mapping: {} ({} rows)", path.display(), summary.rows_written);
    }
    if !summary.errors.is_empty() {
        warn!(
            conversion = summary.errors_at(ProcessingStep::Conversion),
            total = summary.errors.len(),
            "Run finished with errors"
        );
        if summary.error_log_file.is_none() && !settings.error_log {
            info!("Re-run with --error-log to record failures in error_log.csv");
        }
    }

    Ok(())
}

fn log_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::ScanCompleted {
            leaf_directories,
            tasks,
            unreadable_files,
        } => info!(
            leaf_directories,
            tasks,
            unreadable_files,
            "Found {} sequences in {} directories",
            tasks,
            leaf_directories
        ),
        PipelineEvent::TaskFinished {
            sequence_name,
            completed,
            total,
            rows_staged,
            errors,
        } => debug!(
            sequence = %sequence_name,
            rows_staged,
            errors,
            "Task {}/{} finished",
            completed,
            total
        ),
        PipelineEvent::AggregationCompleted { staging_files, rows } => {
            info!(staging_files, rows, "Results combined")
        }
        PipelineEvent::Finished { .. } => {}
    }
}

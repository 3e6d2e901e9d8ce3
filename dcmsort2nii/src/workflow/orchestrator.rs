//! Pipeline orchestrator
//!
//! # Phases
//! 1. **Scan**: walk the input root, mirror every leaf directory under the
//!    output root, group each leaf into sequence tasks
//! 2. **Dispatch**: run all tasks through the executor, at most `workers`
//!    at a time; each task stages its rows to its own file
//! 3. **Aggregate**: read every staging file back into one mapping table
//! 4. **Report**: remove staging, write the mapping and the error log
//!
//! # Error handling
//! Only an unusable input or output root aborts the run. Everything else
//! becomes an `ErrorRecord` and the run continues.

use super::events::{PipelineEvent, PipelineSummary};
use super::executor::TaskExecutor;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{ErrorRecord, ProcessingStep, SequenceTask};
use crate::services::{find_leaf_directories, SequenceGrouper};
use crate::tabular::{
    list_staging_files, read_dataset, read_parquet, write_csv, write_error_log, write_parquet,
    MappingTable, ERROR_LOG_FILE_NAME, MAPPING_FALLBACK_FILE_NAME, MAPPING_FILE_NAME,
};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Staging directory name prefix (created under the output root)
const STAGING_DIR_PREFIX: &str = "dcm_seq_results_";

/// Run configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    /// Maximum concurrently running tasks
    pub workers: usize,
    /// Split 4D volumes into 3D volumes
    pub split: bool,
    /// Write `error_log.csv` when any error was recorded
    pub error_log: bool,
}

/// Result of the scan phase
#[derive(Debug, Default)]
struct ScanResult {
    leaf_directories: usize,
    tasks: Vec<SequenceTask>,
    unreadable_files: usize,
    errors: Vec<ErrorRecord>,
}

/// Drives one conversion run
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    grouper: SequenceGrouper,
    executor: TaskExecutor,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl PipelineOrchestrator {
    pub fn new(config: PipelineConfig, executor: TaskExecutor) -> Self {
        Self {
            config,
            grouper: SequenceGrouper::new(),
            executor,
            event_tx: None,
        }
    }

    /// Create orchestrator with event channel for progress reporting
    pub fn with_events(
        config: PipelineConfig,
        executor: TaskExecutor,
        event_tx: mpsc::Sender<PipelineEvent>,
    ) -> Self {
        Self {
            event_tx: Some(event_tx),
            ..Self::new(config, executor)
        }
    }

    /// Execute the full run
    pub async fn run(&self) -> PipelineResult<PipelineSummary> {
        let input_root = self.config.input_root.as_path();
        let output_root = self.config.output_root.as_path();

        check_input_root(input_root)?;
        std::fs::create_dir_all(output_root)
            .map_err(|e| PipelineError::OutputDir(output_root.to_path_buf(), e))?;

        info!(
            input = %input_root.display(),
            output = %output_root.display(),
            workers = self.config.workers,
            split = self.config.split,
            mode = self.executor.mode_name(),
            "Scanning directories and analyzing sequences"
        );

        let scan = {
            let grouper = self.grouper.clone();
            let (input, output) = (input_root.to_path_buf(), output_root.to_path_buf());
            tokio::task::spawn_blocking(move || scan_tree(&grouper, &input, &output))
                .await
                .map_err(|e| phase_failed("Scan", e))?
        };
        let mut summary = PipelineSummary {
            leaf_directories: scan.leaf_directories,
            tasks: scan.tasks.len(),
            errors: scan.errors,
            ..Default::default()
        };

        info!(
            leaf_directories = scan.leaf_directories,
            tasks = scan.tasks.len(),
            unreadable_files = scan.unreadable_files,
            "Scan complete"
        );
        self.emit_event(PipelineEvent::ScanCompleted {
            leaf_directories: scan.leaf_directories,
            tasks: scan.tasks.len(),
            unreadable_files: scan.unreadable_files,
        })
        .await;

        if scan.tasks.is_empty() {
            info!("No sequences found, nothing to convert");
            self.emit_event(PipelineEvent::Finished {
                summary: summary.clone(),
            })
            .await;
            return Ok(summary);
        }

        let staging = tempfile::Builder::new()
            .prefix(STAGING_DIR_PREFIX)
            .tempdir_in(output_root)
            .map_err(|e| PipelineError::OutputDir(output_root.to_path_buf(), e))?;

        let task_errors = self.dispatch(scan.tasks, staging.path()).await;
        summary.errors.extend(task_errors);

        let staging_dir = staging.path().to_path_buf();
        let (table, staging_files, aggregation_errors) =
            tokio::task::spawn_blocking(move || aggregate(&staging_dir))
                .await
                .map_err(|e| phase_failed("Aggregation", e))?;
        summary.errors.extend(aggregation_errors);
        self.emit_event(PipelineEvent::AggregationCompleted {
            staging_files,
            rows: table.len(),
        })
        .await;

        let staging_path = staging.path().to_path_buf();
        if let Err(e) = staging.close() {
            warn!(dir = %staging_path.display(), error = %e, "Cannot remove staging directory");
        }

        if !table.is_empty() {
            summary.rows_written = table.len();
            let root = output_root.to_path_buf();
            let (mapping_file, write_errors) = tokio::task::spawn_blocking(move || {
                let mut errors = Vec::new();
                let written = write_mapping(&table, &root, &mut errors);
                (written, errors)
            })
            .await
            .map_err(|e| phase_failed("Mapping write", e))?;
            summary.mapping_file = mapping_file;
            summary.errors.extend(write_errors);
        }

        if self.config.error_log && !summary.errors.is_empty() {
            let path = output_root.join(ERROR_LOG_FILE_NAME);
            match write_error_log(&summary.errors, &path) {
                Ok(()) => {
                    info!(path = %path.display(), records = summary.errors.len(), "Error log written");
                    summary.error_log_file = Some(path);
                }
                Err(e) => error!(path = %path.display(), error = %e, "Cannot write error log"),
            }
        }

        info!(
            tasks = summary.tasks,
            rows = summary.rows_written,
            errors = summary.errors.len(),
            "Processing complete"
        );
        self.emit_event(PipelineEvent::Finished {
            summary: summary.clone(),
        })
        .await;

        Ok(summary)
    }

    /// Run every task; returns the error records they produced
    async fn dispatch(&self, tasks: Vec<SequenceTask>, staging_dir: &Path) -> Vec<ErrorRecord> {
        let total = tasks.len();
        let workers = self.config.workers.max(1);
        let split = self.config.split;
        info!(tasks = total, workers, "Dispatching sequence tasks");

        let mut finished = stream::iter(tasks)
            .map(|task| {
                let executor = self.executor.clone();
                async move {
                    let result = executor.execute(&task, staging_dir, split).await;
                    (task, result)
                }
            })
            .buffer_unordered(workers);

        let mut errors = Vec::new();
        let mut completed = 0usize;
        while let Some((task, result)) = finished.next().await {
            completed += 1;
            let name = task.sequence_name.to_string();

            let (rows_staged, task_errors) = match result {
                Ok(outcome) => (outcome.rows_staged, outcome.errors),
                Err(e) => {
                    error!(sequence = %name, error = %e, "Task failed to execute");
                    let record = ErrorRecord::new(ProcessingStep::Executor, e.to_string())
                        .with_sequence(name.as_str())
                        .with_directory(&task.source_dir);
                    (0, vec![record])
                }
            };

            if completed % 10 == 0 || completed == total {
                info!(progress = format!("{}/{}", completed, total), "Pipeline progress update");
            }

            self.emit_event(PipelineEvent::TaskFinished {
                sequence_name: name,
                completed,
                total,
                rows_staged,
                errors: task_errors.len(),
            })
            .await;
            errors.extend(task_errors);
        }

        errors
    }

    async fn emit_event(&self, event: PipelineEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }
}

/// Walk, mirror and group every leaf directory
///
/// Blocking; runs on the blocking pool.
fn scan_tree(grouper: &SequenceGrouper, input_root: &Path, output_root: &Path) -> ScanResult {
    let mut result = ScanResult::default();

    for leaf in find_leaf_directories(input_root) {
        result.leaf_directories += 1;

        let output_dir = leaf.mirrored_under(output_root);
        if let Err(e) = std::fs::create_dir_all(&output_dir) {
            warn!(dir = %output_dir.display(), error = %e, "Cannot create output directory");
            result.errors.push(
                ErrorRecord::new(ProcessingStep::AnalyzeSequences, format!("Cannot create {}: {}", output_dir.display(), e))
                    .with_directory(&leaf.path),
            );
            continue;
        }

        let analysis = match grouper.analyze(&leaf.path) {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(dir = %leaf.path.display(), error = %e, "Sequence analysis failed");
                result.errors.push(
                    ErrorRecord::new(ProcessingStep::AnalyzeSequences, e.to_string()).with_directory(&leaf.path),
                );
                continue;
            }
        };

        debug!(
            dir = %leaf.path.display(),
            sequences = analysis.sequences.len(),
            "Found sequences"
        );
        result.unreadable_files += analysis.unreadable_count;

        for sequence in analysis.sequences {
            result.tasks.push(SequenceTask {
                files: sequence.files,
                output_dir: output_dir.clone(),
                sequence_name: sequence.name,
                source_dir: leaf.path.clone(),
            });
        }
    }

    result
}

fn phase_failed(phase: &'static str, e: tokio::task::JoinError) -> PipelineError {
    error!(phase, error = %e, "Blocking phase did not complete");
    PipelineError::Phase {
        phase,
        message: e.to_string(),
    }
}

fn check_input_root(input_root: &Path) -> PipelineResult<()> {
    let metadata = match std::fs::metadata(input_root) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PipelineError::InputRootNotFound(input_root.to_path_buf()))
        }
        Err(e) => return Err(PipelineError::UnreadableInputRoot(input_root.to_path_buf(), e)),
    };
    if !metadata.is_dir() {
        return Err(PipelineError::NotADirectory(input_root.to_path_buf()));
    }
    std::fs::read_dir(input_root)
        .map_err(|e| PipelineError::UnreadableInputRoot(input_root.to_path_buf(), e))?;
    Ok(())
}

/// Combine all staging files; returns (table, file count, errors)
fn aggregate(staging_dir: &Path) -> (MappingTable, usize, Vec<ErrorRecord>) {
    let mut errors = Vec::new();

    let files = match list_staging_files(staging_dir) {
        Ok(files) => files,
        Err(e) => {
            error!(dir = %staging_dir.display(), error = %e, "Cannot list staging files");
            errors.push(ErrorRecord::new(ProcessingStep::AggregationFallbackRead, e.to_string()).with_directory(staging_dir));
            return (MappingTable::default(), 0, errors);
        }
    };

    if files.is_empty() {
        info!("No staging files produced");
        return (MappingTable::default(), 0, errors);
    }

    info!(files = files.len(), "Combining staging files");
    match read_dataset(&files) {
        Ok(table) => return (table, files.len(), errors),
        Err(e) => warn!(error = %e, "Combined read failed, reading staging files one by one"),
    }

    let mut table = MappingTable::default();
    for file in &files {
        match read_parquet(file) {
            Ok(part) => table.append(part),
            Err(e) => {
                warn!(file = %file.display(), error = %e, "Unreadable staging file");
                errors.push(ErrorRecord::new(ProcessingStep::AggregationFallbackRead, e.to_string()).with_file(file));
            }
        }
    }
    (table, files.len(), errors)
}

/// Write the final mapping, falling back to CSV; returns the written path
fn write_mapping(table: &MappingTable, output_root: &Path, errors: &mut Vec<ErrorRecord>) -> Option<PathBuf> {
    let primary = output_root.join(MAPPING_FILE_NAME);
    match write_parquet(table, &primary) {
        Ok(()) => {
            info!(path = %primary.display(), rows = table.len(), "Mapping written");
            return Some(primary);
        }
        Err(e) => {
            error!(path = %primary.display(), error = %e, "Cannot write Parquet mapping, falling back to CSV");
            let _ = std::fs::remove_file(&primary);
            errors.push(ErrorRecord::new(ProcessingStep::SaveFinalParquet, e.to_string()).with_file(&primary));
        }
    }

    let fallback = output_root.join(MAPPING_FALLBACK_FILE_NAME);
    match write_csv(table, &fallback) {
        Ok(()) => {
            info!(path = %fallback.display(), rows = table.len(), "Fallback mapping written");
            Some(fallback)
        }
        Err(e) => {
            error!(path = %fallback.display(), error = %e, "Cannot write fallback mapping");
            errors.push(ErrorRecord::new(ProcessingStep::SaveFallbackCsv, e.to_string()).with_file(&fallback));
            None
        }
    }
}

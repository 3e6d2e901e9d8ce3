//! Sequence task worker
//!
//! The per-sequence unit of work:
//! `START → CONVERTED → SPLIT (optional) → METADATA_EXTRACTED (per volume) → STAGED`
//!
//! Failures never escape as errors. Each is returned as an `ErrorRecord`
//! and the task stops at the first stage it cannot get past. Rows travel
//! back to the orchestrator only through the staging file.

use crate::models::{ErrorRecord, ProcessingStep, ResultRow, SequenceTask};
use crate::services::{
    CommandConverter, DicomMetadataExtractor, MetadataExtractor, SequenceConverter, VolumeSplitter,
};
use crate::tabular::{write_staging_file, MappingTable};
use dcmsort_common::config::ConverterSettings;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What a finished task reports to the orchestrator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Rows persisted to `staging_file` (0 when nothing was staged)
    pub rows_staged: usize,
    pub staging_file: Option<PathBuf>,
    pub errors: Vec<ErrorRecord>,
}

/// Self-contained job description sent to a worker process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerJob {
    pub task: SequenceTask,
    pub staging_dir: PathBuf,
    pub split: bool,
    pub converter: ConverterSettings,
}

/// Runs one `SequenceTask` end to end
pub struct TaskWorker {
    converter: SequenceConverter,
    splitter: VolumeSplitter,
    extractor: Arc<dyn MetadataExtractor>,
    split: bool,
}

impl TaskWorker {
    pub fn new(converter: SequenceConverter, extractor: Arc<dyn MetadataExtractor>, split: bool) -> Self {
        Self {
            converter,
            splitter: VolumeSplitter::new(),
            extractor,
            split,
        }
    }

    /// Worker using the external converter command and DICOM metadata
    pub fn from_settings(settings: &ConverterSettings, split: bool) -> Self {
        let converter = SequenceConverter::new(Arc::new(CommandConverter::new(settings.clone())))
            .with_scratch_dir(settings.scratch_dir.clone());
        Self::new(converter, Arc::new(DicomMetadataExtractor), split)
    }

    /// Process `task`, staging any rows under `staging_dir`
    pub fn run(&self, task: &SequenceTask, staging_dir: &Path) -> TaskOutcome {
        let name = task.sequence_name.as_str();
        let mut outcome = TaskOutcome::default();

        let record = |step: ProcessingStep, message: String| {
            ErrorRecord::new(step, message)
                .with_sequence(name)
                .with_directory(&task.source_dir)
        };

        let Some(first_file) = task.files.first() else {
            outcome
                .errors
                .push(record(ProcessingStep::Input, "No DICOM files provided".to_string()));
            return outcome;
        };

        tracing::debug!(sequence = name, files = task.files.len(), "Starting sequence");

        let volume = match self.converter.convert(&task.files, &task.output_dir, name) {
            Ok(volume) => volume,
            Err(e) => {
                tracing::warn!(sequence = name, error = %e, "Conversion failed");
                outcome
                    .errors
                    .push(record(ProcessingStep::Conversion, e.to_string()).with_file(first_file));
                return outcome;
            }
        };

        let volumes = if self.split {
            match self.splitter.try_split(&volume) {
                Ok(volumes) => volumes,
                Err(e) => {
                    // No trustworthy volume list: metadata is skipped
                    tracing::warn!(sequence = name, volume = %volume.display(), error = %e, "Split failed");
                    outcome
                        .errors
                        .push(record(ProcessingStep::Split, e.to_string()).with_file(&volume));
                    Vec::new()
                }
            }
        } else {
            vec![volume]
        };

        let mut rows = Vec::with_capacity(volumes.len());
        for volume in volumes {
            if !volume.is_file() {
                outcome.errors.push(
                    record(ProcessingStep::Metadata, "Output volume missing".to_string()).with_file(&volume),
                );
                continue;
            }
            match self.extractor.extract(first_file) {
                Ok(metadata) => rows.push(ResultRow::new(first_file.clone(), volume, metadata)),
                Err(e) => {
                    tracing::warn!(sequence = name, volume = %volume.display(), error = %e, "Metadata extraction failed");
                    outcome
                        .errors
                        .push(record(ProcessingStep::Metadata, e.to_string()).with_file(&volume));
                }
            }
        }

        if !rows.is_empty() {
            let table = MappingTable::from_rows(&rows);
            match write_staging_file(&table, staging_dir, name) {
                Ok(path) => {
                    outcome.rows_staged = rows.len();
                    outcome.staging_file = Some(path);
                }
                Err(e) => {
                    tracing::error!(sequence = name, error = %e, "Cannot save staging file");
                    outcome
                        .errors
                        .push(record(ProcessingStep::SaveTempResults, e.to_string()));
                }
            }
        }

        tracing::debug!(
            sequence = name,
            rows = outcome.rows_staged,
            errors = outcome.errors.len(),
            "Finished sequence"
        );
        outcome
    }
}

impl WorkerJob {
    pub fn run(&self) -> TaskOutcome {
        TaskWorker::from_settings(&self.converter, self.split).run(&self.task, &self.staging_dir)
    }
}

/// Worker-process entry point: one JSON `WorkerJob` in, one JSON `TaskOutcome` out
pub fn serve_job<R: Read, W: Write>(input: R, output: W) -> Result<(), serde_json::Error> {
    let job: WorkerJob = serde_json::from_reader(input)?;
    let outcome = job.run();
    serde_json::to_writer(output, &outcome)
}

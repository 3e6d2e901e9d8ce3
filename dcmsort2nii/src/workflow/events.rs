//! Progress events and run summary

use crate::models::{ErrorRecord, ProcessingStep};
use std::path::PathBuf;

/// Progress events emitted by [`super::PipelineOrchestrator`]
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Directory walk and grouping finished
    ScanCompleted {
        /// Leaf directories found under the input root
        leaf_directories: usize,
        /// Sequence tasks built across all leaves
        tasks: usize,
        /// Files excluded from grouping (not DICOM or no identity)
        unreadable_files: usize,
    },

    /// One task left the worker pool (successfully or not)
    TaskFinished {
        sequence_name: String,
        /// Tasks finished so far, including this one
        completed: usize,
        total: usize,
        /// Rows this task persisted to its staging file
        rows_staged: usize,
        /// Error records this task produced
        errors: usize,
    },

    /// Staging files read back and combined
    AggregationCompleted {
        staging_files: usize,
        rows: usize,
    },

    /// Run complete
    Finished { summary: PipelineSummary },
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineSummary {
    pub leaf_directories: usize,
    pub tasks: usize,
    /// Rows in the final mapping
    pub rows_written: usize,
    /// Every recorded failure, whether or not an error log was written
    pub errors: Vec<ErrorRecord>,
    /// Parquet mapping, or the CSV fallback when Parquet failed
    pub mapping_file: Option<PathBuf>,
    pub error_log_file: Option<PathBuf>,
}

impl PipelineSummary {
    /// Number of records attributed to `step`
    pub fn errors_at(&self, step: ProcessingStep) -> usize {
        self.errors.iter().filter(|e| e.step == step).count()
    }
}

//! Error types for dcmsort2nii
//!
//! Every component below the orchestrator has its own error enum. The worker
//! and orchestrator turn these into `ErrorRecord`s; only `PipelineError`
//! escapes `PipelineOrchestrator::run`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure grouping one directory
#[derive(Debug, Error)]
pub enum GroupingError {
    /// Directory exists but cannot be listed
    #[error("Cannot list directory {0}: {1}")]
    ReadDir(PathBuf, std::io::Error),
}

/// Failure reading a DICOM header
#[derive(Debug, Error)]
pub enum DicomReadError {
    /// File is not a readable DICOM file
    #[error("Cannot open {0} as DICOM: {1}")]
    Open(PathBuf, String),

    /// Element present but its value cannot be decoded as text
    #[error("Cannot decode {element} in {path}: {reason}")]
    Decode {
        path: PathBuf,
        element: &'static str,
        reason: String,
    },
}

/// Underlying cause of a failed conversion
#[derive(Debug, Error)]
pub enum ConverterFailure {
    /// Caller passed no files
    #[error("no input files")]
    EmptyInput,

    /// Creating or populating a staging directory failed
    #[error("staging failed: {0}")]
    Staging(std::io::Error),

    /// Converter executable could not be started
    #[error("cannot launch {program}: {source}")]
    Launch {
        program: PathBuf,
        source: std::io::Error,
    },

    /// Converter exited unsuccessfully
    #[error("converter exited with {status}: {output}")]
    Exit { status: String, output: String },

    /// Converter exceeded the configured timeout and was killed
    #[error("converter timed out after {0:?}")]
    Timeout(Duration),

    /// Converter succeeded but wrote no volume
    #[error("converter produced no volume file")]
    NoOutput,

    /// Moving the volume into the output tree failed
    #[error("cannot move volume to {dest}: {source}")]
    Finalize {
        dest: PathBuf,
        source: std::io::Error,
    },

    /// Converter-specific failure (custom converters)
    #[error("{0}")]
    Other(String),
}

/// Conversion failure of one sequence, with enough context to diagnose it
#[derive(Debug, Error)]
#[error("conversion of {file_count} files (first: {}) failed: {cause}", first_file.display())]
pub struct ConversionError {
    pub file_count: usize,
    pub first_file: PathBuf,
    #[source]
    pub cause: ConverterFailure,
}

/// Failure splitting a volume
#[derive(Debug, Error)]
pub enum SplitError {
    /// Volume cannot be read
    #[error("cannot read volume {0}: {1}")]
    Read(PathBuf, nifti::NiftiError),

    /// Only 3D and 4D volumes are handled
    #[error("unsupported dimensionality {0} (expected 3 or 4)")]
    UnsupportedDimensionality(usize),

    /// Voxel type not handled by the splitter
    #[error("unsupported voxel type {0}")]
    UnsupportedDataType(String),

    /// Writing volume `index` failed
    #[error("cannot write volume {index} to {path}: {source}")]
    Write {
        index: usize,
        path: PathBuf,
        source: nifti::NiftiError,
    },

    /// All volumes written but the 4D original could not be removed
    #[error("cannot remove original {0}: {1}")]
    RemoveOriginal(PathBuf, std::io::Error),
}

/// Failure extracting metadata
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Source file could not be read
    #[error("Failed to read {0}: {1}")]
    ReadError(PathBuf, String),
}

/// Failure reading or writing a tabular file
#[derive(Debug, Error)]
pub enum TabularError {
    #[error("I/O error on {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Failure running one task in the worker pool
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Worker process could not be started
    #[error("cannot spawn worker {0}: {1}")]
    Spawn(PathBuf, std::io::Error),

    /// Sending the job or reading the reply failed
    #[error("worker I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Worker exited unsuccessfully (crash, signal, panic)
    #[error("worker exited with {status}")]
    WorkerExit { status: String },

    /// Worker reply could not be decoded
    #[error("invalid worker reply: {0}")]
    Protocol(#[from] serde_json::Error),

    /// In-process task panicked or was cancelled
    #[error("task failed to complete: {0}")]
    Join(String),
}

/// Fatal pipeline errors; only these abort a run
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input root does not exist
    #[error("Input root not found: {0}")]
    InputRootNotFound(PathBuf),

    /// Input root is not a directory
    #[error("Input root is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Input root cannot be walked
    #[error("Cannot read input root {0}: {1}")]
    UnreadableInputRoot(PathBuf, std::io::Error),

    /// Output root or staging directory cannot be created
    #[error("Cannot prepare output directory {0}: {1}")]
    OutputDir(PathBuf, std::io::Error),

    /// A blocking phase panicked or was cancelled
    #[error("{phase} phase did not complete: {message}")]
    Phase { phase: &'static str, message: String },
}

/// Result type for pipeline runs
pub type PipelineResult<T> = Result<T, PipelineError>;

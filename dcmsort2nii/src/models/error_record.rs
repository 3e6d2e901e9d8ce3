//! Per-step failure records collected across the pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Processing step a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessingStep {
    /// Task carried no usable files
    Input,
    /// Grouping a leaf directory failed outright
    AnalyzeSequences,
    /// External converter failed or produced no output
    Conversion,
    /// 4D decomposition failed
    Split,
    /// Per-volume metadata extraction failed
    Metadata,
    /// Staging file could not be written; the task's rows are discarded
    SaveTempResults,
    /// Worker pool could not run or complete the task
    Executor,
    /// Staging file unreadable during fallback aggregation
    AggregationFallbackRead,
    /// Primary (Parquet) mapping write failed
    SaveFinalParquet,
    /// Secondary (CSV) mapping write failed
    #[serde(rename = "SaveFallbackCSV")]
    SaveFallbackCsv,
}

impl ProcessingStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStep::Input => "Input",
            ProcessingStep::AnalyzeSequences => "AnalyzeSequences",
            ProcessingStep::Conversion => "Conversion",
            ProcessingStep::Split => "Split",
            ProcessingStep::Metadata => "Metadata",
            ProcessingStep::SaveTempResults => "SaveTempResults",
            ProcessingStep::Executor => "Executor",
            ProcessingStep::AggregationFallbackRead => "AggregationFallbackRead",
            ProcessingStep::SaveFinalParquet => "SaveFinalParquet",
            ProcessingStep::SaveFallbackCsv => "SaveFallbackCSV",
        }
    }
}

impl fmt::Display for ProcessingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded failure
///
/// Field order is the column order of `error_log.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(rename = "Step")]
    pub step: ProcessingStep,
    #[serde(rename = "Directory")]
    pub directory: Option<PathBuf>,
    #[serde(rename = "SequenceName")]
    pub sequence_name: Option<String>,
    #[serde(rename = "File")]
    pub file: Option<PathBuf>,
    #[serde(rename = "Error")]
    pub message: String,
}

impl ErrorRecord {
    pub fn new(step: ProcessingStep, message: impl Into<String>) -> Self {
        Self {
            step,
            directory: None,
            sequence_name: None,
            file: None,
            message: message.into(),
        }
    }

    pub fn with_directory(mut self, directory: &Path) -> Self {
        self.directory = Some(directory.to_path_buf());
        self
    }

    pub fn with_sequence(mut self, sequence_name: impl Into<String>) -> Self {
        self.sequence_name = Some(sequence_name.into());
        self
    }

    pub fn with_file(mut self, file: &Path) -> Self {
        self.file = Some(file.to_path_buf());
        self
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.step)?;
        if let Some(name) = &self.sequence_name {
            write!(f, " sequence={}", name)?;
        }
        if let Some(dir) = &self.directory {
            write!(f, " dir={}", dir.display())?;
        }
        if let Some(file) = &self.file {
            write!(f, " file={}", file.display())?;
        }
        write!(f, ": {}", self.message)
    }
}

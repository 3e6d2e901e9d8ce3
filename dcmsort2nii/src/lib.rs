//! dcmsort2nii library interface
//!
//! Converts trees of DICOM slice files into NIfTI volumes, one volume (or
//! one volume per time point) per acquisition sequence, and records a
//! mapping from every volume back to its source files and header metadata.
//!
//! Exposed as a library for the binary and for integration tests.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod tabular;
pub mod workflow;

pub use crate::error::{PipelineError, PipelineResult};
pub use crate::workflow::{PipelineConfig, PipelineEvent, PipelineOrchestrator, PipelineSummary};

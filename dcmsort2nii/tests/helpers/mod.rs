//! Test Helper Utilities
//!
//! Shared fixtures for dcmsort2nii integration tests

#![allow(dead_code)]

pub mod dicom_generator;
pub mod fake_converter;
pub mod nifti_volume;

pub use dicom_generator::{write_series, write_slice, SeriesSpec};
pub use fake_converter::{FakeConverter, TIME_POINTS};
pub use nifti_volume::{read_header, read_volume, write_volume, write_volume_with_header};

use dcmsort2nii::services::{DicomMetadataExtractor, SequenceConverter};
use dcmsort2nii::workflow::{TaskExecutor, WorkerMode};
use dcmsort2nii::PipelineConfig;
use std::path::Path;
use std::sync::Arc;

/// In-process executor backed by [`FakeConverter`]
pub fn fake_executor() -> TaskExecutor {
    TaskExecutor::new(WorkerMode::InProcess {
        converter: SequenceConverter::new(Arc::new(FakeConverter)),
        extractor: Arc::new(DicomMetadataExtractor),
    })
}

pub fn pipeline_config(input_root: &Path, output_root: &Path) -> PipelineConfig {
    PipelineConfig {
        input_root: input_root.to_path_buf(),
        output_root: output_root.to_path_buf(),
        workers: 2,
        split: false,
        error_log: false,
    }
}

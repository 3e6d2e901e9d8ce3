//! Data models for sequence discovery, conversion results and failures

pub mod error_record;
pub mod result_row;
pub mod sequence;

pub use error_record::{ErrorRecord, ProcessingStep};
pub use result_row::{
    MetadataMap, MetadataValue, ResultRow, FIRST_DICOM_FILE_COLUMN, NIFTI_FILE_COLUMN,
};
pub use sequence::{DescriptiveFields, SequenceKey, SequenceName, SequenceTask};

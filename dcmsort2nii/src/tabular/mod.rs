//! Tabular results: per-task staging files, the final mapping and the error log

pub mod csv_io;
pub mod parquet_io;
pub mod table;

pub use csv_io::{write_csv, write_error_log};
pub use parquet_io::{list_staging_files, read_dataset, read_parquet, write_parquet, write_staging_file};
pub use table::MappingTable;

/// Final mapping file name
pub const MAPPING_FILE_NAME: &str = "nifti_dicom_mapping.parquet";

/// Fallback mapping file name, written when Parquet output fails
pub const MAPPING_FALLBACK_FILE_NAME: &str = "nifti_dicom_mapping_fallback.csv";

/// Error log file name
pub const ERROR_LOG_FILE_NAME: &str = "error_log.csv";

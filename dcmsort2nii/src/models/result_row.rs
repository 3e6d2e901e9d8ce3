//! Mapping rows: one per output volume

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Column holding the first slice file of the source sequence
pub const FIRST_DICOM_FILE_COLUMN: &str = "FirstDicomFile";

/// Column holding the output volume path
pub const NIFTI_FILE_COLUMN: &str = "NiftiFile";

/// Extracted header value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Number(f64),
    Text(String),
    Numbers(Vec<f64>),
    Texts(Vec<String>),
}

impl fmt::Display for MetadataValue {
    /// Multi-valued entries are joined with `\`, the DICOM value delimiter
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Number(n) => write!(f, "{}", n),
            MetadataValue::Text(s) => f.write_str(s),
            MetadataValue::Numbers(values) => {
                let joined: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                f.write_str(&joined.join("\\"))
            }
            MetadataValue::Texts(values) => f.write_str(&values.join("\\")),
        }
    }
}

/// Field name → value, ordered by field name
pub type MetadataMap = BTreeMap<String, MetadataValue>;

/// Provenance row for one output volume
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub first_input_file: PathBuf,
    pub output_volume_file: PathBuf,
    pub metadata: MetadataMap,
}

impl ResultRow {
    pub fn new(first_input_file: PathBuf, output_volume_file: PathBuf, metadata: MetadataMap) -> Self {
        Self {
            first_input_file,
            output_volume_file,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_joins_lists_with_backslash() {
        assert_eq!(MetadataValue::Number(2.5).to_string(), "2.5");
        assert_eq!(
            MetadataValue::Numbers(vec![0.5, 0.75]).to_string(),
            "0.5\\0.75"
        );
        assert_eq!(
            MetadataValue::Texts(vec!["ORIGINAL".into(), "PRIMARY".into()]).to_string(),
            "ORIGINAL\\PRIMARY"
        );
    }
}

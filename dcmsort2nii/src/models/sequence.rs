//! Sequence identity, naming and work items

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// Longest sequence name kept after sanitization
const MAX_NAME_LEN: usize = 128;

/// Stable identifier of one acquisition
///
/// Hex-encoded SHA-256 of the acquisition-identity fields joined by `|`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequenceKey(String);

impl SequenceKey {
    /// Hash identity fields into a key
    pub fn from_identity(fields: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(fields.join("|").as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 hex characters, used in fallback names
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Descriptive header fields used to build a human-usable sequence name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptiveFields {
    /// AcquisitionDate, or SeriesDate when absent
    pub acquisition_date: Option<String>,
    pub series_number: Option<String>,
    pub series_description: Option<String>,
}

impl DescriptiveFields {
    fn is_empty(&self) -> bool {
        self.acquisition_date.is_none()
            && self.series_number.is_none()
            && self.series_description.is_none()
    }
}

/// Filesystem-safe sequence name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceName(String);

impl SequenceName {
    /// Derive a name from descriptive fields
    ///
    /// `None` means reading the descriptive fields failed. Every outcome is a
    /// usable name:
    /// - `Error_<key8>` when the fields could not be read
    /// - `Unknown_<key8>` when no descriptive field is present
    /// - `Fallback_<key8>` when sanitization leaves nothing
    pub fn derive(key: &SequenceKey, fields: Option<&DescriptiveFields>) -> Self {
        let Some(fields) = fields else {
            return Self::fallback("Error", key);
        };

        if fields.is_empty() {
            return Self::fallback("Unknown", key);
        }

        let mut parts = Vec::with_capacity(3);
        if let Some(date) = &fields.acquisition_date {
            parts.push(date.clone());
        }
        if let Some(number) = &fields.series_number {
            match number.trim().parse::<i64>() {
                Ok(n) if n >= 0 => parts.push(format!("{:04}", n)),
                _ => parts.push(number.clone()),
            }
        }
        if let Some(description) = &fields.series_description {
            parts.push(description.clone());
        }

        let name = sanitize(&parts.join("_"));
        if name.is_empty() {
            Self::fallback("Fallback", key)
        } else {
            Self(name)
        }
    }

    fn fallback(prefix: &str, key: &SequenceKey) -> Self {
        Self(format!("{}_{}", prefix, key.short()))
    }

    /// Same name with the key prefix appended, for disambiguation
    pub fn disambiguated(&self, key: &SequenceKey) -> Self {
        Self(format!("{}_{}", self.0, key.short()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SequenceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replace whitespace and path-breaking characters with `_`
fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_underscore = false;

    for c in raw.chars() {
        let mapped = if c.is_whitespace()
            || c.is_control()
            || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '^')
        {
            '_'
        } else {
            c
        };

        if mapped == '_' {
            if !last_underscore {
                out.push('_');
            }
            last_underscore = true;
        } else {
            out.push(mapped);
            last_underscore = false;
        }
    }

    let is_edge = |c: char| c == '_' || c == '.';
    let truncated: String = out.trim_matches(is_edge).chars().take(MAX_NAME_LEN).collect();
    truncated.trim_end_matches(is_edge).to_string()
}

/// Immutable unit of work: one sequence to convert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceTask {
    /// Slice files in first-seen order
    pub files: Vec<PathBuf>,
    /// Mirrored output directory the volume(s) land in
    pub output_dir: PathBuf,
    pub sequence_name: SequenceName,
    /// Leaf directory the files were discovered in (error context only)
    pub source_dir: PathBuf,
}

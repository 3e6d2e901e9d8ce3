//! Sequence grouper
//!
//! Partitions the slice files of ONE directory into acquisition sequences.
//! Recursion into subdirectories is the orchestrator's job.
//!
//! Determinism rules:
//! - Sequences are kept in the order their first file was enumerated
//! - Files within a sequence keep enumeration order
//! - A sequence's name is computed once, from its first file

use crate::error::GroupingError;
use crate::models::{SequenceKey, SequenceName};
use crate::services::dicom_reader::{read_slice_identity, SliceIdentity};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Files of one acquisition
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub key: SequenceKey,
    pub name: SequenceName,
    /// Enumeration order, not sorted
    pub files: Vec<PathBuf>,
}

/// Grouping result for one directory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceAnalysis {
    /// Sequences in first-seen order
    pub sequences: Vec<Sequence>,
    /// Regular files enumerated (subdirectories excluded)
    pub total_files: usize,
    /// Files that are not DICOM or lack the identity field
    pub unreadable_count: usize,
}

impl SequenceAnalysis {
    /// Look up a sequence by key
    pub fn get(&self, key: &SequenceKey) -> Option<&Sequence> {
        self.sequences.iter().find(|s| &s.key == key)
    }

    /// Key → files view
    pub fn files_by_key(&self) -> HashMap<&SequenceKey, &[PathBuf]> {
        self.sequences
            .iter()
            .map(|s| (&s.key, s.files.as_slice()))
            .collect()
    }

    /// Key → name view
    pub fn names_by_key(&self) -> HashMap<&SequenceKey, &SequenceName> {
        self.sequences.iter().map(|s| (&s.key, &s.name)).collect()
    }
}

/// Reads slice identity from a file
///
/// Seam for tests; the default reads DICOM headers.
pub type IdentityReader = fn(&Path) -> Result<SliceIdentity, crate::error::DicomReadError>;

/// Sequence grouper
#[derive(Clone)]
pub struct SequenceGrouper {
    read_identity: IdentityReader,
}

impl SequenceGrouper {
    /// Create grouper reading DICOM headers
    pub fn new() -> Self {
        Self {
            read_identity: read_slice_identity,
        }
    }

    /// Create grouper with a custom identity reader
    pub fn with_reader(read_identity: IdentityReader) -> Self {
        Self { read_identity }
    }

    /// Group the direct children of `directory`
    ///
    /// A missing directory yields an empty analysis. Only a directory that
    /// exists but cannot be listed is an error.
    pub fn analyze(&self, directory: &Path) -> Result<SequenceAnalysis, GroupingError> {
        let entries = match std::fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(dir = %directory.display(), "Directory does not exist, nothing to group");
                return Ok(SequenceAnalysis::default());
            }
            Err(e) => return Err(GroupingError::ReadDir(directory.to_path_buf(), e)),
        };

        let mut analysis = SequenceAnalysis::default();
        let mut index_by_key: HashMap<SequenceKey, usize> = HashMap::new();
        let mut used_names: HashSet<SequenceName> = HashSet::new();

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(dir = %directory.display(), error = %e, "Error accessing entry");
                    analysis.total_files += 1;
                    analysis.unreadable_count += 1;
                    continue;
                }
            };

            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            analysis.total_files += 1;

            let identity = match (self.read_identity)(&path) {
                Ok(identity) => identity,
                Err(e) => {
                    tracing::trace!(file = %path.display(), error = %e, "Not groupable");
                    analysis.unreadable_count += 1;
                    continue;
                }
            };

            let Some(uid) = identity.series_instance_uid.as_deref() else {
                tracing::debug!(file = %path.display(), "Missing SeriesInstanceUID, excluded from grouping");
                analysis.unreadable_count += 1;
                continue;
            };

            let key = SequenceKey::from_identity(&[uid]);
            match index_by_key.get(&key) {
                Some(&index) => analysis.sequences[index].files.push(path),
                None => {
                    let mut name = SequenceName::derive(&key, identity.descriptive.as_ref());
                    if used_names.contains(&name) {
                        name = name.disambiguated(&key);
                    }
                    used_names.insert(name.clone());

                    index_by_key.insert(key.clone(), analysis.sequences.len());
                    analysis.sequences.push(Sequence {
                        key,
                        name,
                        files: vec![path],
                    });
                }
            }
        }

        tracing::debug!(
            dir = %directory.display(),
            sequences = analysis.sequences.len(),
            total_files = analysis.total_files,
            unreadable = analysis.unreadable_count,
            "Directory grouped"
        );

        Ok(analysis)
    }
}

impl Default for SequenceGrouper {
    fn default() -> Self {
        Self::new()
    }
}

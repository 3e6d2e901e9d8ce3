//! Service modules for DICOM sequence conversion
//!
//! Leaf-first: header reading, directory discovery, grouping, conversion,
//! 4D splitting and metadata extraction. Each service works on one directory,
//! sequence or volume; fan-out lives in `workflow`.

pub mod converter;
pub mod dicom_reader;
pub mod directory_walker;
pub mod metadata_extractor;
pub mod sequence_grouper;
pub mod volume_splitter;

pub use converter::{CommandConverter, SequenceConverter, VolumeConverter};
pub use dicom_reader::{open_header, read_slice_identity, SliceIdentity};
pub use directory_walker::{find_leaf_directories, LeafDirectory};
pub use metadata_extractor::{DicomMetadataExtractor, MetadataExtractor};
pub use sequence_grouper::{IdentityReader, Sequence, SequenceAnalysis, SequenceGrouper};
pub use volume_splitter::VolumeSplitter;

//! DICOM metadata extraction
//!
//! Reads every non-bulk element of a slice header into a flat field map.
//! Field names are standard dictionary keywords (`PatientName`,
//! `RepetitionTime`), or the tag itself for private/unknown elements.

use crate::error::MetadataError;
use crate::models::{MetadataMap, MetadataValue};
use crate::services::dicom_reader::open_header;
use dicom::core::dictionary::{DataDictionary, DataDictionaryEntry};
use dicom::core::header::Header;
use dicom::core::{PrimitiveValue, Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;
use std::path::Path;

/// Value representations holding binary or nested data
const SKIPPED_VRS: [VR; 8] = [VR::OB, VR::OW, VR::OF, VR::OD, VR::OL, VR::OV, VR::UN, VR::SQ];

/// Per-volume metadata source
pub trait MetadataExtractor: Send + Sync {
    /// Extract header fields from `path`
    ///
    /// Implementations should prefer an empty map over an error when the
    /// file is simply unreadable; an `Err` is recorded against the volume.
    fn extract(&self, path: &Path) -> Result<MetadataMap, MetadataError>;
}

/// Header-only DICOM extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomMetadataExtractor;

impl MetadataExtractor for DicomMetadataExtractor {
    fn extract(&self, path: &Path) -> Result<MetadataMap, MetadataError> {
        let obj = match open_header(path) {
            Ok(obj) => obj,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Metadata unavailable, using empty field set");
                return Ok(MetadataMap::new());
            }
        };

        let mut metadata = MetadataMap::new();
        for elem in obj.iter() {
            let vr = elem.vr();
            if SKIPPED_VRS.contains(&vr) {
                continue;
            }
            let Some(primitive) = elem.value().primitive() else {
                continue;
            };
            if let Some(value) = convert_value(vr, primitive) {
                metadata.insert(field_name(elem.tag()), value);
            }
        }

        tracing::trace!(file = %path.display(), fields = metadata.len(), "Metadata extracted");
        Ok(metadata)
    }
}

/// Dictionary keyword, or `(gggg,eeee)` when the tag is not in the dictionary
fn field_name(tag: Tag) -> String {
    match StandardDataDictionary.by_tag(tag) {
        Some(entry) => entry.alias().to_string(),
        None => tag.to_string(),
    }
}

fn convert_value(vr: VR, value: &PrimitiveValue) -> Option<MetadataValue> {
    if matches!(value, PrimitiveValue::Empty) {
        return Some(MetadataValue::Text(String::new()));
    }

    match vr {
        VR::PN => Some(MetadataValue::Text(
            clean(&value.to_str()).replace('^', " ").trim().to_string(),
        )),
        VR::DS | VR::IS | VR::FD | VR::FL => match value.to_multi_float64() {
            Ok(mut numbers) if numbers.len() == 1 => numbers.pop().map(MetadataValue::Number),
            Ok(numbers) if !numbers.is_empty() => Some(MetadataValue::Numbers(numbers)),
            // Malformed decimal strings are kept verbatim
            _ => Some(MetadataValue::Text(clean(&value.to_str()))),
        },
        _ => {
            if value.multiplicity() > 1 {
                let items = value
                    .to_multi_str()
                    .iter()
                    .map(|s| clean(s))
                    .collect::<Vec<_>>();
                Some(MetadataValue::Texts(items))
            } else {
                Some(MetadataValue::Text(clean(&value.to_str())))
            }
        }
    }
}

fn clean(text: &str) -> String {
    text.trim_matches(|c: char| c.is_whitespace() || c == '\0').to_string()
}

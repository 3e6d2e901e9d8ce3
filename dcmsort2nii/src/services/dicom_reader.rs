//! DICOM header access
//!
//! Header-only parsing: reading stops at PixelData so grouping and metadata
//! extraction never pay for pixel decoding.

use crate::error::DicomReadError;
use crate::models::DescriptiveFields;
use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::{DefaultDicomObject, OpenFileOptions};
use std::path::Path;

/// Identity and naming fields of one slice file
#[derive(Debug, Clone, PartialEq)]
pub struct SliceIdentity {
    /// SeriesInstanceUID, `None` when missing or empty
    pub series_instance_uid: Option<String>,
    /// Descriptive fields, `None` when they could not be decoded
    pub descriptive: Option<DescriptiveFields>,
}

/// Open a DICOM file without its pixel data
pub fn open_header(path: &Path) -> Result<DefaultDicomObject, DicomReadError> {
    OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .map_err(|e| DicomReadError::Open(path.to_path_buf(), e.to_string()))
}

/// Read the identity fields of a slice file
pub fn read_slice_identity(path: &Path) -> Result<SliceIdentity, DicomReadError> {
    let obj = open_header(path)?;

    let series_instance_uid =
        element_text(&obj, path, tags::SERIES_INSTANCE_UID, "SeriesInstanceUID")?;

    let descriptive = match read_descriptive(&obj, path) {
        Ok(fields) => Some(fields),
        Err(e) => {
            tracing::debug!(file = %path.display(), error = %e, "Descriptive fields unreadable");
            None
        }
    };

    Ok(SliceIdentity {
        series_instance_uid,
        descriptive,
    })
}

fn read_descriptive(obj: &DefaultDicomObject, path: &Path) -> Result<DescriptiveFields, DicomReadError> {
    let acquisition_date = match element_text(obj, path, tags::ACQUISITION_DATE, "AcquisitionDate")? {
        Some(date) => Some(date),
        None => element_text(obj, path, tags::SERIES_DATE, "SeriesDate")?,
    };

    Ok(DescriptiveFields {
        acquisition_date,
        series_number: element_text(obj, path, tags::SERIES_NUMBER, "SeriesNumber")?,
        series_description: element_text(obj, path, tags::SERIES_DESCRIPTION, "SeriesDescription")?,
    })
}

/// Trimmed text value of an element; empty values count as missing
fn element_text(
    obj: &DefaultDicomObject,
    path: &Path,
    tag: Tag,
    element: &'static str,
) -> Result<Option<String>, DicomReadError> {
    let decode_error = |reason: String| DicomReadError::Decode {
        path: path.to_path_buf(),
        element,
        reason,
    };

    let Some(elem) = obj.element_opt(tag).map_err(|e| decode_error(e.to_string()))? else {
        return Ok(None);
    };

    let text = elem.to_str().map_err(|e| decode_error(e.to_string()))?;
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');

    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

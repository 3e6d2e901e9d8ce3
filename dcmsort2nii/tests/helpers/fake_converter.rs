//! Converter stand-in that needs no external binary
//!
//! Looks at the SeriesDescription of the first staged slice:
//! - contains `FAIL`: conversion fails
//! - contains `fMRI`: writes a 4D volume with [`TIME_POINTS`] time points
//! - otherwise: writes a 3D volume

use super::nifti_volume::write_volume;
use dcmsort2nii::error::ConverterFailure;
use dcmsort2nii::services::{read_slice_identity, VolumeConverter};
use std::path::Path;

pub const TIME_POINTS: usize = 5;

#[derive(Debug, Default)]
pub struct FakeConverter;

impl VolumeConverter for FakeConverter {
    fn convert(&self, source_dir: &Path, dest_dir: &Path) -> Result<(), ConverterFailure> {
        let first = source_dir.join("file_000000.dcm");
        let identity = read_slice_identity(&first).map_err(|e| ConverterFailure::Other(e.to_string()))?;
        let description = identity
            .descriptive
            .and_then(|d| d.series_description)
            .unwrap_or_default();

        if description.contains("FAIL") {
            return Err(ConverterFailure::Other(format!("cannot reconstruct {}", description)));
        }

        let dims: &[usize] = if description.contains("fMRI") {
            &[4, 4, 3, TIME_POINTS]
        } else {
            &[4, 4, 3]
        };
        write_volume(&dest_dir.join("volume.nii.gz"), dims).map_err(|e| ConverterFailure::Other(e.to_string()))
    }
}

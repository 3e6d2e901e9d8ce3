//! Volume splitter
//!
//! Decomposes a 4D NIfTI time series into numbered 3D volumes
//! (`<base>_vol_0000.nii.gz`, ...) and removes the superseded original.
//! 3D volumes pass through; a 4D volume with a single time point still
//! becomes `<base>_vol_0000`.
//!
//! Voxels are copied in their stored type. When the header carries a
//! non-identity intensity scaling the data is read as `f32` with the scaling
//! applied, and the written volumes carry an identity scaling instead.

use crate::error::SplitError;
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiObject, NiftiType, NiftiVolume, ReaderOptions};
use ndarray::{Array, Axis, IxDyn};
use std::path::{Path, PathBuf};

const VOLUME_EXTENSIONS: [&str; 2] = [".nii.gz", ".nii"];

/// 4D → 3D splitter
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeSplitter;

impl VolumeSplitter {
    pub fn new() -> Self {
        Self
    }

    /// Split `volume_file`, pairing every resulting volume with `first_input_file`
    ///
    /// Returns an empty list on any failure; the failure is logged.
    pub fn split(&self, first_input_file: &Path, volume_file: &Path) -> Vec<(PathBuf, PathBuf)> {
        match self.try_split(volume_file) {
            Ok(volumes) => volumes
                .into_iter()
                .map(|v| (first_input_file.to_path_buf(), v))
                .collect(),
            Err(e) => {
                tracing::error!(volume = %volume_file.display(), error = %e, "Split failed");
                Vec::new()
            }
        }
    }

    /// Split `volume_file` into its 3D volumes
    ///
    /// On error no new volume is left behind and the original stays on disk.
    pub fn try_split(&self, volume_file: &Path) -> Result<Vec<PathBuf>, SplitError> {
        let obj = ReaderOptions::new()
            .read_file(volume_file)
            .map_err(|e| SplitError::Read(volume_file.to_path_buf(), e))?;
        let mut header = obj.header().clone();
        let volume = obj.into_volume();

        let dims: Vec<usize> = volume.dim().iter().map(|&d| d as usize).collect();
        match dims.len() {
            3 => return Ok(vec![volume_file.to_path_buf()]),
            4 => {}
            n => return Err(SplitError::UnsupportedDimensionality(n)),
        }

        let count = dims[3];
        let (base, extension) = split_extension(volume_file);
        let targets: Vec<PathBuf> = (0..count)
            .map(|i| PathBuf::from(format!("{}_vol_{:04}{}", base, i, extension)))
            .collect();

        let scaled = header.scl_slope != 0.0 && (header.scl_slope != 1.0 || header.scl_inter != 0.0);

        macro_rules! write_as {
            ($t:ty) => {{
                let data: Array<$t, IxDyn> = volume
                    .into_ndarray::<$t>()
                    .map_err(|e| SplitError::Read(volume_file.to_path_buf(), e))?;
                let mut result = Ok(());
                for (index, target) in targets.iter().enumerate() {
                    let slab = data.index_axis(Axis(3), index).to_owned();
                    if let Err(source) = WriterOptions::new(target)
                        .reference_header(&header)
                        .write_nifti(&slab)
                    {
                        result = Err(SplitError::Write {
                            index,
                            path: target.clone(),
                            source,
                        });
                        break;
                    }
                }
                result
            }};
        }

        let written = if scaled {
            header.scl_slope = 1.0;
            header.scl_inter = 0.0;
            write_as!(f32)
        } else {
            match volume.data_type() {
                NiftiType::Uint8 => write_as!(u8),
                NiftiType::Int8 => write_as!(i8),
                NiftiType::Uint16 => write_as!(u16),
                NiftiType::Int16 => write_as!(i16),
                NiftiType::Uint32 => write_as!(u32),
                NiftiType::Int32 => write_as!(i32),
                NiftiType::Uint64 => write_as!(u64),
                NiftiType::Int64 => write_as!(i64),
                NiftiType::Float32 => write_as!(f32),
                NiftiType::Float64 => write_as!(f64),
                other => Err(SplitError::UnsupportedDataType(format!("{:?}", other))),
            }
        };

        if let Err(e) = written {
            remove_partial(&targets);
            return Err(e);
        }

        supersede_original(volume_file, &targets)?;

        tracing::debug!(volume = %volume_file.display(), count, "4D volume split");
        Ok(targets)
    }
}

/// Delete the 4D original once every volume is written
///
/// If the original cannot be removed the new volumes are removed instead, so
/// only one representation of the series stays on disk.
fn supersede_original(volume_file: &Path, targets: &[PathBuf]) -> Result<(), SplitError> {
    if let Err(e) = std::fs::remove_file(volume_file) {
        remove_partial(targets);
        return Err(SplitError::RemoveOriginal(volume_file.to_path_buf(), e));
    }
    Ok(())
}

/// Remove volumes written before a failure
fn remove_partial(targets: &[PathBuf]) {
    for target in targets {
        if target.exists() {
            if let Err(e) = std::fs::remove_file(target) {
                tracing::warn!(file = %target.display(), error = %e, "Cannot remove partial split output");
            }
        }
    }
}

/// `/a/b/name.nii.gz` → (`/a/b/name`, `.nii.gz`)
fn split_extension(path: &Path) -> (String, &'static str) {
    let text = path.to_string_lossy();
    for ext in VOLUME_EXTENSIONS {
        if let Some(base) = text.strip_suffix(ext) {
            return (base.to_string(), ext);
        }
    }
    (text.to_string(), ".nii.gz")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_extension() {
        assert_eq!(
            split_extension(Path::new("/o/T1.nii.gz")),
            ("/o/T1".to_string(), ".nii.gz")
        );
        assert_eq!(
            split_extension(Path::new("/o/bold.nii")),
            ("/o/bold".to_string(), ".nii")
        );
    }

    #[test]
    fn test_unremovable_original_discards_new_volumes() {
        let dir = tempfile::tempdir().unwrap();
        let targets: Vec<PathBuf> = (0..2)
            .map(|i| dir.path().join(format!("bold_vol_{:04}.nii.gz", i)))
            .collect();
        for target in &targets {
            std::fs::write(target, b"volume").unwrap();
        }

        // Already gone: removal fails
        let original = dir.path().join("bold.nii.gz");
        let result = supersede_original(&original, &targets);

        assert!(matches!(result, Err(SplitError::RemoveOriginal(_, _))));
        assert!(targets.iter().all(|t| !t.exists()));
    }

    #[test]
    fn test_unreadable_volume_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.nii.gz");
        std::fs::write(&path, b"not a volume").unwrap();

        let pairs = VolumeSplitter::new().split(Path::new("/in/first.dcm"), &path);
        assert!(pairs.is_empty());
        assert!(path.exists());
        assert!(matches!(
            VolumeSplitter::new().try_split(&path),
            Err(SplitError::Read(_, _))
        ));
    }
}

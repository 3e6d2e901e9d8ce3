//! NIfTI fixtures

use anyhow::Result;
use ndarray::{Array, IxDyn};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;

/// Write an `f32` volume of shape `dims` whose voxels count up from 0
pub fn write_volume(path: &Path, dims: &[usize]) -> Result<()> {
    let len: usize = dims.iter().product();
    let data: Vec<f32> = (0..len).map(|i| i as f32).collect();
    let array = Array::from_shape_vec(IxDyn(dims), data)?;
    WriterOptions::new(path).write_nifti(&array)?;
    Ok(())
}

/// Like [`write_volume`], taking spatial fields from `header`
pub fn write_volume_with_header(path: &Path, dims: &[usize], header: &NiftiHeader) -> Result<()> {
    let len: usize = dims.iter().product();
    let data: Vec<f32> = (0..len).map(|i| i as f32).collect();
    let array = Array::from_shape_vec(IxDyn(dims), data)?;
    WriterOptions::new(path).reference_header(header).write_nifti(&array)?;
    Ok(())
}

pub fn read_header(path: &Path) -> Result<NiftiHeader> {
    Ok(ReaderOptions::new().read_file(path)?.header().clone())
}

/// Read a volume back as `f32`
pub fn read_volume(path: &Path) -> Result<Array<f32, IxDyn>> {
    let obj = ReaderOptions::new().read_file(path)?;
    Ok(obj.into_volume().into_ndarray::<f32>()?)
}

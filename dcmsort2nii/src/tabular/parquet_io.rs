//! Parquet staging and final mapping files

use crate::error::TabularError;
use crate::tabular::MappingTable;
use arrow::array::{new_null_array, ArrayRef};
use arrow::compute::concat_batches;
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Prefix of per-task staging files
pub const STAGING_PREFIX: &str = "seq_";

/// Extension of complete staging files
pub const STAGING_EXTENSION: &str = "parquet";

/// Write `table` to `path` as a single-row-group Parquet file
pub fn write_parquet(table: &MappingTable, path: &Path) -> Result<(), TabularError> {
    let batch = table.to_record_batch()?;
    let file = File::create(path).map_err(|e| TabularError::Io(path.to_path_buf(), e))?;

    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Persist one task's rows as `seq_<name>_<uuid>.parquet` in `staging_dir`
///
/// The file is written under a `.partial` name and renamed once complete,
/// so a reader listing `*.parquet` never sees a half-written file.
pub fn write_staging_file(
    table: &MappingTable,
    staging_dir: &Path,
    sequence_name: &str,
) -> Result<PathBuf, TabularError> {
    let stem = format!("{}{}_{}", STAGING_PREFIX, sequence_name, Uuid::new_v4());
    let partial = staging_dir.join(format!("{}.partial", stem));
    let complete = staging_dir.join(format!("{}.{}", stem, STAGING_EXTENSION));

    if let Err(e) = write_parquet(table, &partial) {
        let _ = std::fs::remove_file(&partial);
        return Err(e);
    }

    std::fs::rename(&partial, &complete).map_err(|e| {
        let _ = std::fs::remove_file(&partial);
        TabularError::Io(complete.clone(), e)
    })?;

    Ok(complete)
}

/// Complete staging files in `staging_dir`, in listing order
pub fn list_staging_files(staging_dir: &Path) -> Result<Vec<PathBuf>, TabularError> {
    let entries = std::fs::read_dir(staging_dir).map_err(|e| TabularError::Io(staging_dir.to_path_buf(), e))?;

    Ok(entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(STAGING_EXTENSION))
        .collect())
}

fn read_batches(path: &Path) -> Result<(Arc<Schema>, Vec<RecordBatch>), TabularError> {
    let file = File::open(path).map_err(|e| TabularError::Io(path.to_path_buf(), e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let batches = builder.build()?.collect::<Result<Vec<_>, _>>()?;
    Ok((schema, batches))
}

/// Read one Parquet file into a table
pub fn read_parquet(path: &Path) -> Result<MappingTable, TabularError> {
    let (_, batches) = read_batches(path)?;
    let mut table = MappingTable::default();
    for batch in &batches {
        table.append(MappingTable::from_record_batch(batch)?);
    }
    Ok(table)
}

/// Read all files as one dataset
///
/// Schemas are merged; columns absent from a file are null-filled. Any
/// unreadable file or incompatible schema fails the whole read.
pub fn read_dataset(paths: &[PathBuf]) -> Result<MappingTable, TabularError> {
    if paths.is_empty() {
        return Ok(MappingTable::default());
    }

    let mut schemas = Vec::with_capacity(paths.len());
    let mut all_batches = Vec::new();
    for path in paths {
        let (schema, batches) = read_batches(path)?;
        schemas.push(schema.as_ref().clone());
        all_batches.extend(batches);
    }

    let merged = Arc::new(Schema::try_merge(schemas)?);
    let aligned = all_batches
        .iter()
        .map(|batch| align_to_schema(batch, &merged))
        .collect::<Result<Vec<_>, _>>()?;

    let combined = concat_batches(&merged, &aligned)?;
    Ok(MappingTable::from_record_batch(&combined)?)
}

/// Reorder `batch` columns to `schema`, null-filling absent ones
fn align_to_schema(batch: &RecordBatch, schema: &Arc<Schema>) -> Result<RecordBatch, TabularError> {
    let columns: Vec<ArrayRef> = schema
        .fields()
        .iter()
        .map(|field| match batch.column_by_name(field.name()) {
            Some(column) => column.clone(),
            None => new_null_array(field.data_type(), batch.num_rows()),
        })
        .collect();

    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetadataMap, MetadataValue, ResultRow};

    fn table(volume: &str, field: &str, value: &str) -> MappingTable {
        let mut metadata = MetadataMap::new();
        metadata.insert(field.to_string(), MetadataValue::Text(value.to_string()));
        MappingTable::from_rows(&[ResultRow::new(
            PathBuf::from("/in/s/IM0"),
            PathBuf::from(volume),
            metadata,
        )])
    }

    #[test]
    fn test_staging_file_naming_and_no_partial_left() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_staging_file(&table("/o/a.nii.gz", "Modality", "MR"), dir.path(), "T1").unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("seq_T1_"));
        assert!(name.ends_with(".parquet"));

        let listed = list_staging_files(dir.path()).unwrap();
        assert_eq!(listed, vec![path.clone()]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(read_parquet(&path).unwrap(), table("/o/a.nii.gz", "Modality", "MR"));
    }

    #[test]
    fn test_same_name_never_collides() {
        let dir = tempfile::tempdir().unwrap();
        let t = table("/o/a.nii.gz", "Modality", "MR");
        let a = write_staging_file(&t, dir.path(), "localizer").unwrap();
        let b = write_staging_file(&t, dir.path(), "localizer").unwrap();
        assert_ne!(a, b);
        assert_eq!(list_staging_files(dir.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_dataset_merges_differing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_staging_file(&table("/o/a.nii.gz", "Modality", "MR"), dir.path(), "a").unwrap();
        let b = write_staging_file(&table("/o/b.nii.gz", "BodyPartExamined", "HEAD"), dir.path(), "b").unwrap();

        let merged = read_dataset(&[a, b]).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.columns().len(), 4);

        let by_volume = merged.rows_by("NiftiFile");
        let modality = merged.columns().iter().position(|c| c == "Modality").unwrap();
        assert_eq!(by_volume["/o/a.nii.gz"][modality].as_deref(), Some("MR"));
        assert_eq!(by_volume["/o/b.nii.gz"][modality], None);
    }

    #[test]
    fn test_dataset_fails_on_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_staging_file(&table("/o/a.nii.gz", "Modality", "MR"), dir.path(), "a").unwrap();
        let bad = dir.path().join("seq_bad_0.parquet");
        std::fs::write(&bad, b"PAR1 but not really").unwrap();

        assert!(read_dataset(&[good, bad]).is_err());
    }
}

//! In-memory mapping table
//!
//! All columns are nullable UTF-8. Metadata values are stringified when rows
//! enter the table, so staging files from different sequences always share
//! column types and merge cleanly.

use crate::models::{ResultRow, FIRST_DICOM_FILE_COLUMN, NIFTI_FILE_COLUMN};
use arrow::array::{Array, ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Rows of string cells under a shared, ordered column set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingTable {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl MappingTable {
    /// Build from result rows
    ///
    /// Column order: `FirstDicomFile`, `NiftiFile`, then every metadata field
    /// seen in any row, alphabetically. Fields a row lacks are null.
    pub fn from_rows(rows: &[ResultRow]) -> Self {
        let fields: BTreeSet<&str> = rows
            .iter()
            .flat_map(|r| r.metadata.keys().map(String::as_str))
            .filter(|k| *k != FIRST_DICOM_FILE_COLUMN && *k != NIFTI_FILE_COLUMN)
            .collect();

        let mut columns = vec![FIRST_DICOM_FILE_COLUMN.to_string(), NIFTI_FILE_COLUMN.to_string()];
        columns.extend(fields.iter().map(|f| f.to_string()));

        let rows = rows
            .iter()
            .map(|row| {
                let mut cells = Vec::with_capacity(columns.len());
                cells.push(Some(row.first_input_file.to_string_lossy().to_string()));
                cells.push(Some(row.output_volume_file.to_string_lossy().to_string()));
                for field in &fields {
                    cells.push(row.metadata.get(*field).map(|v| v.to_string()));
                }
                cells
            })
            .collect();

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cells of one column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<Option<&str>>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[index].as_deref()).collect())
    }

    /// Row cells in column order
    pub fn rows(&self) -> impl Iterator<Item = &[Option<String>]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Append `other`, unioning columns; missing cells become null
    pub fn append(&mut self, other: MappingTable) {
        let mut mapping = Vec::with_capacity(other.columns.len());
        for column in &other.columns {
            let index = match self.columns.iter().position(|c| c == column) {
                Some(index) => index,
                None => {
                    self.columns.push(column.clone());
                    for row in &mut self.rows {
                        row.push(None);
                    }
                    self.columns.len() - 1
                }
            };
            mapping.push(index);
        }

        let width = self.columns.len();
        for other_row in other.rows {
            let mut row = vec![None; width];
            for (cell, &index) in other_row.into_iter().zip(&mapping) {
                row[index] = cell;
            }
            self.rows.push(row);
        }
    }

    /// Arrow schema: every column nullable Utf8
    pub fn schema(&self) -> Schema {
        Schema::new(
            self.columns
                .iter()
                .map(|c| Field::new(c, DataType::Utf8, true))
                .collect::<Vec<_>>(),
        )
    }

    pub fn to_record_batch(&self) -> Result<RecordBatch, ArrowError> {
        let arrays: Vec<ArrayRef> = (0..self.columns.len())
            .map(|index| {
                let values: StringArray = self.rows.iter().map(|row| row[index].as_deref()).collect();
                Arc::new(values) as ArrayRef
            })
            .collect();

        RecordBatch::try_new(Arc::new(self.schema()), arrays)
    }

    /// Read a batch back; non-string columns are rendered as display text
    pub fn from_record_batch(batch: &RecordBatch) -> Result<Self, ArrowError> {
        let columns: Vec<String> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();

        let mut rows = vec![Vec::with_capacity(columns.len()); batch.num_rows()];
        for array in batch.columns() {
            let strings = array.as_any().downcast_ref::<StringArray>();
            for (row_index, row) in rows.iter_mut().enumerate() {
                let cell = if array.is_null(row_index) {
                    None
                } else if let Some(strings) = strings {
                    Some(strings.value(row_index).to_string())
                } else {
                    Some(array_value_to_string(array.as_ref(), row_index)?)
                };
                row.push(cell);
            }
        }

        Ok(Self { columns, rows })
    }

    /// Rows keyed by a column value, for order-insensitive comparisons
    pub fn rows_by(&self, key_column: &str) -> HashMap<String, Vec<Option<String>>> {
        let Some(index) = self.columns.iter().position(|c| c == key_column) else {
            return HashMap::new();
        };
        self.rows
            .iter()
            .filter_map(|row| row[index].clone().map(|key| (key, row.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetadataMap, MetadataValue};
    use std::path::PathBuf;

    fn row(volume: &str, fields: &[(&str, MetadataValue)]) -> ResultRow {
        let metadata: MetadataMap = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        ResultRow::new(PathBuf::from("/in/a/1.dcm"), PathBuf::from(volume), metadata)
    }

    #[test]
    fn test_columns_are_unioned_and_ordered() {
        let table = MappingTable::from_rows(&[
            row("/o/a.nii.gz", &[("SeriesNumber", MetadataValue::Number(3.0))]),
            row("/o/b.nii.gz", &[("Modality", MetadataValue::Text("MR".into()))]),
        ]);

        assert_eq!(
            table.columns(),
            &["FirstDicomFile", "NiftiFile", "Modality", "SeriesNumber"]
        );
        assert_eq!(table.column("Modality").unwrap(), vec![None, Some("MR")]);
        assert_eq!(table.column("SeriesNumber").unwrap(), vec![Some("3"), None]);
    }

    #[test]
    fn test_append_fills_missing_cells_with_null() {
        let mut left = MappingTable::from_rows(&[row(
            "/o/a.nii.gz",
            &[("EchoTime", MetadataValue::Number(2.5))],
        )]);
        let right = MappingTable::from_rows(&[row(
            "/o/b.nii.gz",
            &[("FlipAngle", MetadataValue::Number(9.0))],
        )]);

        left.append(right);

        assert_eq!(left.len(), 2);
        assert_eq!(left.column("EchoTime").unwrap(), vec![Some("2.5"), None]);
        assert_eq!(left.column("FlipAngle").unwrap(), vec![None, Some("9")]);
    }

    #[test]
    fn test_record_batch_conversion_keeps_nulls() {
        let table = MappingTable::from_rows(&[
            row("/o/a.nii.gz", &[("ImageType", MetadataValue::Texts(vec!["ORIGINAL".into(), "M".into()]))]),
            row("/o/b.nii.gz", &[]),
        ]);

        let batch = table.to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(MappingTable::from_record_batch(&batch).unwrap(), table);
        assert_eq!(
            table.column("ImageType").unwrap(),
            vec![Some("ORIGINAL\\M"), None]
        );
    }
}

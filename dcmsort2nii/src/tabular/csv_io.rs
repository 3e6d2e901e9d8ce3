//! CSV writers: fallback mapping and error log

use crate::error::TabularError;
use crate::models::ErrorRecord;
use crate::tabular::MappingTable;
use std::path::Path;

/// Write `table` as CSV with a header row; nulls become empty cells
pub fn write_csv(table: &MappingTable, path: &Path) -> Result<(), TabularError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
    }
    writer
        .flush()
        .map_err(|e| TabularError::Io(path.to_path_buf(), e))?;
    Ok(())
}

/// Write error records with columns `Step, Directory, SequenceName, File, Error`
pub fn write_error_log(records: &[ErrorRecord], path: &Path) -> Result<(), TabularError> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer
        .flush()
        .map_err(|e| TabularError::Io(path.to_path_buf(), e))?;
    Ok(())
}

//! Synthetic DICOM slice generator
//!
//! Writes header-only MR slices carrying just the fields grouping, naming
//! and metadata extraction look at.

use anyhow::Result;
use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::dictionary_std::tags;
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use std::path::{Path, PathBuf};

const MR_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.4";
const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";

/// Header values shared by every slice of one series
#[derive(Debug, Clone)]
pub struct SeriesSpec {
    pub series_instance_uid: String,
    pub series_number: Option<String>,
    pub series_description: Option<String>,
    pub acquisition_date: Option<String>,
    pub patient_name: String,
    pub repetition_time: String,
}

impl SeriesSpec {
    pub fn new(series_instance_uid: &str) -> Self {
        Self {
            series_instance_uid: series_instance_uid.to_string(),
            series_number: None,
            series_description: None,
            acquisition_date: None,
            patient_name: "Doe^Jane".to_string(),
            repetition_time: "2000".to_string(),
        }
    }

    pub fn number(mut self, number: &str) -> Self {
        self.series_number = Some(number.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.series_description = Some(description.to_string());
        self
    }

    pub fn date(mut self, date: &str) -> Self {
        self.acquisition_date = Some(date.to_string());
        self
    }
}

fn text(tag: dicom::core::Tag, vr: VR, value: &str) -> DataElement<InMemDicomObject> {
    DataElement::new(tag, vr, PrimitiveValue::from(value))
}

/// Write slice number `instance` of `spec` to `path`
pub fn write_slice(path: &Path, spec: &SeriesSpec, instance: usize) -> Result<()> {
    let sop_instance_uid = format!("{}.{}", spec.series_instance_uid, instance + 1);

    let mut obj = InMemDicomObject::new_empty();
    obj.put(text(tags::SOP_CLASS_UID, VR::UI, MR_IMAGE_STORAGE));
    obj.put(text(tags::SOP_INSTANCE_UID, VR::UI, &sop_instance_uid));
    obj.put(text(tags::MODALITY, VR::CS, "MR"));
    obj.put(text(tags::PATIENT_NAME, VR::PN, &spec.patient_name));
    obj.put(text(tags::SERIES_INSTANCE_UID, VR::UI, &spec.series_instance_uid));
    obj.put(text(tags::REPETITION_TIME, VR::DS, &spec.repetition_time));
    obj.put(text(tags::INSTANCE_NUMBER, VR::IS, &(instance + 1).to_string()));
    if let Some(number) = &spec.series_number {
        obj.put(text(tags::SERIES_NUMBER, VR::IS, number));
    }
    if let Some(description) = &spec.series_description {
        obj.put(text(tags::SERIES_DESCRIPTION, VR::LO, description));
    }
    if let Some(date) = &spec.acquisition_date {
        obj.put(text(tags::ACQUISITION_DATE, VR::DA, date));
    }

    let file = obj.with_meta(
        FileMetaTableBuilder::new()
            .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN)
            .media_storage_sop_class_uid(MR_IMAGE_STORAGE)
            .media_storage_sop_instance_uid(sop_instance_uid.as_str()),
    )?;
    file.write_to_file(path)?;
    Ok(())
}

/// Write `count` slices named `<prefix>0000.dcm`, `<prefix>0001.dcm`, ...
pub fn write_series(dir: &Path, prefix: &str, spec: &SeriesSpec, count: usize) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    (0..count)
        .map(|i| {
            let path = dir.join(format!("{}{:04}.dcm", prefix, i));
            write_slice(&path, spec, i)?;
            Ok(path)
        })
        .collect()
}

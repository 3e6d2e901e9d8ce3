//! Process-mode execution and the command-line binary
//!
//! Uses `sh` as the converter so no DICOM converter needs to be installed:
//! the staged slices are concatenated into `volume.nii.gz`. Split stays off,
//! so the produced file is never parsed as NIfTI.

#![cfg(unix)]

mod helpers;

use dcmsort2nii::models::ProcessingStep;
use dcmsort2nii::tabular::{read_parquet, ERROR_LOG_FILE_NAME, MAPPING_FILE_NAME};
use dcmsort2nii::workflow::{TaskExecutor, WorkerMode};
use dcmsort2nii::PipelineOrchestrator;
use dcmsort_common::config::{load_toml_config, ConverterSettings, TomlConfig};
use helpers::{pipeline_config, write_series, SeriesSpec};
use std::path::{Path, PathBuf};
use std::process::Command;

const BIN: &str = env!("CARGO_BIN_EXE_dcmsort2nii");

fn concatenating_converter() -> ConverterSettings {
    ConverterSettings {
        program: PathBuf::from("sh"),
        args: vec![
            "-c".to_string(),
            "cat \"$0\"/* > \"$1\"/volume.nii.gz".to_string(),
            "{input}".to_string(),
            "{output}".to_string(),
        ],
        timeout_secs: Some(60),
        scratch_dir: None,
    }
}

fn failing_converter() -> ConverterSettings {
    ConverterSettings {
        program: PathBuf::from("false"),
        args: Vec::new(),
        timeout_secs: Some(60),
        scratch_dir: None,
    }
}

fn process_executor(converter: ConverterSettings) -> TaskExecutor {
    TaskExecutor::new(WorkerMode::Process {
        program: PathBuf::from(BIN),
        converter,
        log_filter: Some("warn".to_string()),
    })
}

fn two_series(root: &Path) -> Vec<PathBuf> {
    let leaf = root.join("exam");
    let mut files = write_series(&leaf, "A", &SeriesSpec::new("8.1").number("1").description("T1"), 3).unwrap();
    files.extend(write_series(&leaf, "B", &SeriesSpec::new("8.2").number("2").description("T2"), 2).unwrap());
    files
}

#[tokio::test]
async fn test_worker_processes_convert_and_stage() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    two_series(input.path());

    let summary = PipelineOrchestrator::new(
        pipeline_config(input.path(), output.path()),
        process_executor(concatenating_converter()),
    )
    .run()
    .await
    .unwrap();

    assert!(summary.errors.is_empty(), "unexpected errors: {:?}", summary.errors);
    assert_eq!(summary.rows_written, 2);

    let t1 = output.path().join("exam/0001_T1.nii.gz");
    let t2 = output.path().join("exam/0002_T2.nii.gz");
    assert!(t1.is_file());
    assert!(t2.is_file());

    let table = read_parquet(&output.path().join(MAPPING_FILE_NAME)).unwrap();
    let rows = table.rows_by("NiftiFile");
    assert!(rows.contains_key(t1.to_string_lossy().as_ref()));
    assert!(rows.contains_key(t2.to_string_lossy().as_ref()));
    assert!(table.columns().iter().any(|c| c == "Modality"));
}

#[tokio::test]
async fn test_converter_failure_reported_from_worker() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    two_series(input.path());

    let summary = PipelineOrchestrator::new(
        pipeline_config(input.path(), output.path()),
        process_executor(failing_converter()),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(summary.rows_written, 0);
    assert_eq!(summary.errors_at(ProcessingStep::Conversion), 2);
    assert_eq!(summary.errors_at(ProcessingStep::Executor), 0);
}

#[test]
fn test_cli_run_with_config_file() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let config_dir = tempfile::tempdir().unwrap();
    two_series(input.path());
    write_series(
        &input.path().join("broken"),
        "X",
        &SeriesSpec::new("8.9").description("broken"),
        1,
    )
    .unwrap();

    // Converter fails for the "broken" leaf only
    let mut converter = concatenating_converter();
    converter.args[1] =
        "if grep -q broken \"$0\"/*; then exit 3; fi; cat \"$0\"/* > \"$1\"/volume.nii.gz".to_string();
    let config = TomlConfig {
        workers: Some(2),
        converter,
        ..Default::default()
    };
    let config_path = config_dir.path().join("dcmsort2nii.toml");
    std::fs::write(&config_path, toml::to_string(&config).unwrap()).unwrap();

    let status = Command::new(BIN)
        .arg(input.path())
        .arg("-o")
        .arg(output.path())
        .arg("-c")
        .arg(&config_path)
        .arg("--error-log")
        .env("RUST_LOG", "warn")
        .status()
        .unwrap();

    assert!(status.success());
    assert!(output.path().join(MAPPING_FILE_NAME).is_file());
    assert!(output.path().join("broken").is_dir());

    let log = std::fs::read_to_string(output.path().join(ERROR_LOG_FILE_NAME)).unwrap();
    assert_eq!(log.lines().count(), 2);
    assert!(log.lines().nth(1).unwrap().starts_with("Conversion,"));
}

#[test]
fn test_cli_missing_input_root_fails() {
    let output = tempfile::tempdir().unwrap();

    let status = Command::new(BIN)
        .arg(output.path().join("absent"))
        .arg("-o")
        .arg(output.path())
        .env("RUST_LOG", "error")
        .status()
        .unwrap();

    assert!(!status.success());
}

#[test]
fn test_cli_reports_missing_config_file() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let missing = input.path().join("missing.toml");

    let result = Command::new(BIN)
        .arg(input.path())
        .arg("-o")
        .arg(output.path())
        .arg("-c")
        .arg(&missing)
        .env_remove("RUST_LOG")
        .output()
        .unwrap();

    assert!(result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("does not exist"), "stderr was: {}", stderr);
    assert!(stderr.contains(&missing.display().to_string()));
}

#[test]
fn test_cli_init_config_writes_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("generated.toml");

    let status = Command::new(BIN).arg("init-config").arg(&path).status().unwrap();

    assert!(status.success());
    assert_eq!(load_toml_config(&path).unwrap(), TomlConfig::default());
}

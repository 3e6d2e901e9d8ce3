//! Sequence conversion
//!
//! Two-stage temp-directory protocol:
//! 1. Copy the sequence's files into a fresh input staging directory under
//!    sequential, zero-padded names
//! 2. Run the external converter into a separate output staging directory
//! 3. Move the produced volume to `<output_dir>/<sequence_name>.<ext>`
//! 4. Both staging directories are removed on drop, success or failure
//!
//! The converter's own stdout/stderr is captured, never printed.

use crate::error::{ConversionError, ConverterFailure};
use dcmsort_common::config::ConverterSettings;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Volume extensions recognized in converter output, longest first
const VOLUME_EXTENSIONS: [&str; 2] = [".nii.gz", ".nii"];

/// Captured converter output kept in failure messages
const OUTPUT_TAIL_CHARS: usize = 2000;

/// External volumetric converter
///
/// Contract: reads the slice files in `source_dir` and writes exactly one
/// volume into `dest_dir`. Failure is signalled through the error, never a
/// sentinel.
pub trait VolumeConverter: Send + Sync {
    fn convert(&self, source_dir: &Path, dest_dir: &Path) -> Result<(), ConverterFailure>;
}

/// Converter running an external program (dcm2niix by default)
pub struct CommandConverter {
    settings: ConverterSettings,
}

impl CommandConverter {
    pub fn new(settings: ConverterSettings) -> Self {
        Self { settings }
    }

    fn render_args(&self, source_dir: &Path, dest_dir: &Path) -> Vec<String> {
        let input = source_dir.to_string_lossy();
        let output = dest_dir.to_string_lossy();
        self.settings
            .args
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }
}

impl VolumeConverter for CommandConverter {
    fn convert(&self, source_dir: &Path, dest_dir: &Path) -> Result<(), ConverterFailure> {
        let program = &self.settings.program;
        let args = self.render_args(source_dir, dest_dir);

        // Anonymous file: no pipe to drain, removed by the OS on close
        let capture = tempfile::tempfile().map_err(ConverterFailure::Staging)?;
        let stdout = capture.try_clone().map_err(ConverterFailure::Staging)?;
        let stderr = capture.try_clone().map_err(ConverterFailure::Staging)?;

        tracing::debug!(program = %program.display(), ?args, "Running converter");

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|source| ConverterFailure::Launch {
                program: program.clone(),
                source,
            })?;

        let timeout = self.settings.timeout_secs.map(Duration::from_secs);
        let status = wait_with_timeout(&mut child, timeout)?;

        if status.success() {
            Ok(())
        } else {
            Err(ConverterFailure::Exit {
                status: status.to_string(),
                output: captured_tail(capture),
            })
        }
    }
}

/// Wait for the child, killing it once `timeout` elapses
fn wait_with_timeout(
    child: &mut std::process::Child,
    timeout: Option<Duration>,
) -> Result<ExitStatus, ConverterFailure> {
    let Some(timeout) = timeout else {
        return child.wait().map_err(ConverterFailure::Staging);
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().map_err(ConverterFailure::Staging)? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ConverterFailure::Timeout(timeout));
        }
        std::thread::sleep(Duration::from_millis(25));
    }
}

fn captured_tail(mut capture: File) -> String {
    let mut output = String::new();
    if capture.seek(SeekFrom::Start(0)).is_ok() {
        let mut bytes = Vec::new();
        if capture.read_to_end(&mut bytes).is_ok() {
            output = String::from_utf8_lossy(&bytes).trim().to_string();
        }
    }

    let total = output.chars().count();
    if total > OUTPUT_TAIL_CHARS {
        output.chars().skip(total - OUTPUT_TAIL_CHARS).collect()
    } else {
        output
    }
}

/// Runs one sequence through the converter
#[derive(Clone)]
pub struct SequenceConverter {
    converter: Arc<dyn VolumeConverter>,
    scratch_dir: Option<PathBuf>,
}

impl SequenceConverter {
    pub fn new(converter: Arc<dyn VolumeConverter>) -> Self {
        Self {
            converter,
            scratch_dir: None,
        }
    }

    /// Place staging directories under `scratch_dir` instead of system temp
    pub fn with_scratch_dir(mut self, scratch_dir: Option<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir;
        self
    }

    /// Convert `files` into `<output_dir>/<sequence_name>.<ext>`
    pub fn convert(
        &self,
        files: &[PathBuf],
        output_dir: &Path,
        sequence_name: &str,
    ) -> Result<PathBuf, ConversionError> {
        let wrap = |cause: ConverterFailure| ConversionError {
            file_count: files.len(),
            first_file: files.first().cloned().unwrap_or_default(),
            cause,
        };

        if files.is_empty() {
            return Err(wrap(ConverterFailure::EmptyInput));
        }

        let input_stage = self.staging_dir("dcm_in_").map_err(|e| wrap(ConverterFailure::Staging(e)))?;
        copy_to_staging(files, input_stage.path()).map_err(|e| wrap(ConverterFailure::Staging(e)))?;

        let output_stage = self.staging_dir("dcm_out_").map_err(|e| wrap(ConverterFailure::Staging(e)))?;

        self.converter
            .convert(input_stage.path(), output_stage.path())
            .map_err(wrap)?;

        let (produced, extension) = find_volume(output_stage.path()).ok_or_else(|| wrap(ConverterFailure::NoOutput))?;

        let dest = output_dir.join(format!("{}{}", sequence_name, extension));
        move_file(&produced, &dest).map_err(|source| {
            wrap(ConverterFailure::Finalize {
                dest: dest.clone(),
                source,
            })
        })?;

        tracing::debug!(
            sequence = sequence_name,
            files = files.len(),
            volume = %dest.display(),
            "Sequence converted"
        );

        Ok(dest)
        // input_stage and output_stage dropped here: staging removed
    }

    fn staging_dir(&self, prefix: &str) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        match &self.scratch_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
    }
}

/// Copy files as `file_000000.dcm`, `file_000001.dcm`, ...
fn copy_to_staging(files: &[PathBuf], stage: &Path) -> std::io::Result<()> {
    for (i, file) in files.iter().enumerate() {
        std::fs::copy(file, stage.join(format!("file_{:06}.dcm", i)))?;
    }
    Ok(())
}

/// First volume file (by name) in `dir`, with its extension
fn find_volume(dir: &Path) -> Option<(PathBuf, &'static str)> {
    let mut candidates: Vec<(PathBuf, &'static str)> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            VOLUME_EXTENSIONS
                .iter()
                .find(|ext| name.ends_with(*ext))
                .map(|ext| (e.path(), *ext))
        })
        .collect();

    candidates.sort_by(|a, b| a.0.cmp(&b.0));
    if candidates.len() > 1 {
        tracing::warn!(
            count = candidates.len(),
            chosen = %candidates[0].0.display(),
            "Converter produced several volumes, keeping the first"
        );
    }
    candidates.into_iter().next()
}

/// Rename, falling back to copy + remove across filesystems
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to)?;
    std::fs::remove_file(from)
}

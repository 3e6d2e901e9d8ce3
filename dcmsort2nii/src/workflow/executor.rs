//! Task executor
//!
//! Runs one `SequenceTask` in isolation. Concurrency is bounded by the
//! caller (`buffer_unordered`); the executor only decides WHERE a task runs:
//!
//! - `Process`: a fresh `<program> worker` OS process per task. The job goes
//!   in as JSON on stdin, the `TaskOutcome` comes back as JSON on stdout.
//!   A crash, signal or garbled reply fails that task only.
//! - `InProcess`: a blocking thread per task with injected converter and
//!   extractor. A panic fails that task only.

use crate::error::ExecutorError;
use crate::models::SequenceTask;
use crate::services::{MetadataExtractor, SequenceConverter};
use crate::workflow::task_worker::{TaskOutcome, TaskWorker, WorkerJob};
use dcmsort_common::config::ConverterSettings;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Subcommand the worker binary answers to
pub const WORKER_SUBCOMMAND: &str = "worker";

/// Where tasks run
#[derive(Clone)]
pub enum WorkerMode {
    /// One OS process per task
    Process {
        /// Binary that accepts the `worker` subcommand (normally this executable)
        program: PathBuf,
        converter: ConverterSettings,
        /// Tracing filter handed to workers through `RUST_LOG`
        log_filter: Option<String>,
    },
    /// One blocking thread per task
    InProcess {
        converter: SequenceConverter,
        extractor: Arc<dyn MetadataExtractor>,
    },
}

/// Runs single tasks according to a [`WorkerMode`]
#[derive(Clone)]
pub struct TaskExecutor {
    mode: WorkerMode,
}

impl TaskExecutor {
    pub fn new(mode: WorkerMode) -> Self {
        Self { mode }
    }

    /// Process mode re-running the current executable
    pub fn current_exe(converter: ConverterSettings, log_filter: Option<String>) -> Result<Self, ExecutorError> {
        let program = std::env::current_exe()?;
        Ok(Self::new(WorkerMode::Process {
            program,
            converter,
            log_filter,
        }))
    }

    pub fn mode_name(&self) -> &'static str {
        match self.mode {
            WorkerMode::Process { .. } => "process",
            WorkerMode::InProcess { .. } => "in-process",
        }
    }

    /// Run `task` to completion
    ///
    /// `Err` means the task could not be run or did not report back; task
    /// level failures are inside the returned `TaskOutcome`.
    pub async fn execute(
        &self,
        task: &SequenceTask,
        staging_dir: &Path,
        split: bool,
    ) -> Result<TaskOutcome, ExecutorError> {
        match &self.mode {
            WorkerMode::Process {
                program,
                converter,
                log_filter,
            } => {
                let job = WorkerJob {
                    task: task.clone(),
                    staging_dir: staging_dir.to_path_buf(),
                    split,
                    converter: converter.clone(),
                };
                run_worker_process(program, log_filter.as_deref(), &job).await
            }
            WorkerMode::InProcess { converter, extractor } => {
                let worker = TaskWorker::new(converter.clone(), extractor.clone(), split);
                let task = task.clone();
                let staging_dir = staging_dir.to_path_buf();
                tokio::task::spawn_blocking(move || worker.run(&task, &staging_dir))
                    .await
                    .map_err(|e| ExecutorError::Join(e.to_string()))
            }
        }
    }
}

async fn run_worker_process(
    program: &Path,
    log_filter: Option<&str>,
    job: &WorkerJob,
) -> Result<TaskOutcome, ExecutorError> {
    let payload = serde_json::to_vec(job)?;

    let mut command = Command::new(program);
    command
        .arg(WORKER_SUBCOMMAND)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    if let Some(filter) = log_filter {
        command.env("RUST_LOG", filter);
    }

    let mut child = command
        .spawn()
        .map_err(|e| ExecutorError::Spawn(program.to_path_buf(), e))?;

    // Worker reads stdin to EOF before replying
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(&payload).await?;
        stdin.shutdown().await?;
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        return Err(ExecutorError::WorkerExit {
            status: output.status.to_string(),
        });
    }

    Ok(serde_json::from_slice(&output.stdout)?)
}

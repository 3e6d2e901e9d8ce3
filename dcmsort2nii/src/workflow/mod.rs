//! Sequence-oriented conversion workflow
//!
//! One task per discovered sequence. Each task runs convert → split →
//! metadata → stage as a single unit inside the executor, and the
//! orchestrator combines staged results after all tasks finished.

pub mod events;
pub mod executor;
pub mod orchestrator;
pub mod task_worker;

pub use events::{PipelineEvent, PipelineSummary};
pub use executor::{TaskExecutor, WorkerMode, WORKER_SUBCOMMAND};
pub use orchestrator::{PipelineConfig, PipelineOrchestrator};
pub use task_worker::{serve_job, TaskOutcome, TaskWorker, WorkerJob};

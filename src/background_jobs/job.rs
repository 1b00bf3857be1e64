use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// When a job runs.
#[derive(Debug, Clone, Copy)]
pub struct JobSchedule {
    pub interval: Duration,
    /// Also run once right after the scheduler starts.
    pub run_on_startup: bool,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// A periodically executed maintenance task.
///
/// Jobs own their dependencies; the scheduler only knows when to run them.
/// Executions of the same job never overlap (the scheduler awaits each run).
#[async_trait]
pub trait BackgroundJob: Send + Sync {
    /// Unique identifier, used in logs.
    fn id(&self) -> &'static str;

    /// Human-readable name.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn schedule(&self) -> JobSchedule;

    async fn execute(&self) -> Result<(), JobError>;
}

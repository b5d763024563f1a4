//! Internal unit of queued work.

use crate::core::TaskError;

/// How a job's execution ended, for per-worker accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobStatus {
    Completed,
    Failed,
    Panicked,
    Cancelled,
}

pub(crate) enum JobMode {
    Run,
    /// Resolve the job's future as cancelled without running the body.
    Discard(TaskError),
}

/// A queued job: one closure owning the task body and its promise.
///
/// The single closure handles both execution and discard so that the
/// promise has exactly one owner regardless of which path fires.
pub(crate) struct PoolJob {
    id: u64,
    name: String,
    exec: Option<Box<dyn FnOnce(JobMode) -> JobStatus + Send>>,
}

impl PoolJob {
    pub(crate) fn new(
        id: u64,
        name: String,
        exec: Box<dyn FnOnce(JobMode) -> JobStatus + Send>,
    ) -> Self {
        Self {
            id,
            name,
            exec: Some(exec),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn run(mut self) -> JobStatus {
        match self.exec.take() {
            Some(exec) => exec(JobMode::Run),
            None => JobStatus::Failed,
        }
    }

    pub(crate) fn discard(mut self, error: TaskError) {
        if let Some(exec) = self.exec.take() {
            exec(JobMode::Discard(error));
        }
    }
}

impl std::fmt::Debug for PoolJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolJob")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

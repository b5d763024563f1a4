//! Task trait and related types

use crate::core::{CancellationToken, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Generates a unique task ID
pub(crate) fn next_task_id() -> u64 {
    NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)
}

/// A trait representing a side-effecting unit of work
///
/// Value-producing computations are submitted as closures via
/// [`WorkerPool::submit`](crate::pool::WorkerPool::submit); this trait covers
/// the fire-and-forget case where only completion matters. Long-running
/// implementations should poll the provided [`CancellationToken`] at safe
/// points.
pub trait Task: Send {
    /// Execute the task
    ///
    /// # Errors
    ///
    /// Returns an error if the task execution fails
    fn run(&mut self, token: &CancellationToken) -> Result<()>;

    /// Get the task's type name for debugging and statistics
    fn name(&self) -> &str {
        "Task"
    }
}

impl fmt::Debug for dyn Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({})", self.name())
    }
}

/// A boxed task that can be sent across threads
pub type BoxedTask = Box<dyn Task>;

/// Helper to create a task from a closure
pub struct ClosureTask<F>
where
    F: FnOnce(&CancellationToken) -> Result<()> + Send,
{
    closure: Option<F>,
    name: String,
}

impl<F> ClosureTask<F>
where
    F: FnOnce(&CancellationToken) -> Result<()> + Send,
{
    /// Create a new closure task
    pub fn new(closure: F) -> Self {
        Self {
            closure: Some(closure),
            name: "ClosureTask".to_string(),
        }
    }

    /// Create a new closure task with a custom name
    pub fn with_name<S: Into<String>>(closure: F, name: S) -> Self {
        Self {
            closure: Some(closure),
            name: name.into(),
        }
    }
}

impl<F> Task for ClosureTask<F>
where
    F: FnOnce(&CancellationToken) -> Result<()> + Send,
{
    fn run(&mut self, token: &CancellationToken) -> Result<()> {
        if let Some(closure) = self.closure.take() {
            closure(token)
        } else {
            // A task is owned by exactly one queue and runs at most once
            Err(crate::core::TaskError::other(
                "ClosureTask already executed - cannot run twice",
            ))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

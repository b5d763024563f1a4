//! Pool configuration and rejection policies.

use crate::core::{Result, TaskError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do with a submission when the queue is full and the pool is
/// already at its maximum worker count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RejectionPolicy {
    /// Reject the submission with `TaskError::CapacityExceeded`.
    #[default]
    Abort,
    /// Run the task synchronously on the submitting thread.
    CallerRuns,
    /// Drop the new task; its future resolves as cancelled.
    DiscardNew,
    /// Evict the oldest queued task (its future resolves as cancelled) and
    /// enqueue the new one.
    DiscardOldest,
}

/// Configuration for a [`WorkerPool`](crate::pool::WorkerPool)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of workers kept alive even when idle
    pub core_size: usize,
    /// Upper bound on workers spawned under load
    pub max_size: usize,
    /// Maximum queue size (0 = unbounded)
    pub queue_capacity: usize,
    /// How long a surplus worker may sit idle before retiring.
    /// Default: 30s
    pub idle_timeout: Duration,
    /// Behavior when queue and workers are saturated
    pub rejection_policy: RejectionPolicy,
    /// Thread name prefix
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_size: num_cpus::get(),
            max_size: num_cpus::get() * 2,
            // Bounded by default; with_queue_capacity(0) gives unbounded
            queue_capacity: 10_000,
            idle_timeout: Duration::from_secs(30),
            rejection_policy: RejectionPolicy::default(),
            thread_name_prefix: "taskforge-worker".to_string(),
        }
    }
}

impl PoolConfig {
    /// Create a configuration with the given core size.
    ///
    /// `max_size` is set to twice the core size; `0` means one core worker
    /// per CPU.
    #[must_use]
    pub fn new(core_size: usize) -> Self {
        let core_size = if core_size == 0 {
            num_cpus::get()
        } else {
            core_size
        };
        Self {
            core_size,
            max_size: core_size * 2,
            ..Default::default()
        }
    }

    /// Set the maximum worker count
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the queue capacity (0 = unbounded)
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set how long surplus workers may idle before retiring
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the rejection policy
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_rejection_policy(mut self, policy: RejectionPolicy) -> Self {
        self.rejection_policy = policy;
        self
    }

    /// Set thread name prefix
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// `TaskError::InvalidConfig` when core size is zero, max size is below
    /// core size, or the idle timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.core_size == 0 {
            return Err(TaskError::invalid_config(
                "core_size",
                "Core size must be greater than 0",
            ));
        }
        if self.max_size < self.core_size {
            return Err(TaskError::invalid_config(
                "max_size",
                "Max size must be at least core size",
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(TaskError::invalid_config(
                "idle_timeout",
                "Idle timeout must be non-zero",
            ));
        }
        Ok(())
    }
}

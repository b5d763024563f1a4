//! Error types for the task engine

/// Result type for task engine operations
pub type Result<T> = std::result::Result<T, TaskError>;

/// Errors that can occur in the task engine
///
/// All variants are `Clone` so that a terminal error stored in a future
/// can be observed by any number of readers.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum TaskError {
    /// Submission rejected because queue and workers are saturated
    #[error("Pool capacity exceeded: {queued}/{capacity} tasks queued")]
    CapacityExceeded {
        /// Current queue size
        queued: usize,
        /// Maximum queue size
        capacity: usize,
    },

    /// Blocking wait exceeded its deadline; the waited-on state is unchanged
    #[error("Timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Future resolved via cancellation
    #[error("Task cancelled: {reason}")]
    Cancelled {
        /// Reason for cancellation
        reason: String,
    },

    /// Task body returned an error
    #[error("Task failed: {message}")]
    TaskFailure {
        /// Error message from the task body
        message: String,
    },

    /// Submission attempted after shutdown began
    #[error("Pool is closed")]
    PoolClosed,

    /// A second resolution attempt on an already-resolved future
    #[error("Future already resolved")]
    AlreadyResolved,

    /// Failed to spawn a worker thread
    #[error("Failed to spawn worker thread #{worker_id}: {message}")]
    SpawnError {
        /// ID of the worker that failed to spawn
        worker_id: usize,
        /// Error message
        message: String,
    },

    /// Failed to join a worker thread
    #[error("Failed to join worker thread #{worker_id}: {message}")]
    JoinError {
        /// ID of the worker that failed to join
        worker_id: usize,
        /// Error message
        message: String,
    },

    /// Task body panicked; the panic was contained by the worker
    #[error("Task panicked: {message}")]
    WorkerPanic {
        /// Panic payload rendered as a string
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration for '{parameter}': {message}")]
    InvalidConfig {
        /// Configuration parameter name
        parameter: String,
        /// Error message
        message: String,
    },

    /// General error
    #[error("{0}")]
    Other(String),
}

impl TaskError {
    /// Create a capacity exceeded error
    pub fn capacity_exceeded(queued: usize, capacity: usize) -> Self {
        TaskError::CapacityExceeded { queued, capacity }
    }

    /// Create a timeout error
    pub fn timeout(timeout_ms: u64) -> Self {
        TaskError::Timeout { timeout_ms }
    }

    /// Create a cancelled error
    pub fn cancelled(reason: impl Into<String>) -> Self {
        TaskError::Cancelled {
            reason: reason.into(),
        }
    }

    /// Create a task failure error
    pub fn failure(message: impl Into<String>) -> Self {
        TaskError::TaskFailure {
            message: message.into(),
        }
    }

    /// Create a spawn error
    pub fn spawn(worker_id: usize, message: impl Into<String>) -> Self {
        TaskError::SpawnError {
            worker_id,
            message: message.into(),
        }
    }

    /// Create a join error
    pub fn join(worker_id: usize, message: impl Into<String>) -> Self {
        TaskError::JoinError {
            worker_id,
            message: message.into(),
        }
    }

    /// Create a worker panic error
    pub fn panic(message: impl Into<String>) -> Self {
        TaskError::WorkerPanic {
            message: message.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        TaskError::InvalidConfig {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        TaskError::Other(msg.into())
    }

    /// Returns `true` if this error represents a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled { .. })
    }

    /// Returns `true` if this error represents a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::Timeout { .. })
    }
}

/// Extracts a readable message from a `catch_unwind` payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = TaskError::capacity_exceeded(100, 100);
        assert!(matches!(err, TaskError::CapacityExceeded { .. }));

        let err = TaskError::failure("boom");
        assert!(matches!(err, TaskError::TaskFailure { .. }));

        let err = TaskError::cancelled("user requested");
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_error_display() {
        let err = TaskError::capacity_exceeded(64, 64);
        assert_eq!(
            err.to_string(),
            "Pool capacity exceeded: 64/64 tasks queued"
        );

        let err = TaskError::timeout(5000);
        assert_eq!(err.to_string(), "Timed out after 5000ms");
        assert!(err.is_timeout());

        let err = TaskError::PoolClosed;
        assert_eq!(err.to_string(), "Pool is closed");
    }

    #[test]
    fn test_error_clone() {
        let err = TaskError::spawn(5, "cannot create thread");
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }
}

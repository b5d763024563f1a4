//! Core types and traits for the task engine

pub mod cancellation;
pub mod error;
pub mod task;

pub use cancellation::{CancelReason, CancellationToken};
pub(crate) use error::panic_message;
pub use error::{Result, TaskError};
pub(crate) use task::next_task_id;
pub use task::{BoxedTask, ClosureTask, Task};

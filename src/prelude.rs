//! Convenient re-exports for common types and traits

pub use crate::core::{
    BoxedTask, CancelReason, CancellationToken, ClosureTask, Result, Task, TaskError,
};
pub use crate::forkjoin::{ForkJoinPool, RecursiveTask};
pub use crate::future::{ComposableFuture, Outcome, Promise, TaskFuture};
pub use crate::pool::{
    DiscardedTask, PoolConfig, RejectionPolicy, WorkerPool, WorkerStats,
};
pub use crate::queue::{BoundedQueue, PutError, TakeError};
pub use crate::timer::{ScheduledTimer, TimerHandle};

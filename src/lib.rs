//! # Taskforge
//!
//! A general-purpose task execution engine: worker pools with futures,
//! composable continuations, fork/join parallelism, and deadline-driven
//! timers.
//!
//! ## Features
//!
//! - **Worker Pool**: Core/max sizing with lazy growth, idle reaping, and
//!   pluggable rejection policies
//! - **Futures**: Every submission yields a [`TaskFuture`] with blocking,
//!   timed, and non-blocking reads plus cooperative cancellation
//! - **Composable Futures**: `map`/`flat_map`/`combine`/`all_of`/`any_of`
//!   chaining without blocking any thread
//! - **Fork/Join**: Work-stealing execution of recursive
//!   divide-and-conquer tasks
//! - **Timers**: One-shot and fixed-rate periodic scheduling onto a pool
//! - **Panic Isolation**: A panicking task resolves its own future; the
//!   worker survives
//!
//! ## Quick Start
//!
//! ```rust
//! use taskforge::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let pool = WorkerPool::new(PoolConfig::new(4))?;
//!
//! // Submit computations and read their results through futures
//! let future = pool.submit(|| Ok(6 * 7))?;
//! assert_eq!(future.get()?, 42);
//!
//! // Fire-and-forget side effects
//! for i in 0..10 {
//!     pool.execute(move |_token| {
//!         log::info!("task {} executing", i);
//!         Ok(())
//!     })?;
//! }
//!
//! // Shutdown drains every queued task first
//! pool.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Composable Futures
//!
//! ```rust
//! use taskforge::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<()> {
//! let pool = Arc::new(WorkerPool::new(PoolConfig::new(4))?);
//!
//! let total = ComposableFuture::supply(&pool, || Ok(20))?
//!     .map(|v| v + 1)
//!     .combine(&ComposableFuture::supply(&pool, || Ok(21))?, |a, b| a + b);
//! assert_eq!(total.get()?, 42);
//! # pool.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Cancellation
//!
//! ```rust
//! use taskforge::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> Result<()> {
//! let pool = WorkerPool::new(PoolConfig::new(2))?;
//!
//! let future = pool.submit_cancellable(|token| {
//!     loop {
//!         token.check()?;
//!         std::thread::sleep(Duration::from_millis(10));
//!     }
//!     # #[allow(unreachable_code)]
//!     Ok(())
//! })?;
//!
//! future.cancel(true);
//! assert!(future.get().is_err());
//! # pool.shutdown()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod forkjoin;
pub mod future;
pub mod pool;
pub mod prelude;
pub mod queue;
pub mod timer;

pub use crate::core::{
    BoxedTask, CancelReason, CancellationToken, ClosureTask, Result, Task, TaskError,
};
pub use forkjoin::{ForkJoinPool, RecursiveTask};
pub use future::{ComposableFuture, Outcome, Promise, TaskFuture};
pub use pool::{DiscardedTask, PoolConfig, RejectionPolicy, WorkerPool, WorkerStats};
pub use queue::{BoundedQueue, PutError, TakeError};
pub use timer::{ScheduledTimer, TimerHandle};

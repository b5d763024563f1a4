//! Worker pool for concurrent task execution

pub mod config;
mod job;
pub mod worker;
pub mod worker_pool;

pub use config::{PoolConfig, RejectionPolicy};
pub use worker::{Worker, WorkerStats};
pub use worker_pool::{DiscardedTask, WorkerPool};

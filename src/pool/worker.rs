//! Worker thread implementation

use crate::core::{Result, TaskError};
use crate::pool::job::JobStatus;
use crate::pool::worker_pool::PoolShared;
use crate::queue::TakeError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use log::{debug, trace, warn};

/// Statistics for a worker thread
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Total number of tasks that ran to completion
    pub tasks_processed: AtomicU64,
    /// Total number of tasks whose body returned an error
    pub tasks_failed: AtomicU64,
    /// Total number of tasks that panicked
    pub tasks_panicked: AtomicU64,
    /// Total number of tasks that were cancelled before or during execution
    pub tasks_cancelled: AtomicU64,
    /// Total time spent executing task bodies (microseconds)
    pub total_processing_time_us: AtomicU64,
}

impl WorkerStats {
    /// Create new worker statistics
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, status: JobStatus, elapsed_us: u64) {
        let counter = match status {
            JobStatus::Completed => &self.tasks_processed,
            JobStatus::Failed => &self.tasks_failed,
            JobStatus::Panicked => &self.tasks_panicked,
            JobStatus::Cancelled => &self.tasks_cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_processing_time_us
            .fetch_add(elapsed_us, Ordering::Relaxed);
    }

    /// Get total tasks processed successfully
    pub fn get_tasks_processed(&self) -> u64 {
        self.tasks_processed.load(Ordering::Relaxed)
    }

    /// Get total tasks failed
    pub fn get_tasks_failed(&self) -> u64 {
        self.tasks_failed.load(Ordering::Relaxed)
    }

    /// Get total tasks panicked
    pub fn get_tasks_panicked(&self) -> u64 {
        self.tasks_panicked.load(Ordering::Relaxed)
    }

    /// Get total tasks cancelled
    pub fn get_tasks_cancelled(&self) -> u64 {
        self.tasks_cancelled.load(Ordering::Relaxed)
    }

    /// Get average execution time per task in microseconds
    pub fn get_average_processing_time_us(&self) -> f64 {
        let total = self.total_processing_time_us.load(Ordering::Relaxed);
        let count = self.tasks_processed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }
}

/// A worker thread that drains jobs from the pool queue
#[derive(Debug)]
pub struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Create and start a new worker
    ///
    /// # Shutdown Behavior
    ///
    /// Workers exit when the queue is closed and empty, ensuring all queued
    /// jobs run before a graceful shutdown completes. Surplus workers above
    /// the pool's core size also exit after sitting idle past the configured
    /// idle timeout.
    ///
    /// # Errors
    ///
    /// `TaskError::SpawnError` if the OS refuses the thread.
    pub(crate) fn spawn(id: usize, shared: Arc<PoolShared>) -> Result<Self> {
        let stats = Arc::new(WorkerStats::new());
        let stats_clone = Arc::clone(&stats);

        let thread = thread::Builder::new()
            .name(format!("{}-{}", shared.config().thread_name_prefix, id))
            .spawn(move || {
                let sentinel = Sentinel {
                    id,
                    shared: Arc::clone(&shared),
                    active: true,
                };
                Self::run(id, &shared, &stats_clone);
                sentinel.cancel();
            })
            .map_err(|e| TaskError::spawn(id, e.to_string()))?;

        Ok(Self {
            id,
            thread: Some(thread),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Whether the worker thread has already exited
    pub(crate) fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Join the worker thread
    ///
    /// # Errors
    ///
    /// `TaskError::JoinError` if the worker thread panicked.
    pub fn join(mut self) -> Result<()> {
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| TaskError::join(self.id, "Worker panicked"))?;
        }
        Ok(())
    }

    /// Main worker loop
    fn run(id: usize, shared: &Arc<PoolShared>, stats: &WorkerStats) {
        debug!("worker {} started", id);

        loop {
            match shared.queue().take_timeout(shared.config().idle_timeout) {
                Ok(job) => {
                    let start = std::time::Instant::now();
                    let job_id = job.id();
                    let status = job.run();
                    let elapsed = start.elapsed();
                    stats.record(status, elapsed.as_micros() as u64);
                    match status {
                        JobStatus::Completed => {
                            trace!("worker {}: task {} completed ({:?})", id, job_id, elapsed);
                        }
                        JobStatus::Failed => {
                            warn!("worker {}: task {} failed", id, job_id);
                        }
                        JobStatus::Panicked => {
                            warn!("worker {}: task {} panicked", id, job_id);
                        }
                        JobStatus::Cancelled => {
                            trace!("worker {}: task {} cancelled before run", id, job_id);
                        }
                    }
                }
                Err(TakeError::Timeout) => {
                    // Idle past the timeout; surplus workers retire
                    if shared.try_retire() {
                        debug!("worker {} retiring after idle timeout", id);
                        return;
                    }
                }
                Err(TakeError::Exhausted) => {
                    // Queue closed and drained, shutdown
                    debug!(
                        "worker {} shutting down ({} tasks processed)",
                        id,
                        stats.get_tasks_processed()
                    );
                    break;
                }
                Err(TakeError::Empty) => continue,
            }
        }

        shared.worker_exited();
    }
}

/// Respawns a replacement if a worker thread dies outside a task body.
///
/// Task bodies run under `catch_unwind`, so this only fires on faults in
/// the loop itself.
struct Sentinel {
    id: usize,
    shared: Arc<PoolShared>,
    active: bool,
}

impl Sentinel {
    fn cancel(mut self) {
        self.active = false;
    }
}

impl Drop for Sentinel {
    fn drop(&mut self) {
        if self.active && thread::panicking() {
            self.shared.worker_exited();
            if self.shared.is_running() {
                warn!("worker {} died unexpectedly, spawning replacement", self.id);
                if let Err(e) = PoolShared::respawn_worker(&self.shared) {
                    warn!("failed to replace worker {}: {}", self.id, e);
                }
            }
        }
    }
}

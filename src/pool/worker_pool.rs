//! Worker pool with dynamic sizing and future-based submission

use crate::core::{
    next_task_id, panic_message, CancelReason, CancellationToken, Result, Task, TaskError,
};
use crate::future::TaskFuture;
use crate::pool::config::{PoolConfig, RejectionPolicy};
use crate::pool::job::{JobMode, JobStatus, PoolJob};
use crate::pool::worker::{Worker, WorkerStats};
use crate::queue::{BoundedQueue, PutError};
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Descriptor for a task evicted by [`WorkerPool::shutdown_now`] before it
/// ever ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscardedTask {
    /// Task id assigned at submission
    pub id: u64,
    /// Task name supplied at submission
    pub name: String,
}

/// State shared between the pool handle and its worker threads.
pub(crate) struct PoolShared {
    config: PoolConfig,
    queue: BoundedQueue<PoolJob>,
    running: AtomicBool,
    live_workers: AtomicUsize,
    next_worker_id: AtomicUsize,
    root_token: CancellationToken,
    workers: RwLock<Vec<Worker>>,
    term_lock: Mutex<()>,
    term_cond: Condvar,
}

impl PoolShared {
    pub(crate) fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub(crate) fn queue(&self) -> &BoundedQueue<PoolJob> {
        &self.queue
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Reserves an exit slot for an idle surplus worker.
    ///
    /// The live count never drops below the configured core size here;
    /// core workers keep polling.
    pub(crate) fn try_retire(&self) -> bool {
        loop {
            let live = self.live_workers.load(Ordering::Acquire);
            if live <= self.config.core_size {
                return false;
            }
            if self
                .live_workers
                .compare_exchange(live, live - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.notify_if_terminated();
                return true;
            }
        }
    }

    pub(crate) fn worker_exited(&self) {
        self.live_workers.fetch_sub(1, Ordering::AcqRel);
        self.notify_if_terminated();
    }

    fn notify_if_terminated(&self) {
        if self.live_workers.load(Ordering::Acquire) == 0 {
            let _guard = self.term_lock.lock();
            self.term_cond.notify_all();
        }
    }

    /// Spawns one additional worker if the pool is below `max_size`.
    fn try_grow(this: &Arc<Self>) -> bool {
        loop {
            let live = this.live_workers.load(Ordering::Acquire);
            if live >= this.config.max_size {
                return false;
            }
            if this
                .live_workers
                .compare_exchange(live, live + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                match Self::spawn_worker(this) {
                    Ok(()) => {
                        debug!("pool grew to {} workers", live + 1);
                        return true;
                    }
                    Err(e) => {
                        this.live_workers.fetch_sub(1, Ordering::AcqRel);
                        warn!("failed to grow pool: {}", e);
                        return false;
                    }
                }
            }
        }
    }

    /// Replaces a worker that died outside a task body. The caller has
    /// already decremented the live count.
    pub(crate) fn respawn_worker(this: &Arc<Self>) -> Result<()> {
        this.live_workers.fetch_add(1, Ordering::AcqRel);
        Self::spawn_worker(this).map_err(|e| {
            this.live_workers.fetch_sub(1, Ordering::AcqRel);
            e
        })
    }

    /// Spawns a worker thread. Live count accounting is the caller's job.
    fn spawn_worker(this: &Arc<Self>) -> Result<()> {
        let id = this.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let worker = Worker::spawn(id, Arc::clone(this))?;
        let mut workers = this.workers.write();
        // Retired workers leave finished handles behind; drop them here
        workers.retain(|w| !w.is_finished());
        workers.push(worker);
        Ok(())
    }
}

/// A pool of worker threads executing submitted tasks.
///
/// The pool keeps `core_size` workers alive, grows lazily up to `max_size`
/// when the queue is full, and retires surplus workers after they idle past
/// the configured timeout. Every submission yields a [`TaskFuture`] for its
/// outcome.
///
/// # Shutdown Mechanism
///
/// Graceful shutdown closes the queue; workers drain every queued task
/// before exiting. [`shutdown_now`](Self::shutdown_now) instead evicts the
/// queue and trips the pool's cancellation token so cooperative tasks stop
/// early.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    total_tasks_submitted: AtomicU64,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.shared.config)
            .field("running", &self.shared.is_running())
            .field("live_workers", &self.current_workers())
            .finish()
    }
}

impl WorkerPool {
    /// Create a pool and start its core workers.
    ///
    /// # Errors
    ///
    /// `TaskError::InvalidConfig` for a bad configuration, or
    /// `TaskError::SpawnError` if a core worker thread cannot start.
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let queue = if config.queue_capacity > 0 {
            BoundedQueue::new(config.queue_capacity)
        } else {
            BoundedQueue::unbounded()
        };

        let shared = Arc::new(PoolShared {
            config,
            queue,
            running: AtomicBool::new(true),
            live_workers: AtomicUsize::new(0),
            next_worker_id: AtomicUsize::new(0),
            root_token: CancellationToken::new(),
            workers: RwLock::new(Vec::new()),
            term_lock: Mutex::new(()),
            term_cond: Condvar::new(),
        });

        for _ in 0..shared.config.core_size {
            shared.live_workers.fetch_add(1, Ordering::AcqRel);
            if let Err(e) = PoolShared::spawn_worker(&shared) {
                shared.live_workers.fetch_sub(1, Ordering::AcqRel);
                // Roll back the workers that did start
                shared.running.store(false, Ordering::Release);
                shared.queue.close();
                return Err(e);
            }
        }

        info!(
            "pool '{}' started with {} core workers (max {})",
            shared.config.thread_name_prefix, shared.config.core_size, shared.config.max_size
        );

        Ok(Self {
            shared,
            total_tasks_submitted: AtomicU64::new(0),
        })
    }

    /// Create a pool with default configuration sized to the CPU count.
    ///
    /// # Errors
    ///
    /// `TaskError::SpawnError` if a core worker thread cannot start.
    pub fn with_defaults() -> Result<Self> {
        Self::new(PoolConfig::default())
    }

    /// Submit a computation and get a future for its result.
    ///
    /// # Errors
    ///
    /// - `TaskError::PoolClosed` - pool has been shut down
    /// - `TaskError::CapacityExceeded` - saturated under the `Abort` policy
    ///
    /// # Example
    ///
    /// ```
    /// use taskforge::prelude::*;
    ///
    /// # fn main() -> Result<()> {
    /// let pool = WorkerPool::new(PoolConfig::new(2))?;
    /// let future = pool.submit(|| Ok(6 * 7))?;
    /// assert_eq!(future.get()?, 42);
    /// # pool.shutdown()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn submit<T, F>(&self, f: F) -> Result<TaskFuture<T>>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        self.submit_inner("task", move |_token| f())
    }

    /// Submit a computation that observes its cancellation token.
    ///
    /// The body should poll the token at natural checkpoints and bail out
    /// when it trips. Cancelling the returned future with
    /// `may_interrupt = true` trips the token.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub fn submit_cancellable<T, F>(&self, f: F) -> Result<TaskFuture<T>>
    where
        T: Clone + Send + 'static,
        F: FnOnce(&CancellationToken) -> Result<T> + Send + 'static,
    {
        self.submit_inner("task", f)
    }

    /// Submit a [`Task`] trait object.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub fn submit_task<J: Task + 'static>(&self, mut task: J) -> Result<TaskFuture<()>> {
        let name = task.name().to_string();
        self.submit_inner(&name, move |token| task.run(token))
    }

    /// Submit a closure for its side effects only.
    ///
    /// The task's outcome is observable only through pool statistics.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&CancellationToken) -> Result<()> + Send + 'static,
    {
        self.submit_inner("task", f).map(|_future| ())
    }

    fn submit_inner<T, F>(&self, name: &str, f: F) -> Result<TaskFuture<T>>
    where
        T: Clone + Send + 'static,
        F: FnOnce(&CancellationToken) -> Result<T> + Send + 'static,
    {
        if !self.shared.is_running() {
            return Err(TaskError::PoolClosed);
        }

        let token = self.shared.root_token.child();
        let body_token = token.clone();
        let (promise, future) = TaskFuture::pair(token);
        let id = next_task_id();

        let exec: Box<dyn FnOnce(JobMode) -> JobStatus + Send> = Box::new(move |mode| {
            let discard_error = match mode {
                JobMode::Run => None,
                JobMode::Discard(err) => Some(err),
            };
            if let Some(err) = discard_error {
                match err {
                    TaskError::Cancelled { reason } => promise.cancel(reason),
                    other => {
                        let _ = promise.fail(other);
                    }
                }
                return JobStatus::Cancelled;
            }
            if body_token.is_cancelled() {
                promise.cancel("cancelled before execution");
                return JobStatus::Cancelled;
            }
            if !promise.set_running() {
                // Future already cancelled by a reader
                return JobStatus::Cancelled;
            }
            match catch_unwind(AssertUnwindSafe(|| f(&body_token))) {
                Ok(Ok(value)) => {
                    let _ = promise.complete(value);
                    JobStatus::Completed
                }
                Ok(Err(err)) => {
                    if err.is_cancelled() {
                        let _ = promise.fail(err);
                        JobStatus::Cancelled
                    } else {
                        let _ = promise.fail(err);
                        JobStatus::Failed
                    }
                }
                Err(payload) => {
                    let _ = promise.fail(TaskError::panic(panic_message(payload.as_ref())));
                    JobStatus::Panicked
                }
            }
        });

        self.dispatch(PoolJob::new(id, name.to_string(), exec))?;
        Ok(future)
    }

    fn dispatch(&self, job: PoolJob) -> Result<()> {
        let mut job = match self.shared.queue.try_put(job) {
            Ok(()) => {
                self.total_tasks_submitted.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            Err(PutError::Closed(job)) => {
                job.discard(TaskError::cancelled("pool is shutting down"));
                return Err(TaskError::PoolClosed);
            }
            Err(PutError::Full(job)) | Err(PutError::Timeout(job)) => job,
        };

        // Saturated: grow toward max_size, retrying the enqueue after each
        // new worker starts draining. The short blocking put gives the new
        // worker time to take a job before we conclude we are still full.
        while PoolShared::try_grow(&self.shared) {
            job = match self
                .shared
                .queue
                .put_timeout(job, Duration::from_millis(100))
            {
                Ok(()) => {
                    self.total_tasks_submitted.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(PutError::Closed(job)) => {
                    job.discard(TaskError::cancelled("pool is shutting down"));
                    return Err(TaskError::PoolClosed);
                }
                Err(PutError::Full(job)) | Err(PutError::Timeout(job)) => job,
            };
        }

        self.apply_rejection(job)
    }

    fn apply_rejection(&self, job: PoolJob) -> Result<()> {
        match self.shared.config.rejection_policy {
            RejectionPolicy::Abort => {
                let queued = self.shared.queue.len();
                let capacity = self.shared.config.queue_capacity;
                job.discard(TaskError::capacity_exceeded(queued, capacity));
                Err(TaskError::capacity_exceeded(queued, capacity))
            }
            RejectionPolicy::CallerRuns => {
                debug!("queue full, task {} running on submitting thread", job.id());
                self.total_tasks_submitted.fetch_add(1, Ordering::Relaxed);
                job.run();
                Ok(())
            }
            RejectionPolicy::DiscardNew => {
                debug!("queue full, discarding task {}", job.id());
                job.discard(TaskError::cancelled("discarded: pool saturated"));
                Ok(())
            }
            RejectionPolicy::DiscardOldest => {
                let mut job = job;
                loop {
                    if let Some(oldest) = self.shared.queue.evict_oldest() {
                        debug!("queue full, evicting oldest task {}", oldest.id());
                        oldest.discard(TaskError::cancelled("evicted by newer submission"));
                    }
                    job = match self.shared.queue.try_put(job) {
                        Ok(()) => {
                            self.total_tasks_submitted.fetch_add(1, Ordering::Relaxed);
                            return Ok(());
                        }
                        Err(PutError::Closed(job)) => {
                            job.discard(TaskError::cancelled("pool is shutting down"));
                            return Err(TaskError::PoolClosed);
                        }
                        Err(PutError::Full(job)) | Err(PutError::Timeout(job)) => job,
                    };
                }
            }
        }
    }

    /// Check if the pool accepts submissions
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Number of core workers
    pub fn core_size(&self) -> usize {
        self.shared.config.core_size
    }

    /// Current number of live workers (approximate)
    pub fn current_workers(&self) -> usize {
        self.shared.live_workers.load(Ordering::Acquire)
    }

    /// Current queue depth (approximate)
    pub fn queue_size(&self) -> usize {
        self.shared.queue.len()
    }

    /// Total number of tasks accepted for execution
    pub fn total_tasks_submitted(&self) -> u64 {
        self.total_tasks_submitted.load(Ordering::Relaxed)
    }

    /// The pool's root cancellation token; all task tokens are children
    pub fn token(&self) -> &CancellationToken {
        &self.shared.root_token
    }

    /// Get statistics for all workers, including retired ones
    pub fn get_stats(&self) -> Vec<Arc<WorkerStats>> {
        self.shared.workers.read().iter().map(|w| w.stats()).collect()
    }

    /// Total tasks processed successfully across all workers
    pub fn total_tasks_processed(&self) -> u64 {
        self.sum_stats(|s| s.get_tasks_processed())
    }

    /// Total tasks failed across all workers
    pub fn total_tasks_failed(&self) -> u64 {
        self.sum_stats(|s| s.get_tasks_failed())
    }

    /// Total tasks panicked across all workers
    pub fn total_tasks_panicked(&self) -> u64 {
        self.sum_stats(|s| s.get_tasks_panicked())
    }

    /// Total tasks cancelled across all workers
    pub fn total_tasks_cancelled(&self) -> u64 {
        self.sum_stats(|s| s.get_tasks_cancelled())
    }

    fn sum_stats(&self, f: impl Fn(&WorkerStats) -> u64) -> u64 {
        self.shared.workers.read().iter().map(|w| f(&w.stats())).sum()
    }

    /// Shut down gracefully, draining every queued task first.
    ///
    /// 1. Stops accepting new submissions
    /// 2. Closes the queue
    /// 3. Joins all workers once the queue is drained
    ///
    /// Safe to call more than once; later calls return immediately.
    ///
    /// # Errors
    ///
    /// `TaskError::JoinError` if a worker thread panicked.
    pub fn shutdown(&self) -> Result<()> {
        if !self.begin_shutdown() {
            return Ok(());
        }
        info!(
            "pool '{}' shutting down, draining {} queued tasks",
            self.shared.config.thread_name_prefix,
            self.shared.queue.len()
        );
        self.join_workers()
    }

    /// Shut down immediately, discarding queued tasks.
    ///
    /// The pool's cancellation token is tripped so cooperative in-flight
    /// tasks can stop early; their futures resolve through the normal
    /// paths. Returns descriptors for every queued task that never ran.
    pub fn shutdown_now(&self) -> Vec<DiscardedTask> {
        self.begin_shutdown();
        self.shared
            .root_token
            .cancel_with_reason(CancelReason::PoolShutdown);

        let mut never_ran = Vec::new();
        while let Some(job) = self.shared.queue.evict_oldest() {
            never_ran.push(DiscardedTask {
                id: job.id(),
                name: job.name().to_string(),
            });
            job.discard(TaskError::cancelled("pool shut down before execution"));
        }
        info!(
            "pool '{}' shut down immediately, {} queued tasks discarded",
            self.shared.config.thread_name_prefix,
            never_ran.len()
        );

        if let Err(e) = self.join_workers() {
            warn!("error joining workers during immediate shutdown: {}", e);
        }
        never_ran
    }

    /// Block until every worker has exited, or `timeout` elapses.
    ///
    /// Call after [`shutdown`](Self::shutdown) or
    /// [`shutdown_now`](Self::shutdown_now) from another thread to bound
    /// the wait. Returns `true` if the pool terminated in time.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.shared.term_lock.lock();
        while self.shared.live_workers.load(Ordering::Acquire) > 0 {
            if self
                .shared
                .term_cond
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                return self.shared.live_workers.load(Ordering::Acquire) == 0;
            }
        }
        true
    }

    fn begin_shutdown(&self) -> bool {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            self.shared.queue.close();
            true
        } else {
            false
        }
    }

    fn join_workers(&self) -> Result<()> {
        let workers = std::mem::take(&mut *self.shared.workers.write());
        for worker in workers {
            worker.join()?;
        }
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.shared.is_running() {
            if let Err(e) = self.shutdown() {
                log::error!(
                    "failed to shut down pool '{}' during drop: {}",
                    self.shared.config.thread_name_prefix,
                    e
                );
            }
        }
    }
}

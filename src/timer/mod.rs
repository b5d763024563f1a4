//! Deadline-driven task scheduling.
//!
//! A [`ScheduledTimer`] keeps pending entries in a min-heap keyed by fire
//! time and runs one dedicated thread that sleeps until the earliest
//! deadline. Due tasks are handed to a [`WorkerPool`] so a slow task never
//! delays other timers. Periodic entries reschedule at a fixed rate from
//! the scheduled fire time; a late dispatch runs late rather than being
//! dropped.

use crate::core::{CancelReason, CancellationToken, Result, TaskError};
use crate::pool::WorkerPool;
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

enum TimerTask {
    Once(Box<dyn FnOnce(&CancellationToken) -> Result<()> + Send>),
    Periodic(Arc<dyn Fn(&CancellationToken) -> Result<()> + Send + Sync>),
}

struct Entry {
    id: u64,
    fire_at: Instant,
    period: Option<Duration>,
    token: CancellationToken,
    task: TimerTask,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.id == other.id
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap; reverse so the earliest deadline is on
        // top, with submission order breaking ties
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

struct TimerShared {
    pool: Arc<WorkerPool>,
    heap: Mutex<BinaryHeap<Entry>>,
    cond: Condvar,
    running: AtomicBool,
}

/// Cancellation handle for a scheduled task.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: u64,
    token: CancellationToken,
}

impl TimerHandle {
    /// Id of the scheduled entry
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancel the scheduled task.
    ///
    /// A pending entry is skipped at dispatch; an in-flight run observes
    /// its token and can stop cooperatively. Returns `false` if already
    /// cancelled.
    pub fn cancel(&self) -> bool {
        let already = self.token.is_cancelled();
        self.token.cancel_with_reason(CancelReason::Manual);
        !already
    }

    /// Whether this entry has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Schedules one-shot and fixed-rate periodic tasks onto a worker pool.
pub struct ScheduledTimer {
    shared: Arc<TimerShared>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for ScheduledTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTimer")
            .field("running", &self.shared.running.load(Ordering::Relaxed))
            .field("pending", &self.shared.heap.lock().len())
            .finish()
    }
}

impl ScheduledTimer {
    /// Create a timer that dispatches due tasks onto `pool`.
    ///
    /// # Errors
    ///
    /// `TaskError::SpawnError` if the timer thread cannot start.
    pub fn new(pool: Arc<WorkerPool>) -> Result<Self> {
        let shared = Arc::new(TimerShared {
            pool,
            heap: Mutex::new(BinaryHeap::new()),
            cond: Condvar::new(),
            running: AtomicBool::new(true),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("taskforge-timer".to_string())
            .spawn(move || Self::run(&thread_shared))
            .map_err(|e| TaskError::spawn(0, e.to_string()))?;

        Ok(Self {
            shared,
            thread: Mutex::new(Some(handle)),
            next_id: AtomicU64::new(1),
        })
    }

    /// Schedule `f` to run once after `delay`.
    ///
    /// # Errors
    ///
    /// `TaskError::PoolClosed` if the timer has been shut down.
    pub fn schedule<F>(&self, delay: Duration, f: F) -> Result<TimerHandle>
    where
        F: FnOnce(&CancellationToken) -> Result<()> + Send + 'static,
    {
        self.insert(delay, None, TimerTask::Once(Box::new(f)))
    }

    /// Schedule `f` at a fixed rate: first run after `initial_delay`, then
    /// every `period` measured from the scheduled fire times.
    ///
    /// # Errors
    ///
    /// - `TaskError::PoolClosed` - timer has been shut down
    /// - `TaskError::InvalidConfig` - `period` is zero
    pub fn schedule_periodic<F>(
        &self,
        initial_delay: Duration,
        period: Duration,
        f: F,
    ) -> Result<TimerHandle>
    where
        F: Fn(&CancellationToken) -> Result<()> + Send + Sync + 'static,
    {
        if period.is_zero() {
            return Err(TaskError::invalid_config(
                "period",
                "Period must be non-zero",
            ));
        }
        self.insert(initial_delay, Some(period), TimerTask::Periodic(Arc::new(f)))
    }

    fn insert(
        &self,
        delay: Duration,
        period: Option<Duration>,
        task: TimerTask,
    ) -> Result<TimerHandle> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(TaskError::PoolClosed);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let entry = Entry {
            id,
            fire_at: Instant::now() + delay,
            period,
            token: token.clone(),
            task,
        };

        let mut heap = self.shared.heap.lock();
        heap.push(entry);
        // Wake the timer thread to re-evaluate its earliest deadline
        self.shared.cond.notify_all();
        drop(heap);

        Ok(TimerHandle { id, token })
    }

    /// Number of entries waiting to fire
    pub fn pending(&self) -> usize {
        self.shared.heap.lock().len()
    }

    fn run(shared: &Arc<TimerShared>) {
        debug!("timer thread started");
        loop {
            let due = {
                let mut heap = shared.heap.lock();
                loop {
                    if !shared.running.load(Ordering::Acquire) {
                        return;
                    }
                    match heap.peek().map(|e| e.fire_at) {
                        None => {
                            shared.cond.wait(&mut heap);
                        }
                        Some(fire_at) => {
                            if fire_at <= Instant::now() {
                                break heap.pop();
                            }
                            shared.cond.wait_until(&mut heap, fire_at);
                        }
                    }
                }
            };
            if let Some(entry) = due {
                Self::dispatch(shared, entry);
            }
        }
    }

    fn dispatch(shared: &Arc<TimerShared>, entry: Entry) {
        let Entry {
            id,
            fire_at,
            period,
            token,
            task,
        } = entry;

        if token.is_cancelled() {
            debug!("timer entry {} cancelled, skipping", id);
            return;
        }

        match task {
            TimerTask::Once(f) => {
                let run_token = token;
                if let Err(e) = shared.pool.execute(move |_| f(&run_token)) {
                    warn!("timer entry {} could not be dispatched: {}", id, e);
                }
            }
            TimerTask::Periodic(f) => {
                let run = Arc::clone(&f);
                let run_token = token.clone();
                if let Err(e) = shared.pool.execute(move |_| {
                    if run_token.is_cancelled() {
                        return Ok(());
                    }
                    run(&run_token)
                }) {
                    warn!("timer entry {} could not be dispatched: {}", id, e);
                }

                if let Some(period) = period {
                    // Fixed rate: the next deadline advances from the
                    // scheduled fire time, not from now
                    shared.heap.lock().push(Entry {
                        id,
                        fire_at: fire_at + period,
                        period: Some(period),
                        token,
                        task: TimerTask::Periodic(f),
                    });
                }
            }
        }
    }

    /// Stop the timer thread and drop all pending entries.
    ///
    /// Tasks already handed to the pool keep running; their tokens are not
    /// tripped. Safe to call more than once.
    pub fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        {
            let _heap = self.shared.heap.lock();
            self.shared.cond.notify_all();
        }
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
        let dropped = {
            let mut heap = self.shared.heap.lock();
            let n = heap.len();
            heap.clear();
            n
        };
        if dropped > 0 {
            info!("timer shut down with {} pending entries dropped", dropped);
        }
    }
}

impl Drop for ScheduledTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

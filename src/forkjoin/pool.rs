//! Work-stealing fork/join pool.
//!
//! Each worker owns a LIFO deque; forked subtasks go to the forking
//! worker's own deque for cache locality, and idle workers steal FIFO from
//! peers or pull from the shared injector. A worker waiting on a forked
//! subtask helps by running other jobs instead of blocking, so recursion
//! depth never deadlocks the pool.

use crate::core::{panic_message, Result, TaskError};
use crate::forkjoin::task::RecursiveTask;
use crossbeam_deque::{Injector, Steal, Stealer, Worker as Deque};
use crossbeam_utils::Backoff;
use log::{debug, info};
use parking_lot::{Condvar, Mutex};
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

type FjJob = Box<dyn FnOnce() + Send>;

struct FjShared {
    injector: Injector<FjJob>,
    stealers: Vec<Stealer<FjJob>>,
    running: AtomicBool,
}

/// Per-thread scheduling state; present only on this pool's workers.
struct FjContext {
    local: Deque<FjJob>,
    shared: Arc<FjShared>,
}

thread_local! {
    static CONTEXT: RefCell<Option<FjContext>> = RefCell::new(None);
}

impl FjContext {
    /// Local LIFO pop, then the injector, then random-start peer steals.
    fn find_job(&self) -> Option<FjJob> {
        if let Some(job) = self.local.pop() {
            return Some(job);
        }

        loop {
            match self.shared.injector.steal_batch_and_pop(&self.local) {
                Steal::Success(job) => return Some(job),
                Steal::Empty => break,
                Steal::Retry => {}
            }
        }

        let n = self.shared.stealers.len();
        let start = fastrand::usize(..n);
        for i in 0..n {
            let stealer = &self.shared.stealers[(start + i) % n];
            loop {
                match stealer.steal() {
                    Steal::Success(job) => return Some(job),
                    Steal::Empty => break,
                    Steal::Retry => {}
                }
            }
        }
        None
    }
}

/// Runs one scheduling pass on the current thread's context, if any.
fn run_local_job() -> bool {
    let job = CONTEXT.with(|ctx| ctx.borrow().as_ref().and_then(FjContext::find_job));
    match job {
        Some(job) => {
            job();
            true
        }
        None => false,
    }
}

fn worker_loop(shared: &Arc<FjShared>) {
    let backoff = Backoff::new();
    while shared.running.load(Ordering::Acquire) {
        if run_local_job() {
            backoff.reset();
        } else {
            backoff.snooze();
            if backoff.is_completed() {
                thread::yield_now();
            }
        }
    }
}

/// Rendezvous between a forked subtask and its joiner.
struct JoinSlot<T> {
    result: Mutex<Option<T>>,
    done: AtomicBool,
    cond: Condvar,
}

impl<T> JoinSlot<T> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: AtomicBool::new(false),
            cond: Condvar::new(),
        }
    }

    fn set(&self, value: T) {
        let mut guard = self.result.lock();
        *guard = Some(value);
        self.done.store(true, Ordering::Release);
        self.cond.notify_all();
    }

    fn try_take(&self) -> Option<T> {
        if self.done.load(Ordering::Acquire) {
            self.result.lock().take()
        } else {
            None
        }
    }

    fn wait_blocking(&self) -> Option<T> {
        let mut guard = self.result.lock();
        while guard.is_none() {
            self.cond.wait(&mut guard);
        }
        guard.take()
    }
}

fn exec<T: RecursiveTask>(task: T, threshold: usize) -> Result<T::Output> {
    if task.len() <= threshold {
        return task.compute();
    }
    let (left, right) = task.split();
    let pending = fork(right, threshold);
    let left_out = exec(left, threshold)?;
    let right_out = join(&pending)?;
    Ok(T::merge(left_out, right_out))
}

/// Pushes the subtask onto this worker's deque. Off a worker thread the
/// subtask degrades to inline execution.
fn fork<T: RecursiveTask>(task: T, threshold: usize) -> Arc<JoinSlot<Result<T::Output>>> {
    let slot = Arc::new(JoinSlot::new());
    let producer = Arc::clone(&slot);
    let job: FjJob = Box::new(move || {
        let outcome = match catch_unwind(AssertUnwindSafe(|| exec(task, threshold))) {
            Ok(result) => result,
            Err(payload) => Err(TaskError::panic(panic_message(payload.as_ref()))),
        };
        producer.set(outcome);
    });

    let pushed = CONTEXT.with(|ctx| match ctx.borrow().as_ref() {
        Some(ctx) => {
            ctx.local.push(job);
            None
        }
        None => Some(job),
    });
    if let Some(job) = pushed {
        job();
    }
    slot
}

/// Waits for a forked subtask, running other jobs instead of blocking.
fn join<T>(slot: &Arc<JoinSlot<Result<T>>>) -> Result<T> {
    let backoff = Backoff::new();
    loop {
        if let Some(outcome) = slot.try_take() {
            return outcome;
        }
        if run_local_job() {
            backoff.reset();
        } else {
            // The subtask was stolen and is in flight elsewhere
            backoff.snooze();
        }
    }
}

/// A fixed-parallelism pool for divide-and-conquer workloads.
pub struct ForkJoinPool {
    shared: Arc<FjShared>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl std::fmt::Debug for ForkJoinPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForkJoinPool")
            .field("parallelism", &self.parallelism())
            .field("running", &self.shared.running.load(Ordering::Relaxed))
            .finish()
    }
}

impl ForkJoinPool {
    /// Create a pool with the given number of workers (0 = CPU count).
    ///
    /// # Errors
    ///
    /// `TaskError::SpawnError` if a worker thread cannot start.
    pub fn new(parallelism: usize) -> Result<Self> {
        let parallelism = if parallelism == 0 {
            num_cpus::get()
        } else {
            parallelism
        };

        let deques: Vec<Deque<FjJob>> = (0..parallelism).map(|_| Deque::new_lifo()).collect();
        let stealers = deques.iter().map(Deque::stealer).collect();
        let shared = Arc::new(FjShared {
            injector: Injector::new(),
            stealers,
            running: AtomicBool::new(true),
        });

        let mut handles = Vec::with_capacity(parallelism);
        for (index, deque) in deques.into_iter().enumerate() {
            let shared_clone = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("forkjoin-{}", index))
                .spawn(move || {
                    CONTEXT.with(|ctx| {
                        *ctx.borrow_mut() = Some(FjContext {
                            local: deque,
                            shared: Arc::clone(&shared_clone),
                        });
                    });
                    debug!("forkjoin worker {} started", index);
                    worker_loop(&shared_clone);
                    CONTEXT.with(|ctx| {
                        ctx.borrow_mut().take();
                    });
                    debug!("forkjoin worker {} stopped", index);
                })
                .map_err(|e| TaskError::spawn(index, e.to_string()))?;
            handles.push(handle);
        }

        info!("forkjoin pool started with {} workers", parallelism);
        Ok(Self {
            shared,
            handles: Mutex::new(handles),
        })
    }

    /// Run a recursive task to completion and return its merged output.
    ///
    /// Subtasks at or below `threshold` elements are computed directly;
    /// larger ones keep splitting. A threshold of 0 is treated as 1.
    /// Blocks the calling thread; when called from one of this pool's own
    /// workers the task executes in place, so nested invocations cannot
    /// deadlock.
    ///
    /// # Errors
    ///
    /// - `TaskError::PoolClosed` - pool has been shut down
    /// - `TaskError::WorkerPanic` - a subtask panicked
    /// - any error returned by a subtask's `compute`
    pub fn invoke<T: RecursiveTask>(&self, task: T, threshold: usize) -> Result<T::Output> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(TaskError::PoolClosed);
        }
        let threshold = threshold.max(1);

        let on_own_worker = CONTEXT.with(|ctx| {
            ctx.borrow()
                .as_ref()
                .map_or(false, |c| Arc::ptr_eq(&c.shared, &self.shared))
        });
        if on_own_worker {
            return exec(task, threshold);
        }

        let slot = Arc::new(JoinSlot::new());
        let producer = Arc::clone(&slot);
        let job: FjJob = Box::new(move || {
            let outcome = match catch_unwind(AssertUnwindSafe(|| exec(task, threshold))) {
                Ok(result) => result,
                Err(payload) => Err(TaskError::panic(panic_message(payload.as_ref()))),
            };
            producer.set(outcome);
        });
        self.shared.injector.push(job);

        if !self.shared.running.load(Ordering::Acquire) {
            // Shutdown raced the push; run injector jobs here until ours
            // resolves so the wait below cannot hang
            loop {
                if let Some(outcome) = slot.try_take() {
                    return outcome;
                }
                match self.shared.injector.steal() {
                    Steal::Success(job) => job(),
                    Steal::Empty => break,
                    Steal::Retry => {}
                }
            }
        }

        match slot.wait_blocking() {
            Some(outcome) => outcome,
            None => Err(TaskError::other("forkjoin invocation lost its result")),
        }
    }

    /// Number of worker threads
    pub fn parallelism(&self) -> usize {
        self.shared.stealers.len()
    }

    /// Stop the workers and join them.
    ///
    /// In-flight invocations run to completion on their workers; root
    /// tasks still sitting in the injector are executed on the calling
    /// thread so no waiter is left hanging.
    pub fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.join();
        }
        loop {
            match self.shared.injector.steal() {
                Steal::Success(job) => job(),
                Steal::Empty => break,
                Steal::Retry => {}
            }
        }
        info!("forkjoin pool shut down");
    }
}

impl Drop for ForkJoinPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    struct SumTask {
        values: Arc<Vec<i64>>,
        lo: usize,
        hi: usize,
    }

    impl SumTask {
        fn over(values: Vec<i64>) -> Self {
            let hi = values.len();
            Self {
                values: Arc::new(values),
                lo: 0,
                hi,
            }
        }
    }

    impl RecursiveTask for SumTask {
        type Output = i64;

        fn len(&self) -> usize {
            self.hi - self.lo
        }

        fn split(self) -> (Self, Self) {
            let mid = self.lo + (self.hi - self.lo) / 2;
            (
                Self {
                    values: Arc::clone(&self.values),
                    lo: self.lo,
                    hi: mid,
                },
                Self {
                    values: self.values,
                    lo: mid,
                    hi: self.hi,
                },
            )
        }

        fn compute(self) -> Result<i64> {
            Ok(self.values[self.lo..self.hi].iter().sum())
        }

        fn merge(left: i64, right: i64) -> i64 {
            left + right
        }
    }

    /// Counts leaf computations without producing a value.
    struct TouchTask {
        counter: Arc<AtomicU64>,
        size: usize,
    }

    impl RecursiveTask for TouchTask {
        type Output = ();

        fn len(&self) -> usize {
            self.size
        }

        fn split(self) -> (Self, Self) {
            let half = self.size / 2;
            (
                Self {
                    counter: Arc::clone(&self.counter),
                    size: half,
                },
                Self {
                    counter: self.counter,
                    size: self.size - half,
                },
            )
        }

        fn compute(self) -> Result<()> {
            self.counter.fetch_add(self.size as u64, Ordering::Relaxed);
            Ok(())
        }

        fn merge(_: (), _: ()) {}
    }

    #[test]
    fn test_parallel_sum_matches_sequential() {
        let pool = ForkJoinPool::new(4).unwrap();
        let values: Vec<i64> = (1..=100_000).collect();
        let expected: i64 = values.iter().sum();

        let result = pool.invoke(SumTask::over(values), 1_000).unwrap();
        assert_eq!(result, expected);
        pool.shutdown();
    }

    #[test]
    fn test_small_input_computed_directly() {
        let pool = ForkJoinPool::new(2).unwrap();
        let result = pool.invoke(SumTask::over(vec![1, 2, 3]), 100).unwrap();
        assert_eq!(result, 6);
    }

    #[test]
    fn test_zero_threshold_treated_as_one() {
        let pool = ForkJoinPool::new(2).unwrap();
        let result = pool.invoke(SumTask::over(vec![5, 7, 11]), 0).unwrap();
        assert_eq!(result, 23);
    }

    #[test]
    fn test_empty_input() {
        let pool = ForkJoinPool::new(2).unwrap();
        let result = pool.invoke(SumTask::over(Vec::new()), 8).unwrap();
        assert_eq!(result, 0);
    }

    #[test]
    fn test_side_effect_task_touches_everything() {
        let pool = ForkJoinPool::new(4).unwrap();
        let counter = Arc::new(AtomicU64::new(0));
        pool.invoke(
            TouchTask {
                counter: Arc::clone(&counter),
                size: 10_000,
            },
            16,
        )
        .unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), 10_000);
    }

    #[test]
    fn test_subtask_failure_propagates() {
        struct FailAt {
            lo: usize,
            hi: usize,
        }
        impl RecursiveTask for FailAt {
            type Output = ();
            fn len(&self) -> usize {
                self.hi - self.lo
            }
            fn split(self) -> (Self, Self) {
                let mid = self.lo + (self.hi - self.lo) / 2;
                (
                    Self {
                        lo: self.lo,
                        hi: mid,
                    },
                    Self {
                        lo: mid,
                        hi: self.hi,
                    },
                )
            }
            fn compute(self) -> Result<()> {
                if self.lo <= 700 && 700 < self.hi {
                    Err(TaskError::failure("leaf 700 is poisoned"))
                } else {
                    Ok(())
                }
            }
            fn merge(_: (), _: ()) {}
        }

        let pool = ForkJoinPool::new(4).unwrap();
        let err = pool.invoke(FailAt { lo: 0, hi: 1024 }, 32).unwrap_err();
        assert!(err.to_string().contains("poisoned"));
    }

    #[test]
    fn test_subtask_panic_reported() {
        struct PanicTask {
            size: usize,
        }
        impl RecursiveTask for PanicTask {
            type Output = ();
            fn len(&self) -> usize {
                self.size
            }
            fn split(self) -> (Self, Self) {
                let half = self.size / 2;
                (
                    Self { size: half },
                    Self {
                        size: self.size - half,
                    },
                )
            }
            fn compute(self) -> Result<()> {
                if self.size == 1 {
                    panic!("leaf panic");
                }
                Ok(())
            }
            fn merge(_: (), _: ()) {}
        }

        let pool = ForkJoinPool::new(2).unwrap();
        let err = pool.invoke(PanicTask { size: 64 }, 1).unwrap_err();
        assert!(matches!(err, TaskError::WorkerPanic { .. }));
    }

    #[test]
    fn test_invoke_after_shutdown() {
        let pool = ForkJoinPool::new(2).unwrap();
        pool.shutdown();
        assert!(matches!(
            pool.invoke(SumTask::over(vec![1]), 1),
            Err(TaskError::PoolClosed)
        ));
    }

    #[test]
    fn test_parallelism_defaults_to_cpu_count() {
        let pool = ForkJoinPool::new(0).unwrap();
        assert_eq!(pool.parallelism(), num_cpus::get());
    }

    #[test]
    fn test_repeated_invocations() {
        let pool = ForkJoinPool::new(3).unwrap();
        for n in [10i64, 1_000, 50_000] {
            let values: Vec<i64> = (1..=n).collect();
            let result = pool.invoke(SumTask::over(values), 64).unwrap();
            assert_eq!(result, n * (n + 1) / 2);
        }
    }
}

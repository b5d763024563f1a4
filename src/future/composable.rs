//! Composable futures with chaining and aggregation combinators.
//!
//! A [`ComposableFuture`] wraps a [`TaskFuture`] together with the pool that
//! runs its continuation stages. Transformation stages (`map`, `flat_map`)
//! are scheduled on the pool so a slow transform never blocks the thread
//! that resolved the upstream future; lightweight adapters (`recover`,
//! `handle`, `combine`) run inline on the resolving thread.

use crate::core::{panic_message, CancellationToken, Result, TaskError};
use crate::future::cell::{Outcome, Promise, TaskFuture};
use crate::pool::WorkerPool;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A future that supports chaining further computation onto its outcome.
pub struct ComposableFuture<T: Clone + Send + 'static> {
    future: TaskFuture<T>,
    pool: Arc<WorkerPool>,
}

impl<T: Clone + Send + 'static> Clone for ComposableFuture<T> {
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
            pool: Arc::clone(&self.pool),
        }
    }
}

struct CombineState<T, U, R: Clone + Send + 'static, F> {
    left: Option<T>,
    right: Option<U>,
    promise: Option<Promise<R>>,
    merge: Option<F>,
}

impl<T: Clone + Send + 'static> ComposableFuture<T> {
    pub(crate) fn from_parts(future: TaskFuture<T>, pool: Arc<WorkerPool>) -> Self {
        Self { future, pool }
    }

    /// Runs `f` on the pool and returns a future for chaining further
    /// stages onto its outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool rejects the submission.
    pub fn supply<F>(pool: &Arc<WorkerPool>, f: F) -> Result<Self>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let future = pool.submit(f)?;
        Ok(Self::from_parts(future, Arc::clone(pool)))
    }

    /// An already-resolved future holding `value`.
    pub fn completed(pool: &Arc<WorkerPool>, value: T) -> Self {
        let (promise, future) = TaskFuture::pair(CancellationToken::new());
        let _ = promise.complete(value);
        Self::from_parts(future, Arc::clone(pool))
    }

    /// An already-failed future holding `error`.
    pub fn failed(pool: &Arc<WorkerPool>, error: TaskError) -> Self {
        let (promise, future) = TaskFuture::pair(CancellationToken::new());
        let _ = promise.fail(error);
        Self::from_parts(future, Arc::clone(pool))
    }

    /// Applies `f` to the eventual value, scheduling it on the pool.
    ///
    /// Failures and cancellations skip `f` and propagate unchanged. A panic
    /// inside `f` resolves the derived future as `WorkerPanic`.
    pub fn map<U, F>(&self, f: F) -> ComposableFuture<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let (promise, future) = TaskFuture::pair(CancellationToken::new());
        let pool = Arc::clone(&self.pool);
        let sched = Arc::clone(&self.pool);
        self.future
            .shared()
            .add_continuation(Box::new(move |outcome| match outcome {
                Ok(value) => {
                    let _ = sched.execute(move |_token| {
                        match catch_unwind(AssertUnwindSafe(|| f(value))) {
                            Ok(mapped) => {
                                let _ = promise.complete(mapped);
                            }
                            Err(payload) => {
                                let _ = promise
                                    .fail(TaskError::panic(panic_message(payload.as_ref())));
                            }
                        }
                        Ok(())
                    });
                }
                Err(err) => {
                    let _ = promise.fail(err);
                }
            }));
        ComposableFuture::from_parts(future, pool)
    }

    /// Applies `f` producing another future and flattens one level.
    ///
    /// Upstream failures propagate without invoking `f`.
    pub fn flat_map<U, F>(&self, f: F) -> ComposableFuture<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> ComposableFuture<U> + Send + 'static,
    {
        let (promise, future) = TaskFuture::pair(CancellationToken::new());
        let pool = Arc::clone(&self.pool);
        let sched = Arc::clone(&self.pool);
        self.future
            .shared()
            .add_continuation(Box::new(move |outcome| match outcome {
                Ok(value) => {
                    let _ = sched.execute(move |_token| {
                        match catch_unwind(AssertUnwindSafe(|| f(value))) {
                            Ok(inner) => {
                                inner.future.shared().add_continuation(Box::new(
                                    move |inner_outcome| match inner_outcome {
                                        Ok(v) => {
                                            let _ = promise.complete(v);
                                        }
                                        Err(e) => {
                                            let _ = promise.fail(e);
                                        }
                                    },
                                ));
                            }
                            Err(payload) => {
                                let _ = promise
                                    .fail(TaskError::panic(panic_message(payload.as_ref())));
                            }
                        }
                        Ok(())
                    });
                }
                Err(err) => {
                    let _ = promise.fail(err);
                }
            }));
        ComposableFuture::from_parts(future, pool)
    }

    /// Joins this future with `other`, merging both values with `f`.
    ///
    /// The first observed failure wins and short-circuits the merge. `f`
    /// runs inline on whichever thread resolved the second input.
    pub fn combine<U, R, F>(&self, other: &ComposableFuture<U>, f: F) -> ComposableFuture<R>
    where
        U: Clone + Send + 'static,
        R: Clone + Send + 'static,
        F: FnOnce(T, U) -> R + Send + 'static,
    {
        let (promise, future) = TaskFuture::pair(CancellationToken::new());
        let state = Arc::new(Mutex::new(CombineState {
            left: None,
            right: None,
            promise: Some(promise),
            merge: Some(f),
        }));

        let left_state = Arc::clone(&state);
        self.future
            .shared()
            .add_continuation(Box::new(move |outcome| match outcome {
                Ok(value) => {
                    left_state.lock().left = Some(value);
                    Self::try_merge(&left_state);
                }
                Err(err) => {
                    if let Some(p) = left_state.lock().promise.take() {
                        let _ = p.fail(err);
                    }
                }
            }));

        let right_state = Arc::clone(&state);
        other
            .future
            .shared()
            .add_continuation(Box::new(move |outcome| match outcome {
                Ok(value) => {
                    right_state.lock().right = Some(value);
                    Self::try_merge(&right_state);
                }
                Err(err) => {
                    if let Some(p) = right_state.lock().promise.take() {
                        let _ = p.fail(err);
                    }
                }
            }));

        ComposableFuture::from_parts(future, Arc::clone(&self.pool))
    }

    fn try_merge<U, R, F>(state: &Arc<Mutex<CombineState<T, U, R, F>>>)
    where
        U: Clone + Send + 'static,
        R: Clone + Send + 'static,
        F: FnOnce(T, U) -> R + Send + 'static,
    {
        let (left, right, promise, merge) = {
            let mut st = state.lock();
            match (st.left.take(), st.right.take()) {
                (Some(l), Some(r)) => match (st.promise.take(), st.merge.take()) {
                    (Some(p), Some(m)) => (l, r, p, m),
                    _ => return,
                },
                (l, r) => {
                    st.left = l;
                    st.right = r;
                    return;
                }
            }
        };
        match catch_unwind(AssertUnwindSafe(|| merge(left, right))) {
            Ok(merged) => {
                let _ = promise.complete(merged);
            }
            Err(payload) => {
                let _ = promise.fail(TaskError::panic(panic_message(payload.as_ref())));
            }
        }
    }

    /// Resolves once every input future is terminal.
    ///
    /// Waits for all inputs even after a failure; the result then fails
    /// with the first failure observed. An empty slice yields an
    /// already-completed future.
    pub fn all_of(pool: &Arc<WorkerPool>, futures: &[ComposableFuture<T>]) -> ComposableFuture<()> {
        if futures.is_empty() {
            return ComposableFuture::completed(pool, ());
        }
        let (promise, future) = TaskFuture::pair(CancellationToken::new());
        let remaining = Arc::new(AtomicUsize::new(futures.len()));
        let first_failure = Arc::new(Mutex::new(None::<TaskError>));
        let slot = Arc::new(Mutex::new(Some(promise)));
        for input in futures {
            let remaining = Arc::clone(&remaining);
            let first_failure = Arc::clone(&first_failure);
            let slot = Arc::clone(&slot);
            input
                .future
                .shared()
                .add_continuation(Box::new(move |outcome| {
                    if let Err(err) = outcome {
                        first_failure.lock().get_or_insert(err);
                    }
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        if let Some(p) = slot.lock().take() {
                            match first_failure.lock().take() {
                                Some(err) => {
                                    let _ = p.fail(err);
                                }
                                None => {
                                    let _ = p.complete(());
                                }
                            }
                        }
                    }
                }));
        }
        ComposableFuture::from_parts(future, Arc::clone(pool))
    }

    /// Resolves with the outcome of whichever input resolves first.
    ///
    /// # Errors (on the returned future)
    ///
    /// An empty slice yields a future failed with `InvalidConfig`.
    pub fn any_of(pool: &Arc<WorkerPool>, futures: &[ComposableFuture<T>]) -> ComposableFuture<T> {
        let (promise, future) = TaskFuture::pair(CancellationToken::new());
        if futures.is_empty() {
            let _ = promise.fail(TaskError::invalid_config(
                "futures",
                "any_of requires at least one future",
            ));
            return ComposableFuture::from_parts(future, Arc::clone(pool));
        }
        let slot = Arc::new(Mutex::new(Some(promise)));
        for input in futures {
            let slot = Arc::clone(&slot);
            input
                .future
                .shared()
                .add_continuation(Box::new(move |outcome| {
                    if let Some(p) = slot.lock().take() {
                        match outcome {
                            Ok(v) => {
                                let _ = p.complete(v);
                            }
                            Err(e) => {
                                let _ = p.fail(e);
                            }
                        }
                    }
                }));
        }
        ComposableFuture::from_parts(future, Arc::clone(pool))
    }

    /// Maps a failure back into a value; completed values pass through.
    pub fn recover<F>(&self, f: F) -> ComposableFuture<T>
    where
        F: FnOnce(TaskError) -> T + Send + 'static,
    {
        let (promise, future) = TaskFuture::pair(CancellationToken::new());
        self.future
            .shared()
            .add_continuation(Box::new(move |outcome| match outcome {
                Ok(value) => {
                    let _ = promise.complete(value);
                }
                Err(err) => match catch_unwind(AssertUnwindSafe(|| f(err))) {
                    Ok(recovered) => {
                        let _ = promise.complete(recovered);
                    }
                    Err(payload) => {
                        let _ = promise.fail(TaskError::panic(panic_message(payload.as_ref())));
                    }
                },
            }));
        ComposableFuture::from_parts(future, Arc::clone(&self.pool))
    }

    /// Applies `f` to the outcome, success or failure alike.
    pub fn handle<U, F>(&self, f: F) -> ComposableFuture<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Outcome<T>) -> Result<U> + Send + 'static,
    {
        let (promise, future) = TaskFuture::pair(CancellationToken::new());
        self.future
            .shared()
            .add_continuation(Box::new(move |outcome| {
                match catch_unwind(AssertUnwindSafe(|| f(outcome))) {
                    Ok(Ok(value)) => {
                        let _ = promise.complete(value);
                    }
                    Ok(Err(err)) => {
                        let _ = promise.fail(err);
                    }
                    Err(payload) => {
                        let _ = promise.fail(TaskError::panic(panic_message(payload.as_ref())));
                    }
                }
            }));
        ComposableFuture::from_parts(future, Arc::clone(&self.pool))
    }

    /// The underlying blocking future.
    pub fn future(&self) -> &TaskFuture<T> {
        &self.future
    }

    /// Blocks until resolved. See [`TaskFuture::get`].
    ///
    /// # Errors
    ///
    /// Propagates the stored failure or cancellation.
    pub fn get(&self) -> Result<T> {
        self.future.get()
    }

    /// Blocks up to `timeout`. See [`TaskFuture::get_timeout`].
    ///
    /// # Errors
    ///
    /// `TaskError::Timeout` if the deadline elapses first.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T> {
        self.future.get_timeout(timeout)
    }

    /// Returns the outcome if already resolved.
    pub fn try_get(&self) -> Option<Result<T>> {
        self.future.try_get()
    }

    /// Attempts to cancel. See [`TaskFuture::cancel`].
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        self.future.cancel(may_interrupt)
    }

    /// Returns `true` once resolved.
    pub fn is_done(&self) -> bool {
        self.future.is_done()
    }

    /// Returns `true` if resolved via cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.future.is_cancelled()
    }
}

impl<T: Clone + Send + 'static> std::fmt::Debug for ComposableFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposableFuture")
            .field("done", &self.is_done())
            .finish()
    }
}

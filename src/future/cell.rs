//! Single-assignment future/promise cell.
//!
//! A [`TaskFuture`] is the read side of a task's eventual outcome; the
//! producer holds the matching [`Promise`]. The cell moves through
//! `Pending -> Running -> {Completed, Failed, Cancelled}`; terminal states
//! are monotonic and never re-entered or overwritten.

use crate::core::{CancelReason, CancellationToken, Result, TaskError};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome delivered to readers and continuations.
pub type Outcome<T> = std::result::Result<T, TaskError>;

pub(crate) type Continuation<T> = Box<dyn FnOnce(Outcome<T>) + Send>;

enum State<T> {
    Pending,
    Running,
    Completed(T),
    Failed(TaskError),
    Cancelled(TaskError),
}

impl<T> State<T> {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            State::Completed(_) | State::Failed(_) | State::Cancelled(_)
        )
    }
}

struct Inner<T> {
    state: State<T>,
    // Append-only until resolution, then drained exactly once
    continuations: Vec<Continuation<T>>,
}

pub(crate) struct Shared<T> {
    inner: Mutex<Inner<T>>,
    done: Condvar,
    token: CancellationToken,
}

impl<T: Clone + Send + 'static> Shared<T> {
    fn new(token: CancellationToken) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::Pending,
                continuations: Vec::new(),
            }),
            done: Condvar::new(),
            token,
        }
    }

    fn outcome_of(state: &State<T>) -> Option<Outcome<T>> {
        match state {
            State::Pending | State::Running => None,
            State::Completed(v) => Some(Ok(v.clone())),
            State::Failed(e) => Some(Err(e.clone())),
            State::Cancelled(e) => Some(Err(e.clone())),
        }
    }

    /// Moves the cell into a terminal state and drains continuations.
    ///
    /// Returns `Err(AlreadyResolved)` when the cell already holds a value or
    /// error. Resolution racing against cancellation is benign and ignored.
    fn resolve(&self, next: State<T>) -> Result<()> {
        let drained = {
            let mut inner = self.inner.lock();
            match inner.state {
                State::Pending | State::Running => {
                    inner.state = next;
                    self.done.notify_all();
                    std::mem::take(&mut inner.continuations)
                }
                State::Cancelled(_) => return Ok(()),
                State::Completed(_) | State::Failed(_) => {
                    return Err(TaskError::AlreadyResolved)
                }
            }
        };
        if !drained.is_empty() {
            // Never invoke user continuations while holding the lock
            let outcome = self.peek_outcome().unwrap_or(Err(TaskError::other(
                "future resolved without a terminal outcome",
            )));
            for cont in drained {
                cont(outcome.clone());
            }
        }
        Ok(())
    }

    fn peek_outcome(&self) -> Option<Outcome<T>> {
        Self::outcome_of(&self.inner.lock().state)
    }

    pub(crate) fn add_continuation(&self, cont: Continuation<T>) {
        let ready = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                Self::outcome_of(&inner.state)
            } else {
                inner.continuations.push(cont);
                return;
            }
        };
        if let Some(outcome) = ready {
            cont(outcome);
        }
    }
}

/// A handle to a task's eventual outcome.
///
/// Cloneable; any number of readers may block on [`get`](Self::get) or poll
/// with [`is_done`](Self::is_done). The value type must be `Clone` so every
/// reader can observe the terminal value.
pub struct TaskFuture<T: Clone + Send + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + 'static> Clone for TaskFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> std::fmt::Debug for TaskFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskFuture")
            .field("done", &self.is_done())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl<T: Clone + Send + 'static> TaskFuture<T> {
    /// Creates a connected promise/future pair.
    ///
    /// The `token` becomes the task's cancellation token; cancelling the
    /// future with `may_interrupt` trips it.
    pub fn pair(token: CancellationToken) -> (Promise<T>, TaskFuture<T>) {
        let shared = Arc::new(Shared::new(token));
        (
            Promise {
                shared: Arc::clone(&shared),
            },
            TaskFuture { shared },
        )
    }

    pub(crate) fn shared(&self) -> &Arc<Shared<T>> {
        &self.shared
    }

    /// Blocks until the future is terminal and returns its outcome.
    ///
    /// # Errors
    ///
    /// Returns the task's failure, or `TaskError::Cancelled` if the future
    /// was cancelled.
    pub fn get(&self) -> Result<T> {
        let mut inner = self.shared.inner.lock();
        loop {
            if let Some(outcome) = Shared::outcome_of(&inner.state) {
                return outcome;
            }
            self.shared.done.wait(&mut inner);
        }
    }

    /// Blocks up to `timeout` for the outcome.
    ///
    /// A timeout leaves the future's state untouched; the task keeps
    /// running and a later [`get`](Self::get) can still succeed.
    ///
    /// # Errors
    ///
    /// `TaskError::Timeout` if the future is not terminal within `timeout`.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.inner.lock();
        loop {
            if let Some(outcome) = Shared::outcome_of(&inner.state) {
                return outcome;
            }
            if self
                .shared
                .done
                .wait_until(&mut inner, deadline)
                .timed_out()
            {
                return Err(TaskError::timeout(timeout.as_millis() as u64));
            }
        }
    }

    /// Returns the outcome if terminal, without blocking.
    pub fn try_get(&self) -> Option<Result<T>> {
        self.shared.peek_outcome()
    }

    /// Attempts to cancel the task.
    ///
    /// - Pending futures are cancelled unconditionally.
    /// - Running futures are cancelled only when `may_interrupt` is true;
    ///   the task's cancellation token is tripped so a cooperative body can
    ///   observe it and stop. The future is marked Cancelled immediately;
    ///   a late completion from the body is ignored.
    /// - Terminal futures are left untouched and `false` is returned.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        let cancelled = {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                State::Pending => true,
                State::Running => may_interrupt,
                _ => false,
            }
            .then(|| {
                inner.state = State::Cancelled(TaskError::cancelled("cancelled by caller"));
                self.shared.done.notify_all();
                std::mem::take(&mut inner.continuations)
            })
        };

        match cancelled {
            Some(drained) => {
                self.shared
                    .token
                    .cancel_with_reason(CancelReason::Manual);
                let outcome: Outcome<T> = Err(TaskError::cancelled("cancelled by caller"));
                for cont in drained {
                    cont(outcome.clone());
                }
                true
            }
            None => false,
        }
    }

    /// Returns `true` once the future holds a terminal state.
    pub fn is_done(&self) -> bool {
        self.shared.inner.lock().state.is_terminal()
    }

    /// Returns `true` if the future resolved via cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.shared.inner.lock().state, State::Cancelled(_))
    }

    /// The cancellation token observed by the task body.
    pub fn token(&self) -> &CancellationToken {
        &self.shared.token
    }
}

/// Producer side of a [`TaskFuture`].
///
/// Exactly one promise exists per future; resolving it consumes it. If a
/// promise is dropped unresolved (a worker died outside the task body), the
/// future resolves Failed with an internal-fault cause rather than hanging
/// its readers forever.
pub struct Promise<T: Clone + Send + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Marks the task Running.
    ///
    /// Returns `false` if the future was already cancelled (or otherwise
    /// resolved), in which case the body must not run.
    pub fn set_running(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        match inner.state {
            State::Pending => {
                inner.state = State::Running;
                true
            }
            _ => false,
        }
    }

    /// Resolves the future with a value.
    ///
    /// # Errors
    ///
    /// `TaskError::AlreadyResolved` if the future already completed or
    /// failed. Completion racing a cancellation is ignored.
    pub fn complete(self, value: T) -> Result<()> {
        self.shared.resolve(State::Completed(value))
    }

    /// Resolves the future with a failure.
    ///
    /// # Errors
    ///
    /// `TaskError::AlreadyResolved` if the future already completed or
    /// failed.
    pub fn fail(self, error: TaskError) -> Result<()> {
        self.shared.resolve(State::Failed(error))
    }

    /// Resolves the future as cancelled with the given reason.
    pub fn cancel(self, reason: impl Into<String>) {
        let mut inner = self.shared.inner.lock();
        if !inner.state.is_terminal() {
            inner.state = State::Cancelled(TaskError::cancelled(reason));
            self.shared.done.notify_all();
            let drained = std::mem::take(&mut inner.continuations);
            let outcome = Shared::outcome_of(&inner.state);
            drop(inner);
            if let Some(outcome) = outcome {
                for cont in drained {
                    cont(outcome.clone());
                }
            }
        }
    }

    /// The cancellation token tied to this future.
    pub fn token(&self) -> &CancellationToken {
        &self.shared.token
    }

    /// Returns `true` if the token asks the body to stop.
    pub fn is_cancelled(&self) -> bool {
        self.shared.token.is_cancelled()
    }
}

impl<T: Clone + Send + 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        // Backstop for abnormal producer death; normal resolution consumed
        // the promise already and the state below is terminal.
        let _ = self.shared.resolve(State::Failed(TaskError::other(
            "task abandoned: producer dropped without resolving",
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn pair<T: Clone + Send + 'static>() -> (Promise<T>, TaskFuture<T>) {
        TaskFuture::pair(CancellationToken::new())
    }

    #[test]
    fn test_complete_then_get() {
        let (promise, future) = pair();
        assert!(!future.is_done());

        promise.complete(42).unwrap();
        assert!(future.is_done());
        assert_eq!(future.get().unwrap(), 42);
        // Any number of readers observe the same value
        assert_eq!(future.clone().get().unwrap(), 42);
    }

    #[test]
    fn test_get_blocks_until_resolution() {
        let (promise, future) = pair();
        let waiter = {
            let future = future.clone();
            thread::spawn(move || future.get())
        };

        thread::sleep(Duration::from_millis(20));
        promise.complete("done".to_string()).unwrap();
        assert_eq!(waiter.join().unwrap().unwrap(), "done");
    }

    #[test]
    fn test_get_timeout_leaves_state_unchanged() {
        let (promise, future) = pair::<i32>();

        let err = future.get_timeout(Duration::from_millis(20)).unwrap_err();
        assert!(err.is_timeout());
        assert!(!future.is_done());

        promise.complete(7).unwrap();
        assert_eq!(future.get().unwrap(), 7);
    }

    #[test]
    fn test_fail_propagates() {
        let (promise, future) = pair::<i32>();
        promise.fail(TaskError::failure("disk on fire")).unwrap();

        let err = future.get().unwrap_err();
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn test_double_resolution_rejected() {
        let (promise, future) = pair();
        promise.complete(1).unwrap();

        // Re-resolving a completed cell is a programming error
        let err = future.shared().resolve(State::Completed(2)).unwrap_err();
        assert!(matches!(err, TaskError::AlreadyResolved));
        assert_eq!(future.get().unwrap(), 1);
    }

    #[test]
    fn test_cancel_pending() {
        let (promise, future) = pair::<i32>();

        assert!(future.cancel(false));
        assert!(future.is_cancelled());
        assert!(future.get().unwrap_err().is_cancelled());
        // Token tripped for the (never-started) body
        assert!(promise.is_cancelled());
        // Late completion from the producer is a benign race
        assert!(promise.complete(9).is_ok());
        assert!(future.is_cancelled());
    }

    #[test]
    fn test_cancel_running_requires_interrupt_flag() {
        let (promise, future) = pair::<i32>();
        assert!(promise.set_running());

        assert!(!future.cancel(false));
        assert!(!future.is_cancelled());

        assert!(future.cancel(true));
        assert!(future.is_cancelled());
        assert!(future.token().is_cancelled());
    }

    #[test]
    fn test_cancel_terminal_is_noop() {
        let (promise, future) = pair();
        promise.complete(5).unwrap();

        assert!(!future.cancel(true));
        assert_eq!(future.get().unwrap(), 5);
    }

    #[test]
    fn test_set_running_after_cancel() {
        let (promise, future) = pair::<i32>();
        future.cancel(false);
        // Body must not start once cancelled
        assert!(!promise.set_running());
    }

    #[test]
    fn test_dropped_promise_fails_future() {
        let (promise, future) = pair::<i32>();
        drop(promise);

        let err = future.get().unwrap_err();
        assert!(err.to_string().contains("abandoned"));
    }

    #[test]
    fn test_continuation_runs_on_resolution() {
        let (promise, future) = pair();
        let (observer_promise, observer) = pair::<i32>();

        future.shared().add_continuation(Box::new(move |outcome| {
            let _ = observer_promise.complete(outcome.unwrap() * 2);
        }));

        promise.complete(21).unwrap();
        assert_eq!(observer.get().unwrap(), 42);
    }

    #[test]
    fn test_continuation_after_resolution_runs_immediately() {
        let (promise, future) = pair();
        promise.complete(3).unwrap();

        let (observer_promise, observer) = pair::<i32>();
        future.shared().add_continuation(Box::new(move |outcome| {
            let _ = observer_promise.complete(outcome.unwrap() + 1);
        }));
        assert_eq!(observer.try_get().unwrap().unwrap(), 4);
    }
}

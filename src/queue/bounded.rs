//! Bounded MPMC FIFO queue with blocking put/take.
//!
//! Built on a `VecDeque` guarded by a `parking_lot::Mutex` with two condition
//! variables. Every blocking operation waits in a loop that re-checks its
//! predicate after each wakeup, so spurious wakeups and lost notifications
//! cannot occur. Unlike a channel, the queue exposes
//! [`evict_oldest`](BoundedQueue::evict_oldest), which the pool's
//! `DiscardOldest` rejection policy and immediate-shutdown drain rely on.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Error returned by put operations; carries the rejected item back so the
/// caller can retry or divert it.
pub enum PutError<T> {
    /// Queue is at capacity (try_put only)
    Full(T),
    /// Queue has been closed
    Closed(T),
    /// Timed out waiting for space
    Timeout(T),
}

impl<T> PutError<T> {
    /// Recovers the item that could not be enqueued.
    pub fn into_inner(self) -> T {
        match self {
            PutError::Full(item) | PutError::Closed(item) | PutError::Timeout(item) => item,
        }
    }
}

impl<T> fmt::Debug for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PutError::Full(_) => write!(f, "PutError::Full"),
            PutError::Closed(_) => write!(f, "PutError::Closed"),
            PutError::Timeout(_) => write!(f, "PutError::Timeout"),
        }
    }
}

impl<T> fmt::Display for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PutError::Full(_) => write!(f, "queue is full"),
            PutError::Closed(_) => write!(f, "queue is closed"),
            PutError::Timeout(_) => write!(f, "put timed out"),
        }
    }
}

/// Error returned by take operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeError {
    /// No item available right now (try_take only)
    Empty,
    /// Timed out waiting for an item
    Timeout,
    /// Queue is closed and fully drained
    Exhausted,
}

impl fmt::Display for TakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TakeError::Empty => write!(f, "queue is empty"),
            TakeError::Timeout => write!(f, "take timed out"),
            TakeError::Exhausted => write!(f, "queue is closed and drained"),
        }
    }
}

impl std::error::Error for TakeError {}

struct QueueInner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A bounded MPMC FIFO queue with blocking put/take and close semantics.
///
/// Invariant: `len() <= capacity` at every observable instant. Producers
/// block (or time out / get rejected) when full; consumers block when empty.
/// After [`close`](Self::close), puts fail immediately while takes drain the
/// remaining items and then report [`TakeError::Exhausted`].
///
/// # Example
///
/// ```rust
/// use taskforge::queue::{BoundedQueue, PutError};
///
/// let queue = BoundedQueue::new(2);
/// queue.try_put(1).unwrap();
/// queue.try_put(2).unwrap();
///
/// match queue.try_put(3) {
///     Err(PutError::Full(item)) => assert_eq!(item, 3),
///     _ => panic!("expected Full"),
/// }
/// assert_eq!(queue.take().unwrap(), 1);
/// ```
pub struct BoundedQueue<T> {
    inner: Mutex<QueueInner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
}

impl<T> BoundedQueue<T> {
    /// Creates a new bounded queue with the specified capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0. Use [`unbounded`](Self::unbounded) for a
    /// queue without a capacity limit.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        Self::with_capacity(Some(capacity))
    }

    /// Creates a queue without a capacity limit.
    ///
    /// Puts on an unbounded queue never block.
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    fn has_room(&self, inner: &QueueInner<T>) -> bool {
        match self.capacity {
            Some(cap) => inner.items.len() < cap,
            None => true,
        }
    }

    /// Enqueues an item, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`PutError::Closed`] if the queue is (or becomes) closed.
    pub fn put(&self, item: T) -> Result<(), PutError<T>> {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return Err(PutError::Closed(item));
            }
            if self.has_room(&inner) {
                inner.items.push_back(item);
                self.not_empty.notify_one();
                return Ok(());
            }
            self.not_full.wait(&mut inner);
        }
    }

    /// Enqueues an item, waiting up to `timeout` for space.
    ///
    /// # Errors
    ///
    /// - [`PutError::Timeout`] if no space opened up within the timeout
    /// - [`PutError::Closed`] if the queue is (or becomes) closed
    pub fn put_timeout(&self, item: T, timeout: Duration) -> Result<(), PutError<T>> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return Err(PutError::Closed(item));
            }
            if self.has_room(&inner) {
                inner.items.push_back(item);
                self.not_empty.notify_one();
                return Ok(());
            }
            if self.not_full.wait_until(&mut inner, deadline).timed_out() {
                return Err(PutError::Timeout(item));
            }
        }
    }

    /// Attempts to enqueue an item without blocking.
    ///
    /// # Errors
    ///
    /// - [`PutError::Full`] if the queue is at capacity
    /// - [`PutError::Closed`] if the queue has been closed
    pub fn try_put(&self, item: T) -> Result<(), PutError<T>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(PutError::Closed(item));
        }
        if !self.has_room(&inner) {
            return Err(PutError::Full(item));
        }
        inner.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeues an item, blocking while the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`TakeError::Exhausted`] once the queue is closed and every
    /// remaining item has been drained.
    pub fn take(&self) -> Result<T, TakeError> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                self.not_full.notify_one();
                return Ok(item);
            }
            if inner.closed {
                return Err(TakeError::Exhausted);
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Dequeues an item, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// - [`TakeError::Timeout`] if nothing arrived within the timeout
    /// - [`TakeError::Exhausted`] if the queue is closed and drained
    pub fn take_timeout(&self, timeout: Duration) -> Result<T, TakeError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                self.not_full.notify_one();
                return Ok(item);
            }
            if inner.closed {
                return Err(TakeError::Exhausted);
            }
            if self.not_empty.wait_until(&mut inner, deadline).timed_out() {
                return Err(TakeError::Timeout);
            }
        }
    }

    /// Attempts to dequeue an item without blocking.
    pub fn try_take(&self) -> Result<T, TakeError> {
        let mut inner = self.inner.lock();
        if let Some(item) = inner.items.pop_front() {
            self.not_full.notify_one();
            return Ok(item);
        }
        if inner.closed {
            Err(TakeError::Exhausted)
        } else {
            Err(TakeError::Empty)
        }
    }

    /// Removes and returns the oldest queued item, making room for a newer
    /// one. Returns `None` if the queue is empty.
    pub fn evict_oldest(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        let item = inner.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Closes the queue.
    ///
    /// Blocked and future puts fail with [`PutError::Closed`]; takes continue
    /// to drain remaining items and then report [`TakeError::Exhausted`].
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        // Wake every waiter so all of them re-check the closed flag
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Returns `true` if the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Returns the current number of queued items.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Returns `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the capacity, or `None` for an unbounded queue.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

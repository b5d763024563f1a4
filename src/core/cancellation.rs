//! Cooperative cancellation for task bodies
//!
//! The runtime never preempts a running task. Instead, every submitted task
//! receives a [`CancellationToken`]; long-running bodies poll it at safe
//! points (or call [`CancellationToken::check`] with `?`) and return early
//! once it trips. Tokens form a hierarchy: the pool owns a root token and
//! every task token is a child of it, so immediate shutdown cancels all
//! in-flight work with a single call.

use crate::core::{Result, TaskError};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Reason a token was cancelled
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// Explicitly cancelled by the caller
    Manual,
    /// Cancelled because the parent token was cancelled
    ParentCancelled,
    /// Cancelled because the owning pool shut down
    PoolShutdown,
    /// Custom cancellation reason
    Custom(String),
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Manual => write!(f, "manually cancelled"),
            CancelReason::ParentCancelled => write!(f, "parent was cancelled"),
            CancelReason::PoolShutdown => write!(f, "pool shut down"),
            CancelReason::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

struct TokenInner {
    cancelled: AtomicBool,
    // Weak references so a dropped child never keeps the tree alive
    children: RwLock<Vec<Weak<TokenInner>>>,
    reason: RwLock<Option<CancelReason>>,
}

/// A thread-safe cancellation token shared between a task and its caller
///
/// Cancellation is cooperative: the runtime sets the token, the task body
/// polls it. Cancelling a token cancels all of its children; cancelling a
/// child leaves the parent untouched.
///
/// # Example
///
/// ```rust
/// use taskforge::CancellationToken;
///
/// let parent = CancellationToken::new();
/// let child = parent.child();
///
/// parent.cancel();
/// assert!(child.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

impl CancellationToken {
    /// Create a new token (not cancelled)
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                children: RwLock::new(Vec::new()),
                reason: RwLock::new(None),
            }),
        }
    }

    /// Creates a child token linked to this parent
    ///
    /// The child is cancelled when the parent is cancelled. If the parent is
    /// already cancelled, the child is created in the cancelled state.
    pub fn child(&self) -> Self {
        let child = CancellationToken::new();
        self.inner
            .children
            .write()
            .push(Arc::downgrade(&child.inner));
        if self.is_cancelled() {
            child.cancel_with_reason(CancelReason::ParentCancelled);
        }
        child
    }

    /// Cancel this token with the default reason
    ///
    /// Idempotent; only the first call records a reason.
    pub fn cancel(&self) {
        self.cancel_with_reason(CancelReason::Manual);
    }

    /// Cancel this token and all child tokens with a specific reason
    pub fn cancel_with_reason(&self, reason: CancelReason) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.inner.reason.write() = Some(reason);

        let children = self.inner.children.read();
        for weak in children.iter() {
            if let Some(inner) = weak.upgrade() {
                CancellationToken { inner }.cancel_with_reason(CancelReason::ParentCancelled);
            }
        }
    }

    /// Check if this token has been cancelled
    ///
    /// Lock-free; suitable for polling in hot loops.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Returns the cancellation reason, or `None` if not cancelled
    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.reason.read().clone()
    }

    /// Returns `Err(TaskError::Cancelled)` if cancelled, `Ok(())` otherwise
    ///
    /// Convenience for ergonomic early returns with `?` inside task bodies:
    ///
    /// ```rust
    /// use taskforge::{CancellationToken, Result};
    ///
    /// fn process(token: &CancellationToken) -> Result<()> {
    ///     for _chunk in 0..100 {
    ///         token.check()?;
    ///         // do work...
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            let reason = self
                .reason()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            Err(TaskError::cancelled(reason))
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_token_starts_clear() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancel_with_reason(CancelReason::Custom("ignored".to_string()));

        assert!(token.is_cancelled());
        // First reason wins
        assert_eq!(token.reason(), Some(CancelReason::Manual));
    }

    #[test]
    fn test_clone_shares_state() {
        let token = CancellationToken::new();
        let clone = token.clone();

        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_child_cancelled_with_parent() {
        let parent = CancellationToken::new();
        let child1 = parent.child();
        let child2 = parent.child();
        let grandchild = child1.child();

        parent.cancel();

        assert!(child1.is_cancelled());
        assert!(child2.is_cancelled());
        assert!(grandchild.is_cancelled());
        assert_eq!(child1.reason(), Some(CancelReason::ParentCancelled));
    }

    #[test]
    fn test_child_cancel_leaves_parent() {
        let parent = CancellationToken::new();
        let child = parent.child();

        child.cancel();

        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_child_of_cancelled_parent() {
        let parent = CancellationToken::new();
        parent.cancel_with_reason(CancelReason::PoolShutdown);

        let child = parent.child();
        assert!(child.is_cancelled());
        assert_eq!(child.reason(), Some(CancelReason::ParentCancelled));
    }

    #[test]
    fn test_check_carries_reason() {
        let token = CancellationToken::new();
        token.cancel_with_reason(CancelReason::Custom("deadline passed".to_string()));

        let err = token.check().unwrap_err();
        assert!(err.to_string().contains("deadline passed"));
    }

    #[test]
    fn test_cross_thread_observation() {
        let token = CancellationToken::new();
        let observer = token.clone();

        let handle = thread::spawn(move || {
            for _ in 0..100 {
                if observer.is_cancelled() {
                    return true;
                }
                thread::sleep(Duration::from_millis(5));
            }
            false
        });

        thread::sleep(Duration::from_millis(50));
        token.cancel();
        assert!(handle.join().unwrap());
    }
}

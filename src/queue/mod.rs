//! Blocking queue used for producer/worker handoff.
//!
//! [`BoundedQueue`] mediates between submitting threads and worker threads:
//! producers block (or are rejected, per pool policy) when it is full and
//! consumers block when it is empty.

mod bounded;

pub use bounded::{BoundedQueue, PutError, TakeError};

//! Future and promise primitives for observing task outcomes

pub mod cell;
pub mod composable;

pub use cell::{Outcome, Promise, TaskFuture};
pub use composable::ComposableFuture;

//! Divide-and-conquer task trait.

use crate::core::Result;

/// A problem that can be recursively split until small enough to solve
/// directly.
///
/// The scheduler splits any task whose [`len`](Self::len) exceeds the
/// invocation threshold, runs one half itself and forks the other, then
/// merges the two partial outputs. Side-effecting workloads can use
/// `Output = ()`.
///
/// # Example
///
/// ```
/// use taskforge::prelude::*;
/// use std::sync::Arc;
///
/// struct SumRange {
///     values: Arc<Vec<i64>>,
///     lo: usize,
///     hi: usize,
/// }
///
/// impl RecursiveTask for SumRange {
///     type Output = i64;
///
///     fn len(&self) -> usize {
///         self.hi - self.lo
///     }
///
///     fn split(self) -> (Self, Self) {
///         let mid = self.lo + (self.hi - self.lo) / 2;
///         (
///             SumRange { values: Arc::clone(&self.values), lo: self.lo, hi: mid },
///             SumRange { values: self.values, lo: mid, hi: self.hi },
///         )
///     }
///
///     fn compute(self) -> Result<i64> {
///         Ok(self.values[self.lo..self.hi].iter().sum())
///     }
///
///     fn merge(left: i64, right: i64) -> i64 {
///         left + right
///     }
/// }
///
/// # fn main() -> Result<()> {
/// let pool = ForkJoinPool::new(4)?;
/// let values = Arc::new((1..=1000).collect::<Vec<i64>>());
/// let task = SumRange { values, lo: 0, hi: 1000 };
/// assert_eq!(pool.invoke(task, 64)?, 500_500);
/// # Ok(())
/// # }
/// ```
pub trait RecursiveTask: Send + Sized + 'static {
    /// Result produced by this task.
    type Output: Send + 'static;

    /// Size of the remaining problem, in whatever unit the threshold is
    /// expressed in.
    fn len(&self) -> usize;

    /// Whether the problem is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split the problem into two roughly equal halves.
    ///
    /// Called only when `len()` exceeds the threshold.
    fn split(self) -> (Self, Self);

    /// Solve the problem directly, without further splitting.
    ///
    /// # Errors
    ///
    /// A failure in any subtask aborts the whole invocation.
    fn compute(self) -> Result<Self::Output>;

    /// Merge the outputs of the two halves produced by `split`.
    fn merge(left: Self::Output, right: Self::Output) -> Self::Output;
}

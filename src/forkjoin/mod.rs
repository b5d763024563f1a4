//! Fork/join execution of divide-and-conquer workloads

mod pool;
pub mod task;

pub use pool::ForkJoinPool;
pub use task::RecursiveTask;

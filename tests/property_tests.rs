//! Property-based tests for taskforge using proptest

use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use taskforge::prelude::*;

// ============================================================================
// Configuration properties
// ============================================================================

proptest! {
    /// Any core size with max >= core validates
    #[test]
    fn test_config_valid_sizes(core in 1usize..16, extra in 0usize..16) {
        let config = PoolConfig::new(core).with_max_size(core + extra);
        prop_assert!(config.validate().is_ok());
    }

    /// max below core never validates
    #[test]
    fn test_config_max_below_core(core in 2usize..16) {
        let config = PoolConfig::new(core).with_max_size(core - 1);
        prop_assert!(config.validate().is_err());
    }

    /// Thread name prefixes survive the builder unchanged
    #[test]
    fn test_config_prefix(prefix in "[a-z]{3,12}") {
        let config = PoolConfig::new(2).with_thread_name_prefix(&prefix);
        prop_assert_eq!(config.thread_name_prefix, prefix);
    }
}

// ============================================================================
// Queue properties
// ============================================================================

proptest! {
    /// FIFO order holds for any sequence of values
    #[test]
    fn test_queue_fifo(values in prop::collection::vec(any::<u32>(), 1..64)) {
        let queue = BoundedQueue::new(values.len());
        for v in &values {
            prop_assert!(queue.try_put(*v).is_ok());
        }
        for v in &values {
            prop_assert_eq!(queue.try_take().unwrap(), *v);
        }
    }

    /// A full queue rejects exactly the overflow item, returning it intact
    #[test]
    fn test_queue_capacity_respected(capacity in 1usize..32, overflow in any::<u64>()) {
        let queue = BoundedQueue::new(capacity);
        for i in 0..capacity {
            prop_assert!(queue.try_put(i as u64).is_ok());
        }
        match queue.try_put(overflow) {
            Err(PutError::Full(v)) => prop_assert_eq!(v, overflow),
            other => prop_assert!(false, "expected Full, got {:?}", other.is_ok()),
        }
        prop_assert_eq!(queue.len(), capacity);
    }

    /// Evicting the oldest always yields the first unfetched item
    #[test]
    fn test_queue_evict_oldest(values in prop::collection::vec(any::<i32>(), 2..32)) {
        let queue = BoundedQueue::unbounded();
        for v in &values {
            prop_assert!(queue.try_put(*v).is_ok());
        }
        prop_assert_eq!(queue.evict_oldest(), Some(values[0]));
        prop_assert_eq!(queue.try_take().unwrap(), values[1]);
    }
}

#[test]
fn test_blocked_put_completes_after_take() {
    let queue = Arc::new(BoundedQueue::new(1));
    queue.try_put(1u32).unwrap();

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.put(2u32))
    };
    thread::sleep(Duration::from_millis(30));
    assert_eq!(queue.try_take().unwrap(), 1);

    producer.join().unwrap().expect("blocked put must complete");
    assert_eq!(queue.try_take().unwrap(), 2);
}

// ============================================================================
// Pool properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Every submitted increment arrives exactly once, for any task count
    #[test]
    fn test_all_submissions_execute(n in 1usize..200, workers in 1usize..5) {
        let pool = WorkerPool::new(PoolConfig::new(workers)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..n {
            let counter = Arc::clone(&counter);
            pool.execute(move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }).unwrap();
        }
        pool.shutdown().unwrap();
        prop_assert_eq!(counter.load(Ordering::Relaxed), n);
    }

    /// Futures observe exactly the submitted value
    #[test]
    fn test_future_round_trips_value(value in any::<i64>()) {
        let pool = WorkerPool::new(PoolConfig::new(2)).unwrap();
        let future = pool.submit(move || Ok(value)).unwrap();
        prop_assert_eq!(future.get().unwrap(), value);
        pool.shutdown().unwrap();
    }
}

// ============================================================================
// Fork/join properties
// ============================================================================

struct SumRange {
    lo: u64,
    hi: u64, // exclusive
}

impl RecursiveTask for SumRange {
    type Output = u64;

    fn len(&self) -> usize {
        (self.hi - self.lo) as usize
    }

    fn split(self) -> (Self, Self) {
        let mid = self.lo + (self.hi - self.lo) / 2;
        (
            SumRange {
                lo: self.lo,
                hi: mid,
            },
            SumRange {
                lo: mid,
                hi: self.hi,
            },
        )
    }

    fn compute(self) -> Result<u64> {
        Ok((self.lo..self.hi).sum())
    }

    fn merge(left: u64, right: u64) -> u64 {
        left + right
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Parallel sum equals the closed form for any size and threshold
    #[test]
    fn test_forkjoin_sum_invariant(n in 1u64..5_000, threshold in 1usize..256, workers in 1usize..5) {
        let pool = ForkJoinPool::new(workers).unwrap();
        let result = pool.invoke(SumRange { lo: 1, hi: n + 1 }, threshold).unwrap();
        prop_assert_eq!(result, n * (n + 1) / 2);
        pool.shutdown();
    }
}

//! Comprehensive tests for task cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use taskforge::prelude::*;

#[test]
fn test_cancel_queued_task_never_runs() {
    let pool = WorkerPool::new(PoolConfig::new(1)).expect("Failed to create pool");

    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    pool.execute(move |_| {
        let _ = gate_rx.recv_timeout(Duration::from_secs(5));
        Ok(())
    })
    .expect("Failed to submit blocker");
    thread::sleep(Duration::from_millis(50));

    let executed = Arc::new(AtomicBool::new(false));
    let executed_clone = Arc::clone(&executed);
    let future = pool
        .submit(move || {
            executed_clone.store(true, Ordering::SeqCst);
            Ok(())
        })
        .expect("Failed to submit");

    // Still queued behind the blocker; plain cancel is enough
    assert!(future.cancel(false));
    assert!(future.is_cancelled());

    gate_tx.send(()).unwrap();
    pool.shutdown().expect("Failed to shutdown");

    assert!(!executed.load(Ordering::SeqCst), "cancelled task must not run");
    assert!(future.get().unwrap_err().is_cancelled());
}

#[test]
fn test_cancel_running_task_cooperatively() {
    let pool = WorkerPool::new(PoolConfig::new(2)).expect("Failed to create pool");

    let started = Arc::new(AtomicBool::new(false));
    let observed = Arc::new(AtomicBool::new(false));
    let started_clone = Arc::clone(&started);
    let observed_clone = Arc::clone(&observed);

    let future = pool
        .submit_cancellable(move |token| {
            started_clone.store(true, Ordering::SeqCst);
            for _ in 0..100 {
                if token.is_cancelled() {
                    observed_clone.store(true, Ordering::SeqCst);
                    return Err(TaskError::cancelled("stopped at checkpoint"));
                }
                thread::sleep(Duration::from_millis(10));
            }
            Ok(())
        })
        .expect("Failed to submit");

    // Wait for the body to start
    while !started.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(5));
    }

    // Non-interrupting cancel leaves a running task alone
    assert!(!future.cancel(false));
    assert!(!future.is_cancelled());

    // Interrupting cancel trips the token
    assert!(future.cancel(true));
    assert!(future.is_cancelled());

    pool.shutdown().expect("Failed to shutdown");
    assert!(observed.load(Ordering::SeqCst), "body must see the token trip");
}

#[test]
fn test_cancel_completed_task_is_noop() {
    let pool = WorkerPool::new(PoolConfig::new(1)).expect("Failed to create pool");
    let future = pool.submit(|| Ok(5)).expect("Failed to submit");
    assert_eq!(future.get().unwrap(), 5);

    assert!(!future.cancel(true));
    assert!(!future.is_cancelled());
    assert_eq!(future.get().unwrap(), 5);
    pool.shutdown().expect("Failed to shutdown");
}

#[test]
fn test_token_check_shortcut() {
    let token = CancellationToken::new();
    assert!(token.check().is_ok());

    token.cancel();
    let err = token.check().unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn test_token_hierarchy_cascades() {
    let parent = CancellationToken::new();
    let child = parent.child();
    let grandchild = child.child();

    parent.cancel();
    assert!(child.is_cancelled());
    assert!(grandchild.is_cancelled());
}

#[test]
fn test_child_cancel_does_not_affect_parent() {
    let parent = CancellationToken::new();
    let child = parent.child();

    child.cancel();
    assert!(child.is_cancelled());
    assert!(!parent.is_cancelled());
}

#[test]
fn test_shutdown_now_cancels_pool_token() {
    let pool = WorkerPool::new(PoolConfig::new(1)).expect("Failed to create pool");

    let observed = Arc::new(AtomicBool::new(false));
    let observed_clone = Arc::clone(&observed);
    let future = pool
        .submit_cancellable(move |token| {
            for _ in 0..500 {
                if token.is_cancelled() {
                    observed_clone.store(true, Ordering::SeqCst);
                    return Err(TaskError::cancelled("pool shutdown"));
                }
                thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        })
        .expect("Failed to submit");
    thread::sleep(Duration::from_millis(50));

    let discarded = pool.shutdown_now();
    assert!(discarded.is_empty(), "the only task was already running");
    assert!(observed.load(Ordering::SeqCst));
    assert!(future.get().unwrap_err().is_cancelled());
}

#[test]
fn test_cancelled_timer_task_skipped() {
    let pool = Arc::new(WorkerPool::new(PoolConfig::new(1)).expect("Failed to create pool"));
    let timer = ScheduledTimer::new(Arc::clone(&pool)).expect("Failed to create timer");

    let fired = Arc::new(AtomicBool::new(false));
    let fired_clone = Arc::clone(&fired);
    let handle = timer
        .schedule(Duration::from_millis(80), move |_| {
            fired_clone.store(true, Ordering::SeqCst);
            Ok(())
        })
        .expect("Failed to schedule");

    assert!(handle.cancel());
    thread::sleep(Duration::from_millis(200));
    assert!(!fired.load(Ordering::SeqCst));

    timer.shutdown();
    pool.shutdown().expect("Failed to shutdown");
}

//! Integration tests for the worker pool and host loop working together.

use core_async::sync::oneshot;
use core_async::{HostLoop, WorkerPool};
use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn test_blocking_job_result_is_delivered_on_host_thread() {
    let pool = WorkerPool::new(2).unwrap();
    let mut host = HostLoop::new(RefCell::new(Vec::<thread::ThreadId>::new()));
    let sender = host.sender();
    let (tx, rx) = oneshot::channel();

    pool.spawn_blocking(move || {
        let worker = thread::current().id();
        sender.post(move |seen: &RefCell<Vec<thread::ThreadId>>| {
            seen.borrow_mut().push(thread::current().id());
            let _ = tx.send(worker);
        });
    });

    let worker = host.block_on(rx).unwrap().unwrap();
    let seen = host.context().borrow();
    assert_eq!(seen.as_slice(), &[host.host_thread()]);
    assert_ne!(worker, host.host_thread());
}

#[test]
fn test_pool_never_exceeds_its_size() {
    let pool = WorkerPool::new(2).unwrap();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.spawn_blocking(move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                running.fetch_sub(1, Ordering::SeqCst);
            })
        })
        .collect();

    core_async::runtime::block_on(futures::future::join_all(handles)).unwrap();
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(pool.in_flight(), 0);
}

#[test]
fn test_independent_jobs_settle_in_completion_order() {
    let pool = WorkerPool::new(2).unwrap();
    let mut host = HostLoop::new(RefCell::new(Vec::new()));
    let gate = Arc::new(Barrier::new(2));
    let (slow_tx, slow_rx) = oneshot::channel();
    let (fast_tx, fast_rx) = oneshot::channel();

    let slow_sender = host.sender();
    let slow_gate = Arc::clone(&gate);
    pool.spawn_blocking(move || {
        slow_gate.wait();
        slow_sender.post(move |order: &RefCell<Vec<&'static str>>| {
            order.borrow_mut().push("slow");
            let _ = slow_tx.send(());
        });
    });

    let fast_sender = host.sender();
    pool.spawn_blocking(move || {
        fast_sender.post(move |order: &RefCell<Vec<&'static str>>| {
            order.borrow_mut().push("fast");
            let _ = fast_tx.send(());
        });
    });

    host.block_on(fast_rx).unwrap().unwrap();
    gate.wait();
    host.block_on(slow_rx).unwrap().unwrap();

    assert_eq!(*host.context().borrow(), vec!["fast", "slow"]);
}

#[test]
fn test_drive_returns_when_future_is_ready() {
    let mut host = HostLoop::new(Cell::new(0u32));
    let sender = host.sender();
    sender.post(|count: &Cell<u32>| count.set(count.get() + 1));

    let value = host.block_on(async { 7 }).unwrap();

    assert_eq!(value, 7);
    // The ready future wins over queued work.
    assert_eq!(host.context().get(), 0);
    assert_eq!(host.run_until_idle(), 1);
    assert_eq!(host.context().get(), 1);
}

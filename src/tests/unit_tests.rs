use std::sync::atomic::Ordering::Relaxed;
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::pin::pin;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::wait_queue::{WaitQueue, Waiter};
use crate::{Config, DefaultConfig, Error, Lock, Policy};

/// Waits until the expected number of threads are linked in the wait queue.
fn wait_for_queue_len<C: Config>(lock: &Lock<C>, expected: usize) {
    while lock.queue_len() != expected {
        thread::yield_now();
    }
}

fn mutual_exclusion(policy: Policy) {
    let num_threads = if cfg!(miri) { 4 } else { 16 };
    let num_iters = if cfg!(miri) { 16 } else { 256 };

    let lock = Arc::new(Lock::new(policy));
    let check = Arc::new(AtomicUsize::new(0));
    let counter = Arc::new(AtomicUsize::new(0));

    let mut threads = Vec::new();
    for _ in 0..num_threads {
        let lock = lock.clone();
        let check = check.clone();
        let counter = counter.clone();
        threads.push(thread::spawn(move || {
            for j in 0..num_iters {
                lock.lock();
                if j % 11 == 0 {
                    lock.lock();
                    assert_eq!(lock.hold_count(), 2);
                    assert!(lock.unlock().is_ok());
                }
                assert_eq!(check.fetch_add(1, Relaxed), 0);
                let value = counter.load(Relaxed);
                if j % 7 == 0 {
                    thread::yield_now();
                }
                counter.store(value + 1, Relaxed);
                check.fetch_sub(1, Relaxed);
                assert!(lock.unlock().is_ok());
            }
        }));
    }

    for thread in threads {
        thread.join().unwrap();
    }
    assert_eq!(counter.load(Relaxed), num_threads * num_iters);
    assert!(!lock.is_locked());
    assert!(!lock.has_queued_threads());
    assert_eq!(lock.queue_len(), 0);
}

#[test]
fn lock_non_fair() {
    mutual_exclusion(Policy::NonFair);
}

#[test]
fn lock_fair() {
    mutual_exclusion(Policy::Fair);
}

#[test]
fn reentrancy() {
    let lock = Arc::new(Lock::default());
    let acquired = Arc::new(AtomicBool::new(false));

    lock.lock();
    lock.lock();
    lock.lock();
    assert_eq!(lock.hold_count(), 3);

    let lock_clone = lock.clone();
    let acquired_clone = acquired.clone();
    let thread = thread::spawn(move || {
        lock_clone.lock();
        assert_eq!(lock_clone.hold_count(), 1);
        assert!(!lock_clone.has_queued_threads());
        assert_eq!(lock_clone.queue_len(), 0);
        acquired_clone.store(true, Relaxed);
        assert!(lock_clone.unlock().is_ok());
    });
    wait_for_queue_len(&*lock, 1);

    for remaining in (1..3).rev() {
        assert!(lock.unlock().is_ok());
        assert_eq!(lock.hold_count(), remaining);
        thread::sleep(Duration::from_millis(1));
        assert!(!acquired.load(Relaxed));
    }

    assert!(lock.unlock().is_ok());
    assert_eq!(lock.hold_count(), 0);
    thread.join().unwrap();
    assert!(acquired.load(Relaxed));
}

#[test]
fn wait_queue() {
    let queue = WaitQueue::new();
    assert!(queue.is_empty());
    assert!(!queue.has_predecessor(None));
    assert!(!queue.signal_head::<DefaultConfig>());

    let first = pin!(Waiter::new());
    let first = first.into_ref();
    let second = pin!(Waiter::new());
    let second = second.into_ref();

    queue.enqueue(first);
    queue.enqueue(second);
    assert!(queue.has_predecessor(None));
    assert!(!queue.has_predecessor(Some(first.get_ref())));
    assert!(queue.has_predecessor(Some(second.get_ref())));
    assert_eq!(queue.len::<DefaultConfig>(), 2);

    // A signal set before waiting is consumed without parking.
    assert!(queue.signal_head::<DefaultConfig>());
    first.get_ref().wait();

    queue.dequeue::<DefaultConfig>(first.get_ref());
    assert!(!queue.has_predecessor(Some(second.get_ref())));
    assert_eq!(queue.len::<DefaultConfig>(), 1);

    assert!(queue.signal_head::<DefaultConfig>());
    second.get_ref().wait();

    queue.dequeue::<DefaultConfig>(second.get_ref());
    assert!(queue.is_empty());
    assert!(!queue.has_predecessor(None));
    assert_eq!(queue.len::<DefaultConfig>(), 0);
}

#[test]
fn fair_arrival_order() {
    let num_threads = if cfg!(miri) { 4 } else { 16 };

    let lock = Arc::new(Lock::fair());
    let order = Arc::new(Mutex::new(Vec::new()));

    lock.lock();

    let mut threads = Vec::new();
    for i in 0..num_threads {
        let lock_clone = lock.clone();
        let order = order.clone();
        threads.push(thread::spawn(move || {
            lock_clone.lock();
            order.lock().unwrap().push(i);
            assert!(lock_clone.unlock().is_ok());
        }));
        wait_for_queue_len(&*lock, i + 1);
    }
    assert!(lock.has_queued_threads());

    assert!(lock.unlock().is_ok());
    for thread in threads {
        thread.join().unwrap();
    }
    assert_eq!(*order.lock().unwrap(), (0..num_threads).collect::<Vec<_>>());
}

#[test]
fn fair_no_barging() {
    let lock = Arc::new(Lock::fair());
    let order = Arc::new(Mutex::new(Vec::new()));

    lock.lock();

    let lock_clone = lock.clone();
    let order_clone = order.clone();
    let thread = thread::spawn(move || {
        lock_clone.lock();
        order_clone.lock().unwrap().push("waiter");
        assert!(lock_clone.unlock().is_ok());
    });
    wait_for_queue_len(&*lock, 1);

    assert!(lock.unlock().is_ok());
    lock.lock();
    order.lock().unwrap().push("arrival");
    assert!(lock.unlock().is_ok());

    thread.join().unwrap();
    assert_eq!(*order.lock().unwrap(), ["waiter", "arrival"]);
}

#[test]
fn spurious_unpark() {
    let lock = Arc::new(Lock::default());
    let acquired = Arc::new(AtomicBool::new(false));

    lock.lock();

    let lock_clone = lock.clone();
    let acquired_clone = acquired.clone();
    let thread = thread::spawn(move || {
        lock_clone.lock();
        acquired_clone.store(true, Relaxed);
        assert!(lock_clone.unlock().is_ok());
    });
    wait_for_queue_len(&*lock, 1);

    for _ in 0..16 {
        thread.thread().unpark();
        thread::sleep(Duration::from_micros(10));
    }
    assert!(!acquired.load(Relaxed));
    assert_eq!(lock.queue_len(), 1);

    assert!(lock.unlock().is_ok());
    thread.join().unwrap();
    assert!(acquired.load(Relaxed));
}

#[test]
fn illegal_release() {
    let lock = Arc::new(Lock::default());
    assert_eq!(lock.unlock(), Err(Error::IllegalMonitorState));

    lock.lock();

    let lock_clone = lock.clone();
    let result = thread::spawn(move || lock_clone.unlock()).join().unwrap();
    assert_eq!(result, Err(Error::IllegalMonitorState));
    assert!(lock.is_held_by_current_thread());
    assert_eq!(lock.hold_count(), 1);

    assert!(lock.unlock().is_ok());
    assert_eq!(lock.unlock(), Err(Error::IllegalMonitorState));
    assert_eq!(
        Error::IllegalMonitorState.to_string(),
        "illegal monitor state: the current thread does not hold the lock"
    );
}

#[test]
fn guard() {
    let lock = Lock::fair();
    {
        let guard = lock.guard();
        assert!(guard.lock().is_held_by_current_thread());
        let formatted = format!("{guard:?}");
        assert!(formatted.contains("Fair"));
        assert!(formatted.contains("hold_count: 1"));

        let _inner = lock.guard();
        assert_eq!(lock.hold_count(), 2);
    }
    assert!(!lock.is_locked());
    assert_eq!(lock.hold_count(), 0);
}

#[test]
fn construct() {
    assert_eq!(Lock::default().policy(), Policy::NonFair);
    assert_eq!(Lock::from(false).policy(), Policy::NonFair);
    assert_eq!(Lock::from(true).policy(), Policy::Fair);
    assert_eq!(Lock::from(Policy::Fair).policy(), Policy::Fair);
    assert!(Lock::fair().is_fair());
    assert!(!Lock::new(Policy::NonFair).is_fair());
}

#[test]
fn config() {
    #[derive(Debug, Default)]
    struct NoSpin;

    impl Config for NoSpin {
        fn spin_count() -> usize {
            0
        }
    }

    let num_threads = if cfg!(miri) { 2 } else { 8 };
    let num_iters = if cfg!(miri) { 16 } else { 128 };

    let lock: Arc<Lock<NoSpin>> = Arc::new(Lock::with_config(Policy::Fair));
    let counter = Arc::new(AtomicUsize::new(0));

    let mut threads = Vec::new();
    for _ in 0..num_threads {
        let lock = lock.clone();
        let counter = counter.clone();
        threads.push(thread::spawn(move || {
            for _ in 0..num_iters {
                let _guard = lock.guard();
                let value = counter.load(Relaxed);
                counter.store(value + 1, Relaxed);
            }
        }));
    }

    for thread in threads {
        thread.join().unwrap();
    }
    assert_eq!(counter.load(Relaxed), num_threads * num_iters);
}

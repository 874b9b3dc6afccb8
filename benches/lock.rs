use std::sync::Arc;
use std::thread;

use criterion::{Criterion, criterion_group, criterion_main};
use relock::{Lock, Policy};

fn lock_unlock(c: &mut Criterion) {
    c.bench_function("lock-unlock", |b| {
        let lock = Lock::default();
        b.iter(|| {
            lock.lock();
            assert!(lock.unlock().is_ok());
        });
    });
}

fn reentrant_lock_unlock(c: &mut Criterion) {
    c.bench_function("lock-lock-unlock-unlock", |b| {
        let lock = Lock::default();
        b.iter(|| {
            lock.lock();
            lock.lock();
            assert!(lock.unlock().is_ok());
            assert!(lock.unlock().is_ok());
        });
    });
}

fn contended(c: &mut Criterion, policy: Policy, name: &str) {
    let num_threads = 4;
    let num_iters = 256;
    c.bench_function(name, |b| {
        b.iter(|| {
            let lock = Arc::new(Lock::new(policy));
            let threads: Vec<_> = (0..num_threads)
                .map(|_| {
                    let lock = lock.clone();
                    thread::spawn(move || {
                        for _ in 0..num_iters {
                            let _guard = lock.guard();
                        }
                    })
                })
                .collect();
            for thread in threads {
                thread.join().unwrap();
            }
        });
    });
}

fn contended_non_fair(c: &mut Criterion) {
    contended(c, Policy::NonFair, "contended-non-fair");
}

fn contended_fair(c: &mut Criterion) {
    contended(c, Policy::Fair, "contended-fair");
}

criterion_group!(
    lock,
    lock_unlock,
    reentrant_lock_unlock,
    contended_non_fair,
    contended_fair
);
criterion_main!(lock);

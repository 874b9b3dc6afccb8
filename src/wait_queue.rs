//! Wait queue implementation.

use std::marker::PhantomPinned;
use std::pin::Pin;
use std::ptr::{from_ref, null_mut};
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};
#[cfg(not(feature = "loom"))]
use std::sync::atomic::{AtomicBool, AtomicPtr};
#[cfg(not(feature = "loom"))]
use std::thread::{Thread, current, park};

#[cfg(feature = "loom")]
use loom::sync::atomic::{AtomicBool, AtomicPtr};
#[cfg(feature = "loom")]
use loom::thread::{Thread, current, park};

use crate::config::Config;

/// Heap-free intrusive FIFO of threads blocked on a lock.
///
/// [`Waiter`] entries are pushed at the tail without any locking, and each entry links itself to
/// the one pushed right before it. Only the head entry leaves the queue, and only after its thread
/// acquired the lock. Removing the head and signalling the head are serialized through the
/// `processing` flag, so a signalling thread never touches an entry that already left the queue.
pub(crate) struct WaitQueue {
    /// The oldest entry, or null while the queue is empty or the first entry is being linked.
    head: AtomicPtr<Waiter>,
    /// The newest entry.
    tail: AtomicPtr<Waiter>,
    /// Set while a thread is removing or signalling the head.
    processing: AtomicBool,
}

/// Wait queue entry.
///
/// The entry lives on the stack of the blocked thread, and it must stay pinned until it has been
/// dequeued.
pub(crate) struct Waiter {
    /// Points to the entry that was pushed right after this entry.
    next: AtomicPtr<Waiter>,
    /// Set when the thread is supposed to retry acquiring the lock.
    signaled: AtomicBool,
    /// The blocked thread.
    thread: Thread,
    /// [`Waiter`] forms an intrusive linked list.
    _pinned: PhantomPinned,
}

impl WaitQueue {
    /// Creates an empty [`WaitQueue`].
    pub(crate) fn new() -> Self {
        Self {
            head: AtomicPtr::new(null_mut()),
            tail: AtomicPtr::new(null_mut()),
            processing: AtomicBool::new(false),
        }
    }

    /// Appends the entry at the tail.
    ///
    /// The caller must re-check the lock state after this returns, since the owner may have
    /// released the lock before it could see the entry.
    pub(crate) fn enqueue(&self, waiter: Pin<&Waiter>) {
        let waiter_ptr = Waiter::ref_to_ptr(waiter.get_ref());
        let prev_ptr = self.tail.swap(waiter_ptr, AcqRel);
        // `prev` cannot leave the queue until this link is set, because its thread waits for the
        // link before removing it.
        if let Some(prev) = unsafe { prev_ptr.as_ref() } {
            prev.next.store(waiter_ptr, Release);
        } else {
            self.head.store(waiter_ptr, Release);
        }
    }

    /// Removes the entry from the queue.
    ///
    /// The entry must be the head, and its thread must hold the lock.
    pub(crate) fn dequeue<C: Config>(&self, waiter: &Waiter) {
        let waiter_ptr = Waiter::ref_to_ptr(waiter);
        self.process::<C, _, _>(|| {
            debug_assert_eq!(self.head.load(Relaxed), waiter_ptr);

            let mut next_ptr = waiter.next.load(Acquire);
            if next_ptr.is_null() {
                self.head.store(null_mut(), Release);
                if self
                    .tail
                    .compare_exchange(waiter_ptr, null_mut(), AcqRel, Relaxed)
                    .is_ok()
                {
                    return;
                }

                // Another thread took the tail and is about to link itself.
                let mut spin = 0;
                loop {
                    next_ptr = waiter.next.load(Acquire);
                    if !next_ptr.is_null() {
                        break;
                    }
                    C::backoff(spin);
                    spin += 1;
                }
            }
            self.head.store(next_ptr, Release);
        });
    }

    /// Returns `true` if another thread entered the queue before the caller.
    ///
    /// A caller that is not queued yet regards any queued entry as a predecessor, including one
    /// that is still being linked. A queued caller has no predecessor exactly when its entry is the
    /// head.
    #[inline]
    pub(crate) fn has_predecessor(&self, waiter: Option<&Waiter>) -> bool {
        match waiter {
            Some(waiter) => self.head.load(Acquire) != Waiter::ref_to_ptr(waiter),
            None => !self.tail.load(Acquire).is_null(),
        }
    }

    /// Wakes up the head of the queue.
    ///
    /// Returns `true` if a thread was signalled. The signalled thread is not guaranteed to acquire
    /// the lock.
    pub(crate) fn signal_head<C: Config>(&self) -> bool {
        if self.tail.load(Acquire).is_null() {
            return false;
        }
        let thread = self.process::<C, _, _>(|| {
            // The head can only be removed by `dequeue`, which cannot run while processing.
            let head = unsafe { self.head.load(Acquire).as_ref() };
            head.map(Waiter::signal)
        });
        thread.is_some_and(|thread| {
            thread.unpark();
            true
        })
    }

    /// Returns `true` if no threads are waiting.
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.tail.load(Acquire).is_null()
    }

    /// Returns the number of linked entries.
    ///
    /// The result may not include a thread that is still entering the queue.
    pub(crate) fn len<C: Config>(&self) -> usize {
        self.process::<C, _, _>(|| {
            let mut len = 0;
            let mut entry_ptr = self.head.load(Acquire);
            // Only the head leaves the queue, through `dequeue` which cannot run while processing;
            // every other linked entry waits behind it.
            while let Some(entry) = unsafe { entry_ptr.as_ref() } {
                len += 1;
                entry_ptr = entry.next.load(Acquire);
            }
            len
        })
    }

    /// Runs the closure while no other thread removes or signals the head.
    fn process<C: Config, R, F: FnOnce() -> R>(&self, f: F) -> R {
        let mut spin = 0;
        while self
            .processing
            .compare_exchange_weak(false, true, Acquire, Relaxed)
            .is_err()
        {
            C::backoff(spin);
            spin += 1;
        }
        let result = f();
        self.processing.store(false, Release);
        result
    }
}

impl Waiter {
    /// Creates a new [`Waiter`] for the current thread.
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicPtr::new(null_mut()),
            signaled: AtomicBool::new(false),
            thread: current(),
            _pinned: PhantomPinned,
        }
    }

    /// Parks the current thread until the entry is signalled, and consumes the signal.
    ///
    /// Spurious unparks are absorbed here.
    pub(crate) fn wait(&self) {
        while !self.signaled.swap(false, Acquire) {
            park();
        }
    }

    /// Sets the signal and returns a handle to unpark the thread.
    ///
    /// The thread handle is cloned before the signal is set since the entry may be gone as soon as
    /// the wait queue is no longer being processed. The signal is a read-modify-write operation so
    /// that the next `swap` in [`Waiter::wait`] reads it regardless of how `park` returns.
    fn signal(&self) -> Thread {
        let thread = self.thread.clone();
        self.signaled.swap(true, AcqRel);
        thread
    }

    /// Converts a reference to `Self` into a raw pointer.
    const fn ref_to_ptr(this: &Self) -> *mut Self {
        from_ref(this).cast_mut()
    }
}

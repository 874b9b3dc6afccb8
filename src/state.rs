//! Hold count and owner of a lock.

#![deny(unsafe_code)]

#[cfg(not(feature = "loom"))]
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed};

#[cfg(feature = "loom")]
use loom::sync::atomic::AtomicUsize;

use crate::error::Error;
use crate::thread_id;

/// Hold count and owner of a lock.
///
/// The hold count is `0` if and only if no thread owns the lock. A non-owner may only change the
/// hold count through the `0 -> 1` compare-and-swap; once ownership is established, only the owner
/// writes either field.
///
/// Every modification of the hold count is a read-modify-write operation, so the modifications
/// following an acquire-release read-modify-write operation all belong to its release sequence.
pub(crate) struct State {
    /// Number of unmatched acquisitions made by the owner.
    count: AtomicUsize,
    /// Identity of the owner, or [`thread_id::NONE`].
    owner: AtomicUsize,
}

impl State {
    /// Creates a free [`State`].
    pub(crate) fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
            owner: AtomicUsize::new(thread_id::NONE),
        }
    }

    /// Returns `true` if the lock is currently free.
    #[inline]
    pub(crate) fn is_free(&self) -> bool {
        self.count.load(Relaxed) == 0
    }

    /// Returns `true` if the lock is currently free, synchronizing with the thread that releases
    /// the lock next.
    ///
    /// A waiter calls this after entering the wait queue: either it reads the hold count after the
    /// lock was released, or the releasing thread acquires everything the waiter did before this
    /// call, including entering the wait queue.
    #[inline]
    pub(crate) fn sync_is_free(&self) -> bool {
        self.count.fetch_add(0, AcqRel) == 0
    }

    /// Tries to take a free lock.
    #[inline]
    pub(crate) fn try_claim(&self, me: usize) -> bool {
        if self.count.compare_exchange(0, 1, AcqRel, Relaxed).is_ok() {
            self.owner.store(me, Relaxed);
            return true;
        }
        false
    }

    /// Acquires the lock once more if `me` already owns it.
    ///
    /// # Panics
    ///
    /// Panics if the hold count would overflow.
    #[inline]
    pub(crate) fn reenter(&self, me: usize) -> bool {
        if !self.is_held_by(me) {
            return false;
        }
        assert_ne!(
            self.count.load(Relaxed),
            usize::MAX,
            "maximum lock count exceeded"
        );
        self.count.fetch_add(1, Relaxed);
        true
    }

    /// Releases one level of ownership held by `me`.
    ///
    /// Returns `Ok(true)` if the lock became free.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalMonitorState`] if `me` does not own the lock.
    pub(crate) fn release(&self, me: usize) -> Result<bool, Error> {
        if !self.is_held_by(me) {
            return Err(Error::IllegalMonitorState);
        }
        if self.count.load(Relaxed) != 1 {
            let count = self.count.fetch_sub(1, Relaxed);
            debug_assert!(count > 1);
            return Ok(false);
        }

        self.owner.store(thread_id::NONE, Relaxed);
        let released = self.count.compare_exchange(1, 0, AcqRel, Acquire).is_ok();
        debug_assert!(released);
        Ok(released)
    }

    /// Returns `true` if `me` owns the lock.
    ///
    /// Only the owner writes its own identity, so a relaxed load is exact for the calling thread.
    #[inline]
    pub(crate) fn is_held_by(&self, me: usize) -> bool {
        self.owner.load(Relaxed) == me
    }

    /// Returns the hold count.
    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.count.load(Relaxed)
    }

    /// Returns the owner identity.
    #[inline]
    pub(crate) fn owner(&self) -> usize {
        self.owner.load(Relaxed)
    }
}

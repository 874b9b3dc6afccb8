//! [`Lock`] is a reentrant mutual-exclusion lock with a selectable acquisition policy.

#![deny(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::pin::pin;

use log::{trace, warn};

use crate::config::{Config, DefaultConfig};
use crate::error::Error;
use crate::policy::Policy;
use crate::state::State;
use crate::thread_id;
use crate::wait_queue::{WaitQueue, Waiter};

/// [`Lock`] is a reentrant mutual-exclusion lock with a selectable acquisition policy.
///
/// [`Lock`] only provides low-level locking and releasing methods, hence forcing the user to
/// manage the scope of the critical section; [`Lock::guard`] ties a critical section to a scope.
///
/// A thread that cannot acquire the lock enters a wait queue and is parked until the owner releases
/// the lock. The owner may acquire the lock again without blocking, and other threads can acquire
/// the lock only after the owner has released it as many times as it acquired it.
pub struct Lock<C: Config = DefaultConfig> {
    /// Hold count and owner.
    state: State,
    /// Threads waiting for the lock.
    queue: WaitQueue,
    /// Acquisition policy.
    policy: Policy,
    _config: PhantomData<fn() -> C>,
}

/// Releases the [`Lock`] when dropped.
///
/// The guard cannot be sent to another thread, since only the owner can release the lock.
pub struct LockGuard<'l, C: Config = DefaultConfig> {
    lock: &'l Lock<C>,
    _not_send: PhantomData<*const ()>,
}

impl Lock {
    /// Creates a new [`Lock`] with the supplied policy.
    ///
    /// # Examples
    ///
    /// ```
    /// use relock::{Lock, Policy};
    ///
    /// let lock = Lock::new(Policy::Fair);
    /// assert_eq!(lock.policy(), Policy::Fair);
    /// ```
    #[inline]
    #[must_use]
    pub fn new(policy: Policy) -> Self {
        Self::with_config(policy)
    }

    /// Creates a new fair [`Lock`].
    ///
    /// # Examples
    ///
    /// ```
    /// use relock::Lock;
    ///
    /// let lock = Lock::fair();
    /// assert!(lock.is_fair());
    /// ```
    #[inline]
    #[must_use]
    pub fn fair() -> Self {
        Self::with_config(Policy::Fair)
    }
}

impl<C: Config> Lock<C> {
    /// Creates a new [`Lock`] with the supplied policy and configuration type.
    ///
    /// # Examples
    ///
    /// ```
    /// use relock::{DefaultConfig, Lock, Policy};
    ///
    /// let lock: Lock<DefaultConfig> = Lock::with_config(Policy::NonFair);
    /// assert!(!lock.is_fair());
    /// ```
    #[inline]
    #[must_use]
    pub fn with_config(policy: Policy) -> Self {
        Self {
            state: State::new(),
            queue: WaitQueue::new(),
            policy,
            _config: PhantomData,
        }
    }

    /// Returns the acquisition policy.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Returns `true` if the lock is fair.
    #[inline]
    #[must_use]
    pub fn is_fair(&self) -> bool {
        self.policy == Policy::Fair
    }

    /// Acquires the lock, blocking the current thread until it is available.
    ///
    /// Returns immediately, incrementing the hold count, if the current thread already holds the
    /// lock.
    ///
    /// # Panics
    ///
    /// Panics if the hold count overflows.
    ///
    /// # Examples
    ///
    /// ```
    /// use relock::Lock;
    ///
    /// let lock = Lock::default();
    ///
    /// lock.lock();
    /// lock.lock();
    ///
    /// assert!(lock.is_held_by_current_thread());
    /// assert_eq!(lock.hold_count(), 2);
    /// ```
    #[inline]
    pub fn lock(&self) {
        let me = thread_id::current();
        for spin in 0..C::spin_count().max(1) {
            if spin != 0 {
                C::backoff(spin);
            }
            if self.try_acquire(me) {
                return;
            }
        }
        self.lock_slow(me);
    }

    /// Releases one level of ownership.
    ///
    /// When the hold count drops to zero, the lock becomes free and the first waiting thread is
    /// woken up.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalMonitorState`] if the current thread does not hold the lock.
    ///
    /// # Examples
    ///
    /// ```
    /// use relock::{Error, Lock};
    ///
    /// let lock = Lock::default();
    /// assert_eq!(lock.unlock(), Err(Error::IllegalMonitorState));
    ///
    /// lock.lock();
    /// lock.lock();
    ///
    /// assert!(lock.unlock().is_ok());
    /// assert!(lock.is_locked());
    ///
    /// assert!(lock.unlock().is_ok());
    /// assert!(!lock.is_locked());
    /// ```
    #[inline]
    pub fn unlock(&self) -> Result<(), Error> {
        let me = thread_id::current();
        match self.state.release(me) {
            Ok(true) => {
                if self.queue.signal_head::<C>() {
                    trace!("thread {me} released the lock and woke up a waiting thread");
                }
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(error) => {
                warn!("thread {me} tried to release a lock it does not hold: {error}");
                Err(error)
            }
        }
    }

    /// Acquires the lock and returns a guard that releases it when dropped.
    ///
    /// # Panics
    ///
    /// Panics if the hold count overflows.
    ///
    /// # Examples
    ///
    /// ```
    /// use relock::Lock;
    ///
    /// let lock = Lock::fair();
    ///
    /// {
    ///     let _outer = lock.guard();
    ///     let _inner = lock.guard();
    ///     assert_eq!(lock.hold_count(), 2);
    /// }
    ///
    /// assert!(!lock.is_locked());
    /// ```
    #[inline]
    #[must_use = "the lock is released as soon as the guard is dropped"]
    pub fn guard(&self) -> LockGuard<'_, C> {
        self.lock();
        LockGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Returns `true` if any thread holds the lock.
    ///
    /// # Examples
    ///
    /// ```
    /// use relock::Lock;
    ///
    /// let lock = Lock::default();
    /// assert!(!lock.is_locked());
    ///
    /// lock.lock();
    /// assert!(lock.is_locked());
    /// ```
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.count() != 0
    }

    /// Returns `true` if the current thread holds the lock.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use std::thread;
    ///
    /// use relock::Lock;
    ///
    /// let lock = Arc::new(Lock::default());
    /// lock.lock();
    ///
    /// let lock_clone = lock.clone();
    /// let held = thread::spawn(move || lock_clone.is_held_by_current_thread());
    /// assert!(!held.join().unwrap());
    /// assert!(lock.is_held_by_current_thread());
    /// ```
    #[inline]
    #[must_use]
    pub fn is_held_by_current_thread(&self) -> bool {
        self.state.is_held_by(thread_id::current())
    }

    /// Returns the number of unmatched acquisitions made by the current thread.
    ///
    /// Returns `0` if the current thread does not hold the lock.
    #[inline]
    #[must_use]
    pub fn hold_count(&self) -> usize {
        if self.is_held_by_current_thread() {
            self.state.count()
        } else {
            0
        }
    }

    /// Returns `true` if any thread is waiting for the lock.
    #[inline]
    #[must_use]
    pub fn has_queued_threads(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Returns the number of threads waiting for the lock.
    ///
    /// A thread that is entering the wait queue at the same time may not be counted.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len::<C>()
    }

    /// Tries to acquire the lock on behalf of `me` that is not in the wait queue.
    fn try_acquire(&self, me: usize) -> bool {
        if self.state.is_free() {
            self.policy.admits(&self.queue) && self.state.try_claim(me)
        } else {
            self.state.reenter(me)
        }
    }

    /// Tries to acquire the lock on behalf of `me` at the head of the wait queue.
    ///
    /// A queued thread never owns the lock, so there is no reentrant case.
    fn try_acquire_queued(&self, me: usize) -> bool {
        self.state.sync_is_free() && self.state.try_claim(me)
    }

    /// Waits in the wait queue until the lock is acquired.
    ///
    /// Only the head of the wait queue tries to acquire the lock; the head is signalled whenever
    /// the lock is released. The new owner stays at the head until it removes itself right after
    /// taking the lock, so the wait queue is free of the owner only once `lock` returns.
    #[cold]
    fn lock_slow(&self, me: usize) {
        let waiter = pin!(Waiter::new());
        let waiter = waiter.into_ref();
        self.queue.enqueue(waiter);
        trace!("thread {me} entered the wait queue");

        let waiter = waiter.get_ref();
        loop {
            if !self.queue.has_predecessor(Some(waiter)) && self.try_acquire_queued(me) {
                self.queue.dequeue::<C>(waiter);
                trace!("thread {me} acquired the lock after waiting");
                return;
            }
            waiter.wait();
        }
    }
}

impl Default for Lock {
    /// Creates a non-fair [`Lock`].
    #[inline]
    fn default() -> Self {
        Self::new(Policy::NonFair)
    }
}

impl From<Policy> for Lock {
    #[inline]
    fn from(policy: Policy) -> Self {
        Self::new(policy)
    }
}

impl From<bool> for Lock {
    /// `true` creates a fair [`Lock`].
    #[inline]
    fn from(fair: bool) -> Self {
        Self::new(Policy::from(fair))
    }
}

impl<C: Config> fmt::Debug for Lock<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("policy", &self.policy)
            .field("hold_count", &self.state.count())
            .field("owner", &self.state.owner())
            .field("has_queued_threads", &!self.queue.is_empty())
            .finish()
    }
}

impl<C: Config> LockGuard<'_, C> {
    /// Returns the [`Lock`] the guard holds.
    #[inline]
    #[must_use]
    pub fn lock(&self) -> &Lock<C> {
        self.lock
    }
}

impl<C: Config> fmt::Debug for LockGuard<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("lock", self.lock)
            .finish()
    }
}

impl<C: Config> Drop for LockGuard<'_, C> {
    #[inline]
    fn drop(&mut self) {
        let released = self.lock.unlock();
        debug_assert!(released.is_ok());
    }
}

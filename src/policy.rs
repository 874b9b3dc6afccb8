//! [`Policy`] decides whether a caller may take a free lock.

#![deny(unsafe_code)]

use crate::wait_queue::WaitQueue;

/// Acquisition policy of a [`Lock`](crate::Lock), fixed at construction.
///
/// # Examples
///
/// ```
/// use relock::{Lock, Policy};
///
/// assert_eq!(Policy::default(), Policy::NonFair);
/// assert!(Lock::new(Policy::Fair).is_fair());
/// assert_eq!(Policy::from(true), Policy::Fair);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Policy {
    /// A newly arriving thread may take a free lock ahead of waiting threads.
    #[default]
    NonFair,
    /// Waiting threads acquire the lock in the order they entered the wait queue, and a newly
    /// arriving thread never takes the lock while any thread is waiting.
    Fair,
}

impl Policy {
    /// Returns `true` if a caller that has not entered the wait queue may attempt to take a free
    /// lock.
    ///
    /// Queued threads are not subject to the policy: only the head of the wait queue attempts to
    /// take the lock under either policy.
    #[inline]
    pub(crate) fn admits(self, queue: &WaitQueue) -> bool {
        match self {
            Policy::NonFair => true,
            Policy::Fair => !queue.has_predecessor(None),
        }
    }
}

impl From<bool> for Policy {
    /// `true` selects [`Policy::Fair`].
    #[inline]
    fn from(fair: bool) -> Self {
        if fair { Policy::Fair } else { Policy::NonFair }
    }
}

//! Process-unique thread identities used to record the lock owner.

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::Relaxed;

/// Identity value that no thread ever receives.
pub(crate) const NONE: usize = 0;

/// The next identity to hand out.
///
/// Identities are never reused, so a stale owner value cannot be mistaken for a live thread.
static NEXT_ID: AtomicUsize = AtomicUsize::new(NONE + 1);

#[cfg(not(feature = "loom"))]
std::thread_local! {
    static THREAD_ID: usize = NEXT_ID.fetch_add(1, Relaxed);
}

#[cfg(feature = "loom")]
loom::thread_local! {
    static THREAD_ID: usize = NEXT_ID.fetch_add(1, Relaxed);
}

/// Returns the identity of the calling thread.
#[inline]
pub(crate) fn current() -> usize {
    THREAD_ID.with(|id| *id)
}

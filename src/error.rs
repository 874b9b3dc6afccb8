//! Errors returned by [`Lock`](crate::Lock).

/// Errors that can occur when releasing a [`Lock`](crate::Lock).
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// The calling thread does not hold the lock, or the lock is not held at all.
    #[error("illegal monitor state: the current thread does not hold the lock")]
    IllegalMonitorState,
}

//! [`Config`] defines tuning options for [`Lock`](crate::Lock).

use std::fmt;
use std::hint::spin_loop;
#[cfg(not(feature = "loom"))]
use std::thread::yield_now;

#[cfg(feature = "loom")]
use loom::thread::yield_now;

/// [`Config`] defines tuning options for [`Lock`](crate::Lock).
///
/// # Examples
///
/// ```
/// use relock::{Config, Lock, Policy};
///
/// #[derive(Debug, Default)]
/// struct Eager;
///
/// impl Config for Eager {
///     fn spin_count() -> usize {
///         64
///     }
/// }
///
/// let lock: Lock<Eager> = Lock::with_config(Policy::Fair);
/// lock.lock();
/// assert!(lock.unlock().is_ok());
/// ```
pub trait Config: fmt::Debug + Default {
    /// Defines the number of acquisition attempts made before entering the wait queue.
    ///
    /// At least one attempt is always made.
    #[inline]
    #[must_use]
    fn spin_count() -> usize {
        2
    }

    /// Defines the backoff function to use between attempts and while waiting for a wait queue
    /// link to be published.
    #[inline]
    fn backoff(spin_count: usize) {
        if cfg!(feature = "loom") || spin_count % 64 == 63 {
            yield_now();
        } else {
            spin_loop();
        }
    }
}

/// Default configuration for [`Lock`](crate::Lock).
#[derive(Debug, Default)]
pub struct DefaultConfig;

impl Config for DefaultConfig {}

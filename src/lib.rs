#![deny(missing_docs, clippy::all, clippy::pedantic)]
#![doc = include_str!("../README.md")]

pub mod config;
pub use config::{Config, DefaultConfig};

pub mod error;
pub use error::Error;

pub mod lock;
pub use lock::{Lock, LockGuard};

pub mod policy;
pub use policy::Policy;

mod state;
mod thread_id;
mod wait_queue;

#[cfg(test)]
mod tests;

//! The queue-driven worker loop: bounded concurrent tasks, retry with
//! exponential backoff and jitter, a permanent-failure hook, and per-task
//! memory accounting.

mod backoff;
mod mem;
mod worker;

pub use backoff::Backoff;
pub use worker::{serve, Actor, DispatcherConfig};

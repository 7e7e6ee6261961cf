//! sendq - keyed task queue with global and per-key rate limits
//!
//! sendq paces asynchronous operations (typically "deliver this chat
//! message") across an unbounded number of independent queues. Each
//! operation is submitted under a caller-chosen queue key (one key per
//! chat or recipient) and dispatched under three simultaneous
//! constraints: a global per-second cap, a per-key per-minute cap, and a
//! minimum spacing between dispatches on the same key.
//!
//! # Guarantees
//!
//! - **One at a time per key**: at most one operation per key executes
//!   at any instant, and operations on a key settle in submission order
//! - **Sliding windows**: the caps are enforced over trailing 1 s / 60 s
//!   windows, not fixed buckets; slots are consumed at dispatch start
//! - **Every ticket settles**: success, operation error, and panic all
//!   resolve the caller's [`Ticket`]; failures are never retried
//! - **Keys are independent**: a stalled or starved key never blocks
//!   dispatch on other keys beyond the shared global cap
//!
//! # Modules
//!
//! - [`scheduler`] - the [`Scheduler`] and per-submission [`Ticket`]
//! - [`config`] - rate limit configuration
//! - [`queue`] - queue snapshot and stats types
//! - [`error`] - construction-time errors

pub mod config;
pub mod error;
pub mod queue;
pub mod scheduler;

mod window;

// Re-export commonly used types
pub use config::Limits;
pub use error::SchedulerError;
pub use queue::{QueueSnapshot, SchedulerStats};
pub use scheduler::{Scheduler, Ticket};

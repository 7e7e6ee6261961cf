//! Scheduler error types

use thiserror::Error;

/// Errors raised when constructing a scheduler.
///
/// Operation failures never appear here: they are delivered through the
/// per-submission [`Ticket`](crate::Ticket) instead, and the scheduler
/// performs no I/O of its own.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// A limit that must be positive was zero. A zero limit can never be
    /// satisfied by any dispatch check, silently deadlocking every queue,
    /// so it is rejected up front rather than treated as "unlimited".
    #[error("{field} must be positive (got {value})")]
    InvalidLimit { field: &'static str, value: u64 },
}

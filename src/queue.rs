//! Per-key queue state and inspection types

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::Instant;

use crate::window::RateWindow;

/// A pending operation with its result channel sealed inside.
///
/// Built at submission time: the future runs the caller's operation,
/// settles the caller's [`Ticket`](crate::Ticket), and resolves to
/// whether the operation succeeded (for the stats counters). Type
/// erasure here is what lets one queue hold operations with different
/// result types.
pub(crate) type SealedTask = Pin<Box<dyn Future<Output = bool> + Send + 'static>>;

/// State for one queue key.
///
/// Created lazily on first submission. Only the dispatch-check procedure
/// mutates the flag, the window, and the last-dispatch timestamp.
pub(crate) struct KeyQueue {
    /// Pending operations in submission order
    pub pending: VecDeque<SealedTask>,

    /// True while exactly one operation for this key is executing
    pub in_flight: bool,

    /// Dispatch timestamps for this key within the trailing minute
    pub window: RateWindow,

    /// When this key last started an operation
    pub last_dispatch: Option<Instant>,
}

impl KeyQueue {
    pub fn new(window_span: Duration) -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: false,
            window: RateWindow::new(window_span),
            last_dispatch: None,
        }
    }
}

/// Point-in-time view of one queue key
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    /// Operations waiting to dispatch
    pub pending: usize,

    /// Whether an operation for this key is currently executing
    pub in_flight: bool,

    /// Dispatches for this key within the trailing minute
    pub dispatched_last_minute: usize,

    /// Time since the last dispatch on this key, if any
    pub since_last_dispatch: Option<Duration>,
}

/// Cumulative scheduler counters
#[derive(Debug, Default, Clone)]
pub struct SchedulerStats {
    /// Operations accepted by `submit`
    pub total_submitted: u64,

    /// Operations that started executing
    pub total_dispatched: u64,

    /// Operations that settled successfully
    pub total_completed: u64,

    /// Operations that settled with an error (including panics)
    pub total_failed: u64,

    /// Dispatch checks deferred by a rate limit or spacing constraint
    pub total_rate_limited: u64,

    /// Largest pending depth seen on any single queue
    pub peak_queue_depth: usize,
}

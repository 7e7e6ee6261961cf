//! Keyed dispatch scheduler
//!
//! Owns every queue and all rate-limit state. Operations are submitted
//! under a queue key and dispatched when three constraints all allow it:
//! minimum spacing between dispatches on the key, a global trailing
//! 1-second cap, and a per-key trailing 60-second cap. Within one key,
//! operations run one at a time and settle in submission order.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use eyre::eyre;
use futures::FutureExt;
use tokio::sync::{Mutex, oneshot};
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::config::Limits;
use crate::error::SchedulerError;
use crate::queue::{KeyQueue, QueueSnapshot, SchedulerStats, SealedTask};
use crate::window::RateWindow;

/// Span of the global dispatch window
const GLOBAL_WINDOW: Duration = Duration::from_secs(1);

/// Span of each per-key dispatch window
const KEY_WINDOW: Duration = Duration::from_secs(60);

/// Mutable scheduler state. One lock spans the entire dispatch check so
/// the check is never partially applied; the lock is never held across
/// an await.
struct State {
    /// Dispatch timestamps across all keys within the trailing second
    global_window: RateWindow,

    /// Per-key queues, created lazily on first submission
    queues: HashMap<String, KeyQueue>,

    stats: SchedulerStats,
}

struct Shared {
    limits: Limits,
    state: Mutex<State>,
}

/// Outcome of one dispatch check for a key
enum Checked {
    /// Queue is empty, in flight, or unknown: nothing to do
    Idle,

    /// A constraint blocks dispatch; retry after this delay
    Wait(Duration),

    /// Head operation popped and marked in flight; run it
    Run(SealedTask),
}

/// One-shot handle to a submitted operation's result.
///
/// Settles exactly once: `Ok` with the operation's value, or `Err` with
/// the operation's error (a panicking operation settles `Err` with a
/// synthetic error). Dropping the ticket does not cancel the operation.
pub struct Ticket<T> {
    rx: oneshot::Receiver<eyre::Result<T>>,
}

impl<T> Future for Ticket<T> {
    type Output = eyre::Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx).poll(cx).map(|res| match res {
            Ok(out) => out,
            // Only possible if the runtime tore down the dispatch task.
            Err(_) => Err(eyre!("scheduler dropped the operation before it settled")),
        })
    }
}

/// The scheduler. Cheap to clone; all clones share state.
///
/// ```no_run
/// # async fn demo() -> eyre::Result<()> {
/// use sendq::{Limits, Scheduler};
///
/// let scheduler = Scheduler::new(Limits::default())?;
/// let ticket = scheduler
///     .submit("chat-42", async { Ok("delivered") })
///     .await;
/// let out = ticket.await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Create a scheduler with the given limits.
    ///
    /// Fails fast on a zero limit rather than deadlocking queues later.
    pub fn new(limits: Limits) -> Result<Self, SchedulerError> {
        limits.validate()?;
        debug!(?limits, "scheduler created");
        Ok(Self {
            shared: Arc::new(Shared {
                limits,
                state: Mutex::new(State {
                    global_window: RateWindow::new(GLOBAL_WINDOW),
                    queues: HashMap::new(),
                    stats: SchedulerStats::default(),
                }),
            }),
        })
    }

    /// Submit an operation under a queue key.
    ///
    /// Appends the operation to the key's queue (created lazily) and
    /// returns a [`Ticket`] that settles when the operation does. Awaits
    /// only the internal state lock, never capacity: rate limiting is
    /// experienced through the ticket, not through `submit`.
    pub async fn submit<T, Fut>(&self, key: impl Into<String>, task: Fut) -> Ticket<T>
    where
        T: Send + 'static,
        Fut: Future<Output = eyre::Result<T>> + Send + 'static,
    {
        let key = key.into();
        let (tx, rx) = oneshot::channel();

        let log_key = key.clone();
        let sealed: SealedTask = Box::pin(async move {
            let result = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(out) => out,
                Err(panic) => Err(eyre!(
                    "operation panicked: {}",
                    panic_message(panic.as_ref())
                )),
            };
            let ok = result.is_ok();
            if let Err(error) = &result {
                warn!(key = %log_key, %error, "operation failed");
            }
            if tx.send(result).is_err() {
                debug!(key = %log_key, "ticket dropped before operation settled");
            }
            ok
        });

        {
            let mut st = self.shared.state.lock().await;
            let depth = {
                let q = st
                    .queues
                    .entry(key.clone())
                    .or_insert_with(|| KeyQueue::new(KEY_WINDOW));
                q.pending.push_back(sealed);
                q.pending.len()
            };
            st.stats.total_submitted += 1;
            st.stats.peak_queue_depth = st.stats.peak_queue_depth.max(depth);
            debug!(%key, depth, "operation queued");
        }

        self.spawn_dispatch(key);
        Ticket { rx }
    }

    /// Point-in-time view of one queue key, or `None` if the key has
    /// never been submitted to (or was pruned).
    pub async fn queue_snapshot(&self, key: &str) -> Option<QueueSnapshot> {
        let mut st = self.shared.state.lock().await;
        let now = Instant::now();
        let q = st.queues.get_mut(key)?;
        q.window.prune(now);
        Some(QueueSnapshot {
            pending: q.pending.len(),
            in_flight: q.in_flight,
            dispatched_last_minute: q.window.len(),
            since_last_dispatch: q.last_dispatch.map(|t| now.duration_since(t)),
        })
    }

    /// Get the cumulative scheduler counters
    pub async fn stats(&self) -> SchedulerStats {
        let st = self.shared.state.lock().await;
        st.stats.clone()
    }

    /// Remove queues that have been idle for at least `idle_for`.
    ///
    /// Queue state otherwise lives for the process lifetime. A queue is
    /// removable only when it is empty, not in flight, and its trailing
    /// minute of dispatch history is empty, so a pruned key re-created
    /// by a later submission cannot evade the per-minute cap. Returns
    /// the number of queues removed.
    pub async fn remove_idle(&self, idle_for: Duration) -> usize {
        let mut st = self.shared.state.lock().await;
        let now = Instant::now();
        let before = st.queues.len();
        st.queues.retain(|_, q| {
            q.window.prune(now);
            let removable = !q.in_flight
                && q.pending.is_empty()
                && q.window.is_empty()
                && q.last_dispatch
                    .is_none_or(|t| now.duration_since(t) >= idle_for);
            !removable
        });
        let removed = before - st.queues.len();
        if removed > 0 {
            debug!(removed, "pruned idle queues");
        }
        removed
    }

    fn spawn_dispatch(&self, key: String) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            Shared::dispatch_loop(shared, key).await;
        });
    }
}

impl Shared {
    /// Drive one key until its queue is empty or another dispatch task
    /// owns it. Re-entrant: every submission spawns one of these, and
    /// duplicates exit at the first `Idle` check.
    async fn dispatch_loop(shared: Arc<Self>, key: String) {
        loop {
            let checked = {
                let mut st = shared.state.lock().await;
                shared.check(&mut st, &key)
            };

            match checked {
                Checked::Idle => return,
                Checked::Wait(delay) => {
                    debug!(%key, delay_ms = delay.as_millis() as u64, "dispatch deferred");
                    sleep(delay).await;
                    // Recompute everything from a fresh `now` on wake.
                }
                Checked::Run(task) => {
                    debug!(%key, "operation dispatched");
                    let ok = task.await;

                    let more = {
                        let mut st = shared.state.lock().await;
                        if ok {
                            st.stats.total_completed += 1;
                        } else {
                            st.stats.total_failed += 1;
                        }
                        match st.queues.get_mut(&key) {
                            Some(q) => {
                                q.in_flight = false;
                                !q.pending.is_empty()
                            }
                            None => false,
                        }
                    };
                    if !more {
                        return;
                    }
                }
            }
        }
    }

    /// Steps 1–6 of the dispatch check, under the state lock.
    ///
    /// Check order is spacing, then the global window, then the per-key
    /// window; the first violated constraint determines the retry delay
    /// and the rest are not evaluated. Slots are consumed here, at
    /// dispatch start, so a slow operation occupies exactly one slot
    /// from the moment it begins.
    fn check(&self, st: &mut State, key: &str) -> Checked {
        let State {
            global_window,
            queues,
            stats,
        } = st;

        let Some(q) = queues.get_mut(key) else {
            return Checked::Idle;
        };
        if q.in_flight || q.pending.is_empty() {
            return Checked::Idle;
        }

        let now = Instant::now();

        if let Some(last) = q.last_dispatch {
            let since = now.duration_since(last);
            if since < self.limits.min_spacing() {
                stats.total_rate_limited += 1;
                return Checked::Wait(self.limits.min_spacing() - since);
            }
        }

        global_window.prune(now);
        if global_window.len() >= self.limits.global_per_sec as usize {
            stats.total_rate_limited += 1;
            return Checked::Wait(global_window.until_slot_frees(now));
        }

        q.window.prune(now);
        if q.window.len() >= self.limits.per_key_per_min as usize {
            stats.total_rate_limited += 1;
            return Checked::Wait(q.window.until_slot_frees(now));
        }

        // All three constraints allow it: consume a slot in both windows
        // and take the head operation.
        let task = match q.pending.pop_front() {
            Some(task) => task,
            None => return Checked::Idle,
        };
        q.in_flight = true;
        q.last_dispatch = Some(now);
        q.window.record(now);
        global_window.record(now);
        stats.total_dispatched += 1;
        Checked::Run(task)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "opaque panic payload"
    }
}

//! Rolling time-window event counter

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// A rolling window of event timestamps.
///
/// Counts events within a fixed span measured backward from "now": a
/// continuously sliding window, not fixed buckets. Entries are stored in a
/// `VecDeque` in arrival order and compacted on every prune; at tens of
/// events per second this is cheap enough that no ring buffer is needed.
///
/// All methods take `now` explicitly so callers read the clock once per
/// dispatch check and tests can drive the window with synthetic instants.
#[derive(Debug)]
pub(crate) struct RateWindow {
    span: Duration,
    events: VecDeque<Instant>,
}

impl RateWindow {
    pub fn new(span: Duration) -> Self {
        Self {
            span,
            events: VecDeque::new(),
        }
    }

    /// Record an event at `at`. Timestamps must be appended in
    /// non-decreasing order; the scheduler always records the `now` it
    /// just pruned with.
    pub fn record(&mut self, at: Instant) {
        self.events.push_back(at);
    }

    /// Discard entries that have aged out of the window. An entry exactly
    /// `span` old is no longer inside it.
    pub fn prune(&mut self, now: Instant) {
        while let Some(front) = self.events.front() {
            if now.duration_since(*front) >= self.span {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of retained entries. Meaningful after a `prune` with the
    /// same `now` the caller is reasoning about.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// How long until the oldest retained entry leaves the window, i.e.
    /// the earliest time a new slot opens. Zero when the window is empty.
    pub fn until_slot_frees(&self, now: Instant) -> Duration {
        match self.events.front() {
            Some(oldest) => self.span.saturating_sub(now.duration_since(*oldest)),
            None => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn window_ms(span_ms: u64) -> RateWindow {
        RateWindow::new(Duration::from_millis(span_ms))
    }

    #[test]
    fn empty_window_counts_zero() {
        let mut w = window_ms(1000);
        w.prune(Instant::now());
        assert_eq!(w.len(), 0);
        assert!(w.is_empty());
    }

    #[test]
    fn entries_inside_span_are_retained() {
        let base = Instant::now();
        let mut w = window_ms(1000);
        w.record(base);
        w.record(base + Duration::from_millis(400));

        w.prune(base + Duration::from_millis(999));
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn entry_exactly_span_old_is_dropped() {
        let base = Instant::now();
        let mut w = window_ms(1000);
        w.record(base);

        w.prune(base + Duration::from_millis(1000));
        assert_eq!(w.len(), 0);
    }

    #[test]
    fn prune_drops_only_aged_entries() {
        let base = Instant::now();
        let mut w = window_ms(1000);
        for off in [0u64, 300, 600, 900] {
            w.record(base + Duration::from_millis(off));
        }

        // At t=1100 only the offset-0 entry (age 1100 ms) has aged out.
        w.prune(base + Duration::from_millis(1100));
        assert_eq!(w.len(), 3);

        // At t=1400 the offset-300 entry (age 1100 ms) ages out too.
        w.prune(base + Duration::from_millis(1400));
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn until_slot_frees_is_remaining_age_of_oldest() {
        let base = Instant::now();
        let mut w = window_ms(1000);
        w.record(base);
        w.record(base + Duration::from_millis(500));

        let now = base + Duration::from_millis(700);
        w.prune(now);
        assert_eq!(w.until_slot_frees(now), Duration::from_millis(300));
    }

    #[test]
    fn until_slot_frees_zero_when_empty() {
        let w = window_ms(1000);
        assert_eq!(w.until_slot_frees(Instant::now()), Duration::ZERO);
    }

    proptest! {
        /// After pruning at `now`, every retained entry is strictly
        /// younger than the span, and the retained count never exceeds
        /// the recorded count.
        #[test]
        fn prune_retains_only_in_window_entries(
            span_ms in 1u64..120_000,
            offsets in proptest::collection::vec(0u64..240_000, 0..64),
            now_off in 0u64..240_000,
        ) {
            let base = Instant::now();
            let mut offsets = offsets;
            offsets.sort_unstable();
            // Only record events at or before the observation point.
            let recorded: Vec<u64> =
                offsets.into_iter().filter(|o| *o <= now_off).collect();

            let mut w = RateWindow::new(Duration::from_millis(span_ms));
            for off in &recorded {
                w.record(base + Duration::from_millis(*off));
            }

            let now = base + Duration::from_millis(now_off);
            w.prune(now);

            prop_assert!(w.len() <= recorded.len());
            let expected = recorded
                .iter()
                .filter(|o| now_off - **o < span_ms)
                .count();
            prop_assert_eq!(w.len(), expected);
        }
    }
}

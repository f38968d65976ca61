use crate::metrics::MetricSnapshot;
use std::time::{Duration, Instant};
use tracing::debug;

/// Accumulates snapshots and decides, on the host's polling cadence, when a
/// batch is due.
///
/// The scheduler owns no timer. Callers pass `now` on every poll and send
/// whatever batch `tick` hands back.
#[derive(Debug)]
pub struct DispatchScheduler {
    buffer: Vec<MetricSnapshot>,
    interval: Duration,
    last_dispatch: Instant,
}

impl DispatchScheduler {
    /// `started` anchors the first interval.
    pub fn new(interval: Duration, started: Instant) -> Self {
        Self {
            buffer: Vec::new(),
            interval,
            last_dispatch: started,
        }
    }

    /// Enqueue a snapshot. Never blocks, never drops.
    pub fn append(&mut self, snapshot: MetricSnapshot) {
        self.buffer.push(snapshot);
    }

    /// Returns the whole buffer once `interval` has elapsed since the last
    /// dispatch and there is something to send.
    ///
    /// The dispatch clock restarts whenever the interval has elapsed, even if
    /// the buffer was empty.
    pub fn tick(&mut self, now: Instant) -> Option<Vec<MetricSnapshot>> {
        debug!("KPI bulk buffer len: {}", self.buffer.len());
        if now.saturating_duration_since(self.last_dispatch) < self.interval {
            return None;
        }
        self.last_dispatch = now;

        if self.buffer.is_empty() {
            None
        } else {
            Some(self.drain())
        }
    }

    /// Unconditional drain for the final flush. May be empty.
    pub fn flush_all(&mut self) -> Vec<MetricSnapshot> {
        debug!("KPI bulk buffer len in post-proc: {}", self.buffer.len());
        self.drain()
    }

    fn drain(&mut self) -> Vec<MetricSnapshot> {
        std::mem::take(&mut self.buffer)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn buffered(&self) -> &[MetricSnapshot] {
        &self.buffer
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

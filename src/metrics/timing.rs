//! Lock-free duration summaries for self-observability.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Number of observations and their total in nanoseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DurationSummary {
    pub count: u64,
    pub sum_ns: u64,
}

/// Atomic count and sum of observed durations.
///
/// The two counters are updated independently, so a concurrent reader may
/// see a count that is one ahead of the sum.
#[derive(Debug, Default)]
pub struct DurationRecorder {
    count: AtomicU64,
    sum_ns: AtomicU64,
}

impl DurationRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_ns.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn summary(&self) -> DurationSummary {
        DurationSummary {
            count: self.count.load(Ordering::Relaxed),
            sum_ns: self.sum_ns.load(Ordering::Relaxed),
        }
    }
}

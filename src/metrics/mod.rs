//! Metric accumulators and the lock-guarded stores that hold them.

pub mod store;
pub mod timing;
pub mod types;

pub use store::GuardedStore;
pub use timing::{DurationRecorder, DurationSummary};
pub use types::{
    Accumulator, CounterAccumulator, GaugeAccumulator, HistogramAccumulator, HistogramSnapshot,
    MetricSnapshot, MetricValue, SeriesId,
};

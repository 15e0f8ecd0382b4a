//! Accumulators: the long-lived aggregate behind each series.
//!
//! Accumulators are mutated only by the collector worker and read by
//! snapshots, so none of them carry their own synchronisation.

use crate::core::{HistogramDef, Labels, Sample, SampleKind};
use serde::Serialize;

/// Name and labels of a series, copied from its first sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesId {
    pub name: String,
    pub labels: Labels,
}

impl SeriesId {
    pub fn from_sample(sample: &Sample) -> Self {
        Self {
            name: sample.name.clone(),
            labels: sample.labels.clone(),
        }
    }
}

/// Behaviour shared by the three accumulator kinds
pub trait Accumulator {
    /// Build an empty accumulator seeded from the first sample of a series
    fn seed(sample: &Sample) -> Self;

    /// Fold one observation in
    fn apply(&mut self, value: f64);

    fn series(&self) -> &SeriesId;

    fn value(&self) -> MetricValue;
}

/// Monotonically increasing total
#[derive(Debug, Clone)]
pub struct CounterAccumulator {
    series: SeriesId,
    total: f64,
}

impl CounterAccumulator {
    pub fn total(&self) -> f64 {
        self.total
    }
}

impl Accumulator for CounterAccumulator {
    fn seed(sample: &Sample) -> Self {
        Self {
            series: SeriesId::from_sample(sample),
            total: 0.0,
        }
    }

    // Negative values are not rejected; producers are trusted to send deltas >= 0.
    fn apply(&mut self, value: f64) {
        self.total += value;
    }

    fn series(&self) -> &SeriesId {
        &self.series
    }

    fn value(&self) -> MetricValue {
        MetricValue::Counter(self.total)
    }
}

/// Last-write-wins value
#[derive(Debug, Clone)]
pub struct GaugeAccumulator {
    series: SeriesId,
    value: f64,
}

impl GaugeAccumulator {
    pub fn current(&self) -> f64 {
        self.value
    }
}

impl Accumulator for GaugeAccumulator {
    fn seed(sample: &Sample) -> Self {
        Self {
            series: SeriesId::from_sample(sample),
            value: 0.0,
        }
    }

    fn apply(&mut self, value: f64) {
        self.value = value;
    }

    fn series(&self) -> &SeriesId {
        &self.series
    }

    fn value(&self) -> MetricValue {
        MetricValue::Gauge(self.value)
    }
}

/// Cumulative histogram over linearly spaced buckets.
///
/// The layout is fixed by the first sample; later samples of the same series
/// reuse it even when their own definition differs.
#[derive(Debug, Clone)]
pub struct HistogramAccumulator {
    series: SeriesId,
    upper_bounds: Vec<f64>,
    cumulative_counts: Vec<u64>,
    count: u64,
    sum: f64,
}

impl HistogramAccumulator {
    pub fn with_bounds(series: SeriesId, upper_bounds: Vec<f64>) -> Self {
        let cumulative_counts = vec![0; upper_bounds.len()];
        Self {
            series,
            upper_bounds,
            cumulative_counts,
            count: 0,
            sum: 0.0,
        }
    }

    pub fn upper_bounds(&self) -> &[f64] {
        &self.upper_bounds
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Cumulative count of the bucket with exactly this upper bound
    pub fn bucket_count(&self, upper_bound: f64) -> Option<u64> {
        self.upper_bounds
            .iter()
            .position(|b| *b == upper_bound)
            .map(|i| self.cumulative_counts[i])
    }
}

impl Accumulator for HistogramAccumulator {
    fn seed(sample: &Sample) -> Self {
        let upper_bounds = sample
            .histogram_def
            .as_ref()
            .map(HistogramDef::upper_bounds)
            .unwrap_or_default();
        Self::with_bounds(SeriesId::from_sample(sample), upper_bounds)
    }

    fn apply(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;

        // bounds ascend, so every bucket from the first match onwards counts
        if let Some(first) = self.upper_bounds.iter().position(|bound| value <= *bound) {
            for count in &mut self.cumulative_counts[first..] {
                *count += 1;
            }
        }
    }

    fn series(&self) -> &SeriesId {
        &self.series
    }

    fn value(&self) -> MetricValue {
        MetricValue::Histogram(HistogramSnapshot {
            upper_bounds: self.upper_bounds.clone(),
            cumulative_counts: self.cumulative_counts.clone(),
            count: self.count,
            sum: self.sum,
        })
    }
}

/// Distribution exported for a histogram series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSnapshot {
    pub upper_bounds: Vec<f64>,
    /// Cumulative count per entry of `upper_bounds`; the implicit `+Inf`
    /// bucket equals `count`.
    pub cumulative_counts: Vec<u64>,
    pub count: u64,
    pub sum: f64,
}

/// Accumulated value of one series
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Counter(f64),
    Gauge(f64),
    Histogram(HistogramSnapshot),
}

impl MetricValue {
    pub fn kind(&self) -> SampleKind {
        match self {
            MetricValue::Counter(_) => SampleKind::Counter,
            MetricValue::Gauge(_) => SampleKind::Gauge,
            MetricValue::Histogram(_) => SampleKind::HistogramLinear,
        }
    }
}

/// One exported series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSnapshot {
    pub name: String,
    pub kind: SampleKind,
    pub labels: Labels,
    pub value: MetricValue,
}

impl MetricSnapshot {
    pub fn from_accumulator<A: Accumulator>(accumulator: &A) -> Self {
        let series = accumulator.series();
        let value = accumulator.value();
        Self {
            name: series.name.clone(),
            kind: value.kind(),
            labels: series.labels.clone(),
            value,
        }
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Label set attached to a sample. Keys are unique.
pub type Labels = HashMap<String, String>;

/// Kind of a sample as announced on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    /// Monotonically increasing total (`c`)
    Counter,
    /// Last-write-wins value (`g`)
    Gauge,
    /// Histogram with linearly spaced buckets (`hl`)
    HistogramLinear,
    /// Any other symbol; carried downstream and dropped by the collector
    Unknown,
}

impl SampleKind {
    /// Maps a wire symbol to a kind; unrecognised symbols become `Unknown`
    pub fn from_symbol(symbol: &str) -> Self {
        match symbol {
            "c" => SampleKind::Counter,
            "g" => SampleKind::Gauge,
            "hl" => SampleKind::HistogramLinear,
            _ => SampleKind::Unknown,
        }
    }

    /// Wire symbol of the kind, empty for `Unknown`
    pub fn symbol(&self) -> &'static str {
        match self {
            SampleKind::Counter => "c",
            SampleKind::Gauge => "g",
            SampleKind::HistogramLinear => "hl",
            SampleKind::Unknown => "",
        }
    }

    /// Prometheus metric type name
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleKind::Counter => "counter",
            SampleKind::Gauge => "gauge",
            SampleKind::HistogramLinear => "histogram",
            SampleKind::Unknown => "untyped",
        }
    }
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper limit on explicit buckets per histogram series
pub const MAX_HISTOGRAM_BUCKETS: usize = 4096;

/// Bucket layout of a linear histogram, kept as the literal decimal text
/// received on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramDef {
    pub start: String,
    pub width: String,
    pub count: String,
}

impl HistogramDef {
    pub fn new(
        start: impl Into<String>,
        width: impl Into<String>,
        count: impl Into<String>,
    ) -> Self {
        Self {
            start: start.into(),
            width: width.into(),
            count: count.into(),
        }
    }

    /// `count` upper bounds beginning at `start`, each `width` above the
    /// previous one. The bound is accumulated step by step, so decimal widths
    /// carry the same rounding as Prometheus linear buckets.
    ///
    /// Components that do not parse count as zero, so a malformed `count`
    /// yields a histogram with only the implicit `+Inf` bucket. `count` is
    /// clamped to [`MAX_HISTOGRAM_BUCKETS`].
    pub fn upper_bounds(&self) -> Vec<f64> {
        let start = parse_decimal(&self.start);
        let width = parse_decimal(&self.width);
        let count = self.count.parse::<usize>().unwrap_or(0).min(MAX_HISTOGRAM_BUCKETS);

        let mut bounds = Vec::with_capacity(count);
        let mut bound = start;
        for _ in 0..count {
            bounds.push(bound);
            bound += width;
        }
        bounds
    }
}

impl fmt::Display for HistogramDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{};{}", self.start, self.width, self.count)
    }
}

/// Decimal parse that degrades to zero on malformed input
pub fn parse_decimal(text: &str) -> f64 {
    text.parse::<f64>().unwrap_or(0.0)
}

/// A single observation submitted for aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub name: String,
    pub kind: SampleKind,
    pub labels: Labels,
    pub value: f64,
    /// Present only for `HistogramLinear` samples
    pub histogram_def: Option<HistogramDef>,
}

impl Sample {
    pub fn new(name: impl Into<String>, kind: SampleKind, labels: Labels, value: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            labels,
            value,
            histogram_def: None,
        }
    }

    /// Creates a counter sample without labels
    pub fn counter(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, SampleKind::Counter, Labels::new(), value)
    }

    /// Creates a gauge sample without labels
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, SampleKind::Gauge, Labels::new(), value)
    }

    /// Creates a linear histogram observation without labels
    pub fn histogram_linear(name: impl Into<String>, def: HistogramDef, value: f64) -> Self {
        Self {
            histogram_def: Some(def),
            ..Self::new(name, SampleKind::HistogramLinear, Labels::new(), value)
        }
    }

    /// Adds or replaces a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Label pairs ordered by key
    pub fn sorted_labels(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> =
            self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        pairs.sort_unstable_by(|a, b| a.0.cmp(b.0));
        pairs
    }
}

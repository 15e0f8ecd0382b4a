//! Common test utilities and fixtures.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tallyd_lib::collector::Collector;
use tallyd_lib::core::{CollectorConfig, HistogramDef, Sample, SampleKind};
use tallyd_lib::fingerprint::{Fingerprint, Fingerprinter, HasherKind};
use tallyd_lib::metrics::{MetricSnapshot, MetricValue};

/// Test fixture builder for creating samples with sensible defaults.
pub struct TestSampleBuilder {
    name: String,
    kind: SampleKind,
    labels: Vec<(String, String)>,
    value: f64,
    histogram: Option<HistogramDef>,
}

impl TestSampleBuilder {
    pub fn counter(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: SampleKind::Counter,
            labels: Vec::new(),
            value: 1.0,
            histogram: None,
        }
    }

    pub fn gauge(name: &str) -> Self {
        Self {
            kind: SampleKind::Gauge,
            ..Self::counter(name)
        }
    }

    pub fn histogram(name: &str, start: &str, width: &str, count: &str) -> Self {
        Self {
            kind: SampleKind::HistogramLinear,
            histogram: Some(HistogramDef::new(start, width, count)),
            ..Self::counter(name)
        }
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.push((key.to_string(), value.to_string()));
        self
    }

    pub fn service(self, service: &str) -> Self {
        self.label("service", service)
    }

    pub fn value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    pub fn build(self) -> Sample {
        let mut sample = Sample::new(self.name, self.kind, Default::default(), self.value);
        for (key, value) in self.labels {
            sample = sample.with_label(key, value);
        }
        sample.histogram_def = self.histogram;
        sample
    }
}

/// Collector with the given queue capacity and shutdown timeout.
pub fn collector(capacity: usize, shutdown_timeout: Duration) -> Arc<Collector> {
    Arc::new(Collector::from_config(CollectorConfig {
        queue_capacity: capacity,
        shutdown_timeout,
        hasher: HasherKind::Fnv,
    }))
}

/// Fingerprinter that blocks its thread before delegating to FNV.
pub struct SlowFingerprinter {
    pub delay: Duration,
}

impl Fingerprinter for SlowFingerprinter {
    fn fingerprint(&self, sample: &Sample) -> Fingerprint {
        std::thread::sleep(self.delay);
        HasherKind::Fnv.build().fingerprint(sample)
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

/// Find a series by name and label set.
pub fn find<'a>(
    snapshot: &'a [MetricSnapshot],
    name: &str,
    labels: &[(&str, &str)],
) -> Option<&'a MetricSnapshot> {
    snapshot.iter().find(|m| {
        m.name == name
            && m.labels.len() == labels.len()
            && labels.iter().all(|(k, v)| m.labels.get(*k).map(String::as_str) == Some(*v))
    })
}

/// Value of a counter or gauge series.
pub fn scalar(metric: &MetricSnapshot) -> f64 {
    match &metric.value {
        MetricValue::Counter(v) | MetricValue::Gauge(v) => *v,
        other => panic!("Expected scalar value, got {:?}", other),
    }
}

/// Macro for asserting a scalar series value.
#[macro_export]
macro_rules! assert_series {
    ($snapshot:expr, $name:expr, [$(($k:expr, $v:expr)),*], $expected:expr) => {
        let metric = common::find(&$snapshot, $name, &[$(($k, $v)),*])
            .unwrap_or_else(|| panic!("Series {} not found", $name));
        assert!(
            (common::scalar(metric) - $expected).abs() < 1e-9,
            "Series {} has value {}, expected {}",
            $name,
            common::scalar(metric),
            $expected
        );
    };
}

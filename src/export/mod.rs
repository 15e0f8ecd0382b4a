//! Prometheus text exposition of collector snapshots.
//!
//! Series are grouped by name with one `# TYPE` line per family. Histogram
//! families expand into `_bucket`, `_sum` and `_count` lines with the
//! implicit `+Inf` bucket added. Self-observability metrics of the collector
//! and receiver follow the aggregated series.
//!
//! A family name owns every line name it expands to. Aggregated series whose
//! lines would reuse a name already taken by a self-metric or by an earlier
//! family are left out of the scrape and logged, so one bad record cannot
//! make the whole exposition unparseable.

use crate::collector::CollectorStats;
use crate::core::SampleKind;
use crate::metrics::{DurationSummary, MetricSnapshot, MetricValue};
use crate::receiver::ReceiverStats;
use ahash::AHashSet;
use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt::Write;

const PROCESSING_DURATION: &str = "app_collector_processing_duration_ns";
const HANDLING_DURATION: &str = "app_ingress_request_handling_duration_ns";

/// Label an aggregated histogram may not carry under its own name
const BUCKET_LABEL: &str = "le";
const EXPORTED_BUCKET_LABEL: &str = "exported_le";

/// Every line name emitted by [`render_self_metrics`]
const RESERVED_NAMES: &[&str] = &[
    "app_start_timestamp_seconds",
    "app_duration_seconds",
    "app_collector_queue_length",
    "app_collector_queue_capacity",
    "app_collector_samples_processed_total",
    "app_collector_samples_dropped_total",
    "app_collector_samples_unknown_kind_total",
    PROCESSING_DURATION,
    "app_collector_processing_duration_ns_sum",
    "app_collector_processing_duration_ns_count",
    "app_ingress_requests_total",
    "app_ingress_samples_total",
    "app_ingress_samples_dropped_total",
    HANDLING_DURATION,
    "app_ingress_request_handling_duration_ns_sum",
    "app_ingress_request_handling_duration_ns_count",
];

/// Render aggregated series followed by self-metrics
pub fn render_prometheus(
    snapshot: &[MetricSnapshot],
    collector: &CollectorStats,
    receiver: Option<&ReceiverStats>,
) -> String {
    let mut out = String::with_capacity(snapshot.len() * 64 + 1024);
    render_series(&mut out, snapshot);
    render_self_metrics(&mut out, collector, receiver);
    out
}

/// Render aggregated series only.
///
/// The first kind seen for a name, in `(name, kind)` order, owns the
/// family. Series of another kind under that name, and families whose line
/// names are already taken, are skipped. Returns the number of skipped
/// series.
pub fn render_series(out: &mut String, snapshot: &[MetricSnapshot]) -> usize {
    let mut ordered: Vec<(&MetricSnapshot, Vec<(&str, &str)>)> =
        snapshot.iter().map(|m| (m, sorted_labels(m))).collect();
    ordered.sort_by(|a, b| {
        a.0.name
            .cmp(&b.0.name)
            .then_with(|| a.0.kind.as_str().cmp(b.0.kind.as_str()))
            .then_with(|| a.1.cmp(&b.1))
    });

    let mut claimed: AHashSet<String> = RESERVED_NAMES.iter().map(|n| (*n).to_string()).collect();
    let mut skipped: BTreeMap<&str, usize> = BTreeMap::new();
    let mut family: Option<(&str, SampleKind, bool)> = None;

    for (metric, labels) in &ordered {
        let name = metric.name.as_str();
        let accepted = match family {
            Some((current, kind, accepted)) if current == name => accepted && kind == metric.kind,
            _ => {
                let accepted = claim(&mut claimed, name, metric.kind);
                if accepted {
                    let _ = writeln!(out, "# TYPE {} {}", name, metric.kind.as_str());
                }
                family = Some((name, metric.kind, accepted));
                accepted
            },
        };

        if !accepted {
            *skipped.entry(name).or_default() += 1;
            continue;
        }

        match &metric.value {
            MetricValue::Counter(v) | MetricValue::Gauge(v) => {
                write_line(out, name, labels, None, *v);
            },
            MetricValue::Histogram(histogram) => {
                let labels = histogram_labels(name, labels);
                let bucket_name = format!("{}_bucket", name);
                let buckets = histogram.upper_bounds.iter().zip(&histogram.cumulative_counts);
                for (bound, count) in buckets {
                    let le = format_value(*bound);
                    write_line(out, &bucket_name, &labels, Some(&le), *count as f64);
                }
                write_line(out, &bucket_name, &labels, Some("+Inf"), histogram.count as f64);
                write_line(out, &format!("{}_sum", name), &labels, None, histogram.sum);
                write_line(
                    out,
                    &format!("{}_count", name),
                    &labels,
                    None,
                    histogram.count as f64,
                );
            },
        }
    }

    for (name, count) in &skipped {
        tracing::warn!(
            family = *name,
            skipped = *count,
            "Series left out of exposition, name already in use"
        );
    }
    skipped.values().sum()
}

/// Take every line name of a family, or none if any is already taken
fn claim(claimed: &mut AHashSet<String>, name: &str, kind: SampleKind) -> bool {
    let names = match kind {
        SampleKind::HistogramLinear => vec![
            name.to_string(),
            format!("{}_bucket", name),
            format!("{}_sum", name),
            format!("{}_count", name),
        ],
        _ => vec![name.to_string()],
    };

    if names.iter().any(|n| claimed.contains(n)) {
        return false;
    }
    claimed.extend(names);
    true
}

/// Labels of a histogram series with a user `le` moved out of the way
fn histogram_labels<'a>(name: &str, labels: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
    if !labels.iter().any(|(key, _)| *key == BUCKET_LABEL) {
        return labels.to_vec();
    }

    tracing::debug!(name, "Renaming histogram label le to exported_le");
    let mut renamed: Vec<(&str, &str)> = labels
        .iter()
        .map(|&(key, value)| {
            if key == BUCKET_LABEL {
                (EXPORTED_BUCKET_LABEL, value)
            } else {
                (key, value)
            }
        })
        .collect();
    renamed.sort_unstable();
    renamed
}

fn render_self_metrics(
    out: &mut String,
    collector: &CollectorStats,
    receiver: Option<&ReceiverStats>,
) {
    let started = collector.started_at.timestamp_millis() as f64 / 1000.0;
    let uptime = (Utc::now() - collector.started_at).num_milliseconds().max(0) as f64 / 1000.0;

    write_single(out, "app_start_timestamp_seconds", "gauge", started);
    write_single(out, "app_duration_seconds", "gauge", uptime);
    write_single(out, "app_collector_queue_length", "gauge", collector.queue_length as f64);
    write_single(out, "app_collector_queue_capacity", "gauge", collector.queue_capacity as f64);
    write_single(
        out,
        "app_collector_samples_processed_total",
        "counter",
        collector.samples_processed as f64,
    );
    write_single(
        out,
        "app_collector_samples_dropped_total",
        "counter",
        collector.samples_rejected as f64,
    );
    write_single(
        out,
        "app_collector_samples_unknown_kind_total",
        "counter",
        collector.samples_unknown_kind as f64,
    );

    let _ = writeln!(out, "# TYPE {} summary", PROCESSING_DURATION);
    for (kind, summary) in collector.processing.by_kind() {
        write_summary(out, PROCESSING_DURATION, &[("sampleKind", kind.symbol())], summary);
    }

    if let Some(receiver) = receiver {
        write_single(
            out,
            "app_ingress_requests_total",
            "counter",
            receiver.datagrams_received as f64,
        );
        write_single(
            out,
            "app_ingress_samples_total",
            "counter",
            receiver.samples_received as f64,
        );
        write_single(
            out,
            "app_ingress_samples_dropped_total",
            "counter",
            receiver.samples_dropped as f64,
        );

        let _ = writeln!(out, "# TYPE {} summary", HANDLING_DURATION);
        write_summary(out, HANDLING_DURATION, &[], receiver.handling);
    }
}

fn sorted_labels(metric: &MetricSnapshot) -> Vec<(&str, &str)> {
    let mut labels: Vec<(&str, &str)> =
        metric.labels.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    labels.sort_unstable();
    labels
}

fn write_single(out: &mut String, name: &str, kind: &str, value: f64) {
    let _ = writeln!(out, "# TYPE {} {}", name, kind);
    write_line(out, name, &[], None, value);
}

fn write_summary(out: &mut String, name: &str, labels: &[(&str, &str)], summary: DurationSummary) {
    write_line(out, &format!("{}_sum", name), labels, None, summary.sum_ns as f64);
    write_line(out, &format!("{}_count", name), labels, None, summary.count as f64);
}

fn write_line(
    out: &mut String,
    name: &str,
    labels: &[(&str, &str)],
    le: Option<&str>,
    value: f64,
) {
    out.push_str(name);

    if !labels.is_empty() || le.is_some() {
        out.push('{');
        let mut first = true;
        for (key, val) in labels.iter().copied().chain(le.map(|le| (BUCKET_LABEL, le))) {
            if !first {
                out.push(',');
            }
            first = false;
            out.push_str(key);
            out.push_str("=\"");
            escape_label_value(out, val);
            out.push('"');
        }
        out.push('}');
    }

    out.push(' ');
    out.push_str(&format_value(value));
    out.push('\n');
}

fn escape_label_value(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

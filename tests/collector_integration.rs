//! End-to-end tests for the collector: ingress, aggregation and shutdown.

mod common;

use common::{SlowFingerprinter, TestSampleBuilder};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tallyd_lib::collector::Collector;
use tallyd_lib::core::{CollectorConfig, TallyError};
use tallyd_lib::fingerprint::HasherKind;
use tallyd_lib::metrics::MetricValue;
use tallyd_lib::protocol::parse_samples;

#[tokio::test]
async fn test_samples_aggregate_by_series() {
    let collector = common::collector(1024, Duration::from_secs(1));
    collector.start().unwrap();

    let samples = [
        TestSampleBuilder::counter("requests_total").service("srvA1").value(1.5).build(),
        TestSampleBuilder::counter("requests_total").service("srvA1").value(2.5).build(),
        TestSampleBuilder::counter("requests_total").service("srvB1").value(7.0).build(),
        TestSampleBuilder::gauge("temperature").value(7.3).build(),
        TestSampleBuilder::gauge("temperature").value(17.3).build(),
    ];
    for sample in samples {
        collector.submit(sample).unwrap();
    }

    collector.stop(Duration::from_secs(1)).await.unwrap();

    let snapshot = collector.snapshot();
    assert_eq!(snapshot.len(), 3);
    assert_series!(snapshot, "requests_total", [("service", "srvA1")], 4.0);
    assert_series!(snapshot, "requests_total", [("service", "srvB1")], 7.0);
    assert_series!(snapshot, "temperature", [], 17.3);
}

#[tokio::test]
async fn test_label_order_does_not_split_series() {
    let collector = common::collector(1024, Duration::from_secs(1));
    collector.start().unwrap();

    collector
        .submit(TestSampleBuilder::counter("hits_total").label("a", "1").label("b", "2").build())
        .unwrap();
    collector
        .submit(TestSampleBuilder::counter("hits_total").label("b", "2").label("a", "1").build())
        .unwrap();

    collector.stop(Duration::from_secs(1)).await.unwrap();

    let snapshot = collector.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_series!(snapshot, "hits_total", [("a", "1"), ("b", "2")], 2.0);
}

#[tokio::test]
async fn test_both_hashers_agree_on_grouping() {
    for hasher in [HasherKind::Fnv, HasherKind::Sha256] {
        let collector = Arc::new(Collector::from_config(CollectorConfig {
            hasher,
            ..CollectorConfig::default()
        }));
        collector.start().unwrap();

        for value in [1.0, 2.0, 3.0] {
            collector
                .submit(TestSampleBuilder::counter("c_total").service("s").value(value).build())
                .unwrap();
            collector
                .submit(TestSampleBuilder::gauge("c_total").service("s").value(value).build())
                .unwrap();
        }

        collector.stop(Duration::from_secs(1)).await.unwrap();

        let stats = collector.stats();
        assert_eq!(stats.counter_series, 1, "hasher {}", hasher.as_str());
        assert_eq!(stats.gauge_series, 1, "hasher {}", hasher.as_str());
        assert_eq!(stats.samples_processed, 6);
    }
}

#[tokio::test]
async fn test_histogram_series() {
    let collector = common::collector(1024, Duration::from_secs(1));
    collector.start().unwrap();

    collector
        .submit(TestSampleBuilder::histogram("duration_ms", "8.0", "2.0", "10").value(10.0).build())
        .unwrap();
    collector
        .submit(TestSampleBuilder::histogram("duration_ms", "8.0", "2.0", "10").value(20.0).build())
        .unwrap();

    collector.stop(Duration::from_secs(1)).await.unwrap();

    let snapshot = collector.snapshot();
    assert_eq!(snapshot.len(), 1);
    match &snapshot[0].value {
        MetricValue::Histogram(histogram) => {
            assert_eq!(histogram.count, 2);
            assert_eq!(histogram.sum, 30.0);
            assert_eq!(histogram.upper_bounds.len(), 10);
            assert_eq!(histogram.upper_bounds[3], 14.0);
            assert_eq!(histogram.cumulative_counts[3], 1);
            assert_eq!(histogram.cumulative_counts[9], 2);
        },
        other => panic!("Expected histogram, got {:?}", other),
    }
}

#[tokio::test]
async fn test_parsed_payload_aggregates() {
    let payload = b"service=srvA1;labelA=labelValueA\n\
        name_of_1_metric_total|c|1.1\n\
        name_of_1_metric_total|c|1000.001\n\
        name_of_3_metric|g|7.3\n\
        name_of_4_metric|hl|8.0;2.0;10|10\n\
        name_of_5_metric|zz|1\n";

    let collector = common::collector(1024, Duration::from_secs(1));
    collector.start().unwrap();
    for sample in parse_samples(payload) {
        collector.submit(sample).unwrap();
    }
    collector.stop(Duration::from_secs(1)).await.unwrap();

    let snapshot = collector.snapshot();
    let stats = collector.stats();
    assert_eq!(stats.samples_processed, 4);
    assert_eq!(stats.samples_unknown_kind, 1);
    assert_eq!(snapshot.len(), 3);
    assert_series!(
        snapshot,
        "name_of_1_metric_total",
        [("service", "srvA1"), ("labelA", "labelValueA")],
        1001.101
    );
    assert_series!(
        snapshot,
        "name_of_3_metric",
        [("service", "srvA1"), ("labelA", "labelValueA")],
        7.3
    );
}

#[tokio::test]
async fn test_backpressure_rejects_without_blocking() {
    // not started, so nothing drains the queue
    let collector = common::collector(4, Duration::from_secs(1));

    let started = Instant::now();
    let mut rejected = 0;
    for i in 0..100 {
        match collector.submit(TestSampleBuilder::counter("c_total").value(f64::from(i)).build()) {
            Ok(()) => {},
            Err(TallyError::QueueFull) => rejected += 1,
            Err(e) => panic!("Unexpected error: {}", e),
        }
    }

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(rejected, 96);
    assert_eq!(collector.pending(), 4);
    assert_eq!(collector.stats().samples_rejected, 96);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_drains_queue_under_load() {
    let collector = common::collector(100_000, Duration::from_secs(5));
    collector.start().unwrap();

    let mut producers = Vec::new();
    for p in 0..4 {
        let collector = Arc::clone(&collector);
        producers.push(tokio::spawn(async move {
            for _ in 0..10_000 {
                let sample = TestSampleBuilder::counter("load_total")
                    .label("producer", &p.to_string())
                    .build();
                collector.submit(sample).unwrap();
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    collector.shutdown().await.unwrap();

    let snapshot = collector.snapshot();
    assert_eq!(snapshot.len(), 4);
    let total: f64 = snapshot.iter().map(common::scalar).sum();
    assert_eq!(total, 40_000.0);
    assert_eq!(collector.pending(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_times_out_with_slow_worker() {
    let collector = Arc::new(Collector::new(
        CollectorConfig::default(),
        Arc::new(SlowFingerprinter {
            delay: Duration::from_millis(20),
        }),
    ));

    for i in 0..20 {
        collector
            .submit(TestSampleBuilder::counter("slow_total").value(f64::from(i)).build())
            .unwrap();
    }
    collector.start().unwrap();

    let started = Instant::now();
    let result = collector.stop(Duration::from_millis(50)).await;
    assert!(matches!(result, Err(TallyError::ShutdownTimeout { timeout_ms: 50 })), "{:?}", result);
    assert!(started.elapsed() < Duration::from_millis(350));

    // the worker is left running and a second stop waits on it
    collector.stop(Duration::from_secs(5)).await.unwrap();
    assert_eq!(collector.stats().samples_processed, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_snapshot_during_ingestion() {
    let collector = common::collector(100_000, Duration::from_secs(5));
    collector.start().unwrap();

    let producer = {
        let collector = Arc::clone(&collector);
        tokio::spawn(async move {
            for i in 0..20_000u32 {
                let sample = TestSampleBuilder::counter("race_total")
                    .label("shard", &(i % 8).to_string())
                    .build();
                while collector.submit(sample.clone()).is_err() {
                    tokio::task::yield_now().await;
                }
            }
        })
    };

    let mut last_total = 0.0;
    while !producer.is_finished() {
        let snapshot = collector.snapshot();
        assert!(snapshot.len() <= 8);
        let total: f64 = snapshot.iter().map(common::scalar).sum();
        // counters only ever grow
        assert!(total >= last_total);
        last_total = total;
        tokio::task::yield_now().await;
    }
    producer.await.unwrap();

    collector.shutdown().await.unwrap();
    let total: f64 = collector.snapshot().iter().map(common::scalar).sum();
    assert_eq!(total, 20_000.0);
}

#[tokio::test]
async fn test_double_start_rejected() {
    let collector = common::collector(16, Duration::from_secs(1));
    collector.start().unwrap();
    assert!(matches!(collector.start(), Err(TallyError::AlreadyStarted)));
    collector.shutdown().await.unwrap();
}

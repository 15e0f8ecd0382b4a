//! Single-writer aggregation engine.
//!
//! Producers call [`Collector::submit`], which pushes onto a bounded
//! lock-free queue and never blocks. One worker task drains the queue in FIFO
//! order, fingerprints each sample and folds it into the store for its kind.
//! Scrapes go straight to the stores through [`Collector::snapshot`] and never
//! touch the queue.
//!
//! Shutdown is cooperative: [`Collector::stop`] cancels a token once, the
//! worker notices at its next queue check, drains what is still queued and
//! exits. The caller waits on the worker's join handle for a bounded time.

use crate::core::{CollectorConfig, Result, Sample, SampleKind, TallyError};
use crate::fingerprint::Fingerprinter;
use crate::metrics::{
    CounterAccumulator, DurationRecorder, DurationSummary, GaugeAccumulator, GuardedStore,
    HistogramAccumulator, MetricSnapshot,
};
use chrono::{DateTime, Utc};
use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Samples processed between cooperative yields of the worker
const DRAIN_BATCH: usize = 256;

/// Point-in-time collector counters
#[derive(Debug, Clone, serde::Serialize)]
pub struct CollectorStats {
    pub started_at: DateTime<Utc>,
    pub queue_length: usize,
    pub queue_capacity: usize,
    pub samples_processed: u64,
    pub samples_rejected: u64,
    pub samples_unknown_kind: u64,
    pub processing: ProcessingDurations,
    pub counter_series: usize,
    pub gauge_series: usize,
    pub histogram_series: usize,
}

/// Time spent folding samples into the stores, split by kind
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ProcessingDurations {
    pub counter: DurationSummary,
    pub gauge: DurationSummary,
    pub histogram: DurationSummary,
}

impl ProcessingDurations {
    /// Summaries paired with their kind, in exposition order
    pub fn by_kind(&self) -> [(SampleKind, DurationSummary); 3] {
        [
            (SampleKind::Counter, self.counter),
            (SampleKind::Gauge, self.gauge),
            (SampleKind::HistogramLinear, self.histogram),
        ]
    }
}

pub struct Collector {
    config: CollectorConfig,
    fingerprinter: Arc<dyn Fingerprinter>,

    ingress: ArrayQueue<Sample>,
    wakeup: Notify,

    counters: GuardedStore<CounterAccumulator>,
    gauges: GuardedStore<GaugeAccumulator>,
    histograms: GuardedStore<HistogramAccumulator>,

    shutdown: CancellationToken,
    started: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    started_at: DateTime<Utc>,

    processed: AtomicU64,
    rejected: AtomicU64,
    unknown_kind: AtomicU64,
    counter_timing: DurationRecorder,
    gauge_timing: DurationRecorder,
    histogram_timing: DurationRecorder,
}

impl Collector {
    /// Create a collector using the given fingerprint strategy
    pub fn new(config: CollectorConfig, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        Self {
            ingress: ArrayQueue::new(config.queue_capacity.max(1)),
            wakeup: Notify::new(),
            counters: GuardedStore::new(),
            gauges: GuardedStore::new(),
            histograms: GuardedStore::new(),
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
            worker: Mutex::new(None),
            started_at: Utc::now(),
            processed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            unknown_kind: AtomicU64::new(0),
            counter_timing: DurationRecorder::new(),
            gauge_timing: DurationRecorder::new(),
            histogram_timing: DurationRecorder::new(),
            config,
            fingerprinter,
        }
    }

    /// Create a collector whose strategy comes from `config.hasher`
    pub fn from_config(config: CollectorConfig) -> Self {
        let fingerprinter = config.hasher.build();
        Self::new(config, fingerprinter)
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn fingerprinter(&self) -> &dyn Fingerprinter {
        self.fingerprinter.as_ref()
    }

    /// Enqueue a sample without blocking.
    ///
    /// Returns [`TallyError::QueueFull`] when the queue has no free slot; the
    /// sample is dropped and it is up to the caller to retry or count it.
    pub fn submit(&self, sample: Sample) -> Result<()> {
        match self.ingress.push(sample) {
            Ok(()) => {
                self.wakeup.notify_one();
                Ok(())
            },
            Err(_) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                Err(TallyError::QueueFull)
            },
        }
    }

    /// Number of samples waiting for the worker
    pub fn pending(&self) -> usize {
        self.ingress.len()
    }

    /// Spawn the processing worker on the current tokio runtime
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(TallyError::AlreadyStarted);
        }

        let collector = Arc::clone(self);
        let handle = tokio::spawn(async move { collector.run_worker().await });
        *self.worker.lock() = Some(handle);

        tracing::info!(
            queue_capacity = self.ingress.capacity(),
            hasher = self.fingerprinter.name(),
            "Collector started"
        );
        Ok(())
    }

    /// Request shutdown and wait up to `timeout` for the worker to finish.
    ///
    /// Samples still queued when the worker observes the request are
    /// processed before it exits. On timeout the worker keeps running
    /// detached and [`TallyError::ShutdownTimeout`] is returned; calling
    /// `stop` again waits on the same worker.
    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        self.shutdown.cancel();

        let worker = self.worker.lock().take();
        let Some(mut handle) = worker else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(joined) => {
                joined?;
                tracing::info!(
                    processed = self.processed.load(Ordering::Relaxed),
                    "Collector stopped"
                );
                Ok(())
            },
            Err(_) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::error!(
                    timeout_ms,
                    pending = self.ingress.len(),
                    "Collector worker did not stop in time"
                );
                *self.worker.lock() = Some(handle);
                Err(TallyError::ShutdownTimeout { timeout_ms })
            },
        }
    }

    /// `stop` with the configured shutdown timeout
    pub async fn shutdown(&self) -> Result<()> {
        self.stop(self.config.shutdown_timeout).await
    }

    /// Export all series. Each store is read-locked on its own, so the
    /// result is not atomic across kinds.
    pub fn snapshot(&self) -> Vec<MetricSnapshot> {
        let mut metrics = self.counters.snapshot();
        metrics.extend(self.gauges.snapshot());
        metrics.extend(self.histograms.snapshot());
        metrics
    }

    pub fn stats(&self) -> CollectorStats {
        CollectorStats {
            started_at: self.started_at,
            queue_length: self.ingress.len(),
            queue_capacity: self.ingress.capacity(),
            samples_processed: self.processed.load(Ordering::Relaxed),
            samples_rejected: self.rejected.load(Ordering::Relaxed),
            samples_unknown_kind: self.unknown_kind.load(Ordering::Relaxed),
            processing: ProcessingDurations {
                counter: self.counter_timing.summary(),
                gauge: self.gauge_timing.summary(),
                histogram: self.histogram_timing.summary(),
            },
            counter_series: self.counters.len(),
            gauge_series: self.gauges.len(),
            histogram_series: self.histograms.len(),
        }
    }

    pub fn counters(&self) -> &GuardedStore<CounterAccumulator> {
        &self.counters
    }

    pub fn gauges(&self) -> &GuardedStore<GaugeAccumulator> {
        &self.gauges
    }

    pub fn histograms(&self) -> &GuardedStore<HistogramAccumulator> {
        &self.histograms
    }

    async fn run_worker(&self) {
        loop {
            self.drain().await;

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = self.wakeup.notified() => {},
            }
        }

        // whatever was queued when the stop request was seen
        let remaining = self.ingress.len();
        for _ in 0..remaining {
            match self.ingress.pop() {
                Some(sample) => self.process(&sample),
                None => break,
            }
        }

        tracing::debug!(drained = remaining, "Collector worker exiting");
    }

    /// Process queued samples until the queue is empty or shutdown is requested
    async fn drain(&self) {
        let mut batch = 0;
        while let Some(sample) = self.ingress.pop() {
            self.process(&sample);

            batch += 1;
            if batch == DRAIN_BATCH {
                batch = 0;
                if self.shutdown.is_cancelled() {
                    return;
                }
                tokio::task::yield_now().await;
            }
        }
    }

    fn process(&self, sample: &Sample) {
        let started = Instant::now();

        let (created, timing) = match sample.kind {
            SampleKind::Counter => (
                self.counters.record(self.fingerprinter.fingerprint(sample), sample),
                &self.counter_timing,
            ),
            SampleKind::Gauge => (
                self.gauges.record(self.fingerprinter.fingerprint(sample), sample),
                &self.gauge_timing,
            ),
            SampleKind::HistogramLinear => (
                self.histograms.record(self.fingerprinter.fingerprint(sample), sample),
                &self.histogram_timing,
            ),
            SampleKind::Unknown => {
                self.unknown_kind.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(name = %sample.name, "Dropping sample of unknown kind");
                return;
            },
        };

        if created {
            tracing::debug!(name = %sample.name, kind = %sample.kind, "New series");
        }

        self.processed.fetch_add(1, Ordering::Relaxed);
        timing.observe(started.elapsed());
    }
}

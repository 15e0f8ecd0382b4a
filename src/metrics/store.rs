//! Fingerprint-keyed accumulator map bundled with its reader-writer lock.
//!
//! The lock never escapes this type: callers get closures run under the
//! lock for exactly one map access, which keeps the single writer and
//! concurrent scrapers from holding it longer than needed.

use crate::fingerprint::Fingerprint;
use crate::metrics::types::{Accumulator, MetricSnapshot};
use crate::core::Sample;
use ahash::AHashMap;
use parking_lot::RwLock;

pub struct GuardedStore<A> {
    series: RwLock<AHashMap<Fingerprint, A>>,
}

impl<A: Accumulator> Default for GuardedStore<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Accumulator> GuardedStore<A> {
    pub fn new() -> Self {
        Self {
            series: RwLock::new(AHashMap::new()),
        }
    }

    /// Fold `sample` into the accumulator for `fingerprint`, creating it from
    /// the sample on first sight. Returns true when a new series was created.
    pub fn record(&self, fingerprint: Fingerprint, sample: &Sample) -> bool {
        let mut series = self.series.write();
        let mut created = false;
        let accumulator = series.entry(fingerprint).or_insert_with(|| {
            created = true;
            A::seed(sample)
        });
        accumulator.apply(sample.value);
        created
    }

    /// Run `f` against one accumulator under the read lock
    pub fn with<R>(&self, fingerprint: &Fingerprint, f: impl FnOnce(&A) -> R) -> Option<R> {
        self.series.read().get(fingerprint).map(f)
    }

    /// Export every series; holds the read lock for this store only
    pub fn snapshot(&self) -> Vec<MetricSnapshot> {
        self.series
            .read()
            .values()
            .map(MetricSnapshot::from_accumulator)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.series.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.read().is_empty()
    }
}

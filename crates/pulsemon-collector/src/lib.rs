//! Metric collection for the pulsemon agent.
//!
//! A [`Collector`] samples host statistics into the shared
//! [`MetricsCollection`]; the reporting side reads that collection on its
//! own cadence and resets what it delivered.

pub mod runtime;

use anyhow::Result;
use pulsemon_common::types::{Metric, MetricsSnapshot};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// A metric source run on every poll tick.
///
/// The trait requires `Send + Sync` so a collector can be shared with the
/// poll loop behind an `Arc`.
pub trait Collector: Send + Sync {
    /// Returns the collector name (e.g., `"runtime"`), used for logging.
    fn name(&self) -> &str;

    /// Samples current values into `collection`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system API call fails.
    fn collect(&self, collection: &MetricsCollection) -> Result<()>;
}

#[derive(Debug, Default)]
struct Entries {
    counters: BTreeMap<String, i64>,
    gauges: BTreeMap<String, f64>,
}

/// Agent-local counters and gauges between two report ticks.
///
/// Counters accumulate across polls until [`reset_counters`] subtracts what
/// was delivered; gauges keep their latest sample.
///
/// [`reset_counters`]: MetricsCollection::reset_counters
#[derive(Debug, Default)]
pub struct MetricsCollection {
    inner: Mutex<Entries>,
}

impl MetricsCollection {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_gauge(&self, name: impl Into<String>, value: f64) {
        self.lock().gauges.insert(name.into(), value);
    }

    /// Adds `delta` to the named counter, starting from 0.
    pub fn add_counter(&self, name: impl Into<String>, delta: i64) {
        *self.lock().counters.entry(name.into()).or_insert(0) += delta;
    }

    /// Copy of every pending metric, counters first, each kind sorted by name.
    pub fn snapshot(&self) -> Vec<Metric> {
        let entries = self.lock();
        entries
            .counters
            .iter()
            .map(|(name, delta)| Metric::counter(name.clone(), *delta))
            .chain(
                entries
                    .gauges
                    .iter()
                    .map(|(name, value)| Metric::gauge(name.clone(), *value)),
            )
            .collect()
    }

    /// Same contents as [`snapshot`](Self::snapshot) in storage form.
    pub fn to_snapshot(&self) -> MetricsSnapshot {
        let entries = self.lock();
        MetricsSnapshot {
            counters: entries
                .counters
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            gauges: entries.gauges.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }

    /// Subtracts delivered counter deltas. Counters that reach zero are
    /// dropped; increments made after `sent` was taken are kept.
    pub fn reset_counters(&self, sent: &[Metric]) {
        let mut entries = self.lock();
        for metric in sent {
            let Some(delta) = metric.delta else {
                continue;
            };
            if let Some(current) = entries.counters.get_mut(&metric.id) {
                *current -= delta;
                if *current == 0 {
                    entries.counters.remove(&metric.id);
                }
            }
        }
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.counters.clear();
        entries.gauges.clear();
    }

    pub fn len(&self) -> usize {
        let entries = self.lock();
        entries.counters.len() + entries.gauges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

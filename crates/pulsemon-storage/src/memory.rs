use crate::error::{Result, StorageError};
use crate::{validate_all, MetricsStorage};
use async_trait::async_trait;
use pulsemon_common::types::{Metric, MetricKind, MetricsSnapshot};
use std::sync::{Mutex, MutexGuard};

/// Process-local storage. Every operation runs under one mutex, so
/// read-modify-write of a counter never loses a concurrent increment.
#[derive(Default)]
pub struct MemStorage {
    inner: Mutex<MetricsSnapshot>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: MetricsSnapshot) -> Self {
        Self {
            inner: Mutex::new(snapshot),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricsSnapshot> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.lock().clone()
    }

    pub fn replace(&self, snapshot: MetricsSnapshot) {
        *self.lock() = snapshot;
    }

    pub(crate) fn apply(&self, metric: &Metric) -> Result<Metric> {
        metric.validate()?;
        Ok(self.lock().apply(metric)?)
    }

    pub(crate) fn apply_batch(&self, metrics: &[Metric]) -> Result<()> {
        validate_all(metrics)?;
        let mut guard = self.lock();
        // an overflowing counter rejects the batch, so apply to a copy first
        let mut next = guard.clone();
        for metric in metrics {
            next.apply(metric)?;
        }
        *guard = next;
        Ok(())
    }

    pub(crate) fn find(&self, name: &str, kind: MetricKind) -> Result<Metric> {
        self.lock()
            .get(name, kind)
            .ok_or_else(|| StorageError::NotFound {
                kind,
                name: name.to_string(),
            })
    }
}

#[async_trait]
impl MetricsStorage for MemStorage {
    async fn create_record(&self, metric: &Metric) -> Result<Metric> {
        self.apply(metric)
    }

    async fn get_record(&self, name: &str, kind: MetricKind) -> Result<Metric> {
        self.find(name, kind)
    }

    async fn get_all_records(&self) -> Result<MetricsSnapshot> {
        Ok(self.snapshot())
    }

    async fn store_metrics_batch(&self, metrics: &[Metric]) -> Result<()> {
        self.apply_batch(metrics)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

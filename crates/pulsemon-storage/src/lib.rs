//! Storage layer for counter and gauge metrics.
//!
//! Three backends implement [`MetricsStorage`]:
//! [`memory::MemStorage`] (a mutex-guarded map), [`file::FileStorage`]
//! (the memory backend plus a JSON snapshot file) and
//! [`database::DatabaseStorage`] (SeaORM, PostgreSQL in production).
//! [`open`] picks one from a [`StorageConfig`] at startup.

pub mod database;
pub mod entities;
pub mod error;
pub mod file;
pub mod memory;
pub mod retry;


use async_trait::async_trait;
use pulsemon_common::types::{Metric, MetricKind, MetricsSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;

/// Persistence backend for named counters and gauges.
///
/// Implementations must be safe to share across threads (`Send + Sync`)
/// because the storage is accessed from both the gRPC service and the
/// HTTP handlers concurrently.
#[async_trait]
pub trait MetricsStorage: Send + Sync {
    /// Stores one metric: counters add their delta to the existing value
    /// (0 if absent), gauges replace it. Returns the metric as stored.
    async fn create_record(&self, metric: &Metric) -> Result<Metric>;

    /// Looks up a metric by name and kind.
    ///
    /// # Errors
    ///
    /// Returns [`error::StorageError::NotFound`] when no such metric exists.
    async fn get_record(&self, name: &str, kind: MetricKind) -> Result<Metric>;

    /// Returns a copy of every stored metric.
    async fn get_all_records(&self) -> Result<MetricsSnapshot>;

    /// Returns a copy of every stored metric of one kind, keyed by name.
    async fn get_all_records_by_type(&self, kind: MetricKind) -> Result<HashMap<String, Metric>> {
        Ok(self.get_all_records().await?.by_kind(kind))
    }

    /// Applies `create_record` semantics to a whole slice as one logical
    /// operation. Nothing is written if any metric fails validation.
    async fn store_metrics_batch(&self, metrics: &[Metric]) -> Result<()>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Releases files, timers and connection pools.
    async fn close(&self) -> Result<()>;
}

/// Storage settings, usually part of the server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON snapshot file; enables the file-backed storage.
    #[serde(default)]
    pub store_path: Option<String>,
    /// Seconds between snapshot saves; 0 saves after every write.
    #[serde(default = "default_store_interval_secs")]
    pub store_interval_secs: u64,
    /// Load the snapshot file on startup.
    #[serde(default = "default_restore")]
    pub restore: bool,
    /// Database URL; takes precedence over `store_path`.
    #[serde(default)]
    pub database_dsn: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            store_interval_secs: default_store_interval_secs(),
            restore: default_restore(),
            database_dsn: None,
        }
    }
}

fn default_store_interval_secs() -> u64 {
    300
}

fn default_restore() -> bool {
    true
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Opens the backend selected by `config`: database when a DSN is set,
/// otherwise the snapshot file when a path is set, otherwise memory.
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn MetricsStorage>> {
    if let Some(dsn) = non_empty(&config.database_dsn) {
        let storage =
            database::DatabaseStorage::connect(dsn, &retry::RetryPolicy::default()).await?;
        return Ok(Arc::new(storage));
    }

    if let Some(path) = non_empty(&config.store_path) {
        let storage =
            file::FileStorage::open(path, config.store_interval_secs, config.restore).await?;
        return Ok(Arc::new(storage));
    }

    tracing::info!("Using in-memory metric storage");
    Ok(Arc::new(memory::MemStorage::new()))
}

/// Validates every metric before a batch touches the backend.
pub(crate) fn validate_all(metrics: &[Metric]) -> Result<()> {
    for metric in metrics {
        metric.validate()?;
    }
    Ok(())
}

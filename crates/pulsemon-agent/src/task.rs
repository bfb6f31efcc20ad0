use crate::reporter::Reporter;
use anyhow::Result;
use async_trait::async_trait;
use pulsemon_collector::MetricsCollection;
use std::sync::Arc;

/// A unit of work executed by the [`WorkerPool`](crate::pool::WorkerPool).
#[async_trait]
pub trait Task: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str {
        "task"
    }

    async fn process(&self) -> Result<()>;
}

/// Publishes everything currently in the collection to one server.
///
/// Counters that were delivered are subtracted from the collection
/// afterwards; gauges stay until the next poll overwrites them.
pub struct SendMetricsTask {
    reporter: Arc<dyn Reporter>,
    collection: Arc<MetricsCollection>,
    address: String,
}

impl SendMetricsTask {
    pub fn new(
        reporter: Arc<dyn Reporter>,
        collection: Arc<MetricsCollection>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            reporter,
            collection,
            address: address.into(),
        }
    }
}

#[async_trait]
impl Task for SendMetricsTask {
    fn name(&self) -> &str {
        "send-metrics"
    }

    async fn process(&self) -> Result<()> {
        let summary = self.reporter.send(&self.address).await?;
        self.collection.reset_counters(&summary.delivered);
        if summary.failed > 0 {
            tracing::warn!(
                address = %self.address,
                delivered = summary.delivered.len(),
                failed = summary.failed,
                "Some metrics were not delivered"
            );
        } else {
            tracing::debug!(
                address = %self.address,
                delivered = summary.delivered.len(),
                "Metrics reported"
            );
        }
        Ok(())
    }
}

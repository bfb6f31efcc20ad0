//! Publishing of the agent's metric collection.
//!
//! A [`MetricsReporter`] walks the collection and hands each metric to a
//! [`Transport`]. Metrics are published independently: one failure is
//! logged and counted, and the rest are still sent.

use async_trait::async_trait;
use pulsemon_collector::MetricsCollection;
use pulsemon_common::hash::{sign, HASH_HEADER};
use pulsemon_common::proto;
use pulsemon_common::proto::metrics_service_client::MetricsServiceClient;
use pulsemon_common::types::Metric;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;
use tonic::transport::Channel;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("invalid server address: {0:?}")]
    InvalidAddress(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("JSON encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("gRPC connect failed: {0}")]
    Connect(#[from] tonic::transport::Error),

    #[error("gRPC call failed: {0}")]
    Grpc(#[from] tonic::Status),
}

/// Outcome of one [`Reporter::send`] call.
#[derive(Debug, Default)]
pub struct SendSummary {
    /// Metrics the server accepted, as they were sent.
    pub delivered: Vec<Metric>,
    /// Number of metrics whose publish failed.
    pub failed: usize,
}

#[async_trait]
pub trait Reporter: Send + Sync {
    /// Publishes every metric of the local collection to `address`.
    ///
    /// Per-metric failures are only logged and counted; an error means
    /// nothing could be attempted at all.
    async fn send(&self, address: &str) -> Result<SendSummary, ReportError>;
}

/// Moves one metric to the server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, address: &str, metric: &Metric) -> Result<(), ReportError>;
}

pub struct MetricsReporter<T> {
    collection: Arc<MetricsCollection>,
    transport: T,
}

impl<T: Transport> MetricsReporter<T> {
    pub fn new(collection: Arc<MetricsCollection>, transport: T) -> Self {
        Self {
            collection,
            transport,
        }
    }
}

#[async_trait]
impl<T: Transport> Reporter for MetricsReporter<T> {
    async fn send(&self, address: &str) -> Result<SendSummary, ReportError> {
        if address.trim().is_empty() {
            return Err(ReportError::InvalidAddress(address.to_string()));
        }

        let mut summary = SendSummary::default();
        for metric in self.collection.snapshot() {
            match self.transport.publish(address, &metric).await {
                Ok(()) => summary.delivered.push(metric),
                Err(e) => {
                    tracing::warn!(
                        metric = %metric.id,
                        kind = %metric.kind,
                        error = %e,
                        "Failed to publish metric"
                    );
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }
}

/// Adds `http://` when the address carries no scheme.
fn base_url(address: &str) -> String {
    let addr = address.trim().trim_end_matches('/');
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("http://{addr}")
    }
}

/// `{base}/update/{type}/{name}/{value}` with each segment percent-encoded.
fn update_path_url(address: &str, metric: &Metric) -> Result<reqwest::Url, ReportError> {
    let invalid = || ReportError::InvalidAddress(address.to_string());
    let kind = metric.kind.to_string();
    let value = metric.value_text();
    let mut url = reqwest::Url::parse(&base_url(address)).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .extend(["update", kind.as_str(), metric.id.as_str(), value.as_str()]);
    Ok(url)
}

/// Request body encoding used by [`HttpTransport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMode {
    /// `POST /update/{type}/{name}/{value}` with an empty `text/plain` body.
    #[default]
    Path,
    /// `POST /update/` with the metric as JSON.
    Json,
}

pub struct HttpTransport {
    client: reqwest::Client,
    mode: HttpMode,
    key: Option<String>,
}

impl HttpTransport {
    /// With a `key`, every request body is signed into the `HashSHA256` header.
    pub fn new(mode: HttpMode, key: Option<String>) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, mode, key })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn publish(&self, address: &str, metric: &Metric) -> Result<(), ReportError> {
        let (url, body, content_type) = match self.mode {
            HttpMode::Path => (update_path_url(address, metric)?, Vec::new(), "text/plain"),
            HttpMode::Json => (
                reqwest::Url::parse(&format!("{}/update/", base_url(address)))
                    .map_err(|_| ReportError::InvalidAddress(address.to_string()))?,
                serde_json::to_vec(metric)?,
                "application/json",
            ),
        };

        let mut request = self.client.post(url).header(CONTENT_TYPE, content_type);
        if let Some(key) = &self.key {
            request = request.header(HASH_HEADER, sign(key, &body));
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Publishes through the `CreateMetric` RPC, reusing one connection.
#[derive(Default)]
pub struct GrpcTransport {
    client: Mutex<Option<MetricsServiceClient<Channel>>>,
}

impl GrpcTransport {
    pub fn new() -> Self {
        Self::default()
    }

    async fn client(&self, address: &str) -> Result<MetricsServiceClient<Channel>, ReportError> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = MetricsServiceClient::connect(base_url(address)).await?;
        tracing::info!(address, "Connected to gRPC server");
        *guard = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn publish(&self, address: &str, metric: &Metric) -> Result<(), ReportError> {
        let mut client = self.client(address).await?;
        match client.create_metric(proto::Metric::from(metric)).await {
            Ok(_) => Ok(()),
            Err(status) => {
                if status.code() == tonic::Code::Unavailable {
                    // Force reconnect
                    *self.client.lock().await = None;
                }
                Err(status.into())
            }
        }
    }
}

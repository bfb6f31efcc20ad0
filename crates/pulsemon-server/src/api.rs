use crate::logging::TraceId;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use pulsemon_common::types::{Metric, MetricError, MetricKind};
use pulsemon_storage::error::StorageError;
use serde::{Deserialize, Serialize};

/// Handler failure, rendered as a status code with a short plain-text body.
///
/// Storage failures are logged in full but answered with a generic 500.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("storage failure: {0}")]
    Storage(StorageError),
}

impl From<MetricError> for ApiError {
    fn from(e: MetricError) -> Self {
        match e {
            MetricError::MissingName => ApiError::NotFound(e.to_string()),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            StorageError::InvalidMetric(inner) => inner.into(),
            other => ApiError::Storage(other),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("malformed JSON body: {e}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            ApiError::Storage(e) => {
                tracing::error!(error = %e, "Storage operation failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Body of `POST /value/`.
#[derive(Debug, Deserialize)]
pub struct MetricQuery {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponse {
    pub message: String,
}

pub fn metric_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_metrics))
        .route("/ping", get(ping))
        .route("/update/", post(update_json))
        .route("/updates/", post(update_batch))
        .route("/update/:kind/:name/:value", post(update_path))
        .route("/value/", post(value_json))
        .route("/value/:kind/:name", get(value_path))
}

fn parse_kind(raw: &str) -> ApiResult<MetricKind> {
    raw.parse::<MetricKind>().map_err(ApiError::from)
}

async fn update_path(
    State(state): State<AppState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> ApiResult<String> {
    let kind = parse_kind(&kind)?;
    let metric = Metric::parse_path(kind, &name, &value)?;
    let stored = state.storage.create_record(&metric).await?;
    tracing::debug!(metric = %stored.id, kind = %stored.kind, value = %stored.value_text(), "Metric updated");
    Ok(stored.value_text())
}

async fn value_path(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> ApiResult<String> {
    let kind = parse_kind(&kind)?;
    let metric = state.storage.get_record(&name, kind).await?;
    Ok(metric.value_text())
}

async fn update_json(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Metric>> {
    let metric: Metric = serde_json::from_slice(&body)?;
    let stored = state.storage.create_record(&metric).await?;
    Ok(Json(stored))
}

async fn update_batch(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<BatchResponse>> {
    let metrics: Vec<Metric> = serde_json::from_slice(&body)?;
    state.storage.store_metrics_batch(&metrics).await?;
    tracing::debug!(trace_id = %trace_id.0, count = metrics.len(), "Metric batch stored");
    Ok(Json(BatchResponse {
        message: format!("stored {} metrics", metrics.len()),
    }))
}

async fn value_json(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Metric>> {
    let query: MetricQuery = serde_json::from_slice(&body)?;
    let metric = state.storage.get_record(&query.id, query.kind).await?;
    Ok(Json(metric))
}

async fn ping(State(state): State<AppState>) -> ApiResult<&'static str> {
    state.storage.ping().await?;
    Ok("OK")
}

/// Plain-text listing, one `name value` line per metric.
async fn list_metrics(State(state): State<AppState>) -> ApiResult<String> {
    let snapshot = state.storage.get_all_records().await?;
    let mut out = String::new();
    for metric in snapshot.to_metrics() {
        out.push_str(&metric.id);
        out.push(' ');
        out.push_str(&metric.value_text());
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_to_status_codes() {
        let not_found: ApiError = StorageError::NotFound {
            kind: MetricKind::Gauge,
            name: "cpu".into(),
        }
        .into();
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let invalid: ApiError =
            StorageError::InvalidMetric(MetricError::ValueMismatch("x".into())).into();
        assert_eq!(invalid.into_response().status(), StatusCode::BAD_REQUEST);

        let missing: ApiError = StorageError::InvalidMetric(MetricError::MissingName).into();
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let io: ApiError = StorageError::Io(std::io::Error::other("disk full")).into();
        assert_eq!(io.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use pulsemon_common::hash::HASH_HEADER;
use pulsemon_server::app;
use pulsemon_server::config::ServerConfig;
use pulsemon_server::state::AppState;
use pulsemon_storage::file::FileStorage;
use pulsemon_storage::memory::MemStorage;
use pulsemon_storage::MetricsStorage;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
}

fn context_with(storage: Arc<dyn MetricsStorage>, key: Option<&str>, temp_dir: TempDir) -> TestContext {
    let config = ServerConfig {
        key: key.map(str::to_string),
        ..ServerConfig::default()
    };
    let state = AppState::new(storage, config);
    let app = app::build_http_app(state.clone());
    TestContext {
        temp_dir,
        state,
        app,
    }
}

pub fn build_test_context() -> Result<TestContext> {
    Ok(context_with(Arc::new(MemStorage::new()), None, tempfile::tempdir()?))
}

pub fn build_signed_context(key: &str) -> Result<TestContext> {
    Ok(context_with(Arc::new(MemStorage::new()), Some(key), tempfile::tempdir()?))
}

/// Context over a synchronously saved snapshot file inside the temp dir.
pub async fn build_file_context() -> Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let storage = FileStorage::open(temp_dir.path().join("metrics.json"), 0, true).await?;
    Ok(context_with(Arc::new(storage), None, temp_dir))
}

pub struct TestResponse {
    pub status: StatusCode,
    pub text: String,
    pub hash: Option<String>,
    pub trace_id: Option<String>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.text).unwrap_or(Value::Null)
    }
}

pub async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: &str,
    hash: Option<&str>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if !body.is_empty() {
        builder = builder.header("Content-Type", "application/json");
    }
    if let Some(hash) = hash {
        builder = builder.header(HASH_HEADER, hash);
    }
    let req = builder
        .body(Body::from(body.to_string()))
        .expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let header = |name: &str| {
        resp.headers()
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string())
    };
    let hash = header(HASH_HEADER);
    let trace_id = header("x-trace-id");
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");

    TestResponse {
        status,
        text: String::from_utf8_lossy(&bytes).to_string(),
        hash,
        trace_id,
    }
}

pub async fn post(app: &axum::Router, uri: &str) -> TestResponse {
    send(app, "POST", uri, "", None).await
}

pub async fn get(app: &axum::Router, uri: &str) -> TestResponse {
    send(app, "GET", uri, "", None).await
}

pub async fn post_json(app: &axum::Router, uri: &str, body: &Value) -> TestResponse {
    send(app, "POST", uri, &body.to_string(), None).await
}

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use pulsemon_common::hash::HASH_HEADER;
use std::time::Instant;
use tracing::Instrument;

/// Header carrying the request trace id in both directions.
pub const TRACE_HEADER: &str = "x-trace-id";

const MAX_TRACE_ID_LEN: usize = 64;

/// Per-request trace id, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceId(pub String);

impl TraceId {
    /// Random 16 hex character id.
    pub fn generate() -> Self {
        TraceId(hex::encode(rand::random::<[u8; 8]>()))
    }

    /// Reuses the caller's `X-Trace-Id` when it is a plausible id, so a
    /// report can be followed from agent to server; otherwise a new one.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(TRACE_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|id| is_valid_trace_id(id))
            .map(|id| TraceId(id.to_owned()))
            .unwrap_or_else(TraceId::generate)
    }
}

fn is_valid_trace_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_TRACE_ID_LEN
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

/// Wraps every request in an `http` span carrying the trace id.
///
/// Logs one line when the request arrives and one when it completes, with
/// the level picked from the status class, and echoes the id back in
/// `X-Trace-Id`.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = TraceId::from_headers(req.headers());
    req.extensions_mut().insert(trace_id.clone());

    let span = tracing::info_span!(
        "http",
        trace_id = %trace_id.0,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        tracing::debug!(
            signed = req.headers().contains_key(HASH_HEADER),
            content_length = req
                .headers()
                .get(axum::http::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("0"),
            "request received"
        );

        let start = Instant::now();
        let mut response = next.run(req).await;
        log_completion(response.status(), start.elapsed().as_secs_f64() * 1000.0);

        if let Ok(value) = HeaderValue::from_str(&trace_id.0) {
            response.headers_mut().insert(TRACE_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}

fn log_completion(status: StatusCode, elapsed_ms: f64) {
    let code = status.as_u16();
    if status.is_server_error() {
        tracing::error!(status = code, elapsed_ms, "request failed");
    } else if status.is_client_error() {
        tracing::warn!(status = code, elapsed_ms, "request rejected");
    } else {
        tracing::info!(status = code, elapsed_ms, "request handled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/echo",
                get(|Extension(id): Extension<TraceId>| async move { id.0 }),
            )
            .layer(middleware::from_fn(request_logging))
    }

    async fn call(trace: Option<&str>) -> (String, String) {
        let mut builder = axum::http::Request::get("/echo");
        if let Some(trace) = trace {
            builder = builder.header(TRACE_HEADER, trace);
        }
        let response = app()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let header = response.headers()[TRACE_HEADER].to_str().unwrap().to_string();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        (header, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn generated_ids_are_sixteen_hex_chars() {
        let id = TraceId::generate();
        assert_eq!(id.0.len(), 16);
        assert!(id.0.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, TraceId::generate());
    }

    #[test]
    fn trace_id_validation() {
        assert!(is_valid_trace_id("agent-4f2a"));
        assert!(!is_valid_trace_id(""));
        assert!(!is_valid_trace_id("has space"));
        assert!(!is_valid_trace_id(&"a".repeat(MAX_TRACE_ID_LEN + 1)));
    }

    #[tokio::test]
    async fn handler_sees_the_echoed_id() {
        let (header, body) = call(None).await;
        assert_eq!(header.len(), 16);
        assert_eq!(header, body);
    }

    #[tokio::test]
    async fn incoming_trace_id_is_reused() {
        let (header, body) = call(Some("agent-report-7")).await;
        assert_eq!(header, "agent-report-7");
        assert_eq!(body, "agent-report-7");

        let (header, _) = call(Some("bad id!")).await;
        assert_ne!(header, "bad id!");
        assert_eq!(header.len(), 16);
    }
}

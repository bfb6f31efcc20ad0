use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use pulsemon_common::hash::{sign, verify, HASH_HEADER};

use crate::logging::TraceId;
use crate::state::AppState;

/// Largest request body the integrity check will buffer.
const MAX_SIGNED_BODY: usize = 4 * 1024 * 1024;

/// Middleware that checks the `HashSHA256` request header.
///
/// Without a configured key every request passes untouched. With a key,
/// a request whose header is present but does not match the HMAC of its
/// body is rejected with 400 before any handler runs; requests without
/// the header pass. JSON responses are signed with the same key.
pub async fn hash_check(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let Some(key) = state.key().map(str::to_owned) else {
        return next.run(req).await;
    };

    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let (parts, body) = req.into_parts();
    let body = match to_bytes(body, MAX_SIGNED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(trace_id = %trace_id, error = %e, "Request body could not be read");
            return (StatusCode::BAD_REQUEST, "unreadable request body").into_response();
        }
    };

    if let Some(signature) = parts.headers.get(HASH_HEADER) {
        let valid = signature
            .to_str()
            .map(|s| verify(&key, &body, s))
            .unwrap_or(false);
        if !valid {
            tracing::warn!(
                trace_id = %trace_id,
                path = %parts.uri.path(),
                "Request rejected: HashSHA256 mismatch"
            );
            return (StatusCode::BAD_REQUEST, "hash mismatch").into_response();
        }
    }

    let response = next.run(Request::from_parts(parts, Body::from(body))).await;
    sign_response(&key, response).await
}

async fn sign_response(key: &str, response: Response) -> Response {
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if !is_json {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Response body could not be read for signing");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response();
        }
    };
    if let Ok(value) = HeaderValue::from_str(&sign(key, &bytes)) {
        parts.headers.insert(HASH_HEADER, value);
    }
    Response::from_parts(parts, Body::from(bytes))
}

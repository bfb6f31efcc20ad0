mod common;

use axum::http::StatusCode;
use common::{
    build_file_context, build_signed_context, build_test_context, get, post, post_json, send,
};
use pulsemon_common::hash::{sign, verify};
use pulsemon_common::types::MetricKind;
use pulsemon_storage::file::load_from_file;
use serde_json::json;

#[tokio::test]
async fn counter_updates_accumulate() {
    let ctx = build_test_context().expect("test context should build");

    assert_eq!(post(&ctx.app, "/update/counter/requests/10").await.status, StatusCode::OK);
    let res = post(&ctx.app, "/update/counter/requests/5").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.text, "15");
    assert!(res.trace_id.is_some());

    let res = get(&ctx.app, "/value/counter/requests").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.text, "15");
}

#[tokio::test]
async fn gauge_updates_replace() {
    let ctx = build_test_context().expect("test context should build");

    post(&ctx.app, "/update/gauge/cpu/0.75").await;
    post(&ctx.app, "/update/gauge/cpu/0.40").await;

    let res = get(&ctx.app, "/value/gauge/cpu").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.text, "0.4");
}

#[tokio::test]
async fn missing_value_is_not_found() {
    let ctx = build_test_context().expect("test context should build");

    let res = post(&ctx.app, "/update/counter/requests/").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = post(&ctx.app, "/update/counter/").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bad_type_or_value_is_bad_request() {
    let ctx = build_test_context().expect("test context should build");

    for uri in [
        "/update/unsupported/x/1",
        "/update/Counter/x/1",
        "/update/counter/x/1.5",
        "/update/counter/x/abc",
        "/update/gauge/x/NaN",
        "/update/gauge/x/none",
    ] {
        let res = post(&ctx.app, uri).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST, "{uri}");
    }

    let res = get(&ctx.app, "/value/unsupported/x").await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_metric_is_not_found() {
    let ctx = build_test_context().expect("test context should build");

    post(&ctx.app, "/update/gauge/cpu/1").await;
    assert_eq!(get(&ctx.app, "/value/gauge/memory").await.status, StatusCode::NOT_FOUND);
    // same name, other kind
    assert_eq!(get(&ctx.app, "/value/counter/cpu").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn json_update_and_value() {
    let ctx = build_test_context().expect("test context should build");

    let res = post_json(
        &ctx.app,
        "/update/",
        &json!({"id": "requests", "type": "counter", "delta": 7}),
    )
    .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json(), json!({"id": "requests", "type": "counter", "delta": 7}));

    post_json(
        &ctx.app,
        "/update/",
        &json!({"id": "requests", "type": "counter", "delta": 3}),
    )
    .await;

    let res = post_json(&ctx.app, "/value/", &json!({"id": "requests", "type": "counter"})).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["delta"], 10);

    let res = post_json(&ctx.app, "/value/", &json!({"id": "missing", "type": "gauge"})).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn json_update_validation() {
    let ctx = build_test_context().expect("test context should build");

    // counter carrying a gauge value
    let res = post_json(
        &ctx.app,
        "/update/",
        &json!({"id": "requests", "type": "counter", "value": 1.0}),
    )
    .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = post_json(&ctx.app, "/update/", &json!({"id": "", "type": "gauge", "value": 1.0})).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = send(&ctx.app, "POST", "/update/", "{not json", None).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let all = ctx.state.storage.get_all_records().await.unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn batch_update_stores_everything() {
    let ctx = build_test_context().expect("test context should build");

    let batch = json!([
        {"id": "requests", "type": "counter", "delta": 1},
        {"id": "requests", "type": "counter", "delta": 2},
        {"id": "cpu", "type": "gauge", "value": 0.5},
    ]);
    let res = post_json(&ctx.app, "/updates/", &batch).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["message"], "stored 3 metrics");

    let stored = ctx
        .state
        .storage
        .get_record("requests", MetricKind::Counter)
        .await
        .unwrap();
    assert_eq!(stored.delta, Some(3));
}

#[tokio::test]
async fn invalid_batch_changes_nothing() {
    let ctx = build_test_context().expect("test context should build");

    let batch = json!([
        {"id": "requests", "type": "counter", "delta": 1},
        {"id": "cpu", "type": "gauge"},
    ]);
    let res = post_json(&ctx.app, "/updates/", &batch).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(ctx.state.storage.get_all_records().await.unwrap().is_empty());
}

#[tokio::test]
async fn hash_mismatch_rejects_batch_and_leaves_storage_unchanged() {
    let ctx = build_signed_context("secret").expect("test context should build");

    let body = json!([{"id": "requests", "type": "counter", "delta": 5}]).to_string();
    let wrong = sign("other-secret", body.as_bytes());
    let res = send(&ctx.app, "POST", "/updates/", &body, Some(&wrong)).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(ctx.state.storage.get_all_records().await.unwrap().is_empty());

    let right = sign("secret", body.as_bytes());
    let res = send(&ctx.app, "POST", "/updates/", &body, Some(&right)).await;
    assert_eq!(res.status, StatusCode::OK);
    let hash = res.hash.as_deref().expect("JSON response should be signed");
    assert!(verify("secret", res.text.as_bytes(), hash));
}

#[tokio::test]
async fn listing_and_ping() {
    let ctx = build_test_context().expect("test context should build");

    post(&ctx.app, "/update/gauge/cpu/0.5").await;
    post(&ctx.app, "/update/counter/requests/2").await;
    post(&ctx.app, "/update/gauge/alloc/12").await;

    let res = get(&ctx.app, "/").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.text, "requests 2\nalloc 12\ncpu 0.5\n");

    let res = get(&ctx.app, "/ping").await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn file_backend_persists_every_write() {
    let ctx = build_file_context().await.expect("test context should build");

    post(&ctx.app, "/update/counter/requests/4").await;
    post(&ctx.app, "/update/gauge/cpu/0.25").await;

    let snapshot = load_from_file(&ctx.temp_dir.path().join("metrics.json"))
        .await
        .unwrap()
        .expect("snapshot should exist");
    assert_eq!(snapshot.counters.get("requests"), Some(&4));
    assert_eq!(snapshot.gauges.get("cpu"), Some(&0.25));
}

#[tokio::test]
async fn counter_overflow_is_bad_request() {
    let ctx = build_test_context().expect("test context should build");

    let max = format!("/update/counter/requests/{}", i64::MAX);
    assert_eq!(post(&ctx.app, &max).await.status, StatusCode::OK);
    let res = post(&ctx.app, "/update/counter/requests/1").await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = get(&ctx.app, "/value/counter/requests").await;
    assert_eq!(res.text, i64::MAX.to_string());
}

mod common;

use common::build_test_context;
use pulsemon_common::proto::metrics_service_server::MetricsService;
use pulsemon_common::proto::{self, Empty, MetricId, MetricList, MetricType};
use pulsemon_common::types::Metric;
use pulsemon_server::grpc::MetricsServiceImpl;
use tonic::{Code, Request};

fn counter(id: &str, delta: i64) -> proto::Metric {
    proto::Metric::from(&Metric::counter(id, delta))
}

fn gauge(id: &str, value: f64) -> proto::Metric {
    proto::Metric::from(&Metric::gauge(id, value))
}

#[tokio::test]
async fn create_and_get_metric() {
    let ctx = build_test_context().expect("test context should build");
    let service = MetricsServiceImpl::new(ctx.state.clone());

    service
        .create_metric(Request::new(counter("requests", 10)))
        .await
        .expect("create should succeed");
    let resp = service
        .create_metric(Request::new(counter("requests", 5)))
        .await
        .expect("create should succeed")
        .into_inner();
    assert_eq!(resp.message, "counter requests = 15");

    let metric = service
        .get_metric(Request::new(MetricId {
            id: "requests".into(),
            r#type: MetricType::Counter as i32,
        }))
        .await
        .expect("metric should exist")
        .into_inner();
    assert_eq!(metric.delta, Some(15));
    assert_eq!(metric.value, None);
}

#[tokio::test]
async fn create_metrics_batch_and_list() {
    let ctx = build_test_context().expect("test context should build");
    let service = MetricsServiceImpl::new(ctx.state.clone());

    service
        .create_metrics(Request::new(MetricList {
            metrics: vec![counter("requests", 2), gauge("cpu", 0.75), gauge("cpu", 0.40)],
        }))
        .await
        .expect("batch should succeed");

    let list = service
        .get_metrics(Request::new(Empty {}))
        .await
        .expect("list should succeed")
        .into_inner();
    let metrics: Vec<Metric> = list
        .metrics
        .into_iter()
        .map(|m| Metric::try_from(m).unwrap())
        .collect();
    assert_eq!(
        metrics,
        vec![Metric::counter("requests", 2), Metric::gauge("cpu", 0.40)]
    );
}

#[tokio::test]
async fn invalid_input_maps_to_invalid_argument() {
    let ctx = build_test_context().expect("test context should build");
    let service = MetricsServiceImpl::new(ctx.state.clone());

    let mut no_delta = counter("requests", 1);
    no_delta.delta = None;
    let status = service
        .create_metric(Request::new(no_delta))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let mut unspecified = gauge("cpu", 1.0);
    unspecified.r#type = MetricType::Unspecified as i32;
    let status = service
        .create_metrics(Request::new(MetricList {
            metrics: vec![counter("requests", 1), unspecified],
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let status = service
        .get_metric(Request::new(MetricId {
            id: String::new(),
            r#type: MetricType::Gauge as i32,
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    // rejected batch stored nothing
    assert!(ctx.state.storage.get_all_records().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_metric_is_not_found() {
    let ctx = build_test_context().expect("test context should build");
    let service = MetricsServiceImpl::new(ctx.state.clone());

    let status = service
        .get_metric(Request::new(MetricId {
            id: "cpu".into(),
            r#type: MetricType::Gauge as i32,
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
}

#[tokio::test]
async fn non_finite_gauge_is_invalid_argument() {
    let ctx = build_test_context().expect("test context should build");
    let service = MetricsServiceImpl::new(ctx.state.clone());

    for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let status = service
            .create_metric(Request::new(gauge("cpu", value)))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    let status = service
        .create_metrics(Request::new(MetricList {
            metrics: vec![gauge("cpu", 0.5), gauge("memory", f64::NAN)],
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert!(ctx.state.storage.get_all_records().await.unwrap().is_empty());
}

#[tokio::test]
async fn counter_overflow_is_invalid_argument() {
    let ctx = build_test_context().expect("test context should build");
    let service = MetricsServiceImpl::new(ctx.state.clone());

    service
        .create_metric(Request::new(counter("requests", i64::MAX)))
        .await
        .expect("create should succeed");
    let status = service
        .create_metric(Request::new(counter("requests", 1)))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let metric = service
        .get_metric(Request::new(MetricId {
            id: "requests".into(),
            r#type: MetricType::Counter as i32,
        }))
        .await
        .expect("metric should exist")
        .into_inner();
    assert_eq!(metric.delta, Some(i64::MAX));
}

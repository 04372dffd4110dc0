//! Integration tests for the HTTP surface.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use accrual::{CircuitBreaker, CircuitBreakerConfig};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use server::AppState;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup(breaker: CircuitBreaker) -> axum::Router {
    server::create_app(Arc::new(AppState::new(breaker)), get_metrics_handle())
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_check() {
    let app = setup(CircuitBreaker::new(CircuitBreakerConfig::default()));

    let (status, json) = get_json(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["accrual_circuit"], "closed");
}

#[tokio::test]
async fn test_health_reports_open_circuit() {
    let breaker = CircuitBreaker::new(
        CircuitBreakerConfig::new("health-test")
            .with_failure_threshold(1)
            .with_cooldown(Duration::from_secs(60)),
    );
    let admission = breaker.allow_request().unwrap();
    breaker.record_failure(admission);
    let app = setup(breaker);

    let (status, json) = get_json(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["accrual_circuit"], "open");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup(CircuitBreaker::new(CircuitBreakerConfig::default()));
    metrics::counter!("reconciliation_cycles_total").increment(1);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("reconciliation_cycles_total"));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = setup(CircuitBreaker::new(CircuitBreakerConfig::default()));

    let response = app
        .oneshot(Request::builder().uri("/orders").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

//! HTTP probe, metrics and webhook tests against a local stub server

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use deployctl::deploy::notify::{Notifier, WebhookNotifier};
use deployctl::errors::DeployError;
use deployctl::models::event::NotificationEvent;
use deployctl::models::request::{DeploymentRequest, Environment, StrategyKind};
use deployctl::models::status::{DeploymentStatus, HealthState, PerformanceMetrics};
use deployctl::probe::health::{probe_all, HealthProbe, HttpHealthProbe};
use deployctl::probe::metrics::{HttpMetricsCollector, MetricsCollector, MetricsQuery};
use deployctl::storage::settings::{MetricsFallback, MetricsSettings, ServiceEndpoint};

type Captured = Arc<Mutex<Vec<(Option<String>, Value)>>>;

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn health_routes() -> Router {
    Router::new()
        .route("/healthy", get(|| async { Json(json!({ "healthy": true, "version": "v2" })) }))
        .route("/degraded", get(|| async { Json(json!({ "healthy": false, "db": "slow" })) }))
        .route("/plain", get(|| async { "OK" }))
        .route(
            "/broken",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({ "healthy": true }))
            }),
        )
}

async fn metrics_echo(Json(query): Json<MetricsQuery>) -> Json<PerformanceMetrics> {
    Json(PerformanceMetrics {
        avg_response_time_ms: query.time_range_minutes as f64,
        requests_per_second: query.services.len() as f64,
        error_count: 3,
        success_rate: 99.5,
    })
}

async fn capture(
    State(seen): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    seen.lock().unwrap().push((auth, body));
    StatusCode::NO_CONTENT
}

#[tokio::test]
async fn test_probe_classification() {
    let base = serve(health_routes()).await;
    let probe = HttpHealthProbe::new().unwrap();
    let timeout = Duration::from_millis(500);

    let healthy = probe.check("api", &format!("{}/healthy", base), timeout).await;
    assert_eq!(healthy.status, HealthState::Healthy);
    assert_eq!(healthy.details["version"], "v2");

    let degraded = probe.check("api", &format!("{}/degraded", base), timeout).await;
    assert_eq!(degraded.status, HealthState::Degraded);

    let plain = probe.check("api", &format!("{}/plain", base), timeout).await;
    assert_eq!(plain.status, HealthState::Degraded);
    assert_eq!(plain.details["body"], "OK");

    let broken = probe.check("api", &format!("{}/broken", base), timeout).await;
    assert_eq!(broken.status, HealthState::Unhealthy);
    assert_eq!(broken.details["status_code"], 500);
}

#[tokio::test]
async fn test_probe_timeout_is_unhealthy() {
    let base = serve(health_routes()).await;
    let probe = HttpHealthProbe::new().unwrap();

    let slow = probe
        .check("worker", &format!("{}/slow", base), Duration::from_millis(100))
        .await;
    assert_eq!(slow.status, HealthState::Unhealthy);
    assert!(slow.response_time_ms < 2_000);
    assert!(slow.details["error"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_probe_all_keeps_target_order() {
    let base = serve(health_routes()).await;
    let probe = HttpHealthProbe::new().unwrap();

    let targets = vec![
        ServiceEndpoint::new("slow", &format!("{}/slow", base)),
        ServiceEndpoint::new("api", &format!("{}/healthy", base)),
        ServiceEndpoint::new("worker", &format!("{}/degraded", base)),
    ];
    let results = probe_all(&probe, &targets, Duration::from_millis(300)).await;

    let names: Vec<&str> = results.iter().map(|r| r.service.as_str()).collect();
    assert_eq!(names, vec!["slow", "api", "worker"]);
    assert_eq!(
        results.iter().map(|r| r.status).collect::<Vec<_>>(),
        vec![HealthState::Unhealthy, HealthState::Healthy, HealthState::Degraded]
    );
}

#[tokio::test]
async fn test_metrics_query_and_response() {
    let base = serve(Router::new().route("/metrics", post(metrics_echo))).await;

    let collector = HttpMetricsCollector::new(
        &format!("{}/metrics", base),
        vec!["api".to_string(), "worker".to_string()],
        &MetricsSettings::default(),
    )
    .unwrap();

    let metrics = collector.collect(Duration::from_secs(300)).await.unwrap();
    assert_eq!(metrics.avg_response_time_ms, 5.0);
    assert_eq!(metrics.requests_per_second, 2.0);
    assert!((metrics.error_rate() - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_metrics_backend_error_respects_fallback() {
    let base = serve(Router::new().route(
        "/metrics",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "down") }),
    ))
    .await;
    let endpoint = format!("{}/metrics", base);

    let strict = HttpMetricsCollector::new(
        &endpoint,
        vec![],
        &MetricsSettings {
            fallback: MetricsFallback::Fail,
            ..Default::default()
        },
    )
    .unwrap();
    assert!(matches!(
        strict.collect(Duration::from_secs(60)).await,
        Err(DeployError::MetricsCollection(_))
    ));

    let optimistic = HttpMetricsCollector::new(&endpoint, vec![], &MetricsSettings::default()).unwrap();
    assert_eq!(
        optimistic.collect(Duration::from_secs(60)).await.unwrap(),
        PerformanceMetrics::optimistic()
    );
}

#[tokio::test]
async fn test_webhook_posts_event_with_token() {
    let seen: Captured = Arc::new(Mutex::new(Vec::new()));
    let base = serve(
        Router::new()
            .route("/hook", post(capture))
            .with_state(seen.clone()),
    )
    .await;

    let request = DeploymentRequest {
        environment: Environment::Production,
        version: "v2.0.0".to_string(),
        strategy: StrategyKind::Canary,
        health_check_timeout_ms: 5_000,
        rollback_threshold_error_rate: 0.5,
        validation_steps: vec![],
        post_deployment_tests: vec![],
    };
    let event = NotificationEvent::from_status(&DeploymentStatus::new("deploy-1", &request));

    let notifier =
        WebhookNotifier::new(&format!("{}/hook", base), Some("s3cret".to_string())).unwrap();
    notifier.notify(&event).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (auth, body) = &seen[0];
    assert_eq!(auth.as_deref(), Some("Bearer s3cret"));
    assert_eq!(body["deployment_id"], "deploy-1");
    assert_eq!(body["environment"], "production");
    assert_eq!(body["version"], "v2.0.0");
}

#[tokio::test]
async fn test_webhook_error_status_is_reported() {
    let base = serve(Router::new().route(
        "/hook",
        post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    ))
    .await;

    let request = DeploymentRequest {
        environment: Environment::Staging,
        version: "v2.0.0".to_string(),
        strategy: StrategyKind::Rolling,
        health_check_timeout_ms: 5_000,
        rollback_threshold_error_rate: 1.0,
        validation_steps: vec![],
        post_deployment_tests: vec![],
    };
    let event = NotificationEvent::from_status(&DeploymentStatus::new("deploy-2", &request));

    let notifier = WebhookNotifier::new(&format!("{}/hook", base), None).unwrap();
    assert!(matches!(
        notifier.notify(&event).await,
        Err(DeployError::HttpStatus(_))
    ));
}

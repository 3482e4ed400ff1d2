//! HTTP health probes
//!
//! A probe performs one bounded `GET` against a service health endpoint
//! and classifies the answer:
//!
//! - `healthy`: 2xx and the JSON body reports `"healthy": true`
//! - `degraded`: 2xx but the body does not report healthy
//! - `unhealthy`: transport error, non-2xx status or timeout
//!
//! [`probe_all`] fans probes out concurrently and [`aggregate`] folds a
//! batch into a single verdict where any unhealthy result dominates.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::DeployError;
use crate::models::status::{HealthCheckResult, HealthState};
use crate::storage::settings::ServiceEndpoint;

/// Performs a single health check
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe `endpoint` on behalf of `service`, bounded by `timeout`
    async fn check(&self, service: &str, endpoint: &str, timeout: Duration) -> HealthCheckResult;
}

/// Health probe over reqwest
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new() -> Result<Self, DeployError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("deployctl-health/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn fetch(&self, endpoint: &str) -> (HealthState, Value) {
        let response = match self.client.get(endpoint).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, %endpoint, "health probe request failed");
                return (HealthState::Unhealthy, json!({ "error": e.to_string() }));
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                debug!(error = %e, %endpoint, "health probe body read failed");
                return (HealthState::Unhealthy, json!({ "error": e.to_string() }));
            }
        };

        if !status.is_success() {
            debug!(%status, %endpoint, "health probe non-2xx");
            return (
                HealthState::Unhealthy,
                json!({ "status_code": status.as_u16(), "body": body }),
            );
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(value) => {
                let state = if value.get("healthy") == Some(&Value::Bool(true)) {
                    HealthState::Healthy
                } else {
                    HealthState::Degraded
                };
                (state, value)
            }
            Err(_) => (HealthState::Degraded, json!({ "body": body })),
        }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self, service: &str, endpoint: &str, timeout: Duration) -> HealthCheckResult {
        let started = Instant::now();

        let (status, details) = match tokio::time::timeout(timeout, self.fetch(endpoint)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!(%endpoint, ?timeout, "health probe timed out");
                (
                    HealthState::Unhealthy,
                    json!({ "error": format!("timed out after {} ms", timeout.as_millis()) }),
                )
            }
        };

        HealthCheckResult {
            service: service.to_string(),
            endpoint: endpoint.to_string(),
            status,
            response_time_ms: started.elapsed().as_millis() as u64,
            details,
            timestamp: Utc::now(),
        }
    }
}

/// Probe every target concurrently and return results in target order
pub async fn probe_all(
    probe: &dyn HealthProbe,
    targets: &[ServiceEndpoint],
    timeout: Duration,
) -> Vec<HealthCheckResult> {
    let results = join_all(
        targets
            .iter()
            .map(|t| probe.check(&t.name, &t.health_url, timeout)),
    )
    .await;

    for result in results.iter().filter(|r| r.status != HealthState::Healthy) {
        warn!(
            service = %result.service,
            endpoint = %result.endpoint,
            status = ?result.status,
            "health probe not healthy"
        );
    }

    results
}

/// Fold a batch of results into one verdict
pub fn aggregate(results: &[HealthCheckResult]) -> HealthState {
    if results.iter().any(|r| r.status == HealthState::Unhealthy) {
        HealthState::Unhealthy
    } else if results.iter().any(|r| r.status == HealthState::Degraded) {
        HealthState::Degraded
    } else {
        HealthState::Healthy
    }
}

/// Names of the services that are not healthy, for error messages
pub fn failing_services(results: &[HealthCheckResult]) -> Vec<String> {
    results
        .iter()
        .filter(|r| r.status != HealthState::Healthy)
        .map(|r| format!("{} ({})", r.service, r.status.as_str()))
        .collect()
}

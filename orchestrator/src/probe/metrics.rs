//! Aggregated metrics collection

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::DeployError;
use crate::http::client::HttpClient;
use crate::models::status::PerformanceMetrics;
use crate::storage::settings::{MetricsFallback, MetricsSettings};

/// Queries a metrics backend for a performance snapshot
#[async_trait]
pub trait MetricsCollector: Send + Sync {
    /// Aggregate metrics over the trailing `window`
    async fn collect(&self, window: Duration) -> Result<PerformanceMetrics, DeployError>;
}

/// Body of the aggregated-metrics query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsQuery {
    pub time_range_minutes: u64,
    pub services: Vec<String>,
    pub aggregation_type: String,
}

/// Collector for a POST-based aggregated metrics endpoint
#[derive(Debug, Clone)]
pub struct HttpMetricsCollector {
    http: HttpClient,
    endpoint: String,
    services: Vec<String>,
    aggregation_type: String,
    fallback: MetricsFallback,
}

impl HttpMetricsCollector {
    pub fn new(
        endpoint: &str,
        services: Vec<String>,
        settings: &MetricsSettings,
    ) -> Result<Self, DeployError> {
        Ok(Self {
            http: HttpClient::new(Duration::from_millis(settings.timeout_ms))?,
            endpoint: endpoint.to_string(),
            services,
            aggregation_type: settings.aggregation_type.clone(),
            fallback: settings.fallback,
        })
    }

    fn query(&self, window: Duration) -> MetricsQuery {
        MetricsQuery {
            time_range_minutes: window.as_secs().div_ceil(60).max(1),
            services: self.services.clone(),
            aggregation_type: self.aggregation_type.clone(),
        }
    }
}

#[async_trait]
impl MetricsCollector for HttpMetricsCollector {
    async fn collect(&self, window: Duration) -> Result<PerformanceMetrics, DeployError> {
        let query = self.query(window);
        debug!(endpoint = %self.endpoint, minutes = query.time_range_minutes, "collecting metrics");

        match self.http.post::<PerformanceMetrics, _>(&self.endpoint, &query, None).await {
            Ok(metrics) => Ok(metrics),
            Err(e) => match self.fallback {
                MetricsFallback::Optimistic => {
                    // An outage of the metrics backend during a real incident
                    // will read as a clean window here.
                    warn!(
                        error = %e,
                        endpoint = %self.endpoint,
                        "metrics unavailable, assuming zero errors; a real incident would be masked"
                    );
                    Ok(PerformanceMetrics::optimistic())
                }
                MetricsFallback::Fail => Err(DeployError::MetricsCollection(e.to_string())),
            },
        }
    }
}

/// Collector returning a fixed snapshot, used when no backend is configured
#[derive(Debug, Clone)]
pub struct StaticMetrics(pub PerformanceMetrics);

#[async_trait]
impl MetricsCollector for StaticMetrics {
    async fn collect(&self, _window: Duration) -> Result<PerformanceMetrics, DeployError> {
        Ok(self.0.clone())
    }
}

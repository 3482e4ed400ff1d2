//! Scripted probe and metrics sources for tests and dry runs

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::errors::DeployError;
use crate::models::status::{HealthCheckResult, HealthState, PerformanceMetrics};
use crate::probe::health::HealthProbe;
use crate::probe::metrics::MetricsCollector;

struct ProbeRule {
    pattern: String,
    states: VecDeque<HealthState>,
}

/// Health probe answering from per-endpoint rules
///
/// A rule matches when its pattern is a substring of the endpoint. Each
/// match consumes the next scripted state; the last one repeats. Endpoints
/// without a rule are healthy.
#[derive(Default)]
pub struct ScriptedProbe {
    rules: Mutex<Vec<ProbeRule>>,
    checked: Mutex<Vec<String>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `state` for endpoints containing `pattern`
    pub fn with_state(self, pattern: &str, state: HealthState) -> Self {
        self.with_sequence(pattern, vec![state])
    }

    /// Answer `states` in order for endpoints containing `pattern`
    pub fn with_sequence(self, pattern: &str, states: Vec<HealthState>) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(ProbeRule {
                pattern: pattern.to_string(),
                states: states.into(),
            });
        }
        self
    }

    /// Endpoints probed so far, in completion order
    pub fn checked(&self) -> Vec<String> {
        self.checked.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of probes against endpoints containing `pattern`
    pub fn count(&self, pattern: &str) -> usize {
        self.checked().iter().filter(|e| e.contains(pattern)).count()
    }

    fn next_state(&self, endpoint: &str) -> HealthState {
        let Ok(mut rules) = self.rules.lock() else {
            return HealthState::Unhealthy;
        };

        match rules.iter_mut().find(|r| endpoint.contains(r.pattern.as_str())) {
            Some(rule) if rule.states.len() > 1 => {
                rule.states.pop_front().unwrap_or(HealthState::Healthy)
            }
            Some(rule) => rule.states.front().copied().unwrap_or(HealthState::Healthy),
            None => HealthState::Healthy,
        }
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn check(&self, service: &str, endpoint: &str, _timeout: Duration) -> HealthCheckResult {
        let status = self.next_state(endpoint);
        if let Ok(mut checked) = self.checked.lock() {
            checked.push(endpoint.to_string());
        }

        HealthCheckResult {
            service: service.to_string(),
            endpoint: endpoint.to_string(),
            status,
            response_time_ms: 1,
            details: json!({ "healthy": status == HealthState::Healthy }),
            timestamp: Utc::now(),
        }
    }
}

/// Metrics collector replaying a queue of snapshots
///
/// Each call consumes the next snapshot; the last one repeats.
#[derive(Default)]
pub struct ScriptedMetrics {
    snapshots: Mutex<VecDeque<Result<PerformanceMetrics, String>>>,
    calls: Mutex<usize>,
}

impl ScriptedMetrics {
    pub fn new(snapshots: Vec<PerformanceMetrics>) -> Self {
        Self {
            snapshots: Mutex::new(snapshots.into_iter().map(Ok).collect()),
            calls: Mutex::new(0),
        }
    }

    /// Snapshots with the given error rates (percent), in order
    pub fn error_rates(rates: &[f64]) -> Self {
        Self::new(rates.iter().map(|r| with_error_rate(*r)).collect())
    }

    /// Collector whose every call fails
    pub fn failing(message: &str) -> Self {
        Self {
            snapshots: Mutex::new(VecDeque::from(vec![Err(message.to_string())])),
            calls: Mutex::new(0),
        }
    }

    /// Number of collections so far
    pub fn calls(&self) -> usize {
        self.calls.lock().map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl MetricsCollector for ScriptedMetrics {
    async fn collect(&self, _window: Duration) -> Result<PerformanceMetrics, DeployError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }

        let mut snapshots = self
            .snapshots
            .lock()
            .map_err(|e| DeployError::Internal(e.to_string()))?;

        let next = if snapshots.len() > 1 {
            snapshots.pop_front()
        } else {
            snapshots.front().cloned()
        };

        match next {
            Some(Ok(metrics)) => Ok(metrics),
            Some(Err(message)) => Err(DeployError::MetricsCollection(message)),
            None => Ok(PerformanceMetrics::optimistic()),
        }
    }
}

/// Snapshot with a given error rate (percent)
pub fn with_error_rate(rate: f64) -> PerformanceMetrics {
    PerformanceMetrics {
        avg_response_time_ms: 80.0,
        requests_per_second: 120.0,
        error_count: (rate * 10.0).round() as u64,
        success_rate: 100.0 - rate,
    }
}

//! Collaborators and inputs shared by every phase of a run

use std::sync::Mutex;

use crate::deploy::pacer::Pacer;
use crate::exec::command::{CommandRunner, CommandSpec};
use crate::models::request::DeploymentRequest;
use crate::models::status::{HealthCheckResult, PerformanceMetrics, RollbackReference};
use crate::probe::health::HealthProbe;
use crate::probe::metrics::MetricsCollector;
use crate::storage::settings::Settings;

/// Borrowed view of a run handed to backup, strategies and rollback
pub struct RunContext<'a> {
    pub deployment_id: &'a str,
    pub request: &'a DeploymentRequest,
    pub settings: &'a Settings,
    pub runner: &'a dyn CommandRunner,
    pub probe: &'a dyn HealthProbe,
    pub metrics: &'a dyn MetricsCollector,
    pub pacer: &'a Pacer,
    pub observations: &'a Observations,
    pub rollback_reference: Option<&'a RollbackReference>,
}

impl RunContext<'_> {
    /// Render a command template with `vars` and the run's own placeholders
    ///
    /// Entries in `vars` win over `{version}`, `{environment}` and
    /// `{deployment_id}`.
    pub fn command(&self, spec: &CommandSpec, vars: &[(&str, &str)]) -> CommandSpec {
        let mut all = vars.to_vec();
        all.extend_from_slice(&[
            ("version", self.request.version.as_str()),
            ("environment", self.request.environment.as_str()),
            ("deployment_id", self.deployment_id),
        ]);
        spec.render(&all)
    }
}

/// Health results and metrics gathered outside the orchestrator
///
/// Strategies append here; the orchestrator drains it into the status.
#[derive(Debug, Default)]
pub struct Observations {
    health_checks: Mutex<Vec<HealthCheckResult>>,
    metrics: Mutex<Option<PerformanceMetrics>>,
}

impl Observations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, results: &[HealthCheckResult]) {
        if let Ok(mut checks) = self.health_checks.lock() {
            checks.extend_from_slice(results);
        }
    }

    /// Keep the latest snapshot, replacing any earlier one
    pub fn record_metrics(&self, metrics: &PerformanceMetrics) {
        if let Ok(mut latest) = self.metrics.lock() {
            *latest = Some(metrics.clone());
        }
    }

    /// Remove and return the health results recorded so far
    pub fn drain(&self) -> Vec<HealthCheckResult> {
        self.health_checks
            .lock()
            .map(|mut c| std::mem::take(&mut *c))
            .unwrap_or_default()
    }

    /// Remove and return the latest metrics snapshot
    pub fn take_metrics(&self) -> Option<PerformanceMetrics> {
        self.metrics.lock().ok().and_then(|mut m| m.take())
    }
}

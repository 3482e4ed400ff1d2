//! Deployment status and the records it accumulates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::request::{DeploymentRequest, Environment, StrategyKind};

/// Lifecycle state of a deployment run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentState {
    /// Created, not started
    Pending,

    /// Phases are executing
    InProgress,

    /// Every phase succeeded
    Completed,

    /// Ended without a confirmed rollback
    Failed,

    /// A rollback restored the previous version
    RolledBack,
}

impl DeploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Pending => "pending",
            DeploymentState::InProgress => "in-progress",
            DeploymentState::Completed => "completed",
            DeploymentState::Failed => "failed",
            DeploymentState::RolledBack => "rolled-back",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentState::Completed | DeploymentState::Failed | DeploymentState::RolledBack
        )
    }
}

/// Classification of a single probe or of a probe batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unhealthy => "unhealthy",
        }
    }
}

/// One probe outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub service: String,
    pub endpoint: String,
    pub status: HealthState,
    pub response_time_ms: u64,
    /// Response body, or the failure description
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Aggregated performance snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub avg_response_time_ms: f64,
    pub requests_per_second: f64,
    pub error_count: u64,
    /// Percentage of successful requests (0-100)
    pub success_rate: f64,
}

impl PerformanceMetrics {
    /// Neutral snapshot used when the metrics backend cannot be reached
    pub fn optimistic() -> Self {
        Self {
            avg_response_time_ms: 0.0,
            requests_per_second: 0.0,
            error_count: 0,
            success_rate: 100.0,
        }
    }

    /// Error rate as a percentage (0-100)
    pub fn error_rate(&self) -> f64 {
        (100.0 - self.success_rate).clamp(0.0, 100.0)
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::optimistic()
    }
}

/// A config artifact copied aside before mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedArtifact {
    pub source: String,
    pub archived_path: String,
    pub sha256: String,
}

/// Prior state captured before any mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackReference {
    /// Version-control reference deployed before this run
    pub previous_version: String,

    /// Handle of the datastore backup
    pub backup_id: String,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub archived_configs: Vec<ArchivedArtifact>,
}

/// Result of an attempted rollback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackOutcome {
    pub reason: String,
    pub succeeded: bool,
    pub restored_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// Lifecycle phase names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Validation,
    Backup,
    Strategy,
    HealthVerification,
    PerformanceVerification,
    PostDeploymentTests,
    Monitoring,
    Rollback,
}

/// A finished phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub succeeded: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The single mutable record of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub deployment_id: String,
    pub environment: Environment,
    pub version: String,
    pub strategy: StrategyKind,
    pub state: DeploymentState,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub health_checks: Vec<HealthCheckResult>,
    pub rollback_triggered: bool,
    /// Latest observed error rate (percent)
    pub error_rate: f64,
    pub performance_metrics: PerformanceMetrics,
    #[serde(default)]
    pub rollback_reference: Option<RollbackReference>,
    #[serde(default)]
    pub rollback: Option<RollbackOutcome>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub phases: Vec<PhaseRecord>,
}

impl DeploymentStatus {
    /// Fresh status for a request
    pub fn new(deployment_id: impl Into<String>, request: &DeploymentRequest) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            environment: request.environment,
            version: request.version.clone(),
            strategy: request.strategy,
            state: DeploymentState::Pending,
            started_at: Utc::now(),
            completed_at: None,
            health_checks: Vec::new(),
            rollback_triggered: false,
            error_rate: 0.0,
            performance_metrics: PerformanceMetrics::default(),
            rollback_reference: None,
            rollback: None,
            error: None,
            phases: Vec::new(),
        }
    }

    /// Replace the metrics snapshot
    pub fn record_metrics(&mut self, metrics: PerformanceMetrics) {
        self.error_rate = metrics.error_rate();
        self.performance_metrics = metrics;
    }
}

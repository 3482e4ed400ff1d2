//! Notification event emitted on terminal transitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::request::Environment;
use crate::models::status::{DeploymentState, DeploymentStatus, HealthCheckResult, PerformanceMetrics};

/// Structured payload handed to the notification transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub deployment_id: String,
    pub environment: Environment,
    pub version: String,
    pub status: DeploymentState,
    pub details: String,
    pub timestamp: DateTime<Utc>,
    pub health_checks: Vec<HealthCheckResult>,
    pub performance_metrics: PerformanceMetrics,
}

impl NotificationEvent {
    /// Build the event for a terminal status
    pub fn from_status(status: &DeploymentStatus) -> Self {
        Self {
            deployment_id: status.deployment_id.clone(),
            environment: status.environment,
            version: status.version.clone(),
            status: status.state,
            details: summarize(status),
            timestamp: Utc::now(),
            health_checks: status.health_checks.clone(),
            performance_metrics: status.performance_metrics.clone(),
        }
    }
}

fn summarize(status: &DeploymentStatus) -> String {
    match status.state {
        DeploymentState::Completed => format!(
            "{} deployment of {} to {} completed",
            status.strategy, status.version, status.environment
        ),
        DeploymentState::RolledBack => format!(
            "{} rolled back: {}",
            status.version,
            status
                .rollback
                .as_ref()
                .map(|r| r.reason.as_str())
                .unwrap_or("unknown reason")
        ),
        _ => {
            let mut details = format!(
                "{} deployment of {} is {}",
                status.strategy,
                status.version,
                status.state.as_str()
            );
            if let Some(err) = &status.error {
                details.push_str(": ");
                details.push_str(err);
            }
            if let Some(rollback) = status.rollback.as_ref().filter(|r| !r.succeeded) {
                details.push_str("; rollback attempted but unsuccessful, manual intervention required");
                if let Some(err) = &rollback.error {
                    details.push_str(" (");
                    details.push_str(err);
                    details.push(')');
                }
            }
            details
        }
    }
}

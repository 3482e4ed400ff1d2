//! Deployment request model

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Highest error-rate threshold (percent) accepted for production runs
pub const PRODUCTION_MAX_ERROR_RATE: f64 = 1.0;

/// Target environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(DeployError::InvalidRequest(format!("Unknown environment: {}", s))),
        }
    }
}

/// Rollout algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    BlueGreen,
    Rolling,
    Canary,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::BlueGreen => "blue-green",
            StrategyKind::Rolling => "rolling",
            StrategyKind::Canary => "canary",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blue-green" | "blue_green" | "bluegreen" => Ok(StrategyKind::BlueGreen),
            "rolling" => Ok(StrategyKind::Rolling),
            "canary" => Ok(StrategyKind::Canary),
            _ => Err(DeployError::InvalidRequest(format!("Unknown strategy: {}", s))),
        }
    }
}

/// Immutable input of a deployment run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Target environment
    pub environment: Environment,

    /// Version identifier to roll out
    pub version: String,

    /// Rollout algorithm
    pub strategy: StrategyKind,

    /// Upper bound for a single health probe
    pub health_check_timeout_ms: u64,

    /// Error rate (percent) above which the run rolls back
    pub rollback_threshold_error_rate: f64,

    /// Pre-flight checks, in execution order
    pub validation_steps: Vec<String>,

    /// Post-deployment tests, in execution order
    pub post_deployment_tests: Vec<String>,
}

impl DeploymentRequest {
    /// Reject requests that must never start executing
    pub fn check(&self) -> Result<(), DeployError> {
        if self.version.trim().is_empty() {
            return Err(DeployError::InvalidRequest("version must not be empty".to_string()));
        }

        if self.health_check_timeout_ms == 0 {
            return Err(DeployError::InvalidRequest(
                "health_check_timeout_ms must be greater than zero".to_string(),
            ));
        }

        let threshold = self.rollback_threshold_error_rate;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(DeployError::InvalidRequest(format!(
                "rollback_threshold_error_rate must be a non-negative percentage, got {}",
                threshold
            )));
        }

        if self.environment.is_production() && threshold > PRODUCTION_MAX_ERROR_RATE {
            return Err(DeployError::InvalidRequest(format!(
                "rollback_threshold_error_rate {}% exceeds the production maximum of {}%",
                threshold, PRODUCTION_MAX_ERROR_RATE
            )));
        }

        Ok(())
    }

    /// Health probe timeout as a duration
    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }
}

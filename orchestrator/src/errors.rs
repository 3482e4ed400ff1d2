//! Error types for the deployment orchestrator

use thiserror::Error;

/// Main error type for a deployment run
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("HTTP status error: {0}")]
    HttpStatus(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Validation step {index}/{total} ({step}) failed: {reason}")]
    Validation {
        index: usize,
        total: usize,
        step: String,
        reason: String,
    },

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Strategy error: {0}")]
    Strategy(String),

    #[error("Health check error: {0}")]
    HealthCheck(String),

    #[error("Metrics collection error: {0}")]
    MetricsCollection(String),

    #[error("Error rate {observed:.2}% exceeded threshold {threshold:.2}% ({context})")]
    ThresholdBreach {
        observed: f64,
        threshold: f64,
        context: String,
    },

    #[error("Rolling deployment halted at batch {batch}/{total}: {reason}")]
    PartialRollout {
        batch: usize,
        total: usize,
        updated: Vec<String>,
        reason: String,
    },

    #[error("Rollback error: {0}")]
    Rollback(String),

    #[error("Deployment cancelled")]
    Cancelled,

    #[error("Deployment cancelled before rollout")]
    CancelledBeforeRollout,

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Command error: {0}")]
    CommandError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// How the orchestrator reacts to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Raised before any mutation: the run fails without rollback
    PreFlight,

    /// Raised mid-rollout: rolled back when a rollback reference exists
    Recoverable,

    /// Always terminal, never retried or rolled back automatically
    Unrecoverable,
}

impl DeployError {
    /// Classify the error for propagation
    pub fn class(&self) -> ErrorClass {
        match self {
            DeployError::InvalidRequest(_)
            | DeployError::Validation { .. }
            | DeployError::Backup(_)
            | DeployError::CancelledBeforeRollout => ErrorClass::PreFlight,

            DeployError::PartialRollout { .. }
            | DeployError::Rollback(_)
            | DeployError::InvalidTransition(_) => ErrorClass::Unrecoverable,

            _ => ErrorClass::Recoverable,
        }
    }
}

impl From<anyhow::Error> for DeployError {
    fn from(err: anyhow::Error) -> Self {
        DeployError::Internal(err.to_string())
    }
}

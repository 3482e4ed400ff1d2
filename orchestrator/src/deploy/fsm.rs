//! Finite State Machine for a deployment run

use crate::errors::DeployError;
use crate::models::status::DeploymentState;

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// Request accepted, phases start
    Start,

    /// Request rejected before anything ran
    Reject(String),

    /// Every phase succeeded
    Complete,

    /// Run ended without a confirmed rollback
    Fail(String),

    /// Rollback finished and recovery was confirmed
    RolledBack,
}

/// Deployment FSM
///
/// ```text
/// pending ──Start──▶ in-progress ──Complete──▶ completed
///    │                   ├────────Fail──────▶ failed
///    └──Reject──▶ failed └──────RolledBack──▶ rolled-back
/// ```
///
/// Terminal states accept no further events.
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentState,
    error: Option<String>,
    rollback_triggered: bool,
}

impl DeploymentFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: DeploymentState::Pending,
            error: None,
            rollback_triggered: false,
        }
    }

    /// Get current state
    pub fn state(&self) -> DeploymentState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn rollback_triggered(&self) -> bool {
        self.rollback_triggered
    }

    /// Record that a rollback was started
    ///
    /// Returns `true` only for the first call of a run, the flag is never
    /// cleared.
    pub fn mark_rollback_triggered(&mut self) -> bool {
        let first = !self.rollback_triggered;
        self.rollback_triggered = true;
        first
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<DeploymentState, DeployError> {
        let new_state = match (self.state, &event) {
            (DeploymentState::Pending, DeploymentEvent::Start) => DeploymentState::InProgress,
            (DeploymentState::Pending, DeploymentEvent::Reject(err)) => {
                self.error = Some(err.clone());
                DeploymentState::Failed
            }

            (DeploymentState::InProgress, DeploymentEvent::Complete) => DeploymentState::Completed,
            (DeploymentState::InProgress, DeploymentEvent::Fail(err)) => {
                self.error = Some(err.clone());
                DeploymentState::Failed
            }
            (DeploymentState::InProgress, DeploymentEvent::RolledBack) => {
                if !self.rollback_triggered {
                    return Err(DeployError::InvalidTransition(
                        "rolled-back without a triggered rollback".to_string(),
                    ));
                }
                DeploymentState::RolledBack
            }

            (state, event) => {
                return Err(DeployError::InvalidTransition(format!(
                    "{} -> {:?}",
                    state.as_str(),
                    event
                )));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}

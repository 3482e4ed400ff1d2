//! Notification transports for terminal deployment events

#[cfg(any(test, feature = "test"))]
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::{error, info, warn};

use crate::errors::DeployError;
use crate::http::client::HttpClient;
use crate::models::event::NotificationEvent;
use crate::models::status::DeploymentState;

/// Delivers a notification event
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), DeployError>;
}

/// Emits the event as a tracing record
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), DeployError> {
        match event.status {
            DeploymentState::Completed => info!(
                deployment = %event.deployment_id,
                environment = %event.environment,
                version = %event.version,
                "{}", event.details
            ),
            DeploymentState::RolledBack => warn!(
                deployment = %event.deployment_id,
                environment = %event.environment,
                version = %event.version,
                "{}", event.details
            ),
            _ => error!(
                deployment = %event.deployment_id,
                environment = %event.environment,
                version = %event.version,
                status = event.status.as_str(),
                "{}", event.details
            ),
        }
        Ok(())
    }
}

/// POSTs the event as JSON to a webhook
pub struct WebhookNotifier {
    http: HttpClient,
    url: String,
    token: Option<SecretString>,
}

impl WebhookNotifier {
    pub fn new(url: &str, token: Option<String>) -> Result<Self, DeployError> {
        Ok(Self {
            http: HttpClient::new(Duration::from_secs(10))?,
            url: url.to_string(),
            token: token.map(SecretString::from),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), DeployError> {
        self.http
            .post_no_content(&self.url, event, self.token.as_ref())
            .await
    }
}

/// Keeps events in memory
#[cfg(any(test, feature = "test"))]
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
}

#[cfg(any(test, feature = "test"))]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[cfg(any(test, feature = "test"))]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), DeployError> {
        self.events
            .lock()
            .map_err(|e| DeployError::Internal(e.to_string()))?
            .push(event.clone());
        Ok(())
    }
}

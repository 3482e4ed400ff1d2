//! Cancellable pauses for polling loops

#[cfg(any(test, feature = "test"))]
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;

use crate::errors::DeployError;

/// Source of wall-clock pauses
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately and records every requested pause
#[cfg(any(test, feature = "test"))]
#[derive(Debug, Clone, Default)]
pub struct NoopSleeper {
    pauses: Arc<Mutex<Vec<Duration>>>,
}

#[cfg(any(test, feature = "test"))]
impl NoopSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[cfg(any(test, feature = "test"))]
#[async_trait]
impl Sleeper for NoopSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut pauses) = self.pauses.lock() {
            pauses.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

/// Pauses that end early when the run is cancelled
///
/// The cancel channel carries `true` once cancellation was requested.
#[derive(Clone)]
pub struct Pacer {
    sleeper: Arc<dyn Sleeper>,
    cancel: watch::Receiver<bool>,
}

impl Pacer {
    pub fn new(sleeper: Arc<dyn Sleeper>, cancel: watch::Receiver<bool>) -> Self {
        Self { sleeper, cancel }
    }

    /// Pacer that never gets cancelled
    pub fn uncancellable(sleeper: Arc<dyn Sleeper>) -> Self {
        let (_, rx) = watch::channel(false);
        Self::new(sleeper, rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Fail with `Cancelled` if cancellation was already requested
    pub fn check(&self) -> Result<(), DeployError> {
        if self.is_cancelled() {
            return Err(DeployError::Cancelled);
        }
        Ok(())
    }

    /// Sleep for `duration` unless cancelled first
    pub async fn pause(&self, duration: Duration) -> Result<(), DeployError> {
        self.check()?;

        let mut cancel = self.cancel.clone();
        let mut sleep = self.sleeper.sleep(duration);
        tokio::select! {
            _ = &mut sleep => {}
            requested = async { cancel.wait_for(|cancelled| *cancelled).await.is_ok() } => {
                if requested {
                    info!("pause interrupted by cancellation");
                    return Err(DeployError::Cancelled);
                }
                // sender dropped, cancellation can no longer arrive
                sleep.await;
            }
        }

        self.check()
    }
}

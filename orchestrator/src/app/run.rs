//! Running a single deployment from the binary

use std::future::Future;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::deploy::orchestrator::Orchestrator;
use crate::errors::DeployError;
use crate::models::request::DeploymentRequest;
use crate::models::status::DeploymentStatus;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Run `request` to completion, cancelling it when `shutdown_signal` resolves
pub async fn run(
    settings: Settings,
    layout: StorageLayout,
    request: DeploymentRequest,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<DeploymentStatus, DeployError> {
    layout.setup().await?;

    // Create cancellation channel
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let watcher = tokio::spawn(async move {
        shutdown_signal.await;
        warn!("Shutdown signal received, cancelling deployment...");
        let _ = cancel_tx.send(true);
    });

    let orchestrator = Orchestrator::builder(settings, layout)
        .cancel_signal(cancel_rx)
        .build()?;

    info!("Running deployment of {} to {}", request.version, request.environment);
    let status = orchestrator.run(request).await;

    watcher.abort();
    Ok(status)
}

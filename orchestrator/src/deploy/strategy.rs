//! Rollout strategy seam and helpers shared by the strategies

use async_trait::async_trait;
use tracing::{debug, error};

use crate::deploy::context::RunContext;
use crate::deploy::strategies::{BlueGreen, Canary, Rolling};
use crate::errors::DeployError;
use crate::models::request::StrategyKind;
use crate::models::status::HealthCheckResult;
use crate::probe::health::probe_all;
use crate::storage::settings::ServiceEndpoint;

/// New-version traffic percentages a canary walks through
pub const CANARY_STEPS: [u8; 3] = [10, 50, 100];

/// A rollout algorithm
#[async_trait]
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Roll `ctx.request.version` out to the fleet
    async fn execute(&self, ctx: &RunContext<'_>) -> Result<(), DeployError>;
}

/// Strategy implementation for a request
pub fn for_kind(kind: StrategyKind) -> Box<dyn Strategy> {
    match kind {
        StrategyKind::BlueGreen => Box::new(BlueGreen),
        StrategyKind::Rolling => Box::new(Rolling),
        StrategyKind::Canary => Box::new(Canary),
    }
}

/// Deploy the requested version to one instance
pub async fn deploy_instance(
    ctx: &RunContext<'_>,
    instance: &ServiceEndpoint,
) -> Result<(), DeployError> {
    let spec = ctx.command(
        &ctx.settings.commands.deploy_instance,
        &[("instance", instance.name.as_str())],
    );
    debug!(instance = %instance.name, command = %spec, "deploying instance");
    ctx.runner
        .run(&spec)
        .await?
        .into_result(&format!("deploy to {}", instance.name))?;
    Ok(())
}

/// Probe `targets` with the request timeout and record the results
pub async fn probe_and_record(
    ctx: &RunContext<'_>,
    targets: &[ServiceEndpoint],
) -> Vec<HealthCheckResult> {
    let results = probe_all(ctx.probe, targets, ctx.request.health_check_timeout()).await;
    ctx.observations.record(&results);
    results
}

/// Point new-version traffic at `percent`
pub async fn set_traffic(ctx: &RunContext<'_>, percent: u8) -> Result<(), DeployError> {
    let percent = percent.to_string();
    let spec = ctx.command(
        &ctx.settings.commands.set_traffic_split,
        &[("percent", percent.as_str())],
    );
    ctx.runner
        .run(&spec)
        .await?
        .into_result("traffic split")?;
    Ok(())
}

/// Route all traffic to `target`
pub async fn switch_traffic(ctx: &RunContext<'_>, target: &str) -> Result<(), DeployError> {
    let spec = ctx.command(&ctx.settings.commands.switch_traffic, &[("target", target)]);
    ctx.runner
        .run(&spec)
        .await?
        .into_result(&format!("traffic switch to {}", target))?;
    Ok(())
}

/// Run a compensating action, logging instead of failing
pub async fn compensate<F>(what: &str, action: F)
where
    F: std::future::Future<Output = Result<(), DeployError>>,
{
    if let Err(e) = action.await {
        error!(error = %e, "{} failed", what);
    }
}

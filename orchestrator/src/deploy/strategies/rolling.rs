//! Rolling: replace instances batch by batch behind a health gate

use async_trait::async_trait;
use tracing::{info, warn};

use crate::deploy::context::RunContext;
use crate::deploy::strategy::{deploy_instance, probe_and_record, Strategy};
use crate::errors::DeployError;
use crate::models::request::StrategyKind;
use crate::models::status::HealthState;
use crate::probe::health::failing_services;
use crate::storage::settings::RollingFailurePolicy;

/// Instances per batch, `ceil(n / 3)` unless configured
pub fn batch_size(instances: usize, configured: Option<usize>) -> usize {
    configured.unwrap_or_else(|| instances.div_ceil(3)).max(1)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Rolling;

#[async_trait]
impl Strategy for Rolling {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Rolling
    }

    async fn execute(&self, ctx: &RunContext<'_>) -> Result<(), DeployError> {
        let instances = &ctx.settings.fleet.instances;
        if instances.is_empty() {
            return Err(DeployError::Strategy(
                "rolling deployment needs at least one instance".to_string(),
            ));
        }

        let size = batch_size(instances.len(), ctx.settings.rolling.batch_size);
        let total = instances.len().div_ceil(size);
        let mut updated: Vec<String> = Vec::new();

        info!(
            deployment = %ctx.deployment_id,
            instances = instances.len(),
            batch_size = size,
            batches = total,
            "started rolling update"
        );

        for (i, batch) in instances.chunks(size).enumerate() {
            let number = i + 1;
            if i > 0 {
                ctx.pacer.pause(ctx.settings.rolling.batch_pause()).await?;
            }

            for instance in batch {
                if let Err(e) = deploy_instance(ctx, instance).await {
                    return Err(halt(ctx, number, total, updated, e.to_string()));
                }
                updated.push(instance.name.clone());
            }

            let results = probe_and_record(ctx, batch).await;
            if results.iter().any(|r| r.status != HealthState::Healthy) {
                let reason = format!("unhealthy instances: {}", failing_services(&results).join(", "));
                return Err(halt(ctx, number, total, updated, reason));
            }

            info!(deployment = %ctx.deployment_id, batch = number, total, "batch healthy");
        }

        Ok(())
    }
}

fn halt(
    ctx: &RunContext<'_>,
    batch: usize,
    total: usize,
    updated: Vec<String>,
    reason: String,
) -> DeployError {
    warn!(
        deployment = %ctx.deployment_id,
        batch,
        total,
        updated = updated.len(),
        %reason,
        "rolling update halted"
    );

    match ctx.settings.rolling.failure_policy {
        RollingFailurePolicy::LeaveInPlace => DeployError::PartialRollout {
            batch,
            total,
            updated,
            reason,
        },
        RollingFailurePolicy::Rollback => DeployError::Strategy(format!(
            "rolling deployment halted at batch {}/{}: {}",
            batch, total, reason
        )),
    }
}

//! Canary: shift traffic in steps, watching the error rate after each

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::deploy::context::RunContext;
use crate::deploy::rollback::should_rollback;
use crate::deploy::strategy::{
    compensate, deploy_instance, probe_and_record, set_traffic, Strategy, CANARY_STEPS,
};
use crate::errors::DeployError;
use crate::models::request::StrategyKind;
use crate::models::status::HealthState;
use crate::probe::health::{aggregate, failing_services};

/// Number of metric polls inside a window, at least one
pub fn polls_per_window(window: Duration, interval: Duration) -> u64 {
    if interval.is_zero() {
        return 1;
    }
    (window.as_secs() / interval.as_secs().max(1)).max(1)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Canary;

impl Canary {
    /// Put the new version on the canary pool before it takes traffic
    async fn stage(&self, ctx: &RunContext<'_>) -> Result<(), DeployError> {
        let pool = &ctx.settings.fleet.instances;
        for instance in pool {
            deploy_instance(ctx, instance).await?;
        }

        let results = probe_and_record(ctx, pool).await;
        match aggregate(&results) {
            HealthState::Healthy => Ok(()),
            state => Err(DeployError::HealthCheck(format!(
                "canary pool is {}: {}",
                state.as_str(),
                failing_services(&results).join(", ")
            ))),
        }
    }

    /// Poll metrics through the window after a traffic step
    async fn observe(&self, ctx: &RunContext<'_>, percent: u8) -> Result<(), DeployError> {
        let canary = &ctx.settings.canary;
        let polls = polls_per_window(canary.window(), canary.poll_interval());
        let threshold = ctx.request.rollback_threshold_error_rate;

        for poll in 1..=polls {
            ctx.pacer.pause(canary.poll_interval()).await?;

            let metrics = ctx.metrics.collect(canary.poll_interval()).await?;
            ctx.observations.record_metrics(&metrics);
            let observed = metrics.error_rate();

            if should_rollback(observed, threshold) {
                warn!(
                    deployment = %ctx.deployment_id,
                    percent,
                    poll,
                    observed,
                    threshold,
                    "canary error rate above threshold"
                );
                return Err(DeployError::ThresholdBreach {
                    observed,
                    threshold,
                    context: format!("canary at {}%", percent),
                });
            }
        }

        Ok(())
    }

    async fn walk_steps(&self, ctx: &RunContext<'_>) -> Result<(), DeployError> {
        for percent in CANARY_STEPS {
            ctx.pacer.check()?;
            set_traffic(ctx, percent).await?;
            info!(deployment = %ctx.deployment_id, percent, "canary traffic step");
            self.observe(ctx, percent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Strategy for Canary {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Canary
    }

    async fn execute(&self, ctx: &RunContext<'_>) -> Result<(), DeployError> {
        self.stage(ctx).await?;

        let result = self.walk_steps(ctx).await;
        if let Err(e) = &result {
            warn!(deployment = %ctx.deployment_id, error = %e, "canary aborted, draining new version");
            compensate("canary traffic drain", set_traffic(ctx, 0)).await;
        } else {
            info!(deployment = %ctx.deployment_id, "canary promoted to full traffic");
        }

        result
    }
}

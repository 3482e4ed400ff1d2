//! Blue-green: stage on the idle set, switch traffic once

use async_trait::async_trait;
use tracing::{info, warn};

use crate::deploy::context::RunContext;
use crate::deploy::strategy::{
    compensate, deploy_instance, probe_and_record, switch_traffic, Strategy,
};
use crate::errors::DeployError;
use crate::models::request::StrategyKind;
use crate::models::status::HealthState;
use crate::probe::health::{aggregate, failing_services};

pub const BLUE: &str = "blue";
pub const GREEN: &str = "green";

#[derive(Debug, Clone, Copy, Default)]
pub struct BlueGreen;

impl BlueGreen {
    async fn stage_green(&self, ctx: &RunContext<'_>) -> Result<(), DeployError> {
        let green = &ctx.settings.fleet.green;
        if green.is_empty() {
            return Err(DeployError::Strategy(
                "blue-green needs at least one green instance".to_string(),
            ));
        }

        for instance in green {
            deploy_instance(ctx, instance).await?;
        }

        let results = probe_and_record(ctx, green).await;

        match aggregate(&results) {
            HealthState::Healthy => Ok(()),
            state => Err(DeployError::HealthCheck(format!(
                "green environment is {}: {}",
                state.as_str(),
                failing_services(&results).join(", ")
            ))),
        }
    }
}

#[async_trait]
impl Strategy for BlueGreen {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BlueGreen
    }

    async fn execute(&self, ctx: &RunContext<'_>) -> Result<(), DeployError> {
        info!(deployment = %ctx.deployment_id, version = %ctx.request.version, "staging green");

        let staged = match self.stage_green(ctx).await {
            Ok(()) => ctx.pacer.check(),
            Err(e) => Err(e),
        };

        let result = match staged {
            Ok(()) => switch_traffic(ctx, GREEN).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            warn!(deployment = %ctx.deployment_id, error = %e, "blue-green failed, routing stays on blue");
            compensate("traffic revert to blue", switch_traffic(ctx, BLUE)).await;
        } else {
            info!(deployment = %ctx.deployment_id, "traffic switched to green");
        }

        result
    }
}

//! Restoring the pre-deployment state

use chrono::Utc;
use tracing::{error, info, warn};

use crate::deploy::context::RunContext;
use crate::deploy::strategy::probe_and_record;
use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::status::{HealthState, RollbackOutcome, RollbackReference};
use crate::probe::health::{aggregate, failing_services};

/// True only when the observed error rate is strictly above the threshold
pub fn should_rollback(error_rate: f64, threshold: f64) -> bool {
    error_rate > threshold
}

/// Drives a rollback from a captured reference
#[derive(Debug, Clone, Copy, Default)]
pub struct RollbackController;

impl RollbackController {
    pub fn new() -> Self {
        Self
    }

    /// Restore version, datastore and configs, redeploy, then confirm health
    ///
    /// Fails with `Rollback` when the run has no reference. Every other
    /// problem ends in an outcome with `succeeded: false`; nothing is retried.
    pub async fn maybe_rollback(
        &self,
        ctx: &RunContext<'_>,
        reason: &str,
    ) -> Result<RollbackOutcome, DeployError> {
        let Some(reference) = ctx.rollback_reference else {
            warn!(deployment = %ctx.deployment_id, %reason, "rollback requested without a reference");
            return Err(DeployError::Rollback("no rollback reference".to_string()));
        };

        info!(
            deployment = %ctx.deployment_id,
            previous_version = %reference.previous_version,
            backup_id = %reference.backup_id,
            %reason,
            "starting rollback"
        );

        let outcome = match self.restore(ctx, reference).await {
            Ok(()) => self.confirm(ctx, reference).await,
            Err(e) => Err(e),
        };

        Ok(match outcome {
            Ok(()) => {
                info!(deployment = %ctx.deployment_id, "rollback confirmed healthy");
                RollbackOutcome {
                    reason: reason.to_string(),
                    succeeded: true,
                    restored_version: Some(reference.previous_version.clone()),
                    error: None,
                    finished_at: Utc::now(),
                }
            }
            Err(e) => {
                error!(
                    deployment = %ctx.deployment_id,
                    error = %e,
                    "rollback failed, manual intervention required"
                );
                RollbackOutcome {
                    reason: reason.to_string(),
                    succeeded: false,
                    restored_version: None,
                    error: Some(e.to_string()),
                    finished_at: Utc::now(),
                }
            }
        })
    }

    async fn restore(
        &self,
        ctx: &RunContext<'_>,
        reference: &RollbackReference,
    ) -> Result<(), DeployError> {
        let commands = &ctx.settings.commands;
        let previous = reference.previous_version.as_str();

        let restore_version = ctx.command(&commands.restore_version, &[("version", previous)]);
        ctx.runner
            .run(&restore_version)
            .await?
            .into_result("version restore")?;

        let restore_database = ctx.command(
            &commands.restore_database,
            &[("backup_id", reference.backup_id.as_str())],
        );
        ctx.runner
            .run(&restore_database)
            .await?
            .into_result("datastore restore")?;

        for artifact in &reference.archived_configs {
            File::new(&artifact.archived_path)
                .copy_to(&File::new(&artifact.source))
                .await?;
        }

        let redeploy = ctx.command(&commands.redeploy, &[("version", previous)]);
        ctx.runner.run(&redeploy).await?.into_result("redeploy")?;

        Ok(())
    }

    async fn confirm(
        &self,
        ctx: &RunContext<'_>,
        reference: &RollbackReference,
    ) -> Result<(), DeployError> {
        let results = probe_and_record(ctx, &ctx.settings.services).await;

        match aggregate(&results) {
            HealthState::Healthy => Ok(()),
            state => Err(DeployError::HealthCheck(format!(
                "{} is {} after rollback: {}",
                reference.previous_version,
                state.as_str(),
                failing_services(&results).join(", ")
            ))),
        }
    }
}

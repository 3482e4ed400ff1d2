//! Safety-net capture before any mutation

use chrono::Utc;
use tracing::{info, warn};

use crate::deploy::context::RunContext;
use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::status::{ArchivedArtifact, RollbackReference};
use crate::storage::layout::StorageLayout;
use crate::utils::generate_backup_id;

/// Captures the state a rollback restores
#[derive(Debug, Clone)]
pub struct BackupManager {
    layout: StorageLayout,
}

impl BackupManager {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Back up the datastore, record the current version and archive configs
    ///
    /// Returns `None` only when the backup is skipped on a non-production
    /// run. Any failure is a `Backup` error.
    pub async fn snapshot(
        &self,
        ctx: &RunContext<'_>,
    ) -> Result<Option<RollbackReference>, DeployError> {
        if ctx.settings.backup.skip {
            if ctx.request.environment.is_production() {
                warn!(deployment = %ctx.deployment_id, "backup skip ignored for production");
            } else {
                warn!(
                    deployment = %ctx.deployment_id,
                    "backup skipped, this run cannot be rolled back"
                );
                return Ok(None);
            }
        }

        let backup_id = generate_backup_id();

        let backup = ctx.command(
            &ctx.settings.commands.backup_database,
            &[("backup_id", backup_id.as_str())],
        );
        ctx.runner
            .run(&backup)
            .await
            .and_then(|out| out.into_result("datastore backup"))
            .map_err(|e| DeployError::Backup(e.to_string()))?;

        let current = ctx.command(&ctx.settings.commands.current_version, &[]);
        let previous_version = ctx
            .runner
            .run(&current)
            .await
            .and_then(|out| out.into_result("current version lookup"))
            .map_err(|e| DeployError::Backup(e.to_string()))?
            .stdout
            .trim()
            .to_string();
        if previous_version.is_empty() {
            return Err(DeployError::Backup(format!(
                "`{}` printed no version reference",
                current
            )));
        }

        let archived_configs = self
            .archive_configs(ctx)
            .await
            .map_err(|e| DeployError::Backup(e.to_string()))?;

        info!(
            deployment = %ctx.deployment_id,
            %backup_id,
            %previous_version,
            configs = archived_configs.len(),
            "rollback reference captured"
        );

        Ok(Some(RollbackReference {
            previous_version,
            backup_id,
            created_at: Utc::now(),
            archived_configs,
        }))
    }

    async fn archive_configs(
        &self,
        ctx: &RunContext<'_>,
    ) -> Result<Vec<ArchivedArtifact>, DeployError> {
        let artifacts = &ctx.settings.backup.config_artifacts;
        if artifacts.is_empty() {
            return Ok(Vec::new());
        }

        let dir = self.layout.backup_dir(ctx.deployment_id);
        dir.create().await?;

        let mut archived = Vec::with_capacity(artifacts.len());
        for (i, path) in artifacts.iter().enumerate() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "artifact".to_string());
            // index prefix keeps same-named files from different dirs apart
            let dest = dir.file(&format!("{:02}-{}", i, name));
            let sha256 = File::new(path).copy_to(&dest).await?;

            archived.push(ArchivedArtifact {
                source: path.display().to_string(),
                archived_path: dest.path().display().to_string(),
                sha256,
            });
        }

        Ok(archived)
    }
}

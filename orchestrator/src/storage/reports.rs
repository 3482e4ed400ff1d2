//! Persisted deployment reports

use tracing::{debug, info};

use crate::errors::DeployError;
use crate::models::status::DeploymentStatus;
use crate::storage::layout::StorageLayout;

/// Stores one JSON report per deployment id
#[derive(Debug, Clone)]
pub struct ReportStore {
    layout: StorageLayout,
}

impl ReportStore {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Write the full status under its deployment id
    pub async fn save(&self, status: &DeploymentStatus) -> Result<(), DeployError> {
        let file = self.layout.report_file(&status.deployment_id);
        file.write_json(status).await?;
        info!(
            deployment = %status.deployment_id,
            path = %file.path().display(),
            "deployment report written"
        );
        Ok(())
    }

    /// Reload a previously saved report
    pub async fn load(&self, deployment_id: &str) -> Result<DeploymentStatus, DeployError> {
        let file = self.layout.report_file(deployment_id);
        if !file.exists().await {
            return Err(DeployError::ConfigError(format!(
                "No report for deployment {}",
                deployment_id
            )));
        }
        debug!(deployment = %deployment_id, "loading deployment report");
        file.read_json().await
    }

    /// Deployment ids with a saved report, sorted
    pub async fn list(&self) -> Result<Vec<String>, DeployError> {
        let files = self.layout.reports_dir().list_files().await?;
        Ok(files
            .iter()
            .filter(|p| p.extension().is_some_and(|e| e == "json"))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect())
    }
}

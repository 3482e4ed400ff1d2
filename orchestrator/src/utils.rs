//! Utility functions

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Version information for the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Unique id of a deployment run: `deploy-<utc timestamp>-<8 hex>`
pub fn generate_deployment_id() -> String {
    timestamped_id("deploy")
}

/// Unique handle of a datastore backup: `backup-<utc timestamp>-<8 hex>`
pub fn generate_backup_id() -> String {
    timestamped_id("backup")
}

fn timestamped_id(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        prefix,
        Utc::now().format("%Y%m%d%H%M%S"),
        &suffix[..8]
    )
}

//! Built-in pre-flight checks

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::errors::DeployError;
use crate::exec::command::CommandSpec;
use crate::filesys::file::File;
use crate::storage::settings::ValidationSettings;
use crate::telemetry::{collect_headroom, Headroom};
use crate::validation::runner::{ValidationContext, ValidationStep};

pub const ENV_VARS: &str = "env-vars";
pub const DATASTORE: &str = "datastore";
pub const PLATFORM_CONFIG: &str = "platform-config";
pub const SECURITY_SCAN: &str = "security-scan";
pub const SERVICE_CONFIG: &str = "service-config";
pub const RESOURCE_HEADROOM: &str = "resource-headroom";

/// Required environment variables are present
///
/// Only presence is checked, values are never read into logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvVarsStep;

#[async_trait]
impl ValidationStep for EnvVarsStep {
    fn name(&self) -> &str {
        ENV_VARS
    }

    async fn run(&self, ctx: &ValidationContext<'_>) -> Result<(), DeployError> {
        let missing: Vec<&str> = ctx
            .settings
            .validation
            .required_env_vars
            .iter()
            .filter(|name| std::env::var_os(name.as_str()).is_none())
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            return Err(DeployError::ConfigError(format!(
                "missing environment variables: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

/// A configured command exits zero
#[derive(Debug, Clone, Copy)]
pub struct CommandStep {
    name: &'static str,
    select: fn(&ValidationSettings) -> &CommandSpec,
}

impl CommandStep {
    pub fn datastore() -> Self {
        Self {
            name: DATASTORE,
            select: |v| &v.datastore_check,
        }
    }

    pub fn platform_config() -> Self {
        Self {
            name: PLATFORM_CONFIG,
            select: |v| &v.platform_check,
        }
    }

    pub fn security_scan() -> Self {
        Self {
            name: SECURITY_SCAN,
            select: |v| &v.security_scan,
        }
    }
}

#[async_trait]
impl ValidationStep for CommandStep {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, ctx: &ValidationContext<'_>) -> Result<(), DeployError> {
        let spec = (self.select)(&ctx.settings.validation).render(&[
            ("version", ctx.request.version.as_str()),
            ("environment", ctx.request.environment.as_str()),
        ]);
        ctx.runner.run(&spec).await?.into_result(&spec.to_string())?;
        Ok(())
    }
}

/// Service config files parse and carry their required keys
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceConfigStep;

#[async_trait]
impl ValidationStep for ServiceConfigStep {
    fn name(&self) -> &str {
        SERVICE_CONFIG
    }

    async fn run(&self, ctx: &ValidationContext<'_>) -> Result<(), DeployError> {
        for check in &ctx.settings.validation.service_configs {
            let file = File::new(&check.path);
            let value = file.read_json::<Value>().await.map_err(|e| {
                DeployError::ConfigError(format!("{}: {}", check.path.display(), e))
            })?;

            let Some(object) = value.as_object() else {
                return Err(DeployError::ConfigError(format!(
                    "{}: expected a JSON object",
                    check.path.display()
                )));
            };

            let missing: Vec<&str> = check
                .required_keys
                .iter()
                .filter(|key| !object.contains_key(key.as_str()))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                return Err(DeployError::ConfigError(format!(
                    "{}: missing keys {}",
                    check.path.display(),
                    missing.join(", ")
                )));
            }
            debug!(path = %check.path.display(), "service config ok");
        }
        Ok(())
    }
}

/// Enough free disk and memory on the orchestrating host
#[derive(Debug, Clone, Copy)]
pub struct ResourceHeadroomStep {
    sample: fn() -> Headroom,
}

impl ResourceHeadroomStep {
    pub fn with_sampler(sample: fn() -> Headroom) -> Self {
        Self { sample }
    }
}

impl Default for ResourceHeadroomStep {
    fn default() -> Self {
        Self::with_sampler(collect_headroom)
    }
}

#[async_trait]
impl ValidationStep for ResourceHeadroomStep {
    fn name(&self) -> &str {
        RESOURCE_HEADROOM
    }

    async fn run(&self, ctx: &ValidationContext<'_>) -> Result<(), DeployError> {
        let headroom = (self.sample)();
        let limits = &ctx.settings.validation;
        debug!(
            disk = headroom.free_disk_percent,
            memory = headroom.free_memory_percent,
            "host headroom"
        );

        if headroom.free_disk_percent < limits.min_free_disk_percent {
            return Err(DeployError::ConfigError(format!(
                "free disk {:.1}% below minimum {:.1}%",
                headroom.free_disk_percent, limits.min_free_disk_percent
            )));
        }
        if headroom.free_memory_percent < limits.min_free_memory_percent {
            return Err(DeployError::ConfigError(format!(
                "free memory {:.1}% below minimum {:.1}%",
                headroom.free_memory_percent, limits.min_free_memory_percent
            )));
        }
        Ok(())
    }
}

//! Ordered, fail-fast pre-flight validation

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::errors::DeployError;
use crate::exec::command::CommandRunner;
use crate::models::request::DeploymentRequest;
use crate::storage::settings::Settings;
use crate::validation::steps::{
    CommandStep, EnvVarsStep, ResourceHeadroomStep, ServiceConfigStep,
};

/// Inputs shared by every step
pub struct ValidationContext<'a> {
    pub request: &'a DeploymentRequest,
    pub settings: &'a Settings,
    pub runner: &'a dyn CommandRunner,
}

/// A single named pre-flight check
#[async_trait]
pub trait ValidationStep: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &ValidationContext<'_>) -> Result<(), DeployError>;
}

/// Runs the steps a request names, in request order
pub struct ValidationRunner {
    steps: HashMap<String, Arc<dyn ValidationStep>>,
}

impl ValidationRunner {
    /// Runner with every built-in step registered
    pub fn new() -> Self {
        Self::empty()
            .with_step(EnvVarsStep)
            .with_step(CommandStep::datastore())
            .with_step(CommandStep::platform_config())
            .with_step(CommandStep::security_scan())
            .with_step(ServiceConfigStep)
            .with_step(ResourceHeadroomStep::default())
    }

    pub fn empty() -> Self {
        Self {
            steps: HashMap::new(),
        }
    }

    /// Register a step, replacing any step with the same name
    pub fn with_step(mut self, step: impl ValidationStep + 'static) -> Self {
        self.steps.insert(step.name().to_string(), Arc::new(step));
        self
    }

    /// Run `request.validation_steps` and stop at the first failure
    pub async fn validate(&self, ctx: &ValidationContext<'_>) -> Result<(), DeployError> {
        let names = &ctx.request.validation_steps;
        let total = names.len();

        for (i, name) in names.iter().enumerate() {
            let index = i + 1;
            let fail = |reason: String| {
                error!(step = %name, index, total, %reason, "validation failed");
                DeployError::Validation {
                    index,
                    total,
                    step: name.clone(),
                    reason,
                }
            };

            let Some(step) = self.steps.get(name) else {
                return Err(fail("unknown validation step".to_string()));
            };

            info!(step = %name, index, total, "running validation step");
            step.run(ctx).await.map_err(|e| fail(e.to_string()))?;
        }

        Ok(())
    }
}

impl Default for ValidationRunner {
    fn default() -> Self {
        Self::new()
    }
}

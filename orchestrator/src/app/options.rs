//! Command-line options

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::DeployError;
use crate::models::request::DeploymentRequest;
use crate::storage::settings::RequestDefaults;

/// Parsed `--key=value` arguments and bare `--flag`s
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    values: HashMap<String, String>,
    flags: HashSet<String>,
}

impl CliArgs {
    /// Parse arguments, excluding the program name
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = CliArgs::default();
        for arg in args {
            let arg = arg.as_ref();
            if let Some((key, value)) = arg.split_once('=') {
                // Handle --key=value format
                let clean_key = key.trim_start_matches('-');
                parsed.values.insert(clean_key.to_string(), value.to_string());
            } else if arg.starts_with("--") {
                // Handle standalone flags like --version
                let clean_key = arg.trim_start_matches('-');
                parsed.flags.insert(clean_key.to_string());
            }
        }
        parsed
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.flags.contains(key)
    }

    pub fn settings_path(&self) -> Option<PathBuf> {
        self.value("settings").map(PathBuf::from)
    }

    pub fn storage_dir(&self) -> Option<PathBuf> {
        self.value("storage-dir").map(PathBuf::from)
    }

    /// Production runs must be confirmed explicitly
    pub fn confirmed_production(&self) -> bool {
        self.flag("confirm-production")
    }

    /// Build the request, filling gaps from the settings defaults
    pub fn request(&self, defaults: &RequestDefaults) -> Result<DeploymentRequest, DeployError> {
        let version = self
            .value("version")
            .map(str::to_string)
            .ok_or_else(|| DeployError::InvalidRequest("--version=<ref> is required".to_string()))?;

        Ok(DeploymentRequest {
            environment: self.parsed("environment")?.unwrap_or(defaults.environment),
            version,
            strategy: self.parsed("strategy")?.unwrap_or(defaults.strategy),
            health_check_timeout_ms: self
                .parsed("health-timeout-ms")?
                .unwrap_or(defaults.health_check_timeout_ms),
            rollback_threshold_error_rate: self
                .parsed("error-threshold")?
                .unwrap_or(defaults.rollback_threshold_error_rate),
            validation_steps: self
                .list("validation-steps")
                .unwrap_or_else(|| defaults.validation_steps.clone()),
            post_deployment_tests: self
                .list("tests")
                .unwrap_or_else(|| defaults.post_deployment_tests.clone()),
        })
    }

    fn parsed<T>(&self, key: &str) -> Result<Option<T>, DeployError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.value(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| {
                    DeployError::InvalidRequest(format!("--{}={}: {}", key, raw, e))
                })
            })
            .transpose()
    }

    fn list(&self, key: &str) -> Option<Vec<String>> {
        self.value(key).map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

pub const USAGE: &str = "\
Usage: deployctl --version=<ref> [options]

  --environment=staging|production
  --strategy=blue-green|rolling|canary
  --health-timeout-ms=<ms>
  --error-threshold=<percent>
  --validation-steps=a,b,c
  --tests=x,y
  --settings=<path>
  --storage-dir=<path>
  --confirm-production
  --version             print build information
  --help";

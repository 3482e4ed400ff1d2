//! Settings file management

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::DeployError;
use crate::exec::command::CommandSpec;
use crate::logs::LogLevel;
use crate::models::request::{Environment, StrategyKind};
use crate::validation::steps;

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON logs on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Base directory for reports, backups and logs
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,

    /// Services whose health gates every rollout
    #[serde(default)]
    pub services: Vec<ServiceEndpoint>,

    /// Instances the strategies act on
    #[serde(default)]
    pub fleet: FleetSettings,

    /// Command templates for fleet mutations
    #[serde(default)]
    pub commands: CommandSettings,

    /// Pre-flight checks
    #[serde(default)]
    pub validation: ValidationSettings,

    /// Safety-net settings
    #[serde(default)]
    pub backup: BackupSettings,

    /// Rolling strategy tuning
    #[serde(default)]
    pub rolling: RollingSettings,

    /// Canary strategy tuning
    #[serde(default)]
    pub canary: CanarySettings,

    /// Post-deployment monitoring
    #[serde(default)]
    pub monitoring: MonitoringSettings,

    /// Aggregated metrics backend
    #[serde(default)]
    pub metrics: MetricsSettings,

    /// Notification transport
    #[serde(default)]
    pub notifications: NotificationSettings,

    /// Post-deployment tests by name
    #[serde(default)]
    pub post_deployment_tests: BTreeMap<String, CommandSpec>,

    /// Request fields used when the command line leaves them out
    #[serde(default)]
    pub defaults: RequestDefaults,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            storage_dir: None,
            services: Vec::new(),
            fleet: FleetSettings::default(),
            commands: CommandSettings::default(),
            validation: ValidationSettings::default(),
            backup: BackupSettings::default(),
            rolling: RollingSettings::default(),
            canary: CanarySettings::default(),
            monitoring: MonitoringSettings::default(),
            metrics: MetricsSettings::default(),
            notifications: NotificationSettings::default(),
            post_deployment_tests: BTreeMap::new(),
            defaults: RequestDefaults::default(),
        }
    }
}

impl Settings {
    /// Check that every configured endpoint is a valid URL
    pub fn check(&self) -> Result<(), DeployError> {
        let endpoints = self
            .services
            .iter()
            .map(|s| (s.name.as_str(), s.health_url.as_str()))
            .chain(
                self.fleet
                    .all_instances()
                    .map(|i| (i.name.as_str(), i.health_url.as_str())),
            )
            .chain(self.metrics.endpoint.as_deref().map(|e| ("metrics", e)))
            .chain(
                self.notifications
                    .webhook_url
                    .as_deref()
                    .map(|e| ("notifications", e)),
            );

        for (name, endpoint) in endpoints {
            Url::parse(endpoint).map_err(|e| {
                DeployError::ConfigError(format!("Invalid URL for {}: {} ({})", name, endpoint, e))
            })?;
        }

        if self.rolling.batch_size == Some(0) {
            return Err(DeployError::ConfigError(
                "rolling.batch_size must be greater than zero".to_string(),
            ));
        }

        if self.canary.poll_interval_secs == 0 || self.monitoring.poll_interval_secs == 0 {
            return Err(DeployError::ConfigError(
                "poll intervals must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn default_true() -> bool {
    true
}

/// A registered service health endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub name: String,
    pub health_url: String,
}

impl ServiceEndpoint {
    pub fn new(name: &str, health_url: &str) -> Self {
        Self {
            name: name.to_string(),
            health_url: health_url.to_string(),
        }
    }
}

/// Fleet layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetSettings {
    /// Instances replaced by rolling and canary rollouts
    #[serde(default)]
    pub instances: Vec<ServiceEndpoint>,

    /// Currently serving set for blue-green
    #[serde(default)]
    pub blue: Vec<ServiceEndpoint>,

    /// Idle set for blue-green
    #[serde(default)]
    pub green: Vec<ServiceEndpoint>,
}

impl FleetSettings {
    pub fn all_instances(&self) -> impl Iterator<Item = &ServiceEndpoint> {
        self.instances.iter().chain(&self.blue).chain(&self.green)
    }
}

/// Command templates
///
/// Placeholders: `{instance}`, `{version}`, `{target}`, `{percent}`,
/// `{backup_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSettings {
    #[serde(default = "default_deploy_instance")]
    pub deploy_instance: CommandSpec,

    #[serde(default = "default_switch_traffic")]
    pub switch_traffic: CommandSpec,

    #[serde(default = "default_set_traffic_split")]
    pub set_traffic_split: CommandSpec,

    #[serde(default = "default_current_version")]
    pub current_version: CommandSpec,

    #[serde(default = "default_backup_database")]
    pub backup_database: CommandSpec,

    #[serde(default = "default_restore_version")]
    pub restore_version: CommandSpec,

    #[serde(default = "default_restore_database")]
    pub restore_database: CommandSpec,

    #[serde(default = "default_redeploy")]
    pub redeploy: CommandSpec,
}

fn default_deploy_instance() -> CommandSpec {
    CommandSpec::new("deploy-instance", ["{instance}", "{version}"])
}

fn default_switch_traffic() -> CommandSpec {
    CommandSpec::new("switch-traffic", ["{target}"])
}

fn default_set_traffic_split() -> CommandSpec {
    CommandSpec::new("set-traffic-split", ["{version}", "{percent}"])
}

fn default_current_version() -> CommandSpec {
    CommandSpec::new("git", ["rev-parse", "HEAD"])
}

fn default_backup_database() -> CommandSpec {
    CommandSpec::new("backup-database", ["{backup_id}"])
}

fn default_restore_version() -> CommandSpec {
    CommandSpec::new("git", ["checkout", "{version}"])
}

fn default_restore_database() -> CommandSpec {
    CommandSpec::new("restore-database", ["{backup_id}"])
}

fn default_redeploy() -> CommandSpec {
    CommandSpec::new("redeploy", ["{version}"])
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            deploy_instance: default_deploy_instance(),
            switch_traffic: default_switch_traffic(),
            set_traffic_split: default_set_traffic_split(),
            current_version: default_current_version(),
            backup_database: default_backup_database(),
            restore_version: default_restore_version(),
            restore_database: default_restore_database(),
            redeploy: default_redeploy(),
        }
    }
}

/// Per-service configuration file to schema-check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfigCheck {
    pub path: PathBuf,
    #[serde(default)]
    pub required_keys: Vec<String>,
}

/// Pre-flight check settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// Environment variables that must be present
    #[serde(default)]
    pub required_env_vars: Vec<String>,

    #[serde(default = "default_datastore_check")]
    pub datastore_check: CommandSpec,

    #[serde(default = "default_platform_check")]
    pub platform_check: CommandSpec,

    #[serde(default = "default_security_scan")]
    pub security_scan: CommandSpec,

    #[serde(default)]
    pub service_configs: Vec<ServiceConfigCheck>,

    #[serde(default = "default_min_free_disk_percent")]
    pub min_free_disk_percent: f64,

    #[serde(default = "default_min_free_memory_percent")]
    pub min_free_memory_percent: f64,
}

fn default_datastore_check() -> CommandSpec {
    CommandSpec::new("check-datastore", Vec::<String>::new())
}

fn default_platform_check() -> CommandSpec {
    CommandSpec::new("check-platform-config", Vec::<String>::new())
}

fn default_security_scan() -> CommandSpec {
    CommandSpec::new("cargo", ["audit"])
}

fn default_min_free_disk_percent() -> f64 {
    10.0
}

fn default_min_free_memory_percent() -> f64 {
    10.0
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            required_env_vars: Vec::new(),
            datastore_check: default_datastore_check(),
            platform_check: default_platform_check(),
            security_scan: default_security_scan(),
            service_configs: Vec::new(),
            min_free_disk_percent: default_min_free_disk_percent(),
            min_free_memory_percent: default_min_free_memory_percent(),
        }
    }
}

/// Backup settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Skip the safety net (ignored for production)
    #[serde(default)]
    pub skip: bool,

    /// Configuration files archived before mutation
    #[serde(default)]
    pub config_artifacts: Vec<PathBuf>,
}

/// What to do with updated batches when a rolling rollout halts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RollingFailurePolicy {
    /// Keep updated batches on the new version and fail the run
    #[default]
    LeaveInPlace,

    /// Hand the failure to the rollback controller
    Rollback,
}

/// Rolling strategy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingSettings {
    /// Instances per batch, `ceil(N/3)` when unset
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Pause between batches for connection draining
    #[serde(default = "default_batch_pause_secs")]
    pub batch_pause_secs: u64,

    #[serde(default)]
    pub failure_policy: RollingFailurePolicy,
}

fn default_batch_pause_secs() -> u64 {
    5
}

impl RollingSettings {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_secs(self.batch_pause_secs)
    }
}

impl Default for RollingSettings {
    fn default() -> Self {
        Self {
            batch_size: None,
            batch_pause_secs: default_batch_pause_secs(),
            failure_policy: RollingFailurePolicy::default(),
        }
    }
}

/// Canary strategy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanarySettings {
    /// Observation window after each traffic step
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Metrics polling interval inside the window
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_window_secs() -> u64 {
    300
}

fn default_poll_interval_secs() -> u64 {
    30
}

impl CanarySettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for CanarySettings {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

/// Post-deployment monitoring settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSettings {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Fail the performance gate above this average latency
    #[serde(default)]
    pub max_avg_response_time_ms: Option<f64>,
}

impl MonitoringSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            max_avg_response_time_ms: None,
        }
    }
}

/// Behaviour when the metrics backend is unreachable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsFallback {
    /// Report zero errors and full success
    #[default]
    Optimistic,

    /// Surface the collection failure
    Fail,
}

/// Aggregated metrics backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Aggregated metrics endpoint, metrics are skipped when unset
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_time_range_minutes")]
    pub time_range_minutes: u64,

    #[serde(default = "default_aggregation_type")]
    pub aggregation_type: String,

    #[serde(default = "default_metrics_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub fallback: MetricsFallback,
}

fn default_time_range_minutes() -> u64 {
    5
}

fn default_aggregation_type() -> String {
    "avg".to_string()
}

fn default_metrics_timeout_ms() -> u64 {
    10_000
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            time_range_minutes: default_time_range_minutes(),
            aggregation_type: default_aggregation_type(),
            timeout_ms: default_metrics_timeout_ms(),
            fallback: MetricsFallback::default(),
        }
    }
}

/// Notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Log every event through tracing
    #[serde(default = "default_true")]
    pub log: bool,

    /// Webhook receiving the event as JSON
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Bearer token for the webhook
    #[serde(default)]
    pub webhook_token: Option<String>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            log: true,
            webhook_url: None,
            webhook_token: None,
        }
    }
}

/// Request defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDefaults {
    #[serde(default = "default_environment")]
    pub environment: Environment,

    #[serde(default = "default_strategy")]
    pub strategy: StrategyKind,

    #[serde(default = "default_health_check_timeout_ms")]
    pub health_check_timeout_ms: u64,

    #[serde(default = "default_rollback_threshold_error_rate")]
    pub rollback_threshold_error_rate: f64,

    #[serde(default = "default_validation_steps")]
    pub validation_steps: Vec<String>,

    #[serde(default)]
    pub post_deployment_tests: Vec<String>,
}

fn default_environment() -> Environment {
    Environment::Staging
}

fn default_strategy() -> StrategyKind {
    StrategyKind::Rolling
}

fn default_health_check_timeout_ms() -> u64 {
    5_000
}

fn default_rollback_threshold_error_rate() -> f64 {
    1.0
}

fn default_validation_steps() -> Vec<String> {
    [
        steps::ENV_VARS,
        steps::DATASTORE,
        steps::PLATFORM_CONFIG,
        steps::SECURITY_SCAN,
        steps::SERVICE_CONFIG,
        steps::RESOURCE_HEADROOM,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            strategy: default_strategy(),
            health_check_timeout_ms: default_health_check_timeout_ms(),
            rollback_threshold_error_rate: default_rollback_threshold_error_rate(),
            validation_steps: default_validation_steps(),
            post_deployment_tests: Vec::new(),
        }
    }
}

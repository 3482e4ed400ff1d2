//! Shared fixtures: a fleet, scripted collaborators and a scratch directory

use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::watch;

use deployctl::deploy::notify::RecordingNotifier;
use deployctl::deploy::orchestrator::Orchestrator;
use deployctl::deploy::pacer::{NoopSleeper, Sleeper};
use deployctl::exec::scripted::ScriptedRunner;
use deployctl::models::request::{DeploymentRequest, Environment, StrategyKind};
use deployctl::probe::scripted::{ScriptedMetrics, ScriptedProbe};
use deployctl::storage::layout::StorageLayout;
use deployctl::storage::settings::{ServiceEndpoint, Settings};

pub const VERSION: &str = "v2.0.0";
pub const PREVIOUS: &str = "4f2a9c1";

pub struct Harness {
    pub dir: TempDir,
    pub settings: Settings,
    pub runner: Arc<ScriptedRunner>,
    pub probe: Arc<ScriptedProbe>,
    pub metrics: Arc<ScriptedMetrics>,
    pub notifier: Arc<RecordingNotifier>,
    pub sleeper: NoopSleeper,
}

impl Harness {
    pub fn new() -> Self {
        let mut settings = Settings::default();
        settings.notifications.log = false;
        settings.services = vec![
            ServiceEndpoint::new("api", "http://api.internal/health"),
            ServiceEndpoint::new("worker", "http://worker.internal/health"),
        ];
        settings.fleet.instances = instances("app", 9);
        settings.fleet.blue = instances("blue", 2);
        settings.fleet.green = instances("green", 2);

        Self {
            dir: tempfile::tempdir().unwrap(),
            settings,
            runner: Arc::new(ScriptedRunner::new().stdout("git rev-parse", PREVIOUS)),
            probe: Arc::new(ScriptedProbe::new()),
            metrics: Arc::new(ScriptedMetrics::error_rates(&[0.1])),
            notifier: Arc::new(RecordingNotifier::new()),
            sleeper: NoopSleeper::new(),
        }
    }

    pub fn layout(&self) -> StorageLayout {
        StorageLayout::new(self.dir.path())
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::builder(self.settings.clone(), self.layout())
            .runner(self.runner.clone())
            .probe(self.probe.clone())
            .metrics(self.metrics.clone())
            .notifier(self.notifier.clone())
            .sleeper(Arc::new(self.sleeper.clone()))
            .build()
            .unwrap()
    }

    /// Orchestrator whose pauses go through `sleeper` and stop once `cancel` reads true
    pub fn cancellable_orchestrator(
        &self,
        sleeper: Arc<dyn Sleeper>,
        cancel: watch::Receiver<bool>,
    ) -> Orchestrator {
        Orchestrator::builder(self.settings.clone(), self.layout())
            .runner(self.runner.clone())
            .probe(self.probe.clone())
            .metrics(self.metrics.clone())
            .notifier(self.notifier.clone())
            .sleeper(sleeper)
            .cancel_signal(cancel)
            .build()
            .unwrap()
    }
}

pub fn instances(prefix: &str, count: usize) -> Vec<ServiceEndpoint> {
    (1..=count)
        .map(|i| {
            let name = format!("{}-{}", prefix, i);
            let url = format!("http://{}.internal/health", name);
            ServiceEndpoint::new(&name, &url)
        })
        .collect()
}

pub fn request(strategy: StrategyKind, environment: Environment, threshold: f64) -> DeploymentRequest {
    DeploymentRequest {
        environment,
        version: VERSION.to_string(),
        strategy,
        health_check_timeout_ms: 2_000,
        rollback_threshold_error_rate: threshold,
        validation_steps: Vec::new(),
        post_deployment_tests: Vec::new(),
    }
}

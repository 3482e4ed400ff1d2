//! End-to-end runs against scripted collaborators

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use deployctl::deploy::pacer::Sleeper;
use deployctl::exec::command::{CommandOutput, CommandSpec};
use deployctl::models::request::{Environment, StrategyKind};
use deployctl::models::status::{DeploymentState, HealthState, Phase};
use deployctl::probe::scripted::{with_error_rate, ScriptedMetrics, ScriptedProbe};
use deployctl::storage::settings::RollingFailurePolicy;

use crate::common::{request, Harness, PREVIOUS, VERSION};

#[tokio::test]
async fn test_rolling_happy_path_completes() {
    let mut h = Harness::new();
    h.settings.fleet.instances.truncate(3);

    let status = h
        .orchestrator()
        .run(request(StrategyKind::Rolling, Environment::Staging, 1.0))
        .await;

    assert_eq!(status.state, DeploymentState::Completed, "{:?}", status.error);
    assert!(!status.rollback_triggered);
    assert!(status.completed_at.is_some());
    assert_eq!(status.rollback_reference.as_ref().unwrap().previous_version, PREVIOUS);

    // three instances, then both services
    assert_eq!(status.health_checks.len(), 5);
    assert!((status.error_rate - 0.1).abs() < 1e-9);

    let phases: Vec<Phase> = status.phases.iter().map(|p| p.phase).collect();
    assert_eq!(
        phases,
        vec![
            Phase::Validation,
            Phase::Backup,
            Phase::Strategy,
            Phase::HealthVerification,
            Phase::PerformanceVerification,
            Phase::PostDeploymentTests,
            Phase::Monitoring,
        ]
    );
    assert!(status.phases.iter().all(|p| p.succeeded));

    // two batch pauses, then ten monitoring polls
    let pauses = h.sleeper.pauses();
    assert_eq!(pauses.len(), 12);
    assert_eq!(&pauses[..2], &[Duration::from_secs(5), Duration::from_secs(5)]);
    assert!(pauses[2..].iter().all(|p| *p == Duration::from_secs(30)));

    let events = h.notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, DeploymentState::Completed);

    let report = h.orchestrator().reports().load(&status.deployment_id).await.unwrap();
    assert_eq!(report, status);
}

#[tokio::test]
async fn test_validation_step_three_of_six_fails() {
    let h = Harness::new();
    h.runner
        .push_rule("check-platform-config", CommandOutput::failed(1, "project not found"));

    let mut req = request(StrategyKind::Rolling, Environment::Staging, 1.0);
    req.validation_steps = [
        "env-vars",
        "datastore",
        "platform-config",
        "security-scan",
        "service-config",
        "resource-headroom",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let status = h.orchestrator().run(req).await;

    assert_eq!(status.state, DeploymentState::Failed);
    assert!(status.health_checks.is_empty());
    assert!(!status.rollback_triggered);
    assert!(status.rollback_reference.is_none());
    assert!(status
        .error
        .as_deref()
        .unwrap()
        .starts_with("Validation step 3/6 (platform-config) failed"));

    assert_eq!(h.runner.count("cargo audit"), 0);
    assert_eq!(h.runner.count("backup-database"), 0);
    assert_eq!(h.runner.count("deploy-instance"), 0);
    assert_eq!(status.phases.len(), 1);
    assert_eq!(h.notifier.events().len(), 1);
}

#[tokio::test]
async fn test_production_threshold_rejected_before_execution() {
    let h = Harness::new();

    let status = h
        .orchestrator()
        .run(request(StrategyKind::BlueGreen, Environment::Production, 2.0))
        .await;

    assert_eq!(status.state, DeploymentState::Failed);
    assert!(status.error.as_deref().unwrap().contains("production maximum"));
    assert!(status.phases.is_empty());
    assert!(h.runner.calls().is_empty());
    assert!(h.probe.checked().is_empty());

    let events = h.notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, DeploymentState::Failed);
    assert!(h.orchestrator().reports().load(&status.deployment_id).await.is_ok());
}

#[tokio::test]
async fn test_unhealthy_green_never_switches_traffic() {
    let mut h = Harness::new();
    h.probe = Arc::new(ScriptedProbe::new().with_state("green-2", HealthState::Unhealthy));

    let status = h
        .orchestrator()
        .run(request(StrategyKind::BlueGreen, Environment::Staging, 1.0))
        .await;

    assert_eq!(h.runner.count("switch-traffic green"), 0);
    assert_eq!(h.runner.count("switch-traffic blue"), 1);
    assert_eq!(h.runner.count("deploy-instance green-"), 2);
    assert_eq!(h.runner.count("deploy-instance blue-"), 0);

    // the failed strategy hands over to the rollback controller
    assert_eq!(status.state, DeploymentState::RolledBack);
    assert!(status.rollback_triggered);
    assert!(h.runner.position("switch-traffic blue") < h.runner.position("git checkout"));
    assert!(status
        .health_checks
        .iter()
        .any(|r| r.service == "green-2" && r.status == HealthState::Unhealthy));
}

#[tokio::test]
async fn test_blue_green_switches_once_when_green_is_healthy() {
    let h = Harness::new();

    let status = h
        .orchestrator()
        .run(request(StrategyKind::BlueGreen, Environment::Staging, 1.0))
        .await;

    assert_eq!(status.state, DeploymentState::Completed, "{:?}", status.error);
    assert_eq!(h.runner.count("switch-traffic green"), 1);
    assert_eq!(h.runner.count("switch-traffic blue"), 0);
    assert!(h.runner.position("deploy-instance green-2") < h.runner.position("switch-traffic green"));
}

#[tokio::test]
async fn test_green_gate_ignores_shared_services() {
    let mut h = Harness::new();
    h.probe = Arc::new(ScriptedProbe::new().with_state("api.internal", HealthState::Unhealthy));

    let status = h
        .orchestrator()
        .run(request(StrategyKind::BlueGreen, Environment::Staging, 1.0))
        .await;

    // green itself is healthy, so traffic moves and the shared service fails later
    assert_eq!(h.runner.count("switch-traffic green"), 1);
    let strategy = status.phases.iter().find(|p| p.phase == Phase::Strategy).unwrap();
    assert!(strategy.succeeded);
    let health = status
        .phases
        .iter()
        .find(|p| p.phase == Phase::HealthVerification)
        .unwrap();
    assert!(!health.succeeded);
    assert!(status.error.as_deref().unwrap().contains("api"));
    assert!(status.rollback_triggered);
}

#[tokio::test]
async fn test_rolling_batch_two_failure_leaves_batch_one() {
    let mut h = Harness::new();
    h.probe = Arc::new(ScriptedProbe::new().with_state("app-5", HealthState::Unhealthy));

    let status = h
        .orchestrator()
        .run(request(StrategyKind::Rolling, Environment::Staging, 1.0))
        .await;

    assert_eq!(status.state, DeploymentState::Failed);
    assert!(!status.rollback_triggered);
    assert!(status.rollback.is_none());
    assert!(status
        .error
        .as_deref()
        .unwrap()
        .contains("halted at batch 2/3"));

    for instance in ["app-1", "app-2", "app-3", "app-4", "app-5", "app-6"] {
        assert_eq!(h.runner.count(&format!("deploy-instance {} ", instance)), 1);
    }
    for instance in ["app-7", "app-8", "app-9"] {
        assert_eq!(h.runner.count(&format!("deploy-instance {} ", instance)), 0);
    }
    assert_eq!(h.runner.count("git checkout"), 0);
    assert_eq!(h.sleeper.pauses(), vec![Duration::from_secs(5)]);
}

#[tokio::test]
async fn test_rolling_failure_rolls_back_when_configured() {
    let mut h = Harness::new();
    h.settings.rolling.failure_policy = RollingFailurePolicy::Rollback;
    h.probe = Arc::new(ScriptedProbe::new().with_state("app-5", HealthState::Unhealthy));

    let status = h
        .orchestrator()
        .run(request(StrategyKind::Rolling, Environment::Staging, 1.0))
        .await;

    assert_eq!(status.state, DeploymentState::RolledBack);
    assert_eq!(h.runner.count(&format!("git checkout {}", PREVIOUS)), 1);
    assert_eq!(h.runner.count(&format!("redeploy {}", PREVIOUS)), 1);
    assert_eq!(h.runner.count("deploy-instance app-7 "), 0);
}

#[tokio::test]
async fn test_canary_breach_at_fifty_percent_rolls_back() {
    let mut h = Harness::new();
    // ten clean polls at 10%, then 0.8% errors
    let mut rates = vec![0.1; 10];
    rates.push(0.8);
    h.metrics = Arc::new(ScriptedMetrics::error_rates(&rates));

    let status = h
        .orchestrator()
        .run(request(StrategyKind::Canary, Environment::Production, 0.5))
        .await;

    assert_eq!(status.state, DeploymentState::RolledBack, "{:?}", status.error);
    assert!(status.rollback_triggered);
    assert!((status.error_rate - 0.8).abs() < 1e-9);
    assert!(status.error.as_deref().unwrap().contains("canary at 50%"));

    let split = |p: u8| format!("set-traffic-split {} {}", VERSION, p);
    assert_eq!(h.runner.count(&split(10)), 1);
    assert_eq!(h.runner.count(&split(50)), 1);
    assert_eq!(h.runner.count(&split(100)), 0);
    assert_eq!(h.runner.count(&split(0)), 1);
    assert!(h.runner.position(&split(0)) < h.runner.position("git checkout"));

    let rollback = status.rollback.as_ref().unwrap();
    assert!(rollback.succeeded);
    assert_eq!(rollback.restored_version.as_deref(), Some(PREVIOUS));
    assert_eq!(h.metrics.calls(), 11);
}

#[tokio::test]
async fn test_canary_walks_all_steps_when_clean() {
    let h = Harness::new();

    let status = h
        .orchestrator()
        .run(request(StrategyKind::Canary, Environment::Staging, 0.5))
        .await;

    assert_eq!(status.state, DeploymentState::Completed, "{:?}", status.error);
    let calls = h.runner.calls();
    let steps: Vec<&String> = calls.iter().filter(|c| c.starts_with("set-traffic-split")).collect();
    assert_eq!(
        steps,
        vec![
            &format!("set-traffic-split {} 10", VERSION),
            &format!("set-traffic-split {} 50", VERSION),
            &format!("set-traffic-split {} 100", VERSION),
        ]
    );
}

#[tokio::test]
async fn test_failed_rollback_confirmation_ends_failed() {
    let mut h = Harness::new();
    h.metrics = Arc::new(ScriptedMetrics::new(vec![with_error_rate(3.0)]));
    // the canary never probes services, only the rollback confirmation does
    h.probe = Arc::new(ScriptedProbe::new().with_state("api.internal", HealthState::Unhealthy));

    let status = h
        .orchestrator()
        .run(request(StrategyKind::Canary, Environment::Staging, 1.0))
        .await;

    assert_eq!(status.state, DeploymentState::Failed);
    assert!(status.rollback_triggered);
    let rollback = status.rollback.as_ref().unwrap();
    assert!(!rollback.succeeded);
    assert!(rollback.error.as_deref().unwrap().contains("after rollback"));

    let events = h.notifier.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].details.contains("manual intervention required"));
}

#[tokio::test]
async fn test_run_without_reference_never_rolls_back() {
    let mut h = Harness::new();
    h.settings.backup.skip = true;
    h.metrics = Arc::new(ScriptedMetrics::error_rates(&[5.0]));

    let status = h
        .orchestrator()
        .run(request(StrategyKind::Canary, Environment::Staging, 1.0))
        .await;

    assert_eq!(status.state, DeploymentState::Failed);
    assert!(!status.rollback_triggered);
    assert!(status.rollback_reference.is_none());
    assert!(status.rollback.is_none());
    assert!(status.error.as_deref().unwrap().contains("canary at 10%"));
    assert!(!status.error.as_deref().unwrap().contains("Rollback error"));
    assert!(status.phases.iter().all(|p| p.phase != Phase::Rollback));
    assert_eq!(h.runner.count("backup-database"), 0);
    assert_eq!(h.runner.count("git checkout"), 0);
    assert_eq!(h.runner.count("redeploy"), 0);
}

#[tokio::test]
async fn test_performance_gate_breach_rolls_back() {
    let mut h = Harness::new();
    h.settings.fleet.instances.truncate(2);
    h.metrics = Arc::new(ScriptedMetrics::error_rates(&[2.5]));

    let status = h
        .orchestrator()
        .run(request(StrategyKind::Rolling, Environment::Staging, 1.0))
        .await;

    assert_eq!(status.state, DeploymentState::RolledBack);
    assert!(status.error.as_deref().unwrap().contains("performance verification"));
    let failed: Vec<Phase> = status
        .phases
        .iter()
        .filter(|p| !p.succeeded)
        .map(|p| p.phase)
        .collect();
    assert_eq!(failed, vec![Phase::PerformanceVerification]);
    assert_eq!(status.phases.last().unwrap().phase, Phase::Rollback);
}

#[tokio::test]
async fn test_post_deployment_test_failure_rolls_back() {
    let mut h = Harness::new();
    h.settings.fleet.instances.truncate(1);
    h.settings
        .post_deployment_tests
        .insert("smoke".to_string(), CommandSpec::new("run-smoke", ["{version}"]));
    h.runner.push_rule("run-smoke", CommandOutput::failed(1, "3 of 40 failed"));

    let mut req = request(StrategyKind::Rolling, Environment::Staging, 1.0);
    req.post_deployment_tests = vec!["smoke".to_string()];

    let status = h.orchestrator().run(req).await;

    assert_eq!(status.state, DeploymentState::RolledBack);
    assert_eq!(h.runner.count(&format!("run-smoke {}", VERSION)), 1);
    assert!(status.error.as_deref().unwrap().contains("post-deployment test smoke failed"));
}

#[tokio::test]
async fn test_unknown_post_deployment_test_is_an_error() {
    let mut h = Harness::new();
    h.settings.fleet.instances.truncate(1);

    let mut req = request(StrategyKind::Rolling, Environment::Staging, 1.0);
    req.post_deployment_tests = vec!["load".to_string()];

    let status = h.orchestrator().run(req).await;
    assert_eq!(status.state, DeploymentState::RolledBack);
    assert!(status.error.as_deref().unwrap().contains("load is not configured"));
}

#[tokio::test]
async fn test_monitoring_breach_rolls_back() {
    let mut h = Harness::new();
    h.settings.fleet.instances.truncate(1);
    // performance gate passes, the fourth monitoring poll breaches
    h.metrics = Arc::new(ScriptedMetrics::error_rates(&[0.2, 0.2, 0.2, 0.2, 1.5]));

    let status = h
        .orchestrator()
        .run(request(StrategyKind::Rolling, Environment::Staging, 1.0))
        .await;

    assert_eq!(status.state, DeploymentState::RolledBack);
    assert!(status.error.as_deref().unwrap().contains("monitoring"));
    assert_eq!(h.metrics.calls(), 5);
}

#[tokio::test]
async fn test_cancel_before_rollout_fails_without_rollback() {
    let h = Harness::new();
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let status = h
        .cancellable_orchestrator(Arc::new(h.sleeper.clone()), rx)
        .run(request(StrategyKind::Rolling, Environment::Staging, 1.0))
        .await;

    assert_eq!(status.state, DeploymentState::Failed);
    assert_eq!(status.error.as_deref(), Some("Deployment cancelled before rollout"));
    assert!(!status.rollback_triggered);
    assert!(status.rollback.is_none());
    assert!(status.rollback_reference.is_some());

    assert_eq!(h.runner.count("deploy-instance"), 0);
    assert_eq!(h.runner.count("git checkout"), 0);
    assert_eq!(h.runner.count("restore-database"), 0);
    assert_eq!(h.runner.count("redeploy"), 0);
    assert_eq!(h.notifier.events().len(), 1);
}

/// Requests cancellation from inside the first pause
struct CancellingSleeper {
    cancel: watch::Sender<bool>,
}

#[async_trait]
impl Sleeper for CancellingSleeper {
    async fn sleep(&self, _duration: Duration) {
        let _ = self.cancel.send(true);
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_cancel_during_monitoring_rolls_back() {
    let mut h = Harness::new();
    h.settings.fleet.instances.truncate(1);
    let (tx, rx) = watch::channel(false);

    let status = h
        .cancellable_orchestrator(Arc::new(CancellingSleeper { cancel: tx }), rx)
        .run(request(StrategyKind::Rolling, Environment::Staging, 1.0))
        .await;

    assert_eq!(status.error.as_deref(), Some("Deployment cancelled"));
    assert_eq!(status.state, DeploymentState::RolledBack);
    assert!(status.rollback_triggered);
    assert_eq!(h.runner.count("deploy-instance app-1 "), 1);
    assert_eq!(h.runner.count("restore-database"), 1);

    let monitoring = status
        .phases
        .iter()
        .find(|p| p.phase == Phase::Monitoring)
        .unwrap();
    assert!(!monitoring.succeeded);
}

//! Deployment orchestrator
//!
//! Runs one request through its phases:
//!
//! 1. validation
//! 2. backup (rollback reference)
//! 3. strategy execution
//! 4. health verification
//! 5. performance verification
//! 6. post-deployment tests
//! 7. monitoring window
//!
//! A failing phase stops the run. Pre-flight and unrecoverable errors end it
//! `failed`; every other error hands over to the [`RollbackController`].
//! Each terminal state produces exactly one report and one notification.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::deploy::backup::BackupManager;
use crate::deploy::context::{Observations, RunContext};
use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use crate::deploy::notify::{LogNotifier, Notifier, WebhookNotifier};
use crate::deploy::pacer::{Pacer, Sleeper, TokioSleeper};
use crate::deploy::rollback::{should_rollback, RollbackController};
use crate::deploy::strategies::polls_per_window;
use crate::deploy::strategy::{self, probe_and_record};
use crate::errors::{DeployError, ErrorClass};
use crate::exec::command::{CommandRunner, ProcessRunner};
use crate::models::event::NotificationEvent;
use crate::models::request::DeploymentRequest;
use crate::models::status::{
    DeploymentStatus, HealthState, Phase, PhaseRecord, PerformanceMetrics, RollbackReference,
};
use crate::probe::health::{aggregate, failing_services, HealthProbe, HttpHealthProbe};
use crate::probe::metrics::{HttpMetricsCollector, MetricsCollector, StaticMetrics};
use crate::storage::layout::StorageLayout;
use crate::storage::reports::ReportStore;
use crate::storage::settings::Settings;
use crate::utils::generate_deployment_id;
use crate::validation::runner::{ValidationContext, ValidationRunner};

/// Builds an [`Orchestrator`], defaulting every collaborator not injected
pub struct OrchestratorBuilder {
    settings: Settings,
    layout: StorageLayout,
    runner: Option<Arc<dyn CommandRunner>>,
    probe: Option<Arc<dyn HealthProbe>>,
    metrics: Option<Arc<dyn MetricsCollector>>,
    validator: Option<ValidationRunner>,
    notifiers: Vec<Arc<dyn Notifier>>,
    sleeper: Option<Arc<dyn Sleeper>>,
    cancel: Option<watch::Receiver<bool>>,
}

impl OrchestratorBuilder {
    pub fn new(settings: Settings, layout: StorageLayout) -> Self {
        Self {
            settings,
            layout,
            runner: None,
            probe: None,
            metrics: None,
            validator: None,
            notifiers: Vec::new(),
            sleeper: None,
            cancel: None,
        }
    }

    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn validator(mut self, validator: ValidationRunner) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Add a notifier; the settings-derived notifiers are used only when none is added
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Cancel the run once `true` is sent
    pub fn cancel_signal(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> Result<Orchestrator, DeployError> {
        self.settings.check()?;
        let settings = self.settings;

        let runner = match self.runner {
            Some(runner) => runner,
            None => Arc::new(ProcessRunner::new()),
        };

        let probe = match self.probe {
            Some(probe) => probe,
            None => Arc::new(HttpHealthProbe::new()?),
        };

        let metrics: Arc<dyn MetricsCollector> = match (self.metrics, &settings.metrics.endpoint) {
            (Some(metrics), _) => metrics,
            (None, Some(endpoint)) => Arc::new(HttpMetricsCollector::new(
                endpoint,
                settings.services.iter().map(|s| s.name.clone()).collect(),
                &settings.metrics,
            )?),
            (None, None) => {
                warn!("no metrics endpoint configured, error rate gates will always pass");
                Arc::new(StaticMetrics(PerformanceMetrics::optimistic()))
            }
        };

        let mut notifiers = self.notifiers;
        if notifiers.is_empty() {
            if settings.notifications.log {
                notifiers.push(Arc::new(LogNotifier));
            }
            if let Some(url) = &settings.notifications.webhook_url {
                notifiers.push(Arc::new(WebhookNotifier::new(
                    url,
                    settings.notifications.webhook_token.clone(),
                )?));
            }
        }

        let sleeper = self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper));
        let pacer = match self.cancel {
            Some(cancel) => Pacer::new(sleeper, cancel),
            None => Pacer::uncancellable(sleeper),
        };

        Ok(Orchestrator {
            settings,
            runner,
            probe,
            metrics,
            validator: self.validator.unwrap_or_default(),
            backup: BackupManager::new(self.layout.clone()),
            rollback: RollbackController::new(),
            reports: ReportStore::new(self.layout),
            notifiers,
            pacer,
        })
    }
}

/// Drives deployment runs
pub struct Orchestrator {
    settings: Settings,
    runner: Arc<dyn CommandRunner>,
    probe: Arc<dyn HealthProbe>,
    metrics: Arc<dyn MetricsCollector>,
    validator: ValidationRunner,
    backup: BackupManager,
    rollback: RollbackController,
    reports: ReportStore,
    notifiers: Vec<Arc<dyn Notifier>>,
    pacer: Pacer,
}

impl Orchestrator {
    pub fn builder(settings: Settings, layout: StorageLayout) -> OrchestratorBuilder {
        OrchestratorBuilder::new(settings, layout)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn reports(&self) -> &ReportStore {
        &self.reports
    }

    /// Run a request to a terminal state
    ///
    /// Never fails: the outcome, including any error, is in the returned
    /// status, which has also been persisted and announced.
    pub async fn run(&self, request: DeploymentRequest) -> DeploymentStatus {
        let deployment_id = generate_deployment_id();
        let mut status = DeploymentStatus::new(&deployment_id, &request);
        let mut fsm = DeploymentFsm::new();
        let observations = Observations::new();

        info!(
            deployment = %deployment_id,
            environment = %request.environment,
            version = %request.version,
            strategy = %request.strategy,
            "deployment requested"
        );

        match request.check() {
            Err(e) => {
                error!(deployment = %deployment_id, error = %e, "request rejected");
                status.error = Some(e.to_string());
                transition(&mut fsm, &mut status, DeploymentEvent::Reject(e.to_string()));
            }
            Ok(()) => {
                transition(&mut fsm, &mut status, DeploymentEvent::Start);
                let result = self.execute(&request, &mut status, &observations).await;
                self.conclude(&request, &mut status, &mut fsm, &observations, result)
                    .await;
            }
        }

        status.completed_at = Some(Utc::now());
        self.publish(&status).await;
        status
    }

    fn context<'a>(
        &'a self,
        deployment_id: &'a str,
        request: &'a DeploymentRequest,
        observations: &'a Observations,
        rollback_reference: Option<&'a RollbackReference>,
    ) -> RunContext<'a> {
        RunContext {
            deployment_id,
            request,
            settings: &self.settings,
            runner: self.runner.as_ref(),
            probe: self.probe.as_ref(),
            metrics: self.metrics.as_ref(),
            pacer: &self.pacer,
            observations,
            rollback_reference,
        }
    }

    async fn execute(
        &self,
        request: &DeploymentRequest,
        status: &mut DeploymentStatus,
        observations: &Observations,
    ) -> Result<(), DeployError> {
        let id = status.deployment_id.clone();

        let ctx = self.context(&id, request, observations, None);
        timed(status, observations, Phase::Validation, self.validate(&ctx)).await?;

        let reference = timed(status, observations, Phase::Backup, self.backup.snapshot(&ctx)).await?;
        status.rollback_reference = reference.clone();

        let ctx = self.context(&id, request, observations, reference.as_ref());
        // nothing on the fleet has changed yet, so there is nothing to roll back
        self.pacer
            .check()
            .map_err(|_| DeployError::CancelledBeforeRollout)?;

        let strategy = strategy::for_kind(request.strategy);
        info!(deployment = %id, strategy = %strategy.kind(), "executing strategy");
        timed(status, observations, Phase::Strategy, strategy.execute(&ctx)).await?;
        timed(status, observations, Phase::HealthVerification, self.verify_health(&ctx)).await?;
        timed(
            status,
            observations,
            Phase::PerformanceVerification,
            self.verify_performance(&ctx),
        )
        .await?;
        timed(
            status,
            observations,
            Phase::PostDeploymentTests,
            self.run_post_deployment_tests(&ctx),
        )
        .await?;
        timed(status, observations, Phase::Monitoring, self.monitor(&ctx)).await?;

        Ok(())
    }

    /// Turn the phase result into a terminal state, rolling back when due
    async fn conclude(
        &self,
        request: &DeploymentRequest,
        status: &mut DeploymentStatus,
        fsm: &mut DeploymentFsm,
        observations: &Observations,
        result: Result<(), DeployError>,
    ) {
        let err = match result {
            Ok(()) => {
                info!(deployment = %status.deployment_id, "deployment completed");
                transition(fsm, status, DeploymentEvent::Complete);
                return;
            }
            Err(e) => e,
        };

        let reason = err.to_string();
        status.error = Some(reason.clone());

        if err.class() != ErrorClass::Recoverable {
            error!(deployment = %status.deployment_id, error = %reason, "deployment failed");
            transition(fsm, status, DeploymentEvent::Fail(reason));
            return;
        }

        if status.rollback_reference.is_none() {
            error!(
                deployment = %status.deployment_id,
                error = %reason,
                "deployment failed without a rollback reference, escalating"
            );
            transition(fsm, status, DeploymentEvent::Fail(reason));
            return;
        }

        fsm.mark_rollback_triggered();
        status.rollback_triggered = fsm.rollback_triggered();
        warn!(deployment = %status.deployment_id, error = %reason, "rollback triggered");

        let id = status.deployment_id.clone();
        let reference = status.rollback_reference.clone();
        let ctx = self.context(&id, request, observations, reference.as_ref());

        let started = Instant::now();
        let result = self.rollback.maybe_rollback(&ctx, &reason).await;
        let phase_error = match &result {
            Ok(outcome) => outcome.error.clone(),
            Err(e) => Some(e.to_string()),
        };
        record_phase(status, observations, Phase::Rollback, started, phase_error);

        match result {
            Ok(outcome) if outcome.succeeded => {
                status.rollback = Some(outcome);
                transition(fsm, status, DeploymentEvent::RolledBack);
            }
            Ok(outcome) => {
                let detail = format!(
                    "{}; rollback failed: {}",
                    reason,
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
                status.rollback = Some(outcome);
                status.error = Some(detail.clone());
                transition(fsm, status, DeploymentEvent::Fail(detail));
            }
            Err(e) => {
                let detail = format!("{}; {}", reason, e);
                status.error = Some(detail.clone());
                transition(fsm, status, DeploymentEvent::Fail(detail));
            }
        }
    }

    async fn publish(&self, status: &DeploymentStatus) {
        if let Err(e) = self.reports.save(status).await {
            error!(deployment = %status.deployment_id, error = %e, "failed to write deployment report");
        }

        let event = NotificationEvent::from_status(status);
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(&event).await {
                warn!(deployment = %status.deployment_id, error = %e, "notification failed");
            }
        }
    }

    // =============================== PHASES ================================== //

    async fn validate(&self, ctx: &RunContext<'_>) -> Result<(), DeployError> {
        let vctx = ValidationContext {
            request: ctx.request,
            settings: ctx.settings,
            runner: ctx.runner,
        };
        self.validator.validate(&vctx).await
    }

    async fn verify_health(&self, ctx: &RunContext<'_>) -> Result<(), DeployError> {
        let services = &ctx.settings.services;
        if services.is_empty() {
            debug!(deployment = %ctx.deployment_id, "no registered services to verify");
            return Ok(());
        }

        let results = probe_and_record(ctx, services).await;
        match aggregate(&results) {
            HealthState::Healthy => Ok(()),
            state => Err(DeployError::HealthCheck(format!(
                "services are {}: {}",
                state.as_str(),
                failing_services(&results).join(", ")
            ))),
        }
    }

    async fn verify_performance(&self, ctx: &RunContext<'_>) -> Result<(), DeployError> {
        let window = Duration::from_secs(ctx.settings.metrics.time_range_minutes * 60);
        let metrics = ctx.metrics.collect(window).await?;
        ctx.observations.record_metrics(&metrics);

        let threshold = ctx.request.rollback_threshold_error_rate;
        let observed = metrics.error_rate();
        if should_rollback(observed, threshold) {
            return Err(DeployError::ThresholdBreach {
                observed,
                threshold,
                context: "performance verification".to_string(),
            });
        }

        if let Some(max) = ctx.settings.monitoring.max_avg_response_time_ms {
            if metrics.avg_response_time_ms > max {
                return Err(DeployError::Strategy(format!(
                    "average response time {:.1} ms above limit {:.1} ms",
                    metrics.avg_response_time_ms, max
                )));
            }
        }

        info!(
            deployment = %ctx.deployment_id,
            error_rate = observed,
            avg_response_time_ms = metrics.avg_response_time_ms,
            "performance verified"
        );
        Ok(())
    }

    async fn run_post_deployment_tests(&self, ctx: &RunContext<'_>) -> Result<(), DeployError> {
        for name in &ctx.request.post_deployment_tests {
            let Some(spec) = ctx.settings.post_deployment_tests.get(name) else {
                return Err(DeployError::Strategy(format!(
                    "post-deployment test {} is not configured",
                    name
                )));
            };

            let spec = ctx.command(spec, &[]);
            info!(deployment = %ctx.deployment_id, test = %name, "running post-deployment test");
            ctx.runner
                .run(&spec)
                .await
                .and_then(|out| out.into_result(name))
                .map_err(|e| {
                    DeployError::Strategy(format!("post-deployment test {} failed: {}", name, e))
                })?;
        }
        Ok(())
    }

    async fn monitor(&self, ctx: &RunContext<'_>) -> Result<(), DeployError> {
        let monitoring = &ctx.settings.monitoring;
        if monitoring.window().is_zero() {
            return Ok(());
        }

        let polls = polls_per_window(monitoring.window(), monitoring.poll_interval());
        let threshold = ctx.request.rollback_threshold_error_rate;
        info!(deployment = %ctx.deployment_id, polls, "monitoring deployment");

        for poll in 1..=polls {
            ctx.pacer.pause(monitoring.poll_interval()).await?;

            let metrics = ctx.metrics.collect(monitoring.poll_interval()).await?;
            ctx.observations.record_metrics(&metrics);

            let observed = metrics.error_rate();
            if should_rollback(observed, threshold) {
                warn!(deployment = %ctx.deployment_id, poll, observed, threshold, "error rate above threshold");
                return Err(DeployError::ThresholdBreach {
                    observed,
                    threshold,
                    context: "monitoring".to_string(),
                });
            }
        }

        Ok(())
    }
}

fn transition(fsm: &mut DeploymentFsm, status: &mut DeploymentStatus, event: DeploymentEvent) {
    match fsm.process(event) {
        Ok(state) => status.state = state,
        Err(e) => error!(deployment = %status.deployment_id, error = %e, "state transition rejected"),
    }
    status.rollback_triggered = fsm.rollback_triggered();
}

/// Await a phase and append its record to the status
async fn timed<T, F>(
    status: &mut DeploymentStatus,
    observations: &Observations,
    phase: Phase,
    fut: F,
) -> Result<T, DeployError>
where
    F: Future<Output = Result<T, DeployError>>,
{
    let started = Instant::now();
    let result = fut.await;
    let error = result.as_ref().err().map(|e| e.to_string());
    record_phase(status, observations, phase, started, error);
    result
}

fn record_phase(
    status: &mut DeploymentStatus,
    observations: &Observations,
    phase: Phase,
    started: Instant,
    error: Option<String>,
) {
    status.health_checks.extend(observations.drain());
    if let Some(metrics) = observations.take_metrics() {
        status.record_metrics(metrics);
    }

    debug!(deployment = %status.deployment_id, ?phase, ok = error.is_none(), "phase finished");
    status.phases.push(PhaseRecord {
        phase,
        succeeded: error.is_none(),
        duration_ms: started.elapsed().as_millis() as u64,
        error,
    });
}

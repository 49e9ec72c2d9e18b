//! The harness driver: validates configuration, schedules virtual users
//! according to the run profile, drains in-flight iterations, and turns the
//! collected metrics plus threshold verdicts into a [`Report`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use typed_builder::TypedBuilder;

use crate::check::Checks;
use crate::config::Config;
use crate::error::HarnessError;
use crate::executor::{governor_task, spawn_workers, ExecutionContext, RunProfile, ScenarioEnv};
use crate::http::Client;
use crate::metric::Snapshot;
use crate::registry::{aggregator_task, Recorder, Registry};
use crate::report::Report;
use crate::scenario::Scenario;
use crate::threshold::Threshold;

/// Lifecycle of one run. Configuration errors abort in `Configuring`;
/// cancellation jumps from `Running` straight to `Draining`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Configuring,
    Running,
    Draining,
    Completed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Configuring => "configuring",
            RunState::Running => "running",
            RunState::Draining => "draining",
            RunState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Drives a [`Scenario`] across virtual users according to a
/// [`RunProfile`], then evaluates thresholds over the collected metrics.
#[derive(TypedBuilder)]
pub struct Harness<F, Fut>
where
    F: Fn(crate::scenario::VuContext) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    pub scenario: Scenario<F, Fut>,
    pub profile: RunProfile,
    #[builder(default = Registry::new())]
    pub registry: Registry,
    #[builder(default)]
    pub thresholds: Vec<Threshold>,
    #[builder(default = Config::from_env())]
    pub config: Config,
    /// Governor update granularity.
    #[builder(default = Duration::from_millis(100))]
    pub tick: Duration,
    /// How long draining waits for in-flight iterations before aborting
    /// the stragglers.
    #[builder(default = Duration::from_secs(5))]
    pub grace: Duration,
    #[builder(default = Duration::from_secs(30))]
    pub request_timeout: Duration,
}

impl<F, Fut> Harness<F, Fut>
where
    F: Fn(crate::scenario::VuContext) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    /// Run until the profile completes.
    pub async fn run(self) -> Result<Report, HarnessError> {
        self.run_until(futures::future::pending()).await
    }

    /// Run until the profile completes or `cancel` resolves, whichever
    /// comes first. Cancellation skips any remaining stages and drains
    /// immediately; it is observed between iterations, never mid-request.
    pub async fn run_until<C>(self, cancel: C) -> Result<Report, HarnessError>
    where
        C: Future<Output = ()> + Send,
    {
        tracing::info!(
            state = %RunState::Configuring,
            scenario = %self.scenario.name,
            "validating run"
        );
        self.profile.validate()?;
        for threshold in &self.thresholds {
            threshold.validate(&self.registry)?;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let recorder = Recorder::new(tx);
        let aggregator = tokio::spawn(aggregator_task(self.registry.kinds(), rx));

        let builtins = self.registry.builtins();
        let env = ScenarioEnv {
            config: Arc::new(self.config.clone()),
            http: Client::new(recorder.clone(), builtins, self.request_timeout)?,
            checks: Checks::new(recorder.clone(), builtins.checks),
            recorder: recorder.clone(),
            builtins,
        };

        let (ctx, shutdown_tx, active_tx) = ExecutionContext::new();
        let started = Instant::now();
        tracing::info!(
            state = %RunState::Running,
            vus = self.profile.max_vus(),
            duration = ?self.profile.total_duration(),
            "starting virtual users"
        );
        let mut governor = tokio::spawn(governor_task(
            self.profile.clone(),
            self.tick,
            active_tx,
            ctx.shutdown.clone(),
        ));
        let workers = spawn_workers(
            ctx,
            self.profile.max_vus(),
            self.scenario.action.clone(),
            env,
            self.scenario.think_time,
        );

        let cancelled = tokio::select! {
            res = &mut governor => {
                res.map_err(|e| HarnessError::Task(e.to_string()))?;
                false
            }
            _ = cancel => {
                tracing::info!("cancellation requested, skipping remaining stages");
                true
            }
        };

        tracing::info!(state = %RunState::Draining, grace = ?self.grace, "waiting for in-flight iterations");
        let _ = shutdown_tx.send(true);
        if cancelled {
            // the governor observes the shutdown flag and exits
            (&mut governor)
                .await
                .map_err(|e| HarnessError::Task(e.to_string()))?;
        }

        let deadline = Instant::now() + self.grace;
        let mut worker_panic = None;
        for mut worker in workers {
            match timeout_at(deadline, &mut worker).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) if err.is_panic() => worker_panic = Some(err.to_string()),
                Ok(Err(_)) => {}
                Err(_) => {
                    tracing::warn!("grace period elapsed, aborting a straggling iteration");
                    worker.abort();
                    let _ = worker.await;
                }
            }
        }
        if let Some(panic) = worker_panic {
            return Err(HarnessError::Task(panic));
        }

        // the last writer: dropping it lets the aggregator finish
        drop(recorder);
        let accumulators = aggregator
            .await
            .map_err(|e| HarnessError::Task(e.to_string()))?;
        let snapshot = Snapshot::new(self.registry.names(), accumulators);

        let mut verdicts = Vec::with_capacity(self.thresholds.len());
        for threshold in &self.thresholds {
            verdicts.push(threshold.evaluate(&snapshot)?);
        }
        let passed = verdicts.iter().all(|v| v.passed);
        tracing::info!(state = %RunState::Completed, passed, "run finished");

        Ok(Report {
            scenario: self.scenario.name.clone(),
            test_id: self.config.test_id.clone(),
            duration: started.elapsed(),
            metrics: snapshot.summaries(),
            thresholds: verdicts,
            passed,
        })
    }
}

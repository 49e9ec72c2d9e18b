use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::RunProfile;
use crate::check::Checks;
use crate::config::Config;
use crate::http::Client;
use crate::registry::{BuiltinMetrics, Recorder};
use crate::scenario::VuContext;

/// Shared signals between the governor and the worker loops.
#[derive(Clone)]
pub(crate) struct ExecutionContext {
    pub shutdown: watch::Receiver<bool>,
    pub active: watch::Receiver<usize>,
}

impl ExecutionContext {
    pub fn new() -> (Self, watch::Sender<bool>, watch::Sender<usize>) {
        let (shutdown_tx, shutdown) = watch::channel(false);
        let (active_tx, active) = watch::channel(0);
        (Self { shutdown, active }, shutdown_tx, active_tx)
    }
}

/// Everything a worker needs to assemble per-iteration contexts. Cheap to
/// clone: the client and recorder are handles.
#[derive(Clone)]
pub(crate) struct ScenarioEnv {
    pub config: Arc<Config>,
    pub http: Client,
    pub checks: Checks,
    pub recorder: Recorder,
    pub builtins: BuiltinMetrics,
}

/// Governor task: publishes the interpolated VU target every `tick` until
/// the profile's total duration elapses or shutdown is flagged.
pub(crate) async fn governor_task(
    profile: RunProfile,
    tick: Duration,
    active_tx: watch::Sender<usize>,
    mut shutdown: watch::Receiver<bool>,
) {
    let main_task = async {
        let started = Instant::now();
        let total = profile.total_duration();
        let mut next_tick = started;
        loop {
            let elapsed = started.elapsed();
            if elapsed >= total {
                break;
            }
            if active_tx.send(profile.target_at(elapsed)).is_err() {
                break;
            }
            next_tick += tick;
            tokio::time::sleep_until(next_tick).await;
        }
        let _ = active_tx.send(0);
    };

    tokio::select! {
        _ = main_task => {}
        _ = shutdown.wait_for(|stop| *stop) => {}
    }
}

/// Spawn one task per potential VU. A worker iterates only while the
/// governor's target exceeds its slot id; otherwise it parks until
/// reactivated or shut down.
pub(crate) fn spawn_workers<F, Fut>(
    ctx: ExecutionContext,
    count: usize,
    action: F,
    env: ScenarioEnv,
    think_time: Duration,
) -> Vec<JoinHandle<()>>
where
    F: Fn(VuContext) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    (0..count)
        .map(|id| {
            let mut ctx = ctx.clone();
            let action = action.clone();
            let env = env.clone();
            tokio::spawn(async move {
                let mut iteration = 0u64;
                loop {
                    let activated = tokio::select! {
                        res = ctx.active.wait_for(|active| *active > id) => res.is_ok(),
                        _ = ctx.shutdown.wait_for(|stop| *stop) => false,
                    };
                    // stop signals are observed between iterations only
                    if !activated || *ctx.shutdown.borrow() {
                        break;
                    }

                    let cx = VuContext {
                        vu: id + 1,
                        iteration,
                        config: env.config.clone(),
                        http: env.http.clone(),
                        checks: env.checks.clone(),
                        recorder: env.recorder.clone(),
                    };
                    action(cx).await;
                    env.recorder.record(env.builtins.iterations, 1.0);
                    iteration += 1;

                    if !think_time.is_zero() {
                        tokio::select! {
                            _ = tokio::time::sleep(think_time) => {}
                            _ = ctx.shutdown.wait_for(|stop| *stop) => break,
                        }
                    }
                }
            })
        })
        .collect()
}

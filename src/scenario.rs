use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::check::Checks;
use crate::config::Config;
use crate::http::Client;
use crate::registry::Recorder;

/// Everything one scenario iteration may touch. Cloned per iteration; there
/// is no process-wide state behind it.
#[derive(Debug, Clone)]
pub struct VuContext {
    /// 1-based id of the virtual user running this iteration.
    pub vu: usize,
    /// How many iterations this VU has already completed.
    pub iteration: u64,
    pub config: Arc<Config>,
    pub http: Client,
    pub checks: Checks,
    pub recorder: Recorder,
}

/// User-authored test logic plus its pacing. The action is one iteration:
/// issue requests, evaluate checks, update metrics; the harness handles the
/// think-time pause after it returns.
#[derive(Clone, TypedBuilder)]
pub struct Scenario<F, Fut>
where
    F: Fn(VuContext) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    #[builder(setter(into))]
    pub name: String,
    pub action: F,
    /// Pause between consecutive iterations of one VU.
    #[builder(default = Duration::ZERO)]
    pub think_time: Duration,
    #[builder(default, setter(skip))]
    _future: PhantomData<Fut>,
}

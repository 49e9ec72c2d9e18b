//! Stampede, a small, flexible scripted load-test harness for Rust.
//!
//! Stampede drives user-authored HTTP scenarios across many virtual users
//! (VUs), records custom metrics while they run, and decides pass/fail from
//! threshold expressions evaluated over the aggregated results. It borrows
//! its shape from tools such as k6 and Goose: you write the scenario, the
//! harness supplies scheduling, metric aggregation, and verdicts.
//!
//! # Architecture
//!
//! The main building blocks are:
//!
//! - [`Scenario`]: the user-authored test logic (one iteration of requests,
//!   checks, and metric updates) plus its think-time pacing.
//! - [`Registry`]: named custom metrics (counter, trend, gauge, rate) that
//!   scenario code updates through a clonable [`Recorder`]. Samples flow over
//!   a channel into a single aggregator task, so recording never blocks a VU.
//! - [`Checks`]: named boolean predicates over a [`Response`]. Outcomes feed
//!   the implicit `checks` rate metric; a predicate that panics is a failed
//!   check, never an aborted run.
//! - [`RunProfile`]: either a fixed VU count for a duration, or an ordered
//!   list of [`Stage`]s ramping the active VU count up and down.
//! - [`Threshold`]: k6-style pass/fail expressions (`p(95)<500`,
//!   `rate<0.01`) evaluated once over the final metric snapshot.
//! - [`Harness`]: the driver. Validates configuration, runs the VU loops
//!   until the profile completes or a cancellation signal arrives, drains
//!   in-flight iterations, and produces a [`Report`].
//! - [`Reporter`]: consumes finished reports and sends them somewhere
//!   (stdout, file, remote collector).
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use stampede::{
//!     Harness, MetricKind, Registry, Reporter, RunProfile, Scenario, StdoutReporter,
//!     Threshold, VuContext,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = Registry::new();
//!     let page_latency = registry.register("page_latency", MetricKind::Trend)?;
//!
//!     let scenario = Scenario::builder()
//!         .name("smoke")
//!         .think_time(Duration::from_secs(1))
//!         .action(move |cx: VuContext| async move {
//!             match cx.http.get(&cx.config.base_url).await {
//!                 Ok(res) => {
//!                     cx.checks.check("status is 200", &res, |r| r.status == 200);
//!                     cx.recorder
//!                         .record(page_latency, res.timings.total.as_secs_f64() * 1000.0);
//!                 }
//!                 Err(_) => cx.checks.fail("status is 200"),
//!             }
//!         })
//!         .build();
//!
//!     let report = Harness::builder()
//!         .scenario(scenario)
//!         .profile(RunProfile::Fixed { vus: 5, duration: Duration::from_secs(30) })
//!         .registry(registry)
//!         .thresholds(vec![
//!             Threshold::parse("http_req_duration", "p(95)<500")?,
//!             Threshold::parse("checks", "rate>0.99")?,
//!         ])
//!         .build()
//!         .run()
//!         .await?;
//!
//!     StdoutReporter.publish(&report).await?;
//!     std::process::exit(report.exit_code());
//! }
//! ```
//!
//! # Where to start
//!
//! - Read the docs for [`Harness`], [`Registry`], and [`Threshold`].
//! - See `demos/` for runnable scenarios (recommended: `demos/smoke.rs`).

/// Named pass/fail predicates over responses
pub mod check;
/// Environment-derived run parameters
pub mod config;
/// Fatal harness errors
pub mod error;
/// Run profiles and virtual-user scheduling
pub mod executor;
/// The driver that ties everything together
pub mod harness;
/// HTTP client collaborator
pub mod http;
/// Metric kinds, accumulators, and snapshots
pub mod metric;
/// Named-metric registration and recording
pub mod registry;
/// Reports and Reporters
pub mod report;
/// Scenario definition and per-iteration context
pub mod scenario;
/// Threshold expressions and verdicts
pub mod threshold;

pub use check::Checks;
pub use config::Config;
pub use error::HarnessError;
pub use executor::{RunProfile, Stage};
pub use harness::{Harness, RunState};
pub use http::{Client, Method, RequestError, Response, Timings};
pub use metric::{MetricKind, MetricSummary, Snapshot, Tags};
pub use registry::{BuiltinMetrics, MetricHandle, Recorder, Registry};
pub use report::{JsonFileReporter, JsonReporter, Report, Reporter, StdoutReporter};
pub use scenario::{Scenario, VuContext};
pub use threshold::{Threshold, ThresholdVerdict};

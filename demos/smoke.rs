//! Minimal smoke scenario with a couple of checks and sane defaults.
//!
//! BASE_URL and TEST_ID can be overridden via env vars. Run with:
//! `cargo run --example smoke`

use std::process;
use std::time::Duration;

use stampede::{
    tags, Harness, MetricKind, Registry, Reporter, RunProfile, Scenario, StdoutReporter,
    Threshold, VuContext,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut registry = Registry::new();
    let custom_trend = registry.register("my_custom_trend", MetricKind::Trend)?;

    let scenario = Scenario::builder()
        .name("smoke")
        // tiny think-time so we don't hammer constantly
        .think_time(Duration::from_secs(1))
        .action(move |cx: VuContext| async move {
            let base = cx.config.base_url.clone();
            let test_id = cx.config.test_id.clone();

            // Request 1: basic GET to root
            match cx
                .http
                .get_tagged(
                    &format!("{base}/"),
                    tags! { "testid" => &test_id, "endpoint" => "root_page" },
                )
                .await
            {
                Ok(res) => {
                    cx.checks.check("GET / status is 200", &res, |r| r.status == 200);
                    cx.checks
                        .check("GET / body is not empty", &res, |r| !r.body.is_empty());
                    cx.recorder
                        .record(custom_trend, res.timings.total.as_secs_f64() * 1000.0);
                }
                Err(_) => {
                    cx.checks.fail("GET / status is 200");
                    cx.checks.fail("GET / body is not empty");
                }
            }

            // Request 2: same page, different tag
            match cx
                .http
                .get_tagged(
                    &format!("{base}/"),
                    tags! { "testid" => &test_id, "endpoint" => "another_root_page" },
                )
                .await
            {
                Ok(res) => {
                    cx.checks
                        .check("GET / (another) status is 200", &res, |r| r.status == 200);
                    cx.checks
                        .check("GET / (another) body is not empty", &res, |r| !r.body.is_empty());
                }
                Err(_) => {
                    cx.checks.fail("GET / (another) status is 200");
                    cx.checks.fail("GET / (another) body is not empty");
                }
            }

            // Request 3: a deliberate 404
            match cx
                .http
                .get_tagged(
                    &format!("{base}/status/404"),
                    tags! { "testid" => &test_id, "endpoint" => "not_found" },
                )
                .await
            {
                Ok(res) => {
                    cx.checks
                        .check("GET /status/404 status is 404", &res, |r| r.status == 404);
                }
                Err(_) => cx.checks.fail("GET /status/404 status is 404"),
            }
        })
        .build();

    let report = Harness::builder()
        .scenario(scenario)
        // small, quick test by default; adjust as you wish
        .profile(RunProfile::Fixed {
            vus: 5,
            duration: Duration::from_secs(30),
        })
        .registry(registry)
        .thresholds(vec![
            // fail the test if more than 1% of requests fail
            Threshold::parse("http_req_failed", "rate<0.01")?,
            // keep p(95) latency under 500ms
            Threshold::parse("http_req_duration", "p(95)<500")?,
            // ensure at least 99% of checks pass
            Threshold::parse("checks", "rate>0.99")?,
        ])
        .build()
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    StdoutReporter.publish(&report).await?;
    process::exit(report.exit_code());
}

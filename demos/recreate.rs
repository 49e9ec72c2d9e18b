//! Watches a service while its deployment is recreated, counting which
//! version (v1 or v2) served each response.
//!
//! BASE_URL defaults to the nginx service on the local Docker network.
//! Run with: `cargo run --example recreate`

use std::process;
use std::time::Duration;

use stampede::{
    tags, Config, Harness, MetricKind, Registry, Reporter, RunProfile, Scenario, StdoutReporter,
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

    let base_url = std::env::var("BASE_URL")
        .unwrap_or_else(|_| "http://host.docker.internal:8080".to_string());

    let mut registry = Registry::new();
    let app_version = registry.register("app_version", MetricKind::Counter)?;
    let app_version_duration = registry.register("app_version_duration", MetricKind::Trend)?;

    let scenario = Scenario::builder()
        .name("recreate")
        .think_time(Duration::from_secs(1))
        .action(move |cx: VuContext| async move {
            match cx
                .http
                .get_tagged(&cx.config.base_url, tags! { "testid" => &cx.config.test_id })
                .await
            {
                Ok(res) => {
                    cx.checks.check("status is 200", &res, |r| r.status == 200);
                    cx.checks.check("body contains v1 or v2", &res, |r| {
                        r.body.contains("v1") || r.body.contains("v2")
                    });

                    if res.body.contains("v1") {
                        cx.recorder
                            .record_with(app_version, 1.0, tags! { "version" => "v1" });
                    } else if res.body.contains("v2") {
                        cx.recorder
                            .record_with(app_version, 1.0, tags! { "version" => "v2" });
                    }

                    let version = if res.body.contains("v1") { "v1" } else { "v2" };
                    cx.recorder.record_with(
                        app_version_duration,
                        res.timings.total.as_secs_f64() * 1000.0,
                        tags! { "version" => version },
                    );
                }
                Err(_) => {
                    cx.checks.fail("status is 200");
                    cx.checks.fail("body contains v1 or v2");
                }
            }
        })
        .build();

    let report = Harness::builder()
        .scenario(scenario)
        // two minutes is long enough to observe the rollover
        .profile(RunProfile::Fixed {
            vus: 5,
            duration: Duration::from_secs(120),
        })
        .registry(registry)
        .config(Config::new(base_url, "recreate-test"))
        .thresholds(vec![
            Threshold::parse("http_req_failed", "rate<0.01")?,
            Threshold::parse("http_req_duration", "p(95)<500")?,
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

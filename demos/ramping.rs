//! Staged ramp scenario exercising all four custom metric kinds.
//!
//! Run with: `cargo run --example ramping`

use std::process;
use std::time::Duration;

use rand::Rng;
use stampede::{
    Harness, JsonFileReporter, MetricKind, Registry, Reporter, RunProfile, Scenario, Stage,
    StdoutReporter, Threshold, VuContext,
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
    let waiting_time = registry.register("waiting_time", MetricKind::Trend)?;
    let my_counter = registry.register("my_counter", MetricKind::Counter)?;
    let my_gauge = registry.register("my_gauge", MetricKind::Gauge)?;
    let my_rate = registry.register("my_rate", MetricKind::Rate)?;

    let scenario = Scenario::builder()
        .name("ramping")
        .think_time(Duration::from_millis(500))
        .action(move |cx: VuContext| async move {
            match cx.http.get(&cx.config.base_url).await {
                Ok(res) => {
                    cx.recorder
                        .record(waiting_time, res.timings.waiting.as_secs_f64() * 1000.0);
                    cx.recorder.record(my_counter, 1.0);
                    let value = rand::thread_rng().gen_range(0.0..100.0);
                    cx.recorder.record(my_gauge, value);
                    cx.recorder
                        .record(my_rate, if res.status == 200 { 1.0 } else { 0.0 });

                    cx.checks.check("status is 200", &res, |r| r.status == 200);
                    cx.checks.check("response time OK", &res, |r| {
                        r.timings.total < Duration::from_millis(1000)
                    });
                }
                Err(_) => {
                    cx.recorder.record(my_rate, 0.0);
                    cx.checks.fail("status is 200");
                    cx.checks.fail("response time OK");
                }
            }
        })
        .build();

    let report = Harness::builder()
        .scenario(scenario)
        .profile(RunProfile::Stages(vec![
            Stage::new(Duration::from_secs(60), 10),
            Stage::new(Duration::from_secs(180), 10),
            Stage::new(Duration::from_secs(60), 0),
        ]))
        .registry(registry)
        .thresholds(vec![
            Threshold::parse("http_req_duration", "p(95)<500")?,
            Threshold::parse("http_req_failed", "rate<0.1")?,
            Threshold::parse("waiting_time", "p(99)<1000")?,
        ])
        .build()
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    StdoutReporter.publish(&report).await?;
    JsonFileReporter::new("report.json").publish(&report).await?;
    process::exit(report.exit_code());
}

//! Reports and Reporters.
//!
//! A [`Report`] is the final artifact of a run: per-metric aggregates,
//! per-threshold verdicts, and the overall pass/fail. [`Reporter`]s consume
//! reports and send them somewhere: stdout, a file, or any remote
//! collector you put behind the trait.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::metric::MetricSummary;
use crate::threshold::ThresholdVerdict;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub scenario: String,
    pub test_id: String,
    pub duration: Duration,
    pub metrics: BTreeMap<String, MetricSummary>,
    pub thresholds: Vec<ThresholdVerdict>,
    pub passed: bool,
}

impl Report {
    /// Process exit status for CLI wrappers: 0 on pass, non-zero otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.passed {
            0
        } else {
            1
        }
    }
}

/// Sink for finished reports.
#[async_trait]
pub trait Reporter {
    async fn publish(&self, report: &Report) -> Result<(), Box<dyn std::error::Error>>;
}

/// Human-readable console output, one threshold per line with the observed
/// value next to the required bound.
pub struct StdoutReporter;

#[async_trait]
impl Reporter for StdoutReporter {
    async fn publish(&self, report: &Report) -> Result<(), Box<dyn std::error::Error>> {
        println!("{}", render(report));
        Ok(())
    }
}

fn render(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "scenario: {} (test_id={}, {:.1}s)",
        report.scenario,
        report.test_id,
        report.duration.as_secs_f64()
    );
    let _ = writeln!(out, "metrics:");
    for (name, summary) in &report.metrics {
        let _ = writeln!(out, "  {name}: {summary}");
    }
    if !report.thresholds.is_empty() {
        let _ = writeln!(out, "thresholds:");
        for verdict in &report.thresholds {
            let mark = if verdict.passed { "PASS" } else { "FAIL" };
            match verdict.observed {
                Some(observed) => {
                    let _ = writeln!(
                        out,
                        "  {mark} {}: {} (observed {observed:.2})",
                        verdict.metric, verdict.expression
                    );
                }
                None => {
                    let _ = writeln!(
                        out,
                        "  {mark} {}: {} (no samples)",
                        verdict.metric, verdict.expression
                    );
                }
            }
        }
    }
    let _ = write!(
        out,
        "result: {}",
        if report.passed { "PASSED" } else { "FAILED" }
    );
    out
}

/// One JSON document to stdout, for piping into other tools.
pub struct JsonReporter;

#[async_trait]
impl Reporter for JsonReporter {
    async fn publish(&self, report: &Report) -> Result<(), Box<dyn std::error::Error>> {
        println!("{}", serde_json::to_string_pretty(report)?);
        Ok(())
    }
}

/// Writes the JSON report to a file.
pub struct JsonFileReporter {
    pub path: PathBuf,
}

impl JsonFileReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Reporter for JsonFileReporter {
    async fn publish(&self, report: &Report) -> Result<(), Box<dyn std::error::Error>> {
        let body = serde_json::to_vec_pretty(report)?;
        tokio::fs::write(&self.path, body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> Report {
        Report {
            scenario: "smoke".to_string(),
            test_id: "local-dev".to_string(),
            duration: Duration::from_secs(30),
            metrics: BTreeMap::from([(
                "http_req_duration".to_string(),
                MetricSummary::Trend {
                    count: 10,
                    min: 80.0,
                    max: 610.0,
                    avg: 240.0,
                    med: 210.0,
                    p90: 480.0,
                    p95: 560.0,
                    p99: 600.0,
                    by_tags: BTreeMap::new(),
                },
            )]),
            thresholds: vec![ThresholdVerdict {
                metric: "http_req_duration".to_string(),
                expression: "p(95)<500".to_string(),
                observed: Some(560.0),
                bound: 500.0,
                passed: false,
            }],
            passed: false,
        }
    }

    #[test]
    fn failed_reports_exit_nonzero() {
        let mut report = sample_report();
        assert_eq!(report.exit_code(), 1);
        report.passed = true;
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn rendering_marks_failed_thresholds_with_observed_values() {
        let text = render(&sample_report());
        assert!(text.contains("FAIL http_req_duration: p(95)<500 (observed 560.00)"));
        assert!(text.contains("result: FAILED"));
    }

    #[test]
    fn reports_round_trip_through_json() {
        let report = sample_report();
        let json = serde_json::to_string(&report).expect("serializes");
        let back: Report = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(report, back);
    }
}

//! Named pass/fail predicates over responses.
//!
//! Outcomes feed the implicit `checks` rate metric, tagged by check name so
//! the report can break results down per check. A predicate that panics is
//! a failed check, not an aborted run.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::http::Response;
use crate::metric::Tags;
use crate::registry::{MetricHandle, Recorder};

#[derive(Debug, Clone)]
pub struct Checks {
    recorder: Recorder,
    handle: MetricHandle,
}

impl Checks {
    pub(crate) fn new(recorder: Recorder, handle: MetricHandle) -> Self {
        Self { recorder, handle }
    }

    /// Evaluate `predicate` against `response` and record the outcome.
    /// A predicate that cannot be evaluated counts as failed.
    pub fn check<F>(&self, name: &str, response: &Response, predicate: F) -> bool
    where
        F: FnOnce(&Response) -> bool,
    {
        let outcome = catch_unwind(AssertUnwindSafe(|| predicate(response))).unwrap_or_else(|_| {
            tracing::warn!(check = name, "check predicate panicked, counted as failed");
            false
        });
        self.record(name, outcome);
        outcome
    }

    /// Record a failed check without a response, e.g. when the request
    /// itself errored.
    pub fn fail(&self, name: &str) {
        self.record(name, false);
    }

    fn record(&self, name: &str, outcome: bool) {
        let mut tags = Tags::new();
        tags.insert("check".to_string(), name.to_string());
        self.recorder
            .record_with(self.handle, if outcome { 1.0 } else { 0.0 }, tags);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::http::Timings;
    use crate::metric::{MetricKind, Snapshot};
    use crate::registry::{aggregator_task, Registry};

    fn response(status: u16, body: &str) -> Response {
        Response {
            status,
            body: body.to_string(),
            headers: BTreeMap::new(),
            timings: Timings {
                total: Duration::from_millis(120),
                waiting: Duration::from_millis(30),
            },
            tags: Tags::new(),
        }
    }

    async fn run_checks<F>(run: F) -> Snapshot
    where
        F: FnOnce(&Checks),
    {
        let registry = Registry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(aggregator_task(registry.kinds(), rx));
        let checks = Checks::new(Recorder::new(tx), registry.builtins().checks);
        run(&checks);
        drop(checks);
        Snapshot::new(registry.names(), task.await.expect("aggregator completes"))
    }

    #[tokio::test]
    async fn outcomes_feed_the_checks_rate() {
        let snapshot = run_checks(|checks| {
            let res = response(200, "hello v1");
            assert!(checks.check("status is 200", &res, |r| r.status == 200));
            assert!(!checks.check("body has v2", &res, |r| r.body.contains("v2")));
            checks.fail("request completed");
        })
        .await;

        let acc = snapshot.get("checks").expect("builtin");
        assert_eq!(acc.rate(), Some(1.0 / 3.0));
    }

    #[tokio::test]
    async fn panicking_predicate_is_a_failed_check_not_a_crash() {
        let snapshot = run_checks(|checks| {
            let res = response(200, "");
            let outcome = checks.check("first byte is x", &res, |r| {
                r.body.as_bytes()[0] == b'x' // panics on the empty body
            });
            assert!(!outcome);
        })
        .await;

        let acc = snapshot.get("checks").expect("builtin");
        assert_eq!(acc.rate(), Some(0.0));
    }

    #[tokio::test]
    async fn check_names_break_down_by_tag() {
        let snapshot = run_checks(|checks| {
            let res = response(200, "ok");
            checks.check("status is 200", &res, |r| r.status == 200);
            checks.check("status is 200", &res, |r| r.status == 200);
            checks.check("body is empty", &res, |r| r.body.is_empty());
        })
        .await;

        let summaries = snapshot.summaries();
        let Some(crate::metric::MetricSummary::Rate { by_tags, .. }) = summaries.get("checks")
        else {
            panic!("checks must be a rate");
        };
        assert_eq!(by_tags.get("check=status is 200").map(|r| r.passes), Some(2));
        assert_eq!(by_tags.get("check=body is empty").map(|r| r.total), Some(1));
    }

    #[test]
    fn register_checks_metric_kind_is_rate() {
        let registry = Registry::new();
        assert_eq!(registry.kind_of("checks"), Some(MetricKind::Rate));
    }
}

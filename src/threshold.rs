//! Threshold expressions and end-of-run verdicts.
//!
//! Thresholds use the k6 string form: `p(95)<500`, `rate<0.01`, `avg>=10`,
//! `count>100`, `value<98`. Parsing and registry validation happen before
//! any virtual user starts; evaluation is pure over the final snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;
use crate::metric::{Accumulator, MetricKind, Snapshot};
use crate::registry::Registry;

/// Which statistic of a metric a threshold constrains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Percentile(f64),
    Avg,
    Med,
    Min,
    Max,
    Rate,
    Count,
    Sum,
    Value,
}

impl Aggregation {
    fn supports(self, kind: MetricKind) -> bool {
        use Aggregation::*;
        match (self, kind) {
            (Percentile(_) | Avg | Med, MetricKind::Trend) => true,
            (Min | Max, MetricKind::Trend | MetricKind::Gauge) => true,
            (Rate, MetricKind::Rate) => true,
            (Count, MetricKind::Counter | MetricKind::Trend | MetricKind::Rate) => true,
            (Sum, MetricKind::Counter) => true,
            (Value, MetricKind::Gauge) => true,
            _ => false,
        }
    }

    fn observe(self, acc: &Accumulator) -> Option<f64> {
        match self {
            Aggregation::Percentile(p) => acc.quantile(p),
            Aggregation::Avg => acc.mean(),
            Aggregation::Med => acc.quantile(50.0),
            Aggregation::Min => acc.min(),
            Aggregation::Max => acc.max(),
            Aggregation::Rate => acc.rate(),
            // a count of zero is a real observation, not missing data
            Aggregation::Count => Some(acc.sample_count() as f64),
            Aggregation::Sum => acc.sum(),
            Aggregation::Value => acc.last(),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Percentile(p) => write!(f, "p({p})"),
            Aggregation::Avg => f.write_str("avg"),
            Aggregation::Med => f.write_str("med"),
            Aggregation::Min => f.write_str("min"),
            Aggregation::Max => f.write_str("max"),
            Aggregation::Rate => f.write_str("rate"),
            Aggregation::Count => f.write_str("count"),
            Aggregation::Sum => f.write_str("sum"),
            Aggregation::Value => f.write_str("value"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl Op {
    fn holds(self, observed: f64, bound: f64) -> bool {
        match self {
            Op::Lt => observed < bound,
            Op::Le => observed <= bound,
            Op::Gt => observed > bound,
            Op::Ge => observed >= bound,
            Op::Eq => observed == bound,
        }
    }
}

// two-character symbols first so `<=` is not read as `<`
const OPS: [(&str, Op); 5] = [
    ("<=", Op::Le),
    (">=", Op::Ge),
    ("==", Op::Eq),
    ("<", Op::Lt),
    (">", Op::Gt),
];

/// A pass/fail condition over one metric, evaluated once at run end.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: String,
    aggregation: Aggregation,
    op: Op,
    bound: f64,
    source: String,
}

impl Threshold {
    /// Parse a k6-style expression such as `p(95)<500` or `rate<0.01`.
    pub fn parse(metric: &str, expr: &str) -> Result<Self, HarnessError> {
        let invalid = || HarnessError::InvalidThreshold(format!("{metric}: {expr}"));
        let (symbol, op, pos) = OPS
            .iter()
            .filter_map(|&(symbol, op)| expr.find(symbol).map(|pos| (symbol, op, pos)))
            .min_by_key(|&(_, _, pos)| pos)
            .ok_or_else(invalid)?;
        let lhs = expr[..pos].trim();
        let rhs = expr[pos + symbol.len()..].trim();
        let bound: f64 = rhs.parse().map_err(|_| invalid())?;
        let aggregation = parse_aggregation(lhs).ok_or_else(invalid)?;
        Ok(Self {
            metric: metric.to_string(),
            aggregation,
            op,
            bound,
            source: expr.trim().to_string(),
        })
    }

    /// Reject thresholds that cannot be evaluated, before any VU starts.
    pub fn validate(&self, registry: &Registry) -> Result<(), HarnessError> {
        let kind = registry
            .kind_of(&self.metric)
            .ok_or_else(|| HarnessError::UnknownMetric(self.metric.clone()))?;
        if !self.aggregation.supports(kind) {
            return Err(HarnessError::InvalidConfiguration(format!(
                "threshold `{}` on `{}`: {} is not defined for a {} metric",
                self.source, self.metric, self.aggregation, kind
            )));
        }
        Ok(())
    }

    /// Deterministic evaluation against the final snapshot; no side
    /// effects. A metric nobody recorded passes vacuously.
    pub fn evaluate(&self, snapshot: &Snapshot) -> Result<ThresholdVerdict, HarnessError> {
        let acc = snapshot
            .get(&self.metric)
            .ok_or_else(|| HarnessError::UnknownMetric(self.metric.clone()))?;
        let observed = self.aggregation.observe(acc);
        let passed = observed.map_or(true, |value| self.op.holds(value, self.bound));
        Ok(ThresholdVerdict {
            metric: self.metric.clone(),
            expression: self.source.clone(),
            observed,
            bound: self.bound,
            passed,
        })
    }
}

fn parse_aggregation(s: &str) -> Option<Aggregation> {
    match s {
        "avg" => Some(Aggregation::Avg),
        "med" => Some(Aggregation::Med),
        "min" => Some(Aggregation::Min),
        "max" => Some(Aggregation::Max),
        "rate" => Some(Aggregation::Rate),
        "count" => Some(Aggregation::Count),
        "sum" => Some(Aggregation::Sum),
        "value" => Some(Aggregation::Value),
        _ => {
            let inner = s.strip_prefix("p(")?.strip_suffix(')')?;
            let p: f64 = inner.trim().parse().ok()?;
            (0.0..=100.0).contains(&p).then_some(Aggregation::Percentile(p))
        }
    }
}

/// Outcome of one threshold, carrying the observed value so a failing run
/// can report observed-vs-required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdVerdict {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub bound: f64,
    pub passed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::MetricKind;

    fn trend_snapshot(name: &str, samples: Vec<f64>) -> Snapshot {
        let mut acc = Accumulator::new(MetricKind::Trend);
        for s in samples {
            acc.record(s, None);
        }
        Snapshot::new(vec![name.to_string()], vec![acc])
    }

    fn rate_snapshot(name: &str, outcomes: &[bool]) -> Snapshot {
        let mut acc = Accumulator::new(MetricKind::Rate);
        for &pass in outcomes {
            acc.record(if pass { 1.0 } else { 0.0 }, None);
        }
        Snapshot::new(vec![name.to_string()], vec![acc])
    }

    #[test]
    fn parses_the_k6_expression_grammar() {
        for expr in ["p(95)<500", "p(99) < 1000", "rate<0.01", "avg>=10", "count>100", "value==42"] {
            Threshold::parse("m", expr).expect(expr);
        }
        for expr in ["", "p(95)", "500<p(95)", "p(101)<1", "pct(95)<1", "rate<fast"] {
            Threshold::parse("m", expr).expect_err(expr);
        }
    }

    #[test]
    fn p95_under_bound_passes_and_over_bound_fails() {
        let threshold = Threshold::parse("http_req_duration", "p(95)<500").expect("valid");

        let snapshot = trend_snapshot("http_req_duration", vec![400.0; 100]);
        let verdict = threshold.evaluate(&snapshot).expect("metric present");
        assert!(verdict.passed);
        assert_eq!(verdict.observed, Some(400.0));

        let snapshot = trend_snapshot("http_req_duration", vec![600.0; 100]);
        let verdict = threshold.evaluate(&snapshot).expect("metric present");
        assert!(!verdict.passed);
        assert_eq!(verdict.observed, Some(600.0));
        assert_eq!(verdict.bound, 500.0);
    }

    #[test]
    fn failure_rate_threshold() {
        let threshold = Threshold::parse("http_req_failed", "rate<0.01").expect("valid");
        let snapshot = rate_snapshot("http_req_failed", &[true, true, true, true, true]);
        assert!(!threshold.evaluate(&snapshot).expect("present").passed);

        let snapshot = rate_snapshot("http_req_failed", &[false; 200]);
        assert!(threshold.evaluate(&snapshot).expect("present").passed);
    }

    #[test]
    fn empty_metric_passes_vacuously() {
        let threshold = Threshold::parse("http_req_duration", "p(95)<500").expect("valid");
        let snapshot = trend_snapshot("http_req_duration", Vec::new());
        let verdict = threshold.evaluate(&snapshot).expect("present");
        assert!(verdict.passed);
        assert_eq!(verdict.observed, None);
    }

    #[test]
    fn count_of_zero_is_observed_not_vacuous() {
        let threshold = Threshold::parse("http_req_duration", "count>0").expect("valid");
        let snapshot = trend_snapshot("http_req_duration", Vec::new());
        let verdict = threshold.evaluate(&snapshot).expect("present");
        assert!(!verdict.passed);
        assert_eq!(verdict.observed, Some(0.0));
    }

    #[test]
    fn unknown_metric_is_rejected_before_the_run() {
        let registry = Registry::new();
        let threshold = Threshold::parse("no_such_metric", "rate<0.5").expect("valid");
        assert!(matches!(
            threshold.validate(&registry),
            Err(HarnessError::UnknownMetric(_))
        ));
    }

    #[test]
    fn aggregation_must_match_the_metric_kind() {
        let registry = Registry::new();
        // http_reqs is a counter; p(95) only applies to trends
        let threshold = Threshold::parse("http_reqs", "p(95)<500").expect("valid");
        assert!(matches!(
            threshold.validate(&registry),
            Err(HarnessError::InvalidConfiguration(_))
        ));
        let threshold = Threshold::parse("http_reqs", "count>0").expect("valid");
        threshold.validate(&registry).expect("count fits a counter");
    }
}

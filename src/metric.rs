//! Metric model: kinds, append-only accumulators, and end-of-run snapshots.
//!
//! Accumulators store compact raw data only (sums, samples, pass counts).
//! Derived statistics (percentiles, means, rates) are computed at snapshot
//! time so the accumulation hot path stays cheap and nothing is lost before
//! aggregation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Key-value labels attached to a sample for later filtering.
pub type Tags = BTreeMap<String, String>;

/// Build a [`Tags`] map in place: `tags! { "endpoint" => "root" }`.
#[macro_export]
macro_rules! tags {
    () => { $crate::metric::Tags::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut tags = $crate::metric::Tags::new();
        $( tags.insert($key.to_string(), $value.to_string()); )+
        tags
    }};
}

/// The four custom-metric kinds a scenario can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Accumulates a sum of recorded values.
    Counter,
    /// Retains every sample so distribution statistics can be derived.
    Trend,
    /// Retains the last recorded value (plus observed min/max).
    Gauge,
    /// Ratio of non-zero ("pass") samples to all samples.
    Rate,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::Counter => "counter",
            MetricKind::Trend => "trend",
            MetricKind::Gauge => "gauge",
            MetricKind::Rate => "rate",
        };
        f.write_str(name)
    }
}

/// Distribution statistics of one trend, or of one tag combination of a
/// trend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendStats {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub med: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Pass/total pair for one tag combination of a rate metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCount {
    pub passes: u64,
    pub total: u64,
}

/// Append-only accumulation for one metric. Raw data only; derived
/// statistics live in [`MetricSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Accumulator {
    Counter {
        count: u64,
        sum: f64,
        by_tags: BTreeMap<String, f64>,
    },
    Trend {
        samples: Vec<f64>,
        by_tags: BTreeMap<String, Vec<f64>>,
    },
    Gauge {
        last: Option<f64>,
        min: Option<f64>,
        max: Option<f64>,
    },
    Rate {
        passes: u64,
        total: u64,
        by_tags: BTreeMap<String, RateCount>,
    },
}

impl Accumulator {
    pub fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Accumulator::Counter {
                count: 0,
                sum: 0.0,
                by_tags: BTreeMap::new(),
            },
            MetricKind::Trend => Accumulator::Trend {
                samples: Vec::new(),
                by_tags: BTreeMap::new(),
            },
            MetricKind::Gauge => Accumulator::Gauge {
                last: None,
                min: None,
                max: None,
            },
            MetricKind::Rate => Accumulator::Rate {
                passes: 0,
                total: 0,
                by_tags: BTreeMap::new(),
            },
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Accumulator::Counter { .. } => MetricKind::Counter,
            Accumulator::Trend { .. } => MetricKind::Trend,
            Accumulator::Gauge { .. } => MetricKind::Gauge,
            Accumulator::Rate { .. } => MetricKind::Rate,
        }
    }

    pub(crate) fn record(&mut self, value: f64, tags: Option<&Tags>) {
        match self {
            Accumulator::Counter {
                count,
                sum,
                by_tags,
            } => {
                *count += 1;
                *sum += value;
                if let Some(tags) = tags.filter(|t| !t.is_empty()) {
                    *by_tags.entry(render_tags(tags)).or_insert(0.0) += value;
                }
            }
            Accumulator::Trend { samples, by_tags } => {
                samples.push(value);
                if let Some(tags) = tags.filter(|t| !t.is_empty()) {
                    by_tags.entry(render_tags(tags)).or_default().push(value);
                }
            }
            Accumulator::Gauge { last, min, max } => {
                *last = Some(value);
                *min = Some(min.map_or(value, |m| m.min(value)));
                *max = Some(max.map_or(value, |m| m.max(value)));
            }
            Accumulator::Rate {
                passes,
                total,
                by_tags,
            } => {
                let pass = value != 0.0;
                *total += 1;
                if pass {
                    *passes += 1;
                }
                if let Some(tags) = tags.filter(|t| !t.is_empty()) {
                    let entry = by_tags.entry(render_tags(tags)).or_default();
                    entry.total += 1;
                    if pass {
                        entry.passes += 1;
                    }
                }
            }
        }
    }

    /// Trend samples must be sorted before quantiles are read; called once
    /// when the snapshot is built.
    pub(crate) fn sort_samples(&mut self) {
        if let Accumulator::Trend { samples, by_tags } = self {
            samples.sort_unstable_by(f64::total_cmp);
            for bucket in by_tags.values_mut() {
                bucket.sort_unstable_by(f64::total_cmp);
            }
        }
    }

    /// Number of samples recorded, whatever the kind.
    pub fn sample_count(&self) -> u64 {
        match self {
            Accumulator::Counter { count, .. } => *count,
            Accumulator::Trend { samples, .. } => samples.len() as u64,
            Accumulator::Gauge { last, .. } => u64::from(last.is_some()),
            Accumulator::Rate { total, .. } => *total,
        }
    }

    /// Interpolated quantile of a trend, `p` in 0..=100. Assumes the
    /// snapshot has sorted the samples.
    pub fn quantile(&self, p: f64) -> Option<f64> {
        let Accumulator::Trend { samples, .. } = self else {
            return None;
        };
        quantile_of(samples, p)
    }

    pub fn mean(&self) -> Option<f64> {
        let Accumulator::Trend { samples, .. } = self else {
            return None;
        };
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }

    pub fn min(&self) -> Option<f64> {
        match self {
            Accumulator::Trend { samples, .. } => samples.first().copied(),
            Accumulator::Gauge { min, .. } => *min,
            _ => None,
        }
    }

    pub fn max(&self) -> Option<f64> {
        match self {
            Accumulator::Trend { samples, .. } => samples.last().copied(),
            Accumulator::Gauge { max, .. } => *max,
            _ => None,
        }
    }

    pub fn sum(&self) -> Option<f64> {
        match self {
            Accumulator::Counter { sum, .. } => Some(*sum),
            _ => None,
        }
    }

    /// Pass ratio of a rate metric; `None` until something was recorded.
    pub fn rate(&self) -> Option<f64> {
        match self {
            Accumulator::Rate { passes, total, .. } if *total > 0 => {
                Some(*passes as f64 / *total as f64)
            }
            _ => None,
        }
    }

    /// Last recorded gauge value.
    pub fn last(&self) -> Option<f64> {
        match self {
            Accumulator::Gauge { last, .. } => *last,
            _ => None,
        }
    }

    fn summarize(&self) -> MetricSummary {
        match self {
            Accumulator::Counter {
                count,
                sum,
                by_tags,
            } => MetricSummary::Counter {
                count: *count,
                sum: *sum,
                by_tags: by_tags.clone(),
            },
            Accumulator::Trend { samples, by_tags } => {
                let stats = trend_stats(samples);
                MetricSummary::Trend {
                    count: stats.count,
                    min: stats.min,
                    max: stats.max,
                    avg: stats.avg,
                    med: stats.med,
                    p90: stats.p90,
                    p95: stats.p95,
                    p99: stats.p99,
                    by_tags: by_tags
                        .iter()
                        .map(|(key, bucket)| (key.clone(), trend_stats(bucket)))
                        .collect(),
                }
            }
            Accumulator::Gauge { last, min, max } => MetricSummary::Gauge {
                value: *last,
                min: *min,
                max: *max,
            },
            Accumulator::Rate {
                passes,
                total,
                by_tags,
            } => MetricSummary::Rate {
                passes: *passes,
                total: *total,
                rate: self.rate().unwrap_or(0.0),
                by_tags: by_tags.clone(),
            },
        }
    }
}

/// Aggregated statistics for one metric, derived from its accumulator at
/// snapshot time. This is what ends up in the [`crate::Report`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricSummary {
    Counter {
        count: u64,
        sum: f64,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        by_tags: BTreeMap<String, f64>,
    },
    Trend {
        count: u64,
        min: f64,
        max: f64,
        avg: f64,
        med: f64,
        p90: f64,
        p95: f64,
        p99: f64,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        by_tags: BTreeMap<String, TrendStats>,
    },
    Gauge {
        value: Option<f64>,
        min: Option<f64>,
        max: Option<f64>,
    },
    Rate {
        passes: u64,
        total: u64,
        rate: f64,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        by_tags: BTreeMap<String, RateCount>,
    },
}

impl fmt::Display for MetricSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricSummary::Counter { count, sum, .. } => {
                write!(f, "count={count} sum={sum:.2}")
            }
            MetricSummary::Trend {
                count,
                min,
                max,
                avg,
                med,
                p90,
                p95,
                p99,
                ..
            } => write!(
                f,
                "count={count} min={min:.2} max={max:.2} avg={avg:.2} med={med:.2} \
                 p90={p90:.2} p95={p95:.2} p99={p99:.2}"
            ),
            MetricSummary::Gauge { value, min, max } => match (value, min, max) {
                (Some(value), Some(min), Some(max)) => {
                    write!(f, "value={value:.2} min={min:.2} max={max:.2}")
                }
                _ => write!(f, "value=-"),
            },
            MetricSummary::Rate { passes, total, rate, .. } => {
                write!(f, "rate={:.2}% ({passes}/{total})", rate * 100.0)
            }
        }
    }
}

/// Immutable end-of-run view of every registered metric. Built once, after
/// all writers have stopped; reading it has no side effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    metrics: BTreeMap<String, Accumulator>,
}

impl Snapshot {
    pub(crate) fn new(names: Vec<String>, mut accumulators: Vec<Accumulator>) -> Self {
        for acc in &mut accumulators {
            acc.sort_samples();
        }
        Self {
            metrics: names.into_iter().zip(accumulators).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Accumulator> {
        self.metrics.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Accumulator)> {
        self.metrics.iter()
    }

    /// Derive per-metric statistics. Pure: calling it twice yields equal
    /// results.
    pub fn summaries(&self) -> BTreeMap<String, MetricSummary> {
        self.metrics
            .iter()
            .map(|(name, acc)| (name.clone(), acc.summarize()))
            .collect()
    }
}

/// Interpolated quantile over sorted samples, `p` in 0..=100.
fn quantile_of(samples: &[f64], p: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (samples.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let frac = rank - lo as f64;
    let value = if lo + 1 < samples.len() {
        samples[lo] + (samples[lo + 1] - samples[lo]) * frac
    } else {
        samples[lo]
    };
    Some(value)
}

fn trend_stats(samples: &[f64]) -> TrendStats {
    TrendStats {
        count: samples.len() as u64,
        min: samples.first().copied().unwrap_or(0.0),
        max: samples.last().copied().unwrap_or(0.0),
        avg: if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<f64>() / samples.len() as f64
        },
        med: quantile_of(samples, 50.0).unwrap_or(0.0),
        p90: quantile_of(samples, 90.0).unwrap_or(0.0),
        p95: quantile_of(samples, 95.0).unwrap_or(0.0),
        p99: quantile_of(samples, 99.0).unwrap_or(0.0),
    }
}

/// Canonical `key=value,key=value` rendering of a tag set, used as the
/// per-tag breakdown key.
pub(crate) fn render_tags(tags: &Tags) -> String {
    let mut out = String::new();
    for (i, (key, value)) in tags.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(key);
        out.push('=');
        out.push_str(value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trend_snapshot(samples: Vec<f64>) -> Snapshot {
        let mut acc = Accumulator::new(MetricKind::Trend);
        for s in samples {
            acc.record(s, None);
        }
        Snapshot::new(vec!["latency".to_string()], vec![acc])
    }

    #[test]
    fn quantiles_are_monotone_in_p() {
        let snapshot = trend_snapshot(vec![9.0, 1.0, 4.0, 7.0, 3.0, 8.0, 2.0, 6.0, 5.0]);
        let acc = snapshot.get("latency").expect("registered");
        let mut previous = f64::NEG_INFINITY;
        for p in [0.0, 10.0, 25.0, 50.0, 75.0, 90.0, 95.0, 99.0, 100.0] {
            let q = acc.quantile(p).expect("non-empty trend");
            assert!(q >= previous, "quantile({p}) regressed: {q} < {previous}");
            previous = q;
        }
    }

    #[test]
    fn quantile_interpolates_between_samples() {
        let snapshot = trend_snapshot(vec![10.0, 20.0]);
        let acc = snapshot.get("latency").expect("registered");
        assert_eq!(acc.quantile(0.0), Some(10.0));
        assert_eq!(acc.quantile(50.0), Some(15.0));
        assert_eq!(acc.quantile(100.0), Some(20.0));
    }

    #[test]
    fn summaries_are_idempotent() {
        let snapshot = trend_snapshot(vec![5.0, 1.0, 3.0]);
        assert_eq!(snapshot.summaries(), snapshot.summaries());
    }

    #[test]
    fn counter_accumulates_sum_and_tag_breakdown() {
        let mut acc = Accumulator::new(MetricKind::Counter);
        acc.record(1.0, Some(&tags! { "version" => "v1" }));
        acc.record(1.0, Some(&tags! { "version" => "v2" }));
        acc.record(1.0, Some(&tags! { "version" => "v1" }));
        let Accumulator::Counter {
            count,
            sum,
            by_tags,
        } = &acc
        else {
            panic!("wrong kind");
        };
        assert_eq!(*count, 3);
        assert_eq!(*sum, 3.0);
        assert_eq!(by_tags.get("version=v1"), Some(&2.0));
        assert_eq!(by_tags.get("version=v2"), Some(&1.0));
    }

    #[test]
    fn trend_breaks_down_by_tag() {
        let mut acc = Accumulator::new(MetricKind::Trend);
        acc.record(100.0, Some(&tags! { "version" => "v1" }));
        acc.record(300.0, Some(&tags! { "version" => "v1" }));
        acc.record(50.0, Some(&tags! { "version" => "v2" }));
        let snapshot = Snapshot::new(vec!["app_version_duration".to_string()], vec![acc]);

        let summaries = snapshot.summaries();
        let Some(MetricSummary::Trend { count, by_tags, .. }) =
            summaries.get("app_version_duration")
        else {
            panic!("wrong kind");
        };
        assert_eq!(*count, 3);
        let v1 = by_tags.get("version=v1").expect("v1 bucket");
        assert_eq!(v1.count, 2);
        assert_eq!(v1.avg, 200.0);
        assert_eq!(v1.min, 100.0);
        assert_eq!(v1.max, 300.0);
        assert_eq!(by_tags.get("version=v2").map(|s| s.count), Some(1));
    }

    #[test]
    fn gauge_keeps_last_min_max() {
        let mut acc = Accumulator::new(MetricKind::Gauge);
        acc.record(40.0, None);
        acc.record(10.0, None);
        acc.record(25.0, None);
        assert_eq!(acc.last(), Some(25.0));
        assert_eq!(acc.min(), Some(10.0));
        assert_eq!(acc.max(), Some(40.0));
    }

    #[test]
    fn rate_counts_nonzero_as_pass() {
        let mut acc = Accumulator::new(MetricKind::Rate);
        acc.record(1.0, None);
        acc.record(0.0, None);
        acc.record(1.0, None);
        acc.record(1.0, None);
        assert_eq!(acc.rate(), Some(0.75));
    }

    #[test]
    fn empty_metrics_report_no_values() {
        let acc = Accumulator::new(MetricKind::Trend);
        assert_eq!(acc.quantile(95.0), None);
        assert_eq!(acc.mean(), None);
        let acc = Accumulator::new(MetricKind::Rate);
        assert_eq!(acc.rate(), None);
        let acc = Accumulator::new(MetricKind::Gauge);
        assert_eq!(acc.last(), None);
    }

    #[test]
    fn tag_rendering_is_ordered_and_stable() {
        let tags = tags! { "b" => "2", "a" => "1" };
        assert_eq!(render_tags(&tags), "a=1,b=2");
    }
}

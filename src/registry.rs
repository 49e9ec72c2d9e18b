//! Named-metric registration and concurrent recording.
//!
//! The registry owns the set of metric definitions for a run. Virtual users
//! write through clonable [`Recorder`] handles; samples travel over an
//! unbounded channel to a single aggregator task, so a write never suspends
//! a VU loop. The accumulators are only read back after every writer has
//! stopped.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::error::HarnessError;
use crate::metric::{Accumulator, MetricKind, Tags};

/// Opaque index of a registered metric; cheap to copy into scenario
/// closures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricHandle(pub(crate) usize);

#[derive(Debug, Clone)]
struct MetricDef {
    name: String,
    kind: MetricKind,
}

/// Handles of the metrics every run records automatically, using the
/// conventional k6 names so thresholds port over unchanged.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinMetrics {
    /// Counter: one per issued request.
    pub http_reqs: MetricHandle,
    /// Trend, milliseconds: full request round trip.
    pub http_req_duration: MetricHandle,
    /// Trend, milliseconds: time to first byte.
    pub http_req_waiting: MetricHandle,
    /// Rate: transport errors and non-2xx/3xx statuses count as failed.
    pub http_req_failed: MetricHandle,
    /// Rate: check outcomes, tagged `check=<name>`.
    pub checks: MetricHandle,
    /// Counter: completed scenario iterations.
    pub iterations: MetricHandle,
}

/// Holds every named metric of a run. Create one, register custom metrics,
/// and hand it to the harness; the builtin metrics are always present.
#[derive(Debug, Clone)]
pub struct Registry {
    defs: Vec<MetricDef>,
    index: HashMap<String, usize>,
    builtins: BuiltinMetrics,
}

impl Registry {
    pub fn new() -> Self {
        let mut defs = Vec::new();
        let mut index = HashMap::new();
        let mut push = |name: &str, kind: MetricKind, defs: &mut Vec<MetricDef>| {
            let handle = MetricHandle(defs.len());
            index.insert(name.to_string(), handle.0);
            defs.push(MetricDef {
                name: name.to_string(),
                kind,
            });
            handle
        };
        let builtins = BuiltinMetrics {
            http_reqs: push("http_reqs", MetricKind::Counter, &mut defs),
            http_req_duration: push("http_req_duration", MetricKind::Trend, &mut defs),
            http_req_waiting: push("http_req_waiting", MetricKind::Trend, &mut defs),
            http_req_failed: push("http_req_failed", MetricKind::Rate, &mut defs),
            checks: push("checks", MetricKind::Rate, &mut defs),
            iterations: push("iterations", MetricKind::Counter, &mut defs),
        };
        Self {
            defs,
            index,
            builtins,
        }
    }

    /// Register a custom metric. Re-registering a name with the same kind
    /// returns the existing handle; a different kind is an error.
    pub fn register(&mut self, name: &str, kind: MetricKind) -> Result<MetricHandle, HarnessError> {
        if let Some(&i) = self.index.get(name) {
            let existing = self.defs[i].kind;
            if existing == kind {
                return Ok(MetricHandle(i));
            }
            return Err(HarnessError::DuplicateMetric {
                name: name.to_string(),
                existing,
            });
        }
        let handle = MetricHandle(self.defs.len());
        self.index.insert(name.to_string(), handle.0);
        self.defs.push(MetricDef {
            name: name.to_string(),
            kind,
        });
        Ok(handle)
    }

    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.index.get(name).map(|&i| self.defs[i].kind)
    }

    pub fn builtins(&self) -> BuiltinMetrics {
        self.builtins
    }

    pub(crate) fn kinds(&self) -> Vec<MetricKind> {
        self.defs.iter().map(|d| d.kind).collect()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.defs.iter().map(|d| d.name.clone()).collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// One recorded value on its way to the aggregator task.
#[derive(Debug, Clone)]
pub(crate) struct MetricSample {
    pub handle: MetricHandle,
    pub value: f64,
    pub tags: Option<Tags>,
}

/// Clonable writer handle. Recording is non-blocking: the only suspension
/// points of a VU loop are the HTTP call and the think-time pause, never a
/// metric write.
#[derive(Debug, Clone)]
pub struct Recorder {
    tx: mpsc::UnboundedSender<MetricSample>,
}

impl Recorder {
    pub(crate) fn new(tx: mpsc::UnboundedSender<MetricSample>) -> Self {
        Self { tx }
    }

    pub fn record(&self, handle: MetricHandle, value: f64) {
        self.send(handle, value, None);
    }

    pub fn record_with(&self, handle: MetricHandle, value: f64, tags: Tags) {
        self.send(handle, value, Some(tags));
    }

    fn send(&self, handle: MetricHandle, value: f64, tags: Option<Tags>) {
        let sample = MetricSample {
            handle,
            value,
            tags,
        };
        if self.tx.send(sample).is_err() {
            tracing::debug!("metric sample dropped after aggregation stopped");
        }
    }
}

/// Single-consumer aggregation task. Applies samples to per-metric
/// accumulators and returns them once every [`Recorder`] clone is dropped.
pub(crate) async fn aggregator_task(
    kinds: Vec<MetricKind>,
    mut rx: mpsc::UnboundedReceiver<MetricSample>,
) -> Vec<Accumulator> {
    let mut accumulators: Vec<Accumulator> = kinds.into_iter().map(Accumulator::new).collect();
    loop {
        match rx.recv().await {
            Some(sample) => apply(&mut accumulators, sample),
            None => break,
        }
        // drain whatever else is already queued before the next await
        while let Ok(sample) = rx.try_recv() {
            apply(&mut accumulators, sample);
        }
    }
    accumulators
}

fn apply(accumulators: &mut [Accumulator], sample: MetricSample) {
    if let Some(acc) = accumulators.get_mut(sample.handle.0) {
        acc.record(sample.value, sample.tags.as_ref());
    }
}

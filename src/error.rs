use thiserror::Error;

use crate::metric::MetricKind;

/// Fatal errors: configuration problems caught before any virtual user
/// starts, plus internal task failures. Per-request failures are
/// [`crate::http::RequestError`] and never surface here.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("metric `{name}` is already registered as a {existing} metric")]
    DuplicateMetric { name: String, existing: MetricKind },

    #[error("threshold references unknown metric `{0}`")]
    UnknownMetric(String),

    #[error("invalid threshold expression `{0}`")]
    InvalidThreshold(String),

    #[error("harness task failed: {0}")]
    Task(String),
}

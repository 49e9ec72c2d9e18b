use std::env;

/// Default target when `BASE_URL` is not set.
pub const DEFAULT_BASE_URL: &str = "https://test.k6.io";
/// Default run label when `TEST_ID` is not set.
pub const DEFAULT_TEST_ID: &str = "local-dev";

/// Environment-derived run parameters, resolved once at harness start.
/// Scenario code reads these through [`crate::VuContext`]; nothing looks at
/// the process environment after the run begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root URL of the service under test.
    pub base_url: String,
    /// Label attached to the run, useful for filtering results downstream.
    pub test_id: String,
}

impl Config {
    pub fn new(base_url: impl Into<String>, test_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            test_id: test_id.into(),
        }
    }

    /// Resolve from `BASE_URL` and `TEST_ID`, falling back to the documented
    /// defaults when absent.
    pub fn from_env() -> Self {
        Self {
            base_url: env::var("BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            test_id: env::var("TEST_ID").unwrap_or_else(|_| DEFAULT_TEST_ID.to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_TEST_ID)
    }
}

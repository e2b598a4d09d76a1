//! Runtime settings shared by every controller.

use std::time::Duration;

/// Controllers started when none are named explicitly.
pub const DEFAULT_CONTROLLERS: [&str; 3] = ["elasticsearch", "cassandra", "pilot"];

#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace to watch; every namespace when `None`
    pub namespace: Option<String>,
    /// Concurrent reconciles per controller
    pub workers: u16,
    /// Registry keys of the controllers to run
    pub controllers: Vec<String>,
    /// First retry delay after a retryable failure
    pub min_backoff: Duration,
    /// Retry delay ceiling, also used for fatal failures
    pub max_backoff: Duration,
    /// Requeue interval after a successful reconcile
    pub resync: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            workers: 4,
            controllers: DEFAULT_CONTROLLERS.iter().map(|c| c.to_string()).collect(),
            min_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(300),
            resync: Duration::from_secs(60),
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::query::{QueryError, StatusQuery};
use super::types::{CheckOutcome, EndpointKey, StatusInfo};
use crate::config::Monitoring;
use crate::registry::Endpoint;

/// Bounded retry policy for a single endpoint check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Query attempts per check, including the first one
    pub max_attempts: u32,

    /// Pause before the second and later attempts
    pub retry_delay: Duration,

    /// Limit for one query attempt
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Longest time a single check can take
    pub fn worst_case(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        self.timeout * attempts + self.retry_delay * (attempts - 1)
    }
}

impl From<&Monitoring> for RetryPolicy {
    fn from(config: &Monitoring) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_seconds),
            timeout: Duration::from_secs(config.query_timeout_seconds),
        }
    }
}

/// Runs liveness checks against endpoints and folds the result into their status
pub struct StatusChecker {
    query: Arc<dyn StatusQuery>,
    policy: RetryPolicy,
}

impl StatusChecker {
    pub fn new(query: Arc<dyn StatusQuery>, policy: RetryPolicy) -> Self {
        Self { query, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Check one endpoint and update its status.
    ///
    /// The endpoint's lock is taken only to record the attempt and to store the
    /// outcome; queries and retry pauses run without it.
    pub async fn check(&self, endpoint: &Endpoint) -> CheckOutcome {
        let key = endpoint.key();
        endpoint.record_attempt(Utc::now()).await;

        let info = match self.query_with_retries(key).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(host = %key.host, port = key.port, error = %e, "Server check failed after {} attempts", self.policy.max_attempts);
                None
            }
        };

        let outcome = endpoint.apply(info, Utc::now()).await;

        if outcome.changed {
            info!(host = %key.host, port = key.port, alive = outcome.alive, "Status changed: {}", outcome.message);
        } else {
            debug!(host = %key.host, port = key.port, "Status unchanged");
        }

        outcome
    }

    async fn query_with_retries(&self, key: &EndpointKey) -> Result<StatusInfo, QueryError> {
        let mut attempt = 1;

        loop {
            match self.query.query(&key.host, key.port, self.policy.timeout).await {
                Ok(info) => return Ok(info),
                Err(e) if attempt >= self.policy.max_attempts => return Err(e),
                Err(e) => {
                    debug!(host = %key.host, port = key.port, attempt, error = %e, "Query attempt failed, retrying");
                    attempt += 1;
                    sleep(self.policy.retry_delay).await;
                }
            }
        }
    }
}

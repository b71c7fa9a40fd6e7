//! Rate-limit retry policy for downstream API calls.
//!
//! A call that is answered with "429 Too Many Requests" is retried exactly
//! once after a fixed wait. Any other failure, or a second failure, turns
//! into a no-result value the caller treats as "this one operation did not
//! complete".

use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::SyncResult;

/// Attempts made for one call, the first included.
const MAX_ATTEMPTS: u32 = 2;

/// Sleep-and-retry-once policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRetry {
    wait: Duration,
}

impl Default for RateLimitRetry {
    fn default() -> Self {
        Self::new(1)
    }
}

impl RateLimitRetry {
    #[must_use]
    pub fn new(retry_wait_seconds: u64) -> Self {
        Self {
            wait: Duration::from_secs(retry_wait_seconds),
        }
    }

    #[must_use]
    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Run `f`, retrying once on a rate-limit answer.
    ///
    /// Returns `None` after logging if the call ultimately failed; errors are
    /// never propagated.
    pub async fn run<F, Fut, T>(&self, operation: &str, mut f: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Operation succeeded after rate-limit retry");
                    }
                    return Some(value);
                }
                Err(e) if e.is_rate_limited() && attempt < MAX_ATTEMPTS => {
                    warn!(
                        operation,
                        wait_secs = self.wait.as_secs(),
                        "API rate limit exceeded, waiting before retry"
                    );
                    tokio::time::sleep(self.wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(operation, attempts = attempt, error = %e, "API call failed");
                    return None;
                }
            }
        }
    }
}

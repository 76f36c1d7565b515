use std::sync::Arc;
use std::time::Duration;

use scylla::errors::{DbError, RequestAttemptError};
use scylla::policies::retry::{RequestInfo, RetryDecision, RetryPolicy, RetrySession};
use scylla::statement::unprepared::Statement;
use scylla::statement::Consistency;
use tracing::{debug, warn};

/// Upper bound on automatic same-target retries for a single request.
pub const MAX_RETRIES: u32 = 100;

/// Pause before retrying after the cluster reported itself unavailable, so a
/// degraded cluster is not hammered in a hot loop.
pub const UNAVAILABLE_BACKOFF: Duration = Duration::from_secs(2);

/// Retry policy for final/closing reads issued after the cluster has
/// stabilized.
///
/// Retries read timeouts and unavailability at the same target, same
/// consistency, up to [`MAX_RETRIES`] times. Write timeouts always escalate:
/// a timed-out write may still be applied later, and blindly retrying could
/// double-apply it, so that decision belongs to the idempotency-aware
/// outcome layer.
///
/// This policy is strictly opt-in (per statement or per execution profile).
/// It must not be used for ordinary workload traffic, where a hundred silent
/// retries would mask real availability problems.
#[derive(Debug, Clone)]
pub struct AggressiveReadRetryPolicy {
    backoff: Duration,
}

impl AggressiveReadRetryPolicy {
    /// Creates the policy with the standard [`UNAVAILABLE_BACKOFF`].
    pub fn new() -> AggressiveReadRetryPolicy {
        AggressiveReadRetryPolicy {
            backoff: UNAVAILABLE_BACKOFF,
        }
    }

    /// Creates the policy with a custom unavailable backoff.
    pub fn with_backoff(backoff: Duration) -> AggressiveReadRetryPolicy {
        AggressiveReadRetryPolicy { backoff }
    }
}

impl Default for AggressiveReadRetryPolicy {
    fn default() -> AggressiveReadRetryPolicy {
        AggressiveReadRetryPolicy::new()
    }
}

impl RetryPolicy for AggressiveReadRetryPolicy {
    fn new_session(&self) -> Box<dyn RetrySession> {
        Box::new(AggressiveReadRetrySession {
            backoff: self.backoff,
            retry_count: 0,
        })
    }
}

/// Per-request retry state of [`AggressiveReadRetryPolicy`].
#[derive(Debug)]
pub struct AggressiveReadRetrySession {
    backoff: Duration,
    retry_count: u32,
}

impl RetrySession for AggressiveReadRetrySession {
    fn decide_should_retry(&mut self, request_info: RequestInfo) -> RetryDecision {
        match request_info.error {
            RequestAttemptError::DbError(DbError::ReadTimeout { .. }, _) => {
                self.bounded_retry("read timeout")
            }
            RequestAttemptError::DbError(DbError::WriteTimeout { .. }, _) => {
                debug!("write timeout, escalating to the outcome layer");
                RetryDecision::DontRetry
            }
            RequestAttemptError::DbError(DbError::Unavailable { .. }, _) => {
                warn!(backoff = ?self.backoff, "cluster unavailable, backing off before retry");
                // RetrySession is a synchronous callback, so this stalls the
                // invoking worker thread. That is the intent: the worker has
                // nothing useful to do against an unavailable cluster.
                std::thread::sleep(self.backoff);
                self.bounded_retry("unavailable")
            }
            _ => RetryDecision::DontRetry,
        }
    }

    fn reset(&mut self) {
        self.retry_count = 0;
    }
}

impl AggressiveReadRetrySession {
    fn bounded_retry(&mut self, cause: &'static str) -> RetryDecision {
        if self.retry_count > MAX_RETRIES {
            debug!(cause, retries = self.retry_count, "retry budget exhausted");
            RetryDecision::DontRetry
        } else {
            self.retry_count += 1;
            debug!(cause, retries = self.retry_count, "retrying at the same target");
            RetryDecision::RetrySameTarget(None)
        }
    }
}

/// Builds a final-verification read statement: aggressive retries and `ALL`
/// consistency, matching the intended use of this policy.
pub fn final_read_statement(cql: impl Into<String>) -> Statement {
    let mut statement = Statement::new(cql);
    statement.set_retry_policy(Some(Arc::new(AggressiveReadRetryPolicy::new())));
    statement.set_consistency(Consistency::All);
    statement
}

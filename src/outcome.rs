//! Wrapping database operations into canonical harness outcomes.
//!
//! The harness cares about one question per operation: did it take effect?
//! [`with_errors`] answers it by combining the error classification table
//! with the caller-declared idempotency of the operation, so a classified
//! failure comes back as data on the [`Operation`] record instead of a
//! crash.

use std::future::Future;
use std::time::Duration;

use scylla::errors::ExecutionError;
use tracing::{debug, warn};

use crate::errors::{classify, ClassifiedError, ErrorKind};

/// Pause after a no-host failure before handing the outcome back.
///
/// When the client believes every node is down, each attempt fails
/// instantly; without this pause a worker loop degenerates into millions of
/// no-op requests per second, flooding logs and CPU.
pub const NO_HOST_THROTTLE: Duration = Duration::from_secs(2);

/// Canonical status of a wrapped operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    /// Submitted; outcome not decided yet.
    Invoke,
    /// Took effect. Set by the harness itself, never by the wrapper.
    Ok,
    /// Certainly did not take effect, or is safe to treat as such because
    /// the action is idempotent.
    Fail,
    /// Ambiguous outcome of a non-idempotent action: the harness must not
    /// assume failure, since the write may have silently succeeded.
    Info,
}

/// A logical action submitted by the harness.
#[derive(Debug)]
pub struct Operation {
    /// Name of the logical action, e.g. `"read"` or `"transfer"`.
    pub f: String,
    /// Current status; starts as [`OpStatus::Invoke`].
    pub status: OpStatus,
    /// Classified failure, if any.
    pub error: Option<ClassifiedError>,
}

impl Operation {
    /// A fresh operation in the [`OpStatus::Invoke`] state.
    pub fn invoke(f: impl Into<String>) -> Operation {
        Operation {
            f: f.into(),
            status: OpStatus::Invoke,
            error: None,
        }
    }
}

/// Result of running an operation body through [`with_errors`].
#[derive(Debug)]
pub enum Outcome<T> {
    /// The body succeeded; the operation record was left untouched.
    Value(T),
    /// The body failed with a classified error, now recorded on the
    /// operation.
    Op(Operation),
}

/// Runs `body` and folds any classified failure into an [`Operation`]
/// outcome.
///
/// On success the body's value is returned and `op` is not mutated. On a
/// classified failure `op.status` is set to [`OpStatus::Fail`] when the
/// failure is definite or the operation is idempotent, and to
/// [`OpStatus::Info`] otherwise; the classified error is attached to
/// `op.error`. Errors outside the classification table are returned as
/// `Err` unchanged — they signal a setup or programming problem and must
/// never be absorbed into an outcome.
pub async fn with_errors<T, F, Fut>(
    mut op: Operation,
    is_idempotent: bool,
    body: F,
) -> Result<Outcome<T>, ExecutionError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ExecutionError>>,
{
    let error = match body().await {
        Ok(value) => return Ok(Outcome::Value(value)),
        Err(error) => error,
    };

    let Some(kind) = classify(&error) else {
        return Err(error);
    };

    if kind == ErrorKind::NoHostAvailable {
        warn!(f = %op.f, throttle = ?NO_HOST_THROTTLE, "no host available, throttling");
        tokio::time::sleep(NO_HOST_THROTTLE).await;
    }

    let definite = kind.is_definite();
    op.status = if definite || is_idempotent {
        OpStatus::Fail
    } else {
        OpStatus::Info
    };
    debug!(f = %op.f, ?kind, definite, status = ?op.status, "classified operation failure");
    op.error = Some(ClassifiedError::new(kind, error));
    Ok(Outcome::Op(op))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use scylla::errors::{DbError, ExecutionError, RequestAttemptError, WriteType};
    use scylla::statement::Consistency;
    use tokio::time::Instant;

    use super::{with_errors, OpStatus, Operation, Outcome, NO_HOST_THROTTLE};
    use crate::errors::ErrorKind;
    use crate::test_utils::setup_tracing;

    fn wrapped(db_error: DbError) -> ExecutionError {
        ExecutionError::LastAttemptError(RequestAttemptError::DbError(db_error, String::new()))
    }

    fn read_timeout() -> ExecutionError {
        wrapped(DbError::ReadTimeout {
            consistency: Consistency::Quorum,
            received: 1,
            required: 2,
            data_present: false,
        })
    }

    fn write_timeout() -> ExecutionError {
        wrapped(DbError::WriteTimeout {
            consistency: Consistency::Quorum,
            received: 1,
            required: 2,
            write_type: WriteType::Simple,
        })
    }

    fn unavailable() -> ExecutionError {
        wrapped(DbError::Unavailable {
            consistency: Consistency::Quorum,
            required: 2,
            alive: 1,
        })
    }

    async fn failed_op(
        f: &str,
        is_idempotent: bool,
        error: ExecutionError,
    ) -> Operation {
        let outcome: Outcome<()> =
            with_errors(Operation::invoke(f), is_idempotent, || async move { Err(error) })
                .await
                .unwrap();
        match outcome {
            Outcome::Op(op) => op,
            Outcome::Value(_) => panic!("expected a recorded operation"),
        }
    }

    #[tokio::test]
    async fn success_returns_the_value_untouched() {
        setup_tracing();
        let outcome = with_errors(Operation::invoke("read"), true, || async { Ok(42) })
            .await
            .unwrap();
        assert_matches!(outcome, Outcome::Value(42));
    }

    #[tokio::test]
    async fn indefinite_failure_of_idempotent_op_is_fail() {
        setup_tracing();
        let op = failed_op("read", true, read_timeout()).await;
        assert_eq!(op.f, "read");
        assert_eq!(op.status, OpStatus::Fail);
        let error = op.error.unwrap();
        assert_eq!(error.kind, ErrorKind::ReadTimeout);
        assert!(!error.is_definite());
    }

    #[tokio::test]
    async fn indefinite_failure_of_non_idempotent_op_is_info() {
        setup_tracing();
        let op = failed_op("write", false, write_timeout()).await;
        assert_eq!(op.status, OpStatus::Info);
        let error = op.error.unwrap();
        assert_eq!(error.kind, ErrorKind::WriteTimeout);
        assert!(!error.is_definite());
    }

    #[tokio::test]
    async fn definite_failure_is_fail_regardless_of_idempotency() {
        setup_tracing();
        for is_idempotent in [false, true] {
            let op = failed_op("write", is_idempotent, unavailable()).await;
            assert_eq!(op.status, OpStatus::Fail);
            assert_eq!(op.error.unwrap().kind, ErrorKind::Unavailable);
        }
    }

    #[tokio::test]
    async fn write_failure_is_indefinite() {
        setup_tracing();
        let error = wrapped(DbError::WriteFailure {
            consistency: Consistency::Quorum,
            received: 1,
            required: 2,
            numfailures: 1,
            write_type: WriteType::Simple,
        });
        let op = failed_op("write", false, error).await;
        assert_eq!(op.status, OpStatus::Info);
        assert_eq!(op.error.unwrap().kind, ErrorKind::WriteFailure);
    }

    #[tokio::test]
    async fn unclassified_errors_propagate() {
        setup_tracing();
        let result: Result<Outcome<()>, _> =
            with_errors(Operation::invoke("read"), true, || async {
                Err(wrapped(DbError::SyntaxError))
            })
            .await;
        assert_matches!(
            result,
            Err(ExecutionError::LastAttemptError(RequestAttemptError::DbError(
                DbError::SyntaxError,
                _
            )))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn no_host_available_is_throttled() {
        setup_tracing();
        let started = Instant::now();
        let op = failed_op("read", true, ExecutionError::EmptyPlan).await;
        assert_eq!(op.status, OpStatus::Fail);
        assert_eq!(op.error.unwrap().kind, ErrorKind::NoHostAvailable);
        assert_eq!(started.elapsed(), NO_HOST_THROTTLE);
    }
}

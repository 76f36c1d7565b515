//! Error taxonomy of the shim.
//!
//! Query-level failures are folded into a small canonical set of
//! [`ErrorKind`]s by [`classify`]; anything outside that set must reach the
//! caller unchanged, because an unrecognized error signals a setup or
//! programming problem rather than an induced fault.

use scylla::errors::{
    DbError, ExecutionError, MetadataError, NewSessionError, RequestAttemptError,
};
use thiserror::Error;

/// Canonical category of a query-level failure.
///
/// Each kind carries a fixed *definiteness*: whether the failed operation
/// provably did not take effect ([`ErrorKind::is_definite`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request never left the client: no reachable node.
    NoHostAvailable,
    /// The coordinator timed out waiting for read replies.
    ReadTimeout,
    /// Not enough replicas alive to even attempt the request.
    Unavailable,
    /// A replica explicitly refused the write.
    WriteFailure,
    /// The coordinator timed out waiting for write acks.
    WriteTimeout,
    /// Failure outside the classification table.
    Unknown,
}

impl ErrorKind {
    /// `true` means the operation provably did not take effect; `false`
    /// means the outcome is unknown (e.g. a timeout after the request was
    /// already sent).
    pub fn is_definite(self) -> bool {
        match self {
            ErrorKind::NoHostAvailable | ErrorKind::Unavailable => true,
            ErrorKind::ReadTimeout
            | ErrorKind::WriteFailure
            | ErrorKind::WriteTimeout
            | ErrorKind::Unknown => false,
        }
    }
}

/// A query failure recognized by [`classify`], attached to a failed
/// [`Operation`](crate::outcome::Operation) so the harness can record it as
/// data rather than a crash.
#[derive(Debug, Error)]
#[error(
    "{kind:?} ({definiteness} failure): {source}",
    definiteness = if .kind.is_definite() { "definite" } else { "indefinite" }
)]
pub struct ClassifiedError {
    /// Canonical category of the failure.
    pub kind: ErrorKind,
    /// The driver error that was classified.
    #[source]
    pub source: ExecutionError,
}

impl ClassifiedError {
    pub(crate) fn new(kind: ErrorKind, source: ExecutionError) -> Self {
        ClassifiedError { kind, source }
    }

    /// Shorthand for `self.kind.is_definite()`.
    pub fn is_definite(&self) -> bool {
        self.kind.is_definite()
    }
}

/// Failure to establish (or prove liveness of) a pinned connection.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectionError {
    /// The node hostname could not be resolved.
    #[error("failed to resolve {node}: {source}")]
    Resolve {
        /// Hostname that failed to resolve.
        node: String,
        /// Underlying resolver error.
        #[source]
        source: std::io::Error,
    },

    /// Session establishment against the node failed.
    #[error("failed to open session to {node}: {source}")]
    Open {
        /// Node the session was opened against.
        node: String,
        /// Driver error from session construction.
        #[source]
        source: NewSessionError,
    },

    /// The canary read confirming liveness failed.
    #[error("canary query on {node} failed: {source}")]
    Canary {
        /// Node the canary was issued against.
        node: String,
        /// Driver error from the canary query.
        #[source]
        source: ExecutionError,
    },

    /// [`await_open`](crate::connection::await_open) exhausted its attempt
    /// budget without the node becoming reachable.
    #[error("{node} did not become available within {attempts} attempts")]
    AwaitOpenTimeout {
        /// Node that never became reachable.
        node: String,
        /// Number of attempts made.
        attempts: u32,
    },
}

impl ConnectionError {
    /// Whether `await_open` may treat this failure as transient
    /// host-unavailability. Everything else propagates immediately.
    pub(crate) fn is_host_unavailable(&self) -> bool {
        match self {
            // Session build failed because the control connection could not
            // be established, i.e. the node itself is unreachable.
            ConnectionError::Open { source, .. } => matches!(
                source,
                NewSessionError::MetadataError(MetadataError::ConnectionPoolError(_))
            ),
            ConnectionError::Canary { source, .. } => {
                classify(source) == Some(ErrorKind::NoHostAvailable)
            }
            _ => false,
        }
    }
}

/// Maps a driver error to its canonical [`ErrorKind`].
///
/// Returns `None` for anything outside the classification table; such errors
/// must propagate unchanged. The driver reports server-side errors wrapped
/// one layer deep in its last-attempt envelope, so that layer is unwrapped
/// and the cause re-classified through the same table.
pub fn classify(error: &ExecutionError) -> Option<ErrorKind> {
    match error {
        // The single-target plan produced no node, or the pinned node's
        // connection pool is down: the request never left the client.
        ExecutionError::EmptyPlan | ExecutionError::ConnectionPoolError(_) => {
            Some(ErrorKind::NoHostAvailable)
        }
        ExecutionError::LastAttemptError(attempt) => classify_attempt(attempt),
        _ => None,
    }
}

pub(crate) fn classify_attempt(error: &RequestAttemptError) -> Option<ErrorKind> {
    match error {
        RequestAttemptError::DbError(db_error, _) => classify_db_error(db_error),
        _ => None,
    }
}

fn classify_db_error(error: &DbError) -> Option<ErrorKind> {
    match error {
        DbError::ReadTimeout { .. } => Some(ErrorKind::ReadTimeout),
        DbError::Unavailable { .. } => Some(ErrorKind::Unavailable),
        DbError::WriteFailure { .. } => Some(ErrorKind::WriteFailure),
        DbError::WriteTimeout { .. } => Some(ErrorKind::WriteTimeout),
        _ => None,
    }
}

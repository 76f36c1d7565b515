//! Opening and closing a connection pinned to exactly one cluster node.
//!
//! The whole point of the shim is to observe a *specific* node's behavior
//! while faults are injected into it, so smart-client routing must be taken
//! out of the picture: every session built here carries a single-target
//! load-balancing policy with an empty fallback plan.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use scylla::client::execution_profile::ExecutionProfile;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::policies::load_balancing::{NodeIdentifier, SingleTargetLoadBalancingPolicy};
use tokio::net::lookup_host;
use tracing::{debug, warn};

use crate::errors::ConnectionError;

/// Standard CQL client port.
pub const CQL_PORT: u16 = 9042;

/// Attempt budget of [`await_open`].
pub const AWAIT_OPEN_ATTEMPTS: u32 = 32;

/// Pause between failed [`await_open`] attempts.
pub const AWAIT_OPEN_BACKOFF: Duration = Duration::from_secs(5);

/// Lightweight read of node-local peer metadata, used only to confirm that a
/// freshly built session is genuinely serving traffic.
const CANARY_QUERY: &str = "SELECT peer FROM system.peers";

/// A driver session pinned to exactly one cluster node.
///
/// The driver couples the cluster and session handles into one [`Session`]
/// whose drop releases every pooled connection and background worker, so a
/// `Connection` is either fully open or fully closed; a failed [`open`]
/// never yields a partially-open value, and double-close is ruled out by
/// move semantics.
pub struct Connection {
    session: Session,
    node: String,
    addr: SocketAddr,
}

impl Connection {
    /// The underlying session, for issuing statements against the pinned
    /// node.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Hostname this connection is pinned to.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Resolved address of the pinned node.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Releases the session and with it every network resource it owns.
    pub fn close(self) {
        debug!(node = %self.node, "closing pinned session");
        drop(self.session);
    }
}

/// Opens a session pinned to `node` at the standard CQL port.
///
/// The session's default execution profile routes every request to that node
/// and nowhere else, guaranteeing that induced node failures are actually
/// observed by the caller instead of being papered over by rerouting. On
/// failure the driver has already released whatever it allocated.
pub async fn open(node: &str) -> Result<Connection, ConnectionError> {
    let addr = resolve(node).await?;

    let profile = ExecutionProfile::builder()
        .load_balancing_policy(SingleTargetLoadBalancingPolicy::new(
            NodeIdentifier::NodeAddress(addr),
            None,
        ))
        .build();

    let session = SessionBuilder::new()
        .known_node_addr(addr)
        .default_execution_profile_handle(profile.into_handle())
        .build()
        .await
        .map_err(|source| ConnectionError::Open {
            node: node.to_owned(),
            source,
        })?;

    debug!(node, %addr, "opened pinned session");
    Ok(Connection {
        session,
        node: node.to_owned(),
        addr,
    })
}

/// Free-function form of [`Connection::close`].
pub fn close(connection: Connection) {
    connection.close();
}

/// Repeatedly [`open`]s a connection to `node` until the node serves a
/// canary read, bounded at [`AWAIT_OPEN_ATTEMPTS`] attempts with
/// [`AWAIT_OPEN_BACKOFF`] between them.
///
/// Only host-unavailability is treated as transient here; any other error
/// from `open` or the canary propagates immediately. An exhausted budget
/// fails with [`ConnectionError::AwaitOpenTimeout`].
pub async fn await_open(node: &str) -> Result<Connection, ConnectionError> {
    retry_until_open(node, AWAIT_OPEN_ATTEMPTS, AWAIT_OPEN_BACKOFF, || async move {
        let connection = open(node).await?;
        canary(&connection).await?;
        Ok(connection)
    })
    .await
}

async fn canary(connection: &Connection) -> Result<(), ConnectionError> {
    connection
        .session
        .query_unpaged(CANARY_QUERY, &[])
        .await
        .map(|_| ())
        .map_err(|source| ConnectionError::Canary {
            node: connection.node.clone(),
            source,
        })
}

async fn resolve(node: &str) -> Result<SocketAddr, ConnectionError> {
    let mut addrs = lookup_host((node, CQL_PORT))
        .await
        .map_err(|source| ConnectionError::Resolve {
            node: node.to_owned(),
            source,
        })?;
    addrs.next().ok_or_else(|| ConnectionError::Resolve {
        node: node.to_owned(),
        source: std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "hostname resolved to no addresses",
        ),
    })
}

/// The attempt/backoff loop of [`await_open`], generic over the opening
/// closure so it can be exercised without a live cluster.
async fn retry_until_open<T, F, Fut>(
    node: &str,
    attempts: u32,
    backoff: Duration,
    mut open_fn: F,
) -> Result<T, ConnectionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ConnectionError>>,
{
    for attempt in 1..=attempts {
        debug!(node, attempt, "opening pinned session");
        match open_fn().await {
            Ok(connection) => return Ok(connection),
            Err(error) if error.is_host_unavailable() => {
                warn!(node, attempt, %error, "node not available yet");
                if attempt < attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
            Err(error) => return Err(error),
        }
    }
    Err(ConnectionError::AwaitOpenTimeout {
        node: node.to_owned(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use scylla::errors::ExecutionError;
    use tokio::time::Instant;

    use super::retry_until_open;
    use crate::errors::ConnectionError;
    use crate::test_utils::setup_tracing;

    const BACKOFF: Duration = Duration::from_secs(5);

    fn no_host(node: &str) -> ConnectionError {
        ConnectionError::Canary {
            node: node.to_owned(),
            source: ExecutionError::EmptyPlan,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_once_the_node_comes_back() {
        setup_tracing();
        let calls = Cell::new(0u32);
        let started = Instant::now();

        let result = retry_until_open("node3", 32, BACKOFF, || {
            calls.set(calls.get() + 1);
            let attempt = calls.get();
            async move {
                if attempt <= 3 {
                    Err(no_host("node3"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 4);
        assert_eq!(calls.get(), 4);
        // One backoff sleep per failed attempt.
        assert_eq!(started.elapsed(), 3 * BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_times_out() {
        setup_tracing();
        let calls = Cell::new(0u32);
        let started = Instant::now();

        let result: Result<(), _> = retry_until_open("node3", 32, BACKOFF, || {
            calls.set(calls.get() + 1);
            async { Err(no_host("node3")) }
        })
        .await;

        assert_matches!(
            result,
            Err(ConnectionError::AwaitOpenTimeout { node, attempts: 32 }) if node == "node3"
        );
        assert_eq!(calls.get(), 32);
        // No sleep after the final attempt.
        assert_eq!(started.elapsed(), 31 * BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_errors_propagate_immediately() {
        setup_tracing();
        let calls = Cell::new(0u32);

        let result: Result<(), _> = retry_until_open("node3", 32, BACKOFF, || {
            calls.set(calls.get() + 1);
            async {
                Err(ConnectionError::Resolve {
                    node: "node3".to_owned(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such host"),
                })
            }
        })
        .await;

        assert_matches!(result, Err(ConnectionError::Resolve { .. }));
        assert_eq!(calls.get(), 1);
    }
}

//! Fault-tolerant client shim for driving a ScyllaDB / Apache Cassandra™
//! cluster during fault-injection testing (node kills, network partitions).
//!
//! The shim does three things and nothing else:
//!
//! * pins a session to exactly one cluster node ([`open`], [`close`],
//!   [`await_open`]), so induced faults on that node are observed instead of
//!   routed around;
//! * classifies every query-level failure as *definite* (the operation
//!   certainly did not take effect) or *indefinite* (unknown outcome)
//!   ([`classify`], [`ErrorKind`]);
//! * combines that classification with the caller-declared idempotency of
//!   the operation into a single canonical outcome ([`with_errors`],
//!   [`Operation`]).
//!
//! Statement construction, topology discovery, workload generation and
//! result checking belong to the harness calling in, not to this crate.
//!
//! # Example
//!
//! ```rust,no_run
//! use cql_chaos::{await_open, with_errors, Operation, Outcome};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let connection = await_open("node3").await?;
//!
//! let op = Operation::invoke("read");
//! let session = connection.session();
//! let outcome = with_errors(op, true, || async move {
//!     session
//!         .query_unpaged("SELECT value FROM ks.registers WHERE id = 0", &[])
//!         .await
//! })
//! .await?;
//!
//! match outcome {
//!     Outcome::Value(_) => println!("read ok"),
//!     Outcome::Op(op) => println!("{} -> {:?}: {:?}", op.f, op.status, op.error),
//! }
//!
//! connection.close();
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod errors;
pub mod outcome;
pub mod policies;

pub use connection::{await_open, close, open, Connection};
pub use errors::{classify, ClassifiedError, ConnectionError, ErrorKind};
pub use outcome::{with_errors, OpStatus, Operation, Outcome};
pub use policies::retry::{final_read_statement, AggressiveReadRetryPolicy};

#[cfg(test)]
pub(crate) mod test_utils;

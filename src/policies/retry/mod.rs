//! Request retry configuration for final-verification reads.

mod aggressive_read;

pub use aggressive_read::{
    final_read_statement, AggressiveReadRetryPolicy, AggressiveReadRetrySession, MAX_RETRIES,
    UNAVAILABLE_BACKOFF,
};

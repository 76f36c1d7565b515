//! Driver policies installed by the shim.

pub mod retry;

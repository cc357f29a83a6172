//! Query execution.
//!
//! Submits queries to a query service, waits for them, and shapes results.

pub mod executor;
pub mod shape;

pub use executor::{PollPolicy, QueryExecutor, QueryTarget, DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL};
pub use shape::shape_result;

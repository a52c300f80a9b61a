//! Routing error types

use thiserror::Error;

/// Errors that can occur when building a router
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Log range has `first > last`
    #[error("invalid log range: first {first} > last {last}")]
    InvalidLogRange { first: u64, last: u64 },
}

/// Result type for routing operations
pub type Result<T> = std::result::Result<T, RoutingError>;

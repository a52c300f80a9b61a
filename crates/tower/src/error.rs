//! Tower error types
//!
//! Errors inside the room are mostly recovered locally: out-of-order events
//! and lookups on missing state drop with `NotFound` and a debug log.
//! Storage failures during `start_reading` surface to the subscriber.

use skyway_storage::StorageError;
use thiserror::Error;

/// Errors produced by the control tower read path
#[derive(Debug, Error)]
pub enum TowerError {
    /// The subscription, reader state, or log entry does not exist.
    /// Doubles as the drop signal for late or out-of-order events.
    #[error("not found")]
    NotFound,

    /// Room event queue is full; the caller retries with the same payload
    #[error("room queue full")]
    NoBuffer,

    /// Subscription at an impossible seqno or outside the routed log range
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Log store failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Operation before `initialize` wired the readers
    #[error("tower not initialized")]
    NotInitialized,

    /// The room task has shut down and its queue is gone
    #[error("room shut down")]
    RoomClosed,
}

/// Result type for tower operations
pub type Result<T> = std::result::Result<T, TowerError>;

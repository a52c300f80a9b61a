//! Storage error types

use skyway_protocol::{LogId, ReaderId};
use thiserror::Error;

/// Errors that can occur at the log-store boundary
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store has not been wired with delivery callbacks yet
    #[error("storage not initialized")]
    NotInitialized,

    /// Reader is not open on the log
    #[error("{reader_id} is not open on {log_id}")]
    NotOpen { log_id: LogId, reader_id: ReaderId },

    /// Downstream queue is full; the store keeps its cursor and retries
    #[error("downstream queue full")]
    NoBuffer,

    /// Underlying store failure
    #[error("storage I/O: {0}")]
    Io(String),
}

impl StorageError {
    /// Create a not-open error
    #[inline]
    pub fn not_open(log_id: LogId, reader_id: ReaderId) -> Self {
        Self::NotOpen { log_id, reader_id }
    }

    /// True if the operation should be retried unchanged later
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NoBuffer)
    }
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

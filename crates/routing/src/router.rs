//! Log router - deterministic topic → log mapping
//!
//! Every topic is owned by exactly one log in a configured `[first, last]`
//! range. The mapping is a pure function of the topic's namespace and name,
//! so publishers and subscribers agree on the log without coordination.

use skyway_protocol::{LogId, TopicUuid};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{Result, RoutingError};

/// Separator between namespace and topic name in the hashed key.
///
/// 0x1F (unit separator) cannot appear in either part by construction, so
/// `("ab", "c")` and `("a", "bc")` hash differently.
const TOPIC_KEY_SEPARATOR: u8 = 0x1f;

/// Inclusive range of log ids available for routing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRange {
    first: u64,
    last: u64,
}

impl LogRange {
    /// Create a new log range
    ///
    /// # Errors
    ///
    /// Returns `InvalidLogRange` if `first > last`.
    pub fn new(first: u64, last: u64) -> Result<Self> {
        if first > last {
            return Err(RoutingError::InvalidLogRange { first, last });
        }
        Ok(Self { first, last })
    }

    /// First log id in the range (inclusive)
    #[inline]
    #[must_use]
    pub fn first(&self) -> u64 {
        self.first
    }

    /// Last log id in the range (inclusive)
    #[inline]
    #[must_use]
    pub fn last(&self) -> u64 {
        self.last
    }

    /// Number of logs in the range
    #[inline]
    #[must_use]
    pub fn count(&self) -> u64 {
        self.last - self.first + 1
    }

    /// True if `log_id` falls inside the range
    #[inline]
    #[must_use]
    pub fn contains(&self, log_id: LogId) -> bool {
        (self.first..=self.last).contains(&log_id.value())
    }
}

/// Deterministic topic → log router
///
/// # Stability
///
/// `route()` is a pure function: the same topic always yields the same log,
/// across calls, restarts, and hosts. Client-persisted subscriptions depend
/// on this.
#[derive(Debug, Clone, Copy)]
pub struct LogRouter {
    range: LogRange,
}

impl LogRouter {
    /// Create a router over the given log range
    #[inline]
    #[must_use]
    pub fn new(range: LogRange) -> Self {
        Self { range }
    }

    /// Get the log range this router distributes over
    #[inline]
    #[must_use]
    pub fn range(&self) -> LogRange {
        self.range
    }

    /// Route a topic to its owning log
    ///
    /// Hashes `namespace || 0x1F || topic` with xxh3 and folds the result
    /// into the configured range.
    #[inline]
    #[must_use]
    pub fn route(&self, topic: &TopicUuid) -> LogId {
        let mut key = Vec::with_capacity(topic.namespace().len() + 1 + topic.topic().len());
        key.extend_from_slice(topic.namespace().as_bytes());
        key.push(TOPIC_KEY_SEPARATOR);
        key.extend_from_slice(topic.topic().as_bytes());

        let hash = xxh3_64(&key);
        LogId::new(self.range.first() + hash % self.range.count())
    }

    /// Room that services a log, for a tower running `num_rooms` rooms
    ///
    /// All records of one log must flow through a single room, so the shard
    /// function is a plain modulus over the log id.
    #[inline]
    #[must_use]
    pub fn room_for(log_id: LogId, num_rooms: usize) -> usize {
        (log_id.value() % num_rooms as u64) as usize
    }
}

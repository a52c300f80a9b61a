//! Log record container
//!
//! `LogRecord` is the unit handed from the log store to the read path. The
//! payload is `bytes::Bytes`, so records can be shared between the fan-out
//! path and the record cache behind `Arc` without copying.

use bytes::Bytes;

use crate::ids::SequenceNumber;
use crate::topic::TopicUuid;

/// One record read from a log
///
/// # Design
///
/// - Payload uses `bytes::Bytes` - reference-counted, O(1) clone
/// - Records are wrapped in `Arc<LogRecord>` for multi-subscriber fan-out
///   and for cache storage; neither path copies the payload
#[derive(Debug, Clone)]
pub struct LogRecord {
    topic: TopicUuid,
    seqno: SequenceNumber,
    payload: Bytes,
}

impl LogRecord {
    /// Create a new log record
    #[inline]
    pub fn new(topic: TopicUuid, seqno: SequenceNumber, payload: Bytes) -> Self {
        Self {
            topic,
            seqno,
            payload,
        }
    }

    /// Get the topic this record was published on
    #[inline]
    #[must_use]
    pub fn topic(&self) -> &TopicUuid {
        &self.topic
    }

    /// Get the record's sequence number within its log
    #[inline]
    #[must_use]
    pub fn seqno(&self) -> SequenceNumber {
        self.seqno
    }

    /// Get the record payload
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Get the payload size in bytes
    #[inline]
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

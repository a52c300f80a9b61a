//! Outgoing messages
//!
//! `TailerMessage` is what the read path emits towards subscribers: either a
//! record delivery with its `(prev, cur)` sequence stamp, or a gap covering a
//! range of sequence numbers the subscriber will not receive records for.

use std::fmt;
use std::sync::Arc;

use crate::ids::SequenceNumber;
use crate::record::LogRecord;
use crate::topic::TopicUuid;

/// Classification of a gap in a subscriber's record stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GapType {
    /// Information-preserving advance: no records for this topic existed in
    /// the range (or the subscriber was fast-forwarded past them)
    Benign,
    /// Records in the range expired out of the store's retention window
    Retention,
    /// Records in the range were lost
    DataLoss,
}

impl GapType {
    /// True for gap types that lose history (`Retention`, `DataLoss`)
    ///
    /// After a malignant gap a reader can no longer vouch for any topic's
    /// position before the gap.
    #[inline]
    #[must_use]
    pub fn is_malignant(self) -> bool {
        !matches!(self, GapType::Benign)
    }
}

impl fmt::Display for GapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GapType::Benign => "benign",
            GapType::Retention => "retention",
            GapType::DataLoss => "data_loss",
        };
        f.write_str(s)
    }
}

/// A message from the read path to a set of subscribers
///
/// # Sequence stamps
///
/// For `Deliver`, `prev_seqno` is the seqno the recipient was expecting when
/// the record was sent, so `prev_seqno <= record.seqno()` and both are
/// positive. Two consecutive deliveries on the same topic satisfy
/// `next.prev_seqno == previous.record.seqno() + 1`; anything else means a
/// `Gap` or a cache replay separated them. For `Gap`, `from <= to`.
#[derive(Debug, Clone)]
pub enum TailerMessage {
    /// A record delivery
    Deliver {
        /// The record; shared, not copied, across recipients
        record: Arc<LogRecord>,
        /// Sequence number the recipient had reached before this delivery
        prev_seqno: SequenceNumber,
    },
    /// A gap covering `[from, to]` on one topic
    Gap {
        /// Topic the gap applies to
        topic: TopicUuid,
        /// Gap classification
        gap_type: GapType,
        /// First sequence number of the gap (inclusive)
        from: SequenceNumber,
        /// Last sequence number of the gap (inclusive)
        to: SequenceNumber,
    },
}

impl TailerMessage {
    /// The topic this message concerns
    #[inline]
    #[must_use]
    pub fn topic(&self) -> &TopicUuid {
        match self {
            TailerMessage::Deliver { record, .. } => record.topic(),
            TailerMessage::Gap { topic, .. } => topic,
        }
    }
}

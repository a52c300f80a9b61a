//! Identifier types
//!
//! Lightweight `Copy` identifiers used throughout the read path.
//! Designed to fit in a register and hash cheaply.

use std::fmt;

/// Sequence number within a log.
///
/// Monotonically increasing per log. `0` is a reserved sentinel meaning
/// "tail / no estimate" and never names a real record.
pub type SequenceNumber = u64;

/// Log identifier
///
/// Identifies one append-only log in the shared log space. Topics are
/// deterministically routed onto logs within a configured range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogId(u64);

impl LogId {
    /// Create a new log ID
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the numeric value of this log ID
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "log:{}", self.0)
    }
}

impl From<u64> for LogId {
    #[inline]
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<LogId> for u64 {
    #[inline]
    fn from(id: LogId) -> Self {
        id.0
    }
}

/// Reader identifier on the log store
///
/// A unit of read parallelism. Physical readers consume bandwidth from the
/// store; each one is owned exclusively by one `LogReader` for its lifetime.
/// Id `0` is reserved for the virtual reader, which holds subscription state
/// with no store-side resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReaderId(u64);

impl ReaderId {
    /// The virtual reader id - no underlying store reader
    pub const VIRTUAL: ReaderId = ReaderId(0);

    /// Create a new reader ID
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the numeric value of this reader ID
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reader:{}", self.0)
    }
}

impl From<u64> for ReaderId {
    #[inline]
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Stream identifier
///
/// Opaque identifier of a client transport. Globally unique per live
/// connection; all subscriptions on a lost stream are torn down together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    /// Create a new stream ID
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the numeric value of this stream ID
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream:{}", self.0)
    }
}

impl From<u64> for StreamId {
    #[inline]
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Per-stream subscription handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Create a new subscription ID
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the numeric value of this subscription ID
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub:{}", self.0)
    }
}

impl From<u64> for SubscriptionId {
    #[inline]
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Fully-qualified subscriber address: one subscription on one stream
///
/// This is the recipient identity stamped on every outgoing `Deliver` and
/// `Gap` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CopilotSub {
    /// The owning client transport
    pub stream_id: StreamId,
    /// The subscription handle within that stream
    pub sub_id: SubscriptionId,
}

impl CopilotSub {
    /// Create a new subscriber address
    #[inline]
    #[must_use]
    pub const fn new(stream_id: StreamId, sub_id: SubscriptionId) -> Self {
        Self { stream_id, sub_id }
    }
}

impl fmt::Display for CopilotSub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stream_id, self.sub_id)
    }
}

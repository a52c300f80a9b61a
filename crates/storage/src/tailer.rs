//! Log tailer contract
//!
//! `LogTailer` is the seam between the read path and the physical log store.
//! The production implementation wraps the external store's client; tests use
//! [`crate::MemoryTailer`]. The read path holds the tailer as
//! `Arc<dyn LogTailer>` and owns nothing of its internals.

use std::sync::Arc;

use skyway_protocol::{GapType, LogId, LogRecord, ReaderId, SequenceNumber};

use crate::error::Result;

/// Callback receiving a record on a storage worker thread.
///
/// Returning [`crate::StorageError::NoBuffer`] tells the store the record was
/// not accepted; the store must keep its cursor on this record and redeliver.
/// The `Arc` stays with the caller, so nothing is lost on rejection.
pub type RecordCallback =
    dyn Fn(Arc<LogRecord>, LogId, ReaderId) -> Result<()> + Send + Sync + 'static;

/// Callback receiving a gap `[from, to]` on a storage worker thread.
///
/// Same rejection contract as [`RecordCallback`].
pub type GapCallback =
    dyn Fn(LogId, ReaderId, GapType, SequenceNumber, SequenceNumber) -> Result<()>
        + Send
        + Sync
        + 'static;

/// One-shot callback for [`LogTailer::find_latest_seqno`].
///
/// Invoked on a storage worker thread with the sequence number the next
/// appended record would receive.
pub type SeqnoCallback = Box<dyn FnOnce(Result<SequenceNumber>) + Send + 'static>;

/// Delivery callbacks wired into a tailer before reading starts
pub struct Delivery {
    /// Invoked per record, in sequence order per (log, reader)
    pub on_record: Box<RecordCallback>,
    /// Invoked per gap, in sequence order per (log, reader)
    pub on_gap: Box<GapCallback>,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery").finish_non_exhaustive()
    }
}

/// Interface to the external log store
///
/// # Ordering
///
/// For one `(log_id, reader_id)` pair the store delivers records and gaps in
/// strictly ascending, dense sequence order starting at the opened seqno.
/// Distinct readers (and distinct logs) have no ordering relationship.
pub trait LogTailer: Send + Sync {
    /// Begin (or rewind) reading `log_id` from `seqno` under `reader_id`.
    ///
    /// `first_open` is false when the call rewinds a reader that is already
    /// open on this log. A failed open leaves the reader's previous state
    /// untouched.
    fn start_reading(
        &self,
        log_id: LogId,
        seqno: SequenceNumber,
        reader_id: ReaderId,
        first_open: bool,
    ) -> Result<()>;

    /// Release `reader_id` on `log_id`.
    fn stop_reading(&self, log_id: LogId, reader_id: ReaderId) -> Result<()>;

    /// Asynchronously look up the sequence number the next record appended to
    /// `log_id` would receive. The callback runs on a storage worker thread
    /// and must re-enter the room through its queue.
    fn find_latest_seqno(&self, log_id: LogId, callback: SeqnoCallback) -> Result<()>;

    /// True if readers may be opened past the current end of a log.
    ///
    /// When false, callers subscribe from `seqno - 1` so the open lands on an
    /// existing position.
    fn can_subscribe_past_end(&self) -> bool;
}

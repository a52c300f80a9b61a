//! Room events and the cross-thread queue
//!
//! The room's event queue is the only way in: storage worker threads push
//! records and gaps with a non-blocking `try_send` (full queue → `NoBuffer`,
//! payload handed back for retry), while control operations use the async
//! `send` and wait for capacity instead of dropping.
//!
//! # Design
//!
//! Events are a concrete enum rather than boxed closures: the hot path
//! allocates nothing beyond the `Arc` clone it already holds, and the room
//! loop stays a plain `match`.

use std::sync::Arc;

use crossfire::{MAsyncTx, TrySendError};
use skyway_protocol::{
    CopilotSub, GapType, LogId, LogRecord, ReaderId, SequenceNumber, StreamId, TopicUuid,
};
use tokio::sync::oneshot;

use crate::error::{Result, TowerError};
use crate::metrics::TailerMetrics;

/// Admin request answered with a human-readable string
#[derive(Debug)]
pub enum InspectRequest {
    /// Per-log state: tail estimate plus each reader's position
    LogInfo(LogId),
    /// Same, across every log the room knows about
    AllLogsInfo,
    /// Current record cache usage in bytes
    CacheUsage,
    /// Record cache capacity in bytes
    CacheCapacity,
    /// Drop every cached record
    ClearCache,
    /// Resize the record cache
    SetCacheCapacity(usize),
}

/// One unit of work for a room
#[derive(Debug)]
pub enum RoomEvent {
    /// A record from the log store (storage thread, `try_send`)
    Record {
        record: Arc<LogRecord>,
        log_id: LogId,
        reader_id: ReaderId,
    },
    /// A gap from the log store (storage thread, `try_send`)
    Gap {
        log_id: LogId,
        reader_id: ReaderId,
        gap_type: GapType,
        from: SequenceNumber,
        to: SequenceNumber,
    },
    /// Resolved tail seqno for a pending `start == 0` subscription
    /// (storage thread, `try_send`)
    TailSeqno {
        topic: TopicUuid,
        id: CopilotSub,
        log_id: LogId,
        seqno: SequenceNumber,
    },
    /// Subscribe `id` to `topic` from `start` (0 = tail)
    Subscribe {
        topic: TopicUuid,
        start: SequenceNumber,
        id: CopilotSub,
    },
    /// Drop one subscription by handle
    Unsubscribe { id: CopilotSub },
    /// Drop every subscription on a lost stream
    UnsubscribeStream { stream_id: StreamId },
    /// Read the cached tail estimate for a log (0 = unknown)
    TailEstimate {
        log_id: LogId,
        reply: oneshot::Sender<SequenceNumber>,
    },
    /// Admin request/reply
    Inspect {
        request: InspectRequest,
        reply: oneshot::Sender<String>,
    },
}

/// Handle for pushing events into one room
///
/// Cloneable and thread-safe; the storage layer holds one per room it feeds.
#[derive(Clone)]
pub struct RoomHandle {
    room: usize,
    tx: MAsyncTx<RoomEvent>,
    metrics: Arc<TailerMetrics>,
}

impl RoomHandle {
    pub(crate) fn new(room: usize, tx: MAsyncTx<RoomEvent>, metrics: Arc<TailerMetrics>) -> Self {
        Self { room, tx, metrics }
    }

    /// Index of the room this handle feeds
    #[inline]
    #[must_use]
    pub fn room(&self) -> usize {
        self.room
    }

    /// Metrics of the room's tailer
    #[inline]
    #[must_use]
    pub fn metrics(&self) -> &Arc<TailerMetrics> {
        &self.metrics
    }

    /// Push a record from a storage thread. Non-blocking.
    ///
    /// # Errors
    ///
    /// `NoBuffer` when the room queue is full; the caller keeps its `Arc`
    /// and retries. `RoomClosed` when the room task is gone.
    pub fn send_log_record(
        &self,
        record: Arc<LogRecord>,
        log_id: LogId,
        reader_id: ReaderId,
    ) -> Result<()> {
        self.forward(RoomEvent::Record {
            record,
            log_id,
            reader_id,
        })
    }

    /// Push a gap from a storage thread. Non-blocking, same contract as
    /// [`Self::send_log_record`].
    pub fn send_gap_record(
        &self,
        log_id: LogId,
        reader_id: ReaderId,
        gap_type: GapType,
        from: SequenceNumber,
        to: SequenceNumber,
    ) -> Result<()> {
        self.forward(RoomEvent::Gap {
            log_id,
            reader_id,
            gap_type,
            from,
            to,
        })
    }

    /// Non-blocking push, from any thread.
    pub fn forward(&self, event: RoomEvent) -> Result<()> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.metrics.forward_rejection();
                Err(TowerError::NoBuffer)
            }
            Err(TrySendError::Disconnected(_)) => Err(TowerError::RoomClosed),
        }
    }

    /// Waiting push, for control operations.
    ///
    /// # Errors
    ///
    /// `RoomClosed` when the room task is gone.
    pub async fn send(&self, event: RoomEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| TowerError::RoomClosed)
    }
}

impl std::fmt::Debug for RoomHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomHandle").field("room", &self.room).finish()
    }
}

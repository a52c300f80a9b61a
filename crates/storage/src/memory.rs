//! In-memory log tailer
//!
//! A `LogTailer` over process-local logs, used by tests and local
//! development. Appends deliver synchronously on the calling thread, which
//! stands in for a storage worker thread: deterministic for tests, and it
//! exercises the same `NoBuffer` retry contract as a real store.
//!
//! Delivery callbacks are invoked while the tailer's lock is held; they must
//! not call back into the tailer.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::OnceLock;

use parking_lot::Mutex;
use skyway_protocol::{Bytes, GapType, LogId, LogRecord, ReaderId, SequenceNumber, TopicUuid};
use tracing::{debug, warn};

use crate::error::{Result, StorageError};
use crate::tailer::{Delivery, LogTailer, SeqnoCallback};

/// One entry in a log: a record, or a gap span keyed at its first seqno
#[derive(Debug, Clone)]
enum Entry {
    Record(Arc<LogRecord>),
    Gap {
        gap_type: GapType,
        to: SequenceNumber,
    },
}

#[derive(Debug)]
struct MemoryLog {
    entries: BTreeMap<SequenceNumber, Entry>,
    /// Seqno the next appended record will receive; logs start at 1
    next_seqno: SequenceNumber,
}

impl MemoryLog {
    fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_seqno: 1,
        }
    }
}

/// A recorded open/stop call, for test assertions on reader lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailerOp {
    /// `start_reading` was called
    Open {
        log_id: LogId,
        seqno: SequenceNumber,
        reader_id: ReaderId,
        first_open: bool,
    },
    /// `stop_reading` was called
    Stop { log_id: LogId, reader_id: ReaderId },
}

#[derive(Debug, Default)]
struct Inner {
    logs: HashMap<LogId, MemoryLog>,
    /// Next seqno to deliver, per open (log, reader)
    cursors: HashMap<(LogId, ReaderId), SequenceNumber>,
    operations: Vec<TailerOp>,
}

/// In-memory `LogTailer` implementation
///
/// # Example
///
/// ```ignore
/// let tailer = Arc::new(MemoryTailer::new());
/// tailer.initialize(Delivery { on_record, on_gap });
///
/// tailer.append(LogId::new(1), TopicUuid::new("ns", "t"), payload);
/// ```
pub struct MemoryTailer {
    inner: Mutex<Inner>,
    delivery: OnceLock<Delivery>,
}

impl MemoryTailer {
    /// Create an empty tailer with no logs and no open readers
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            delivery: OnceLock::new(),
        }
    }

    /// Wire the delivery callbacks. Must be called once before any reader is
    /// opened; later calls are ignored.
    pub fn initialize(&self, delivery: Delivery) {
        if self.delivery.set(delivery).is_err() {
            warn!("memory tailer already initialized, ignoring");
        }
    }

    /// Append a record to a log, then push it to every open reader whose
    /// cursor has reached it.
    ///
    /// Returns the sequence number assigned to the record.
    pub fn append(&self, log_id: LogId, topic: TopicUuid, payload: Bytes) -> SequenceNumber {
        let mut inner = self.inner.lock();
        let log = inner.logs.entry(log_id).or_insert_with(MemoryLog::new);
        let seqno = log.next_seqno;
        log.next_seqno = seqno + 1;
        log.entries
            .insert(seqno, Entry::Record(Arc::new(LogRecord::new(topic, seqno, payload))));

        self.pump_log(&mut inner, log_id);
        seqno
    }

    /// Append a gap spanning `len` sequence numbers, then push it to every
    /// open reader whose cursor has reached it.
    ///
    /// Returns the `(from, to)` range the gap occupies.
    pub fn append_gap(
        &self,
        log_id: LogId,
        gap_type: GapType,
        len: u64,
    ) -> (SequenceNumber, SequenceNumber) {
        assert!(len > 0, "gap must span at least one seqno");
        let mut inner = self.inner.lock();
        let log = inner.logs.entry(log_id).or_insert_with(MemoryLog::new);
        let from = log.next_seqno;
        let to = from + len - 1;
        log.next_seqno = to + 1;
        log.entries.insert(from, Entry::Gap { gap_type, to });

        self.pump_log(&mut inner, log_id);
        (from, to)
    }

    /// Retry delivery for every open reader.
    ///
    /// Call after the downstream queue has drained following a `NoBuffer`
    /// rejection.
    pub fn pump(&self) {
        let mut inner = self.inner.lock();
        let logs: Vec<LogId> = inner.cursors.keys().map(|(log_id, _)| *log_id).collect();
        for log_id in logs {
            self.pump_log(&mut inner, log_id);
        }
    }

    /// True if `reader_id` currently has `log_id` open
    #[must_use]
    pub fn is_open(&self, log_id: LogId, reader_id: ReaderId) -> bool {
        self.inner.lock().cursors.contains_key(&(log_id, reader_id))
    }

    /// Readers currently open on `log_id`
    #[must_use]
    pub fn open_readers(&self, log_id: LogId) -> Vec<ReaderId> {
        let inner = self.inner.lock();
        let mut readers: Vec<ReaderId> = inner
            .cursors
            .keys()
            .filter(|(l, _)| *l == log_id)
            .map(|(_, r)| *r)
            .collect();
        readers.sort();
        readers
    }

    /// History of open/stop calls, oldest first
    #[must_use]
    pub fn operations(&self) -> Vec<TailerOp> {
        self.inner.lock().operations.clone()
    }

    /// Deliver everything possible to every reader open on `log_id`.
    fn pump_log(&self, inner: &mut Inner, log_id: LogId) {
        let Some(delivery) = self.delivery.get() else {
            return;
        };

        let readers: Vec<ReaderId> = inner
            .cursors
            .keys()
            .filter(|(l, _)| *l == log_id)
            .map(|(_, r)| *r)
            .collect();

        for reader_id in readers {
            Self::pump_reader(inner, delivery, log_id, reader_id);
        }
    }

    /// Advance one reader's cursor, invoking callbacks until it hits the end
    /// of the log or a `NoBuffer` rejection.
    fn pump_reader(inner: &mut Inner, delivery: &Delivery, log_id: LogId, reader_id: ReaderId) {
        loop {
            let cursor = match inner.cursors.get(&(log_id, reader_id)) {
                Some(&c) => c,
                None => return,
            };
            let Some(log) = inner.logs.get(&log_id) else {
                return;
            };

            // The entry covering `cursor`: either exactly at it, or a gap
            // span that started earlier and reaches it.
            let covering = log
                .entries
                .range(..=cursor)
                .next_back()
                .and_then(|(_, entry)| match entry {
                    Entry::Record(record) if record.seqno() == cursor => {
                        Some(Entry::Record(Arc::clone(record)))
                    }
                    Entry::Gap { gap_type, to } if *to >= cursor => Some(Entry::Gap {
                        gap_type: *gap_type,
                        to: *to,
                    }),
                    _ => None,
                });

            let advanced = match covering {
                Some(Entry::Record(record)) => {
                    match (delivery.on_record)(record, log_id, reader_id) {
                        Ok(()) => Some(cursor + 1),
                        Err(err) => {
                            if !err.is_retryable() {
                                warn!(%log_id, %reader_id, error = %err, "record delivery failed");
                            }
                            None
                        }
                    }
                }
                Some(Entry::Gap { gap_type, to }) => {
                    match (delivery.on_gap)(log_id, reader_id, gap_type, cursor, to) {
                        Ok(()) => Some(to + 1),
                        Err(err) => {
                            if !err.is_retryable() {
                                warn!(%log_id, %reader_id, error = %err, "gap delivery failed");
                            }
                            None
                        }
                    }
                }
                None => return, // caught up
            };

            match advanced {
                Some(next) => {
                    inner.cursors.insert((log_id, reader_id), next);
                }
                None => return, // downstream full; cursor unchanged, retried on next pump
            }
        }
    }
}

impl Default for MemoryTailer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogTailer for MemoryTailer {
    fn start_reading(
        &self,
        log_id: LogId,
        seqno: SequenceNumber,
        reader_id: ReaderId,
        first_open: bool,
    ) -> Result<()> {
        if self.delivery.get().is_none() {
            return Err(StorageError::NotInitialized);
        }

        let mut inner = self.inner.lock();
        let open = inner.cursors.contains_key(&(log_id, reader_id));
        if !first_open && !open {
            return Err(StorageError::not_open(log_id, reader_id));
        }
        if first_open && open {
            warn!(%log_id, %reader_id, "reopening an already-open reader");
        }

        debug!(%log_id, %reader_id, seqno, first_open, "reader opened");
        inner.logs.entry(log_id).or_insert_with(MemoryLog::new);
        inner.cursors.insert((log_id, reader_id), seqno);
        inner.operations.push(TailerOp::Open {
            log_id,
            seqno,
            reader_id,
            first_open,
        });

        self.pump_log(&mut inner, log_id);
        Ok(())
    }

    fn stop_reading(&self, log_id: LogId, reader_id: ReaderId) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.cursors.remove(&(log_id, reader_id)).is_none() {
            return Err(StorageError::not_open(log_id, reader_id));
        }
        debug!(%log_id, %reader_id, "reader stopped");
        inner.operations.push(TailerOp::Stop { log_id, reader_id });
        Ok(())
    }

    fn find_latest_seqno(&self, log_id: LogId, callback: SeqnoCallback) -> Result<()> {
        let next_seqno = {
            let inner = self.inner.lock();
            inner
                .logs
                .get(&log_id)
                .map(|log| log.next_seqno)
                .unwrap_or(1)
        };
        // A real store resolves this on a worker thread; inline keeps tests
        // deterministic. The callback re-enters the room via its queue.
        callback(Ok(next_seqno));
        Ok(())
    }

    fn can_subscribe_past_end(&self) -> bool {
        true
    }
}

//! Record cache
//!
//! A bounded-memory, per-log, seqno-ordered cache of recently delivered
//! records. New subscribers replay their backlog from here instead of
//! forcing a physical reader rewind.
//!
//! # Eviction
//!
//! Capacity is counted in payload bytes (0 disables the cache). On overflow
//! the victim is the oldest record of the least-recently-stored log, so a
//! busy log cannot starve quiet logs of their whole window at once.
//!
//! # Ordering
//!
//! Each log's window is kept in strictly ascending seqno order by
//! construction: duplicates and records at or below the window's tail are
//! rejected at `store` time.

use std::collections::VecDeque;
use std::sync::Arc;

use lru::LruCache;
use skyway_protocol::{LogId, LogRecord, SequenceNumber};
use tracing::debug;

/// Seqno-ordered window of cached records for one log
#[derive(Debug, Default)]
struct LogWindow {
    records: VecDeque<Arc<LogRecord>>,
}

impl LogWindow {
    fn tail_seqno(&self) -> Option<SequenceNumber> {
        self.records.back().map(|record| record.seqno())
    }
}

/// Bounded per-log record cache
pub struct DataCache {
    /// Per-log windows; LRU order picks the eviction victim log
    logs: LruCache<LogId, LogWindow>,
    /// Capacity in payload bytes; 0 disables the cache entirely
    capacity: usize,
    /// Current payload bytes held
    usage: usize,
    /// Whether records from reserved `_` namespaces are cached
    cache_system_namespaces: bool,
}

impl DataCache {
    /// Create a cache with the given capacity in payload bytes
    #[must_use]
    pub fn new(capacity: usize, cache_system_namespaces: bool) -> Self {
        Self {
            logs: LruCache::unbounded(),
            capacity,
            usage: 0,
            cache_system_namespaces,
        }
    }

    /// Capacity in payload bytes; 0 means the cache is disabled
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current payload bytes held
    #[inline]
    #[must_use]
    pub fn usage(&self) -> usize {
        self.usage
    }

    /// Resize the cache, evicting down to the new capacity if needed
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.evict_to_capacity();
        if capacity == 0 {
            self.clear();
        }
    }

    /// Drop every cached record
    pub fn clear(&mut self) {
        self.logs.clear();
        self.usage = 0;
    }

    /// Drop the cached window for one log
    pub fn clear_log(&mut self, log_id: LogId) {
        if let Some(window) = self.logs.pop(&log_id) {
            let freed: usize = window.records.iter().map(|r| r.payload_len()).sum();
            self.usage -= freed;
        }
    }

    /// Store a record, evicting the oldest cached data on overflow.
    ///
    /// Duplicates and records at or below the log's cached tail are dropped;
    /// the per-log window stays strictly ascending. Records from reserved
    /// namespaces are skipped unless configured in.
    pub fn store(&mut self, log_id: LogId, record: Arc<LogRecord>) {
        if self.capacity == 0 {
            return;
        }
        if record.topic().is_system() && !self.cache_system_namespaces {
            return;
        }

        let window = self.logs.get_or_insert_mut(log_id, LogWindow::default);
        if let Some(tail) = window.tail_seqno() {
            if record.seqno() <= tail {
                debug!(%log_id, seqno = record.seqno(), tail, "cache rejecting stale record");
                return;
            }
        }

        self.usage += record.payload_len();
        window.records.push_back(record);
        self.evict_to_capacity();
    }

    /// Replay cached records for `log_id` with `seqno >= start`, in order.
    ///
    /// Returns the first seqno *not* covered by the cache: one past the last
    /// record in the log's window, or `start` when nothing was visited.
    pub fn visit(
        &self,
        log_id: LogId,
        start: SequenceNumber,
        mut f: impl FnMut(&Arc<LogRecord>),
    ) -> SequenceNumber {
        let Some(window) = self.logs.peek(&log_id) else {
            return start;
        };

        let mut next_uncovered = start;
        for record in &window.records {
            if record.seqno() < start {
                continue;
            }
            f(record);
            next_uncovered = record.seqno() + 1;
        }
        next_uncovered
    }

    /// Evict oldest records from least-recently-stored logs until usage fits
    fn evict_to_capacity(&mut self) {
        while self.usage > self.capacity {
            let Some((&victim_log, _)) = self.logs.peek_lru() else {
                break;
            };
            let Some(window) = self.logs.peek_mut(&victim_log) else {
                break;
            };
            match window.records.pop_front() {
                Some(record) => {
                    self.usage -= record.payload_len();
                    if window.records.is_empty() {
                        self.logs.pop(&victim_log);
                    }
                }
                None => {
                    self.logs.pop(&victim_log);
                }
            }
        }
    }
}

impl std::fmt::Debug for DataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataCache")
            .field("capacity", &self.capacity)
            .field("usage", &self.usage)
            .field("logs", &self.logs.len())
            .finish()
    }
}

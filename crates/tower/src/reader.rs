//! Log reader state
//!
//! A `LogReader` owns the per-log state behind one store reader id: where
//! reading started, the last seqno traversed, and an ordered map of the
//! topics seen with their next expected seqnos. A *virtual* reader holds the
//! same state with no store-side resource; subscriptions park there when
//! serving them immediately would rewind a live reader.
//!
//! # Ordered topic map
//!
//! The topic map is an `lru::LruCache` used as a linked hash map: the LRU
//! end holds the least-recently-advanced topic. Advancing a topic promotes
//! it, so the LRU end is exactly the set of topics that may need a catch-up
//! gap - lag bumping pops from there and stops at the first topic that is
//! not lagging.

use std::collections::HashMap;
use std::sync::Arc;

use lru::LruCache;
use skyway_protocol::{GapType, LogId, ReaderId, SequenceNumber, TopicUuid};
use skyway_storage::LogTailer;
use tracing::{debug, error, info};

use crate::error::{Result, TowerError};

/// Cost of a subscription that would rewind a live reader: effectively
/// infinite, chosen only when nothing else can serve it.
pub const COST_REWIND: u64 = u64::MAX;

/// Next expected seqno for one topic, as known by one reader
#[derive(Debug, Clone, Copy)]
struct TopicState {
    next_seqno: SequenceNumber,
}

/// Per-log state for one reader
#[derive(Debug)]
struct LogState {
    /// Seqno this reader's history begins at
    start_seqno: SequenceNumber,
    /// Last seqno delivered or traversed; next expected is `last_read + 1`
    last_read: SequenceNumber,
    /// Topics seen, least-recently-advanced at the LRU end
    topics: LruCache<TopicUuid, TopicState>,
}

impl LogState {
    fn new(seqno: SequenceNumber) -> Self {
        Self {
            start_seqno: seqno,
            last_read: seqno.wrapping_sub(1),
            topics: LruCache::unbounded(),
        }
    }
}

/// State for one physical (or virtual) reader of whole logs
pub struct LogReader {
    /// Store handle; `None` makes this a virtual reader
    tailer: Option<Arc<dyn LogTailer>>,
    reader_id: ReaderId,
    max_subscription_lag: u64,
    cost_start: u64,
    log_state: HashMap<LogId, LogState>,
}

impl LogReader {
    /// Create a reader.
    ///
    /// `tailer = None` creates a virtual reader: it tracks topic state and
    /// start seqnos but never touches the store.
    pub fn new(
        tailer: Option<Arc<dyn LogTailer>>,
        reader_id: ReaderId,
        max_subscription_lag: u64,
        cost_start: u64,
    ) -> Self {
        Self {
            tailer,
            reader_id,
            max_subscription_lag,
            cost_start,
            log_state: HashMap::new(),
        }
    }

    /// The reader id this reader holds on the store
    #[inline]
    #[must_use]
    pub fn reader_id(&self) -> ReaderId {
        self.reader_id
    }

    /// True if this reader has no store-side resource
    #[inline]
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.tailer.is_none()
    }

    /// True if this reader currently has `log_id` open
    #[inline]
    #[must_use]
    pub fn is_log_open(&self, log_id: LogId) -> bool {
        self.log_state.contains_key(&log_id)
    }

    /// Number of topics tracked on `log_id`
    #[must_use]
    pub fn num_topics(&self, log_id: LogId) -> usize {
        self.log_state.get(&log_id).map_or(0, |s| s.topics.len())
    }

    /// Update state for a delivered record.
    ///
    /// Returns the previous next-expected seqno for the record's topic, or
    /// `0` if this is the first record seen on the topic.
    ///
    /// # Errors
    ///
    /// `NotFound` if the log is not open on this reader or the record is out
    /// of order (`seqno != last_read + 1`); the caller drops the record.
    pub fn process_record(
        &mut self,
        log_id: LogId,
        seqno: SequenceNumber,
        topic: &TopicUuid,
    ) -> Result<SequenceNumber> {
        let Some(state) = self.log_state.get_mut(&log_id) else {
            debug!(reader_id = %self.reader_id, %log_id, %topic, "record for unopened log");
            return Err(TowerError::NotFound);
        };
        if seqno != state.last_read + 1 {
            debug!(
                reader_id = %self.reader_id,
                %log_id,
                %topic,
                expected = state.last_read + 1,
                received = seqno,
                "record out of order"
            );
            return Err(TowerError::NotFound);
        }
        state.last_read = seqno;

        // get_mut promotes the topic to most-recently-advanced
        match state.topics.get_mut(topic) {
            Some(topic_state) => {
                let prev_seqno = topic_state.next_seqno;
                topic_state.next_seqno = seqno + 1;
                Ok(prev_seqno)
            }
            None => Ok(0),
        }
    }

    /// Check that a gap starting at `from` is in order for `log_id`.
    ///
    /// # Errors
    ///
    /// `NotFound` under the same conditions as [`Self::process_record`].
    pub fn validate_gap(&self, log_id: LogId, from: SequenceNumber) -> Result<()> {
        let Some(state) = self.log_state.get(&log_id) else {
            debug!(reader_id = %self.reader_id, %log_id, "gap on unopened log");
            return Err(TowerError::NotFound);
        };
        if from != state.last_read + 1 {
            debug!(
                reader_id = %self.reader_id,
                %log_id,
                expected = state.last_read + 1,
                received = from,
                "gap out of order"
            );
            return Err(TowerError::NotFound);
        }
        Ok(())
    }

    /// Update one topic's state for a gap `[from, to]`.
    ///
    /// Pre-condition: `validate_gap(log_id, from)` succeeded. Returns the
    /// topic's previous next-expected seqno, or `0` if this reader was not
    /// tracking the topic.
    pub fn process_gap(
        &mut self,
        log_id: LogId,
        topic: &TopicUuid,
        _gap_type: GapType,
        from: SequenceNumber,
        to: SequenceNumber,
    ) -> SequenceNumber {
        let Some(state) = self.log_state.get_mut(&log_id) else {
            debug_assert!(false, "gap processed without validation");
            return 0;
        };
        debug_assert_eq!(from, state.last_read + 1, "gap processed without validation");

        match state.topics.get_mut(topic) {
            Some(topic_state) => {
                let prev_seqno = topic_state.next_seqno;
                debug_assert_ne!(prev_seqno, 0);
                topic_state.next_seqno = to + 1;
                prev_seqno
            }
            None => 0,
        }
    }

    /// Advance reader-level state past a benign gap.
    ///
    /// Called after per-topic fan-out; the next expected seqno becomes
    /// `to + 1`.
    pub fn process_benign_gap(&mut self, log_id: LogId, _from: SequenceNumber, to: SequenceNumber) {
        if let Some(state) = self.log_state.get_mut(&log_id) {
            state.last_read = to;
        }
    }

    /// Discard topic history after a malignant gap.
    ///
    /// Sets `start_seqno = seqno`, `last_read = seqno - 1`, and clears the
    /// per-topic map: nothing this reader claimed to know before the gap
    /// survives it.
    pub fn flush_history(&mut self, log_id: LogId, seqno: SequenceNumber) {
        if let Some(state) = self.log_state.get_mut(&log_id) {
            state.start_seqno = seqno;
            state.last_read = seqno - 1;
            state.topics.clear();
        }
    }

    /// Register a new subscription on `topic` at `seqno`, opening or
    /// rewinding the store reader as needed.
    ///
    /// The store is only touched when this reader has not yet reached
    /// `seqno`; a subscription behind `last_read` on an already-known topic
    /// pointer never reseeks by itself.
    ///
    /// # Errors
    ///
    /// Storage failures from the open are returned; on a failed first open
    /// the log state is rolled back, on a failed rewind the previous
    /// position is kept.
    pub fn start_reading(
        &mut self,
        topic: &TopicUuid,
        log_id: LogId,
        seqno: SequenceNumber,
    ) -> Result<()> {
        let is_virtual = self.is_virtual();
        let first_open = !self.log_state.contains_key(&log_id);
        let state = self
            .log_state
            .entry(log_id)
            .or_insert_with(|| LogState::new(seqno));

        let mut reseek = match state.topics.peek_mut(topic) {
            Some(topic_state) => {
                let lower = seqno < topic_state.next_seqno;
                topic_state.next_seqno = topic_state.next_seqno.min(seqno);
                lower
            }
            None => {
                state.topics.put(topic.clone(), TopicState { next_seqno: seqno });
                true
            }
        };
        // Oldest-touched position: a fresh subscription is the first
        // candidate for lag bumping
        state.topics.demote(topic);

        let resume_from = state.last_read + 1;
        if !first_open && reseek {
            // No need to reseek if we are yet to reach that seqno
            reseek = seqno <= state.last_read;
        }

        if reseek {
            if first_open {
                info!(
                    is_virtual,
                    reader_id = %self.reader_id,
                    %log_id,
                    seqno,
                    %topic,
                    "reader now reading log"
                );
            } else {
                info!(
                    is_virtual,
                    reader_id = %self.reader_id,
                    %log_id,
                    from = resume_from,
                    to = seqno,
                    %topic,
                    "reader rewinding log"
                );
            }

            if let Some(tailer) = &self.tailer {
                if let Err(err) = tailer.start_reading(log_id, seqno, self.reader_id, first_open) {
                    error!(
                        reader_id = %self.reader_id,
                        %log_id,
                        seqno,
                        error = %err,
                        "failed to start reading"
                    );
                    if first_open {
                        self.log_state.remove(&log_id);
                    }
                    return Err(err.into());
                }
            }
            if let Some(state) = self.log_state.get_mut(&log_id) {
                state.start_seqno = state.start_seqno.min(seqno);
                state.last_read = seqno.wrapping_sub(1);
            }
        }
        Ok(())
    }

    /// Forget a topic; when it was the last topic on the log, release the
    /// store reader and drop the log state.
    ///
    /// # Errors
    ///
    /// Storage failures from the release are returned; the log state is kept
    /// so a retry can release it again.
    pub fn stop_reading(&mut self, topic: &TopicUuid, log_id: LogId) -> Result<()> {
        let is_virtual = self.is_virtual();
        let Some(state) = self.log_state.get_mut(&log_id) else {
            return Ok(());
        };
        if state.topics.pop(topic).is_none() {
            return Ok(());
        }
        info!(
            is_virtual,
            reader_id = %self.reader_id,
            %log_id,
            %topic,
            "no more subscribers on topic"
        );

        if state.topics.is_empty() {
            if let Some(tailer) = &self.tailer {
                if let Err(err) = tailer.stop_reading(log_id, self.reader_id) {
                    error!(
                        reader_id = %self.reader_id,
                        %log_id,
                        error = %err,
                        "failed to stop reading"
                    );
                    return Err(err.into());
                }
            }
            info!(
                is_virtual,
                reader_id = %self.reader_id,
                %log_id,
                "no more subscribers on log"
            );
            self.log_state.remove(&log_id);
        }
        Ok(())
    }

    /// Bump topics whose next expected seqno has fallen more than
    /// `max_subscription_lag` behind `seqno`.
    ///
    /// `on_bump(topic, last_known)` fires per bumped topic; the topic then
    /// jumps to `seqno + 1` and moves to the most-recently-advanced end.
    /// Stops at the first non-lagging topic, so the cost is O(bumped).
    pub fn bump_lagging_subscriptions(
        &mut self,
        log_id: LogId,
        seqno: SequenceNumber,
        mut on_bump: impl FnMut(&TopicUuid, SequenceNumber),
    ) {
        let Some(state) = self.log_state.get_mut(&log_id) else {
            return;
        };
        while let Some((topic, topic_state)) = state.topics.peek_lru() {
            let last_known = topic_state.next_seqno;
            if last_known.saturating_add(self.max_subscription_lag) >= seqno {
                break;
            }
            let topic = topic.clone();
            debug!(
                %topic,
                from = last_known,
                to = seqno,
                %log_id,
                "bumping lagging topic"
            );
            on_bump(&topic, last_known);
            // get_mut promotes to the most-recently-advanced end
            if let Some(topic_state) = state.topics.get_mut(&topic) {
                topic_state.next_seqno = seqno + 1;
            }
        }
    }

    /// Cost of taking a new subscription on `(topic, log_id)` at `seqno`;
    /// lower is better.
    ///
    /// Open and behind: the distance left to travel. Open and already past:
    /// free when the topic pointer covers `seqno`, [`COST_REWIND`] when it
    /// does not. Not open: a flat start penalty, so a reader slightly behind
    /// beats opening a fresh store reader.
    #[must_use]
    pub fn subscription_cost(&self, topic: &TopicUuid, log_id: LogId, seqno: SequenceNumber) -> u64 {
        let Some(state) = self.log_state.get(&log_id) else {
            return self.cost_start;
        };
        if state.last_read < seqno {
            return seqno - state.last_read;
        }
        match state.topics.peek(topic) {
            None => COST_REWIND,
            Some(topic_state) if seqno < topic_state.next_seqno => COST_REWIND,
            Some(_) => 0,
        }
    }

    /// True if `other` can subsume this reader's subscriptions on `log_id`:
    /// both physical, both open on the log, identical positions.
    #[must_use]
    pub fn can_merge_into(&self, other: &LogReader, log_id: LogId) -> bool {
        debug_assert!(!self.is_virtual() && !other.is_virtual());
        let (Some(src), Some(dest)) = (self.log_state.get(&log_id), other.log_state.get(&log_id))
        else {
            return false;
        };
        src.last_read == dest.last_read
    }

    /// Merge this reader's subscriptions on `log_id` into `dest` and release
    /// our store reader on the log.
    ///
    /// Pre-condition: `can_merge_into(dest, log_id)`. Topic pointers merge
    /// by minimum, so no subscriber's coverage shrinks.
    pub fn merge_into(&mut self, dest: &mut LogReader, log_id: LogId) {
        debug_assert!(self.can_merge_into(dest, log_id));
        let Some(src_state) = self.log_state.remove(&log_id) else {
            return;
        };
        let Some(dest_state) = dest.log_state.get_mut(&log_id) else {
            return;
        };
        debug_assert_eq!(src_state.last_read, dest_state.last_read);

        info!(
            src = %self.reader_id,
            dest = %dest.reader_id,
            %log_id,
            at = src_state.last_read,
            "merging readers"
        );

        for (topic, src_topic) in src_state.topics.iter() {
            match dest_state.topics.peek_mut(topic) {
                Some(dest_topic) => {
                    dest_topic.next_seqno = dest_topic.next_seqno.min(src_topic.next_seqno);
                }
                None => {
                    dest_state.topics.put(topic.clone(), *src_topic);
                }
            }
        }

        if let Some(tailer) = &self.tailer {
            match tailer.stop_reading(log_id, self.reader_id) {
                Ok(()) => info!(reader_id = %self.reader_id, %log_id, "reader stopped after merge"),
                Err(err) => error!(
                    reader_id = %self.reader_id,
                    %log_id,
                    error = %err,
                    "failed to stop reader after merge"
                ),
            }
        }
    }

    /// Take over the virtual reader's parked subscriptions on `log_id`,
    /// opening the log at their recorded start seqno.
    ///
    /// # Errors
    ///
    /// A failed open leaves the parked state with the virtual reader.
    pub fn steal_log_subscriptions(&mut self, from: &mut LogReader, log_id: LogId) -> Result<()> {
        debug_assert!(from.is_virtual() && !self.is_virtual());
        debug_assert!(from.is_log_open(log_id) && !self.is_log_open(log_id));

        let Some(start_seqno) = from.log_state.get(&log_id).map(|s| s.start_seqno) else {
            return Ok(());
        };
        let tailer = self.tailer.as_ref().ok_or(TowerError::NotInitialized)?;
        if let Err(err) = tailer.start_reading(log_id, start_seqno, self.reader_id, true) {
            error!(
                reader_id = %self.reader_id,
                %log_id,
                seqno = start_seqno,
                error = %err,
                "failed to adopt parked subscriptions"
            );
            return Err(err.into());
        }
        if let Some(state) = from.log_state.remove(&log_id) {
            debug_assert!(!state.topics.is_empty());
            info!(
                reader_id = %self.reader_id,
                %log_id,
                seqno = start_seqno,
                topics = state.topics.len(),
                "adopted parked subscriptions"
            );
            self.log_state.insert(log_id, state);
        }
        Ok(())
    }

    /// Human-readable reader state for one log
    #[must_use]
    pub fn log_info(&self, log_id: LogId) -> String {
        let log = log_id.value();
        let reader = self.reader_id.value();
        match self.log_state.get(&log_id) {
            Some(state) => format!(
                "Log({log}).reader[{reader}].start_seqno: {}\n\
                 Log({log}).reader[{reader}].last_read: {}\n\
                 Log({log}).reader[{reader}].num_topics_subscribed: {}\n",
                state.start_seqno,
                state.last_read,
                state.topics.len()
            ),
            None => format!("Log({log}).reader[{reader}] not currently reading\n"),
        }
    }

    /// Human-readable reader state across all open logs
    #[must_use]
    pub fn all_logs_info(&self) -> String {
        let mut result = String::new();
        for log_id in self.log_state.keys() {
            result.push_str(&self.log_info(*log_id));
        }
        result
    }
}

impl std::fmt::Debug for LogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogReader")
            .field("reader_id", &self.reader_id)
            .field("virtual", &self.is_virtual())
            .field("open_logs", &self.log_state.len())
            .finish()
    }
}

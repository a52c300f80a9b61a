//! Topic tailer
//!
//! Turns a bounded pool of whole-log readers into per-topic subscription
//! streams: routes new subscriptions to the cheapest reader, fans records
//! and gaps out to subscribers with tight `(prev, cur)` stamps, bumps
//! subscriptions that fall too far behind, and merges readers that catch up
//! with each other so parked subscriptions can take over the freed reader.
//!
//! All state in this type belongs to one room and is only touched from the
//! room's task; the thread-safe surface is [`crate::RoomHandle`].

use std::collections::HashMap;
use std::sync::Arc;

use skyway_protocol::{
    CopilotSub, GapType, LogId, LogRecord, ReaderId, SequenceNumber, StreamId, TailerMessage,
    TopicUuid,
};
use skyway_routing::LogRouter;
use skyway_storage::{LogTailer, SeqnoCallback};
use tracing::{debug, info, warn};

use crate::cache::DataCache;
use crate::error::{Result, TowerError};
use crate::events::{InspectRequest, RoomEvent, RoomHandle};
use crate::metrics::TailerMetrics;
use crate::reader::{LogReader, COST_REWIND};
use crate::subscriptions::StreamSubscriptions;
use crate::topic::TopicManager;

/// Callback delivering an outgoing message to a set of subscribers.
///
/// Invoked on the room task; implementations forward to the subscription
/// frontend and must not block.
pub type MessageCallback = Arc<dyn Fn(TailerMessage, &[CopilotSub]) + Send + Sync>;

/// Where a new subscription lands
enum ReaderChoice {
    /// A physical reader, by index
    Physical(usize),
    /// The virtual reader: parked until a merge frees a physical reader
    Pending,
}

/// Per-room topic tailer
pub struct TopicTailer {
    room: usize,
    log_tailer: Arc<dyn LogTailer>,
    router: LogRouter,
    on_message: MessageCallback,
    /// Handle onto our own event queue, for storage-thread callbacks
    forward: RoomHandle,
    metrics: Arc<TailerMetrics>,
    cost_start: u64,
    max_subscription_lag: u64,

    /// Physical readers; empty until `initialize`
    log_readers: Vec<LogReader>,
    /// The virtual reader holding parked subscriptions
    pending_reader: LogReader,
    /// Subscription state per log
    topic_map: HashMap<LogId, TopicManager>,
    /// Lower-bound tail estimates; absent or 0 = unknown
    tail_seqno_cached: HashMap<LogId, SequenceNumber>,
    data_cache: DataCache,
    stream_subscriptions: StreamSubscriptions,
}

impl TopicTailer {
    /// Create a tailer for one room.
    ///
    /// The tailer is inert until [`Self::initialize`] constructs its
    /// readers.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        room: usize,
        log_tailer: Arc<dyn LogTailer>,
        router: LogRouter,
        cache_size: usize,
        cache_system_namespaces: bool,
        cost_start: u64,
        on_message: MessageCallback,
        forward: RoomHandle,
    ) -> Self {
        let metrics = Arc::clone(forward.metrics());
        Self {
            room,
            log_tailer,
            router,
            on_message,
            forward,
            metrics,
            cost_start,
            max_subscription_lag: 0,
            log_readers: Vec::new(),
            pending_reader: LogReader::new(None, ReaderId::VIRTUAL, 0, cost_start),
            topic_map: HashMap::new(),
            tail_seqno_cached: HashMap::new(),
            data_cache: DataCache::new(cache_size, cache_system_namespaces),
            stream_subscriptions: StreamSubscriptions::new(),
        }
    }

    /// Construct one physical reader per id, plus the virtual reader.
    pub fn initialize(&mut self, reader_ids: &[ReaderId], max_subscription_lag: u64) {
        self.max_subscription_lag = max_subscription_lag;
        self.log_readers = reader_ids
            .iter()
            .map(|&reader_id| {
                LogReader::new(
                    Some(Arc::clone(&self.log_tailer)),
                    reader_id,
                    max_subscription_lag,
                    self.cost_start,
                )
            })
            .collect();
        self.pending_reader =
            LogReader::new(None, ReaderId::VIRTUAL, max_subscription_lag, self.cost_start);
    }

    /// Room index this tailer serves
    #[inline]
    #[must_use]
    pub fn room(&self) -> usize {
        self.room
    }

    /// This room's metrics
    #[inline]
    #[must_use]
    pub fn metrics(&self) -> &Arc<TailerMetrics> {
        &self.metrics
    }

    /// Hand a message to the subscription frontend.
    fn emit(&self, message: TailerMessage, recipients: &[CopilotSub]) {
        (self.on_message.as_ref())(message, recipients);
    }

    /// Process one event from the room queue.
    pub fn handle_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Record {
                record,
                log_id,
                reader_id,
            } => self.on_log_record(record, log_id, reader_id),
            RoomEvent::Gap {
                log_id,
                reader_id,
                gap_type,
                from,
                to,
            } => self.on_gap_record(log_id, reader_id, gap_type, from, to),
            RoomEvent::TailSeqno {
                topic,
                id,
                log_id,
                seqno,
            } => {
                info!(room = self.room, %log_id, seqno, "tail seqno resolved");
                if let Err(err) = self.add_tail_subscriber(topic, id, log_id, seqno) {
                    warn!(%id, %log_id, error = %err, "tail subscription failed");
                }
                let estimate = self.tail_seqno_cached.entry(log_id).or_insert(0);
                *estimate = (*estimate).max(seqno);
            }
            RoomEvent::Subscribe { topic, start, id } => {
                if let Err(err) = self.add_subscriber(topic, start, id) {
                    warn!(%id, error = %err, "subscribe failed");
                }
            }
            RoomEvent::Unsubscribe { id } => {
                // NotFound is routine: unsubscribes broadcast to all rooms
                // and only the owning room has the handle
                let _ = self.remove_subscriber(id);
            }
            RoomEvent::UnsubscribeStream { stream_id } => {
                self.remove_subscriber_stream(stream_id);
            }
            RoomEvent::TailEstimate { log_id, reply } => {
                let _ = reply.send(self.get_tail_seqno_estimate(log_id));
            }
            RoomEvent::Inspect { request, reply } => {
                let _ = reply.send(self.inspect(request));
            }
        }
    }

    /// Add a subscriber to a topic. `start == 0` subscribes at the tail,
    /// resolving it from the cached estimate or the store.
    ///
    /// # Errors
    ///
    /// `NotInitialized` before `initialize`; storage failures from opening a
    /// reader surface here and the subscription should be retried.
    pub fn add_subscriber(
        &mut self,
        topic: TopicUuid,
        start: SequenceNumber,
        id: CopilotSub,
    ) -> Result<()> {
        self.metrics.subscribe_request();
        if self.log_readers.is_empty() {
            return Err(TowerError::NotInitialized);
        }
        let log_id = self.router.route(&topic);

        if start != 0 {
            return self.add_subscriber_internal(topic, id, log_id, start);
        }

        self.metrics.subscribe_request_at_tail();
        let estimate = self.get_tail_seqno_estimate(log_id);
        if estimate != 0 {
            self.metrics.tail_estimate_hit();
            return self.add_tail_subscriber(topic, id, log_id, estimate);
        }

        // Ask the store; the answer re-enters the room through the queue.
        self.metrics.tail_estimate_miss();
        let forward = self.forward.clone();
        let callback: SeqnoCallback = Box::new(move |result| match result {
            Ok(seqno) => {
                let event = RoomEvent::TailSeqno {
                    topic,
                    id,
                    log_id,
                    seqno,
                };
                if let Err(err) = forward.forward(event) {
                    warn!(%id, %log_id, error = %err, "failed to forward tail seqno to room");
                }
            }
            Err(err) => {
                warn!(%id, %log_id, error = %err, "failed to find latest seqno");
            }
        });
        if let Err(err) = self.log_tailer.find_latest_seqno(log_id, callback) {
            // Dropped; the client is expected to retry the subscribe
            warn!(%id, %log_id, error = %err, "failed to request latest seqno");
        }
        Ok(())
    }

    /// Remove one subscription by handle.
    ///
    /// # Errors
    ///
    /// `NotFound` if this room has no such subscription.
    pub fn remove_subscriber(&mut self, id: CopilotSub) -> Result<()> {
        self.metrics.unsubscribe_request();
        let Some(topic) = self.stream_subscriptions.take(id) else {
            debug!(%id, room = self.room, "unsubscribe for unknown subscription");
            return Err(TowerError::NotFound);
        };
        let log_id = self.router.route(&topic);
        debug!(%id, %topic, "unsubscribed");
        self.remove_subscriber_internal(&topic, id, log_id);
        Ok(())
    }

    /// Remove every subscription on a lost stream.
    pub fn remove_subscriber_stream(&mut self, stream_id: StreamId) {
        debug!(%stream_id, room = self.room, "stream unsubscribed from all topics");
        for (sub_id, topic) in self.stream_subscriptions.take_stream(stream_id) {
            let log_id = self.router.route(&topic);
            self.remove_subscriber_internal(&topic, CopilotSub::new(stream_id, sub_id), log_id);
        }
    }

    /// Cached tail estimate for a log, or 0 if unknown
    #[must_use]
    pub fn get_tail_seqno_estimate(&self, log_id: LogId) -> SequenceNumber {
        self.tail_seqno_cached.get(&log_id).copied().unwrap_or(0)
    }

    /// Human-readable state for one log
    #[must_use]
    pub fn get_log_info(&self, log_id: LogId) -> String {
        let mut result = format!(
            "Log({}).tail_seqno_cached: {}\n",
            log_id.value(),
            self.get_tail_seqno_estimate(log_id)
        );
        for reader in &self.log_readers {
            result.push_str(&reader.log_info(log_id));
        }
        result
    }

    /// Human-readable state for every log this room knows about
    #[must_use]
    pub fn get_all_logs_info(&self) -> String {
        let mut result = String::new();
        for (log_id, estimate) in &self.tail_seqno_cached {
            result.push_str(&format!(
                "Log({}).tail_seqno_cached: {}\n",
                log_id.value(),
                estimate
            ));
        }
        for reader in &self.log_readers {
            result.push_str(&reader.all_logs_info());
        }
        result
    }

    /// Answer an admin request
    pub fn inspect(&mut self, request: InspectRequest) -> String {
        match request {
            InspectRequest::LogInfo(log_id) => self.get_log_info(log_id),
            InspectRequest::AllLogsInfo => self.get_all_logs_info(),
            InspectRequest::CacheUsage => self.data_cache.usage().to_string(),
            InspectRequest::CacheCapacity => self.data_cache.capacity().to_string(),
            InspectRequest::ClearCache => {
                info!(room = self.room, "clearing record cache");
                self.data_cache.clear();
                String::new()
            }
            InspectRequest::SetCacheCapacity(capacity) => {
                info!(room = self.room, capacity, "resizing record cache");
                self.data_cache.set_capacity(capacity);
                String::new()
            }
        }
    }

    // ---- Record and gap arrival (room task) ----

    /// Process a record delivered by the log store.
    pub(crate) fn on_log_record(
        &mut self,
        record: Arc<LogRecord>,
        log_id: LogId,
        reader_id: ReaderId,
    ) {
        self.metrics.record_received();
        let Some(idx) = self.find_reader(reader_id) else {
            debug!(%reader_id, %log_id, "record from unknown reader");
            return;
        };
        let topic = record.topic().clone();
        let seqno = record.seqno();
        let processed = self.log_readers[idx].process_record(log_id, seqno, &topic);

        // Cached regardless of reader state; the cache rejects anything that
        // would break its ascending window.
        self.data_cache.store(log_id, Arc::clone(&record));

        let mut is_tail = false;
        if let Some(estimate) = self.tail_seqno_cached.get_mut(&log_id) {
            if *estimate <= seqno {
                is_tail = true;
                *estimate = seqno + 1;
            }
        }
        if is_tail {
            self.metrics.record_at_tail();
        } else {
            self.metrics.record_backlog();
        }

        let prev_seqno = match processed {
            Ok(prev_seqno) => prev_seqno,
            Err(err) => {
                // Out of order or log not open: upstream contract violation,
                // drop and count
                self.metrics.record_out_of_order();
                debug!(%reader_id, %log_id, seqno, error = %err, "dropping record");
                return;
            }
        };

        if prev_seqno != 0 {
            let manager = self.topic_map.entry(log_id).or_default();
            let mut recipients = Vec::new();
            manager.visit_subscribers(&topic, prev_seqno, seqno, |sub| {
                recipients.push(sub.id());
                sub.set_next_seqno(seqno + 1);
            });
            if recipients.is_empty() {
                self.metrics.record_without_subscriptions();
                debug!(
                    %reader_id,
                    %topic,
                    prev_seqno,
                    seqno,
                    "no subscribers in range"
                );
            } else {
                self.metrics.record_with_subscriptions();
                self.emit(
                    TailerMessage::Deliver {
                        record: Arc::clone(&record),
                        prev_seqno,
                    },
                    &recipients,
                );
            }
        } else {
            self.metrics.record_without_subscriptions();
        }

        // Topics silent for more than max_subscription_lag get a catch-up
        // gap so their subscribers observe continuity.
        let on_message = Arc::clone(&self.on_message);
        let metrics = Arc::clone(&self.metrics);
        let manager = self.topic_map.entry(log_id).or_default();
        self.log_readers[idx].bump_lagging_subscriptions(log_id, seqno, |bumped, bump_seqno| {
            let mut recipients = Vec::new();
            manager.visit_subscribers(bumped, bump_seqno, seqno, |sub| {
                recipients.push(sub.id());
                sub.set_next_seqno(seqno + 1);
            });
            if !recipients.is_empty() {
                metrics.record_bumped(recipients.len() as u64);
                (on_message.as_ref())(
                    TailerMessage::Gap {
                        topic: bumped.clone(),
                        gap_type: GapType::Benign,
                        from: bump_seqno,
                        to: seqno,
                    },
                    &recipients,
                );
            }
        });

        self.attempt_reader_merges(idx, log_id);
    }

    /// Process a gap delivered by the log store.
    pub(crate) fn on_gap_record(
        &mut self,
        log_id: LogId,
        reader_id: ReaderId,
        gap_type: GapType,
        from: SequenceNumber,
        to: SequenceNumber,
    ) {
        self.metrics.gap_received();
        let Some(idx) = self.find_reader(reader_id) else {
            debug!(%reader_id, %log_id, "gap from unknown reader");
            return;
        };
        if self.log_readers[idx].validate_gap(log_id, from).is_err() {
            self.metrics.gap_out_of_order();
            return;
        }

        // Per-topic fan-out. `tracked` remembers the topics this reader had
        // positions for, so a malignant flush can re-register them.
        let topics = self.topic_map.entry(log_id).or_default().topics();
        let mut tracked = Vec::new();
        for topic in topics {
            let prev_seqno =
                self.log_readers[idx].process_gap(log_id, &topic, gap_type, from, to);
            if prev_seqno != 0 {
                tracked.push(topic.clone());
            }

            let manager = self.topic_map.entry(log_id).or_default();
            let mut recipients = Vec::new();
            manager.visit_subscribers(&topic, prev_seqno, to, |sub| {
                recipients.push(sub.id());
                sub.set_next_seqno(to + 1);
            });
            if recipients.is_empty() {
                self.metrics.gap_without_subscriptions();
            } else {
                self.metrics.gap_with_subscriptions();
                self.emit(
                    TailerMessage::Gap {
                        topic,
                        gap_type,
                        from: prev_seqno,
                        to,
                    },
                    &recipients,
                );
            }
        }

        if let Some(estimate) = self.tail_seqno_cached.get_mut(&log_id) {
            if *estimate <= to {
                *estimate = to + 1;
            }
        }

        if gap_type.is_malignant() {
            // History is gone: drop every pre-gap claim, then resume the
            // topics we were serving at the first post-gap seqno. The
            // re-registration never touches the store because the reader is
            // already positioned at to + 1.
            self.metrics.malignant_gap();
            self.log_readers[idx].flush_history(log_id, to + 1);
            for topic in &tracked {
                let _ = self.log_readers[idx].start_reading(topic, log_id, to + 1);
            }
        } else {
            self.metrics.benign_gap();
            self.log_readers[idx].process_benign_gap(log_id, from, to);
        }

        self.attempt_reader_merges(idx, log_id);
    }

    // ---- Subscription plumbing ----

    /// Tail subscription: tell the subscriber where the tail is with a
    /// benign gap from the epoch, then subscribe at the tail.
    fn add_tail_subscriber(
        &mut self,
        topic: TopicUuid,
        id: CopilotSub,
        log_id: LogId,
        seqno: SequenceNumber,
    ) -> Result<()> {
        debug!(%id, %topic, tail = seqno, "subscribing at tail");
        self.emit(
            TailerMessage::Gap {
                topic: topic.clone(),
                gap_type: GapType::Benign,
                from: 0,
                to: seqno - 1,
            },
            &[id],
        );
        self.add_subscriber_internal(topic, id, log_id, seqno)
    }

    fn add_subscriber_internal(
        &mut self,
        topic: TopicUuid,
        id: CopilotSub,
        log_id: LogId,
        seqno: SequenceNumber,
    ) -> Result<()> {
        debug_assert_ne!(seqno, 0);

        // Serve what the cache already holds before touching any reader.
        let seqno = self.deliver_from_cache(&topic, id, log_id, seqno);

        let was_added = self
            .topic_map
            .entry(log_id)
            .or_default()
            .add_subscriber(&topic, seqno, id);
        if was_added {
            self.metrics.subscription_added();
        }
        self.stream_subscriptions.insert(id, topic.clone());

        // The tail estimate names the *next* seqno to be written; a store
        // that cannot open past the end starts one back, on a seqno that
        // exists.
        let from = if self.log_tailer.can_subscribe_past_end() {
            seqno
        } else {
            seqno - 1
        };

        let result = match self.reader_for_new_subscription(&topic, log_id, from) {
            ReaderChoice::Physical(idx) => {
                self.log_readers[idx].start_reading(&topic, log_id, from)
            }
            ReaderChoice::Pending => self.pending_reader.start_reading(&topic, log_id, from),
        };
        match &result {
            Ok(()) => debug!(
                %id,
                %topic,
                seqno,
                new = was_added,
                "subscriber registered"
            ),
            Err(err) => warn!(%id, %topic, seqno, error = %err, "subscriber registration failed"),
        }
        result
    }

    /// Replay the cache window for this topic to a fresh subscriber.
    ///
    /// Returns the subscriber's new starting seqno: one past the cache's
    /// coverage of the log, or the original seqno when the cache had
    /// nothing.
    fn deliver_from_cache(
        &self,
        topic: &TopicUuid,
        id: CopilotSub,
        log_id: LogId,
        seqno: SequenceNumber,
    ) -> SequenceNumber {
        if self.data_cache.capacity() == 0 {
            return seqno;
        }
        debug_assert_ne!(seqno, 0);

        let recipients = [id];
        let mut delivered = seqno;
        let next = self.data_cache.visit(log_id, seqno, |record| {
            if record.topic() == topic {
                self.metrics.record_served_from_cache();
                self.emit(
                    TailerMessage::Deliver {
                        record: Arc::clone(record),
                        prev_seqno: delivered,
                    },
                    &recipients,
                );
                delivered = record.seqno() + 1;
            }
        });

        // The cache covered seqnos past the last record on this topic:
        // close the window with a benign gap so the stamps stay tight.
        if next > delivered {
            self.emit(
                TailerMessage::Gap {
                    topic: topic.clone(),
                    gap_type: GapType::Benign,
                    from: delivered,
                    to: next - 1,
                },
                &recipients,
            );
        }
        if next != seqno {
            debug!(%id, %topic, from = seqno, to = next, "subscription fast-forwarded from cache");
        }
        next
    }

    fn remove_subscriber_internal(&mut self, topic: &TopicUuid, id: CopilotSub, log_id: LogId) {
        let manager = self.topic_map.entry(log_id).or_default();
        let all_removed = manager.remove_subscriber(topic, id);
        if manager.is_empty() {
            self.topic_map.remove(&log_id);
        }
        if !all_removed {
            return;
        }

        // Last subscriber on the topic: every reader forgets it, and a log
        // with no readers left loses its tail estimate.
        let mut log_closed = true;
        for reader in &mut self.log_readers {
            if let Err(err) = reader.stop_reading(topic, log_id) {
                warn!(%log_id, error = %err, "failed to stop reading");
            }
            log_closed = log_closed && !reader.is_log_open(log_id);
        }
        if let Err(err) = self.pending_reader.stop_reading(topic, log_id) {
            warn!(%log_id, error = %err, "failed to stop virtual reader");
        }
        log_closed = log_closed && !self.pending_reader.is_log_open(log_id);

        if log_closed {
            self.tail_seqno_cached.remove(&log_id);
        }
    }

    // ---- Reader pool ----

    fn find_reader(&self, reader_id: ReaderId) -> Option<usize> {
        self.log_readers
            .iter()
            .position(|reader| reader.reader_id() == reader_id)
    }

    /// Pick the cheapest reader for a new subscription.
    ///
    /// A live reader is never rewound: a rewind costs `COST_REWIND`, which
    /// never beats the virtual reader's starting cost, so such subscriptions
    /// park on the virtual reader until a merge frees a physical one. The
    /// single-reader degenerate case accepts rewinds.
    fn reader_for_new_subscription(
        &self,
        topic: &TopicUuid,
        log_id: LogId,
        seqno: SequenceNumber,
    ) -> ReaderChoice {
        if self.log_readers.len() == 1 {
            return ReaderChoice::Physical(0);
        }
        let mut best = ReaderChoice::Pending;
        let mut best_cost = COST_REWIND;
        for (idx, reader) in self.log_readers.iter().enumerate() {
            let cost = reader.subscription_cost(topic, log_id, seqno);
            if cost < best_cost {
                best = ReaderChoice::Physical(idx);
                best_cost = cost;
            }
        }
        best
    }

    /// After `src` advanced on `log_id`, merge it into any reader at the
    /// same position, then hand the freed reader the virtual reader's parked
    /// subscriptions for the log.
    fn attempt_reader_merges(&mut self, src_idx: usize, log_id: LogId) {
        for dest_idx in 0..self.log_readers.len() {
            if dest_idx == src_idx {
                continue;
            }
            let (src, dest) = pair_mut(&mut self.log_readers, src_idx, dest_idx);
            if !src.can_merge_into(dest, log_id) {
                continue;
            }
            src.merge_into(dest, log_id);

            if self.pending_reader.is_log_open(log_id) {
                // src just freed the log; it can open at the parked
                // start_seqno without rewinding anything live.
                if let Err(err) = self.log_readers[src_idx]
                    .steal_log_subscriptions(&mut self.pending_reader, log_id)
                {
                    warn!(%log_id, error = %err, "parked subscriptions stay parked");
                }
            }
            break;
        }
    }
}

impl std::fmt::Debug for TopicTailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicTailer")
            .field("room", &self.room)
            .field("readers", &self.log_readers.len())
            .field("logs_with_subscriptions", &self.topic_map.len())
            .finish()
    }
}

/// Disjoint mutable borrows of two readers in the pool
fn pair_mut(readers: &mut [LogReader], a: usize, b: usize) -> (&mut LogReader, &mut LogReader) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = readers.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = readers.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

//! Rooms and the control tower front
//!
//! A `Room` is a spawned task draining one event queue into one
//! [`TopicTailer`]. The `ControlTower` owns the rooms: it spawns them,
//! routes control operations to the room that services a log, and builds the
//! storage-side delivery callbacks that feed the room queues.

use std::sync::Arc;

use crossfire::AsyncRx;
use skyway_config::TowerConfig;
use skyway_protocol::{CopilotSub, LogId, ReaderId, SequenceNumber, StreamId, TopicUuid};
use skyway_routing::{LogRange, LogRouter};
use skyway_storage::{Delivery, LogTailer, StorageError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{Result, TowerError};
use crate::events::{InspectRequest, RoomEvent, RoomHandle};
use crate::metrics::TailerMetrics;
use crate::tailer::{MessageCallback, TopicTailer};

/// One room: an event loop around a topic tailer
pub struct Room {
    tailer: TopicTailer,
    rx: AsyncRx<RoomEvent>,
    cancel: CancellationToken,
}

impl Room {
    /// Create a room over an initialized tailer and its queue
    pub fn new(tailer: TopicTailer, rx: AsyncRx<RoomEvent>, cancel: CancellationToken) -> Self {
        Self { tailer, rx, cancel }
    }

    /// Run the room until cancelled or every sender is gone.
    ///
    /// This consumes the room; all tailer state lives and dies on this task.
    pub async fn run(mut self) {
        let room = self.tailer.room();
        info!(room, "room starting");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = self.rx.recv() => match event {
                    Ok(event) => self.tailer.handle_event(event),
                    Err(_) => break,
                },
            }
        }

        info!(room, "room shutting down");
    }
}

/// The control tower read path: rooms, routing, and admin plumbing
pub struct ControlTower {
    router: LogRouter,
    rooms: Vec<RoomHandle>,
    tasks: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl ControlTower {
    /// Validate the configuration, spawn the rooms, and wire their readers.
    ///
    /// The caller still has to hand [`Self::delivery`] to the log store so
    /// records reach the rooms.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a configuration that fails validation.
    pub fn new(
        config: &TowerConfig,
        log_tailer: Arc<dyn LogTailer>,
        on_message: MessageCallback,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|err| TowerError::InvalidArgument(err.to_string()))?;
        let range = LogRange::new(config.first_log, config.last_log)
            .map_err(|err| TowerError::InvalidArgument(err.to_string()))?;
        let router = LogRouter::new(range);
        let cancel = CancellationToken::new();

        let mut rooms = Vec::with_capacity(config.num_rooms);
        let mut tasks = Vec::with_capacity(config.num_rooms);
        for room in 0..config.num_rooms {
            let (tx, rx) = crossfire::mpsc::bounded_async::<RoomEvent>(config.room_queue_size);
            let handle = RoomHandle::new(room, tx, Arc::new(TailerMetrics::new()));

            let mut tailer = TopicTailer::new(
                room,
                Arc::clone(&log_tailer),
                router,
                config.cache_size_per_room,
                config.cache_system_namespaces,
                config.subscription_cost_start,
                Arc::clone(&on_message),
                handle.clone(),
            );
            // Reader ids are a global pool: each room owns a disjoint block,
            // id 0 stays reserved for virtual readers.
            let reader_ids: Vec<ReaderId> = (0..config.readers_per_room)
                .map(|slot| ReaderId::new((room * config.readers_per_room + slot + 1) as u64))
                .collect();
            tailer.initialize(&reader_ids, config.max_subscription_lag);

            tasks.push(tokio::spawn(Room::new(tailer, rx, cancel.child_token()).run()));
            rooms.push(handle);
        }

        info!(
            rooms = config.num_rooms,
            readers_per_room = config.readers_per_room,
            "control tower started"
        );
        Ok(Self {
            router,
            rooms,
            tasks,
            cancel,
        })
    }

    /// Number of rooms
    #[inline]
    #[must_use]
    pub fn num_rooms(&self) -> usize {
        self.rooms.len()
    }

    /// Handle of one room
    #[must_use]
    pub fn room_handle(&self, room: usize) -> &RoomHandle {
        &self.rooms[room]
    }

    /// The topic → log router this tower uses
    #[inline]
    #[must_use]
    pub fn router(&self) -> LogRouter {
        self.router
    }

    /// Delivery callbacks routing store events to the owning rooms.
    ///
    /// Hand these to the log store implementation. A full room queue comes
    /// back as [`StorageError::NoBuffer`] so the store holds its cursor.
    #[must_use]
    pub fn delivery(&self) -> Delivery {
        let record_rooms = self.rooms.clone();
        let gap_rooms = self.rooms.clone();
        Delivery {
            on_record: Box::new(move |record, log_id, reader_id| {
                let room = &record_rooms[LogRouter::room_for(log_id, record_rooms.len())];
                room.send_log_record(record, log_id, reader_id)
                    .map_err(forward_error)
            }),
            on_gap: Box::new(move |log_id, reader_id, gap_type, from, to| {
                let room = &gap_rooms[LogRouter::room_for(log_id, gap_rooms.len())];
                room.send_gap_record(log_id, reader_id, gap_type, from, to)
                    .map_err(forward_error)
            }),
        }
    }

    /// Subscribe `id` to `topic` from `start` (0 = tail).
    pub async fn subscribe(
        &self,
        topic: TopicUuid,
        start: SequenceNumber,
        id: CopilotSub,
    ) -> Result<()> {
        let log_id = self.router.route(&topic);
        self.room_for(log_id)
            .send(RoomEvent::Subscribe { topic, start, id })
            .await
    }

    /// Drop one subscription by handle.
    ///
    /// Broadcast: only the owning room has the handle, the rest ignore it.
    pub async fn unsubscribe(&self, id: CopilotSub) -> Result<()> {
        for room in &self.rooms {
            room.send(RoomEvent::Unsubscribe { id }).await?;
        }
        Ok(())
    }

    /// Drop every subscription on a lost stream.
    pub async fn goodbye(&self, stream_id: StreamId) -> Result<()> {
        for room in &self.rooms {
            room.send(RoomEvent::UnsubscribeStream { stream_id }).await?;
        }
        Ok(())
    }

    /// Cached tail estimate for a log, or 0 if unknown.
    pub async fn get_tail_seqno_estimate(&self, log_id: LogId) -> Result<SequenceNumber> {
        let (reply, rx) = oneshot::channel();
        self.room_for(log_id)
            .send(RoomEvent::TailEstimate { log_id, reply })
            .await?;
        rx.await.map_err(|_| TowerError::RoomClosed)
    }

    /// Human-readable state for one log.
    pub async fn get_log_info(&self, log_id: LogId) -> Result<String> {
        self.inspect_room(self.room_for(log_id), InspectRequest::LogInfo(log_id))
            .await
    }

    /// Human-readable state across all rooms.
    pub async fn get_all_logs_info(&self) -> Result<String> {
        let mut result = String::new();
        for room in &self.rooms {
            result.push_str(&self.inspect_room(room, InspectRequest::AllLogsInfo).await?);
        }
        Ok(result)
    }

    /// Drop every cached record in every room.
    pub async fn clear_cache(&self) -> Result<()> {
        for room in &self.rooms {
            self.inspect_room(room, InspectRequest::ClearCache).await?;
        }
        Ok(())
    }

    /// Resize every room's record cache.
    pub async fn set_cache_capacity(&self, capacity: usize) -> Result<()> {
        for room in &self.rooms {
            self.inspect_room(room, InspectRequest::SetCacheCapacity(capacity))
                .await?;
        }
        Ok(())
    }

    /// Total record cache usage across rooms, in bytes.
    pub async fn get_cache_usage(&self) -> Result<usize> {
        self.sum_inspect(|| InspectRequest::CacheUsage).await
    }

    /// Total record cache capacity across rooms, in bytes.
    pub async fn get_cache_capacity(&self) -> Result<usize> {
        self.sum_inspect(|| InspectRequest::CacheCapacity).await
    }

    /// Stop every room and wait for them to drain.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        info!("control tower stopped");
    }

    fn room_for(&self, log_id: LogId) -> &RoomHandle {
        &self.rooms[LogRouter::room_for(log_id, self.rooms.len())]
    }

    async fn inspect_room(&self, room: &RoomHandle, request: InspectRequest) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        room.send(RoomEvent::Inspect { request, reply }).await?;
        rx.await.map_err(|_| TowerError::RoomClosed)
    }

    async fn sum_inspect(&self, request: impl Fn() -> InspectRequest) -> Result<usize> {
        let mut total = 0usize;
        for room in &self.rooms {
            let value = self.inspect_room(room, request()).await?;
            total += value.parse::<usize>().unwrap_or(0);
        }
        Ok(total)
    }
}

impl std::fmt::Debug for ControlTower {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlTower")
            .field("rooms", &self.rooms.len())
            .finish()
    }
}

/// Translate queue rejection into the storage-side retry contract
fn forward_error(err: TowerError) -> StorageError {
    match err {
        TowerError::NoBuffer => StorageError::NoBuffer,
        other => StorageError::Io(other.to_string()),
    }
}

//! Skyway - Control Tower
//!
//! The read path of the Skyway pub/sub service: a small, bounded pool of
//! whole-log readers demultiplexed into a virtually unbounded set of
//! per-topic subscriptions.
//!
//! # Architecture
//!
//! A tower hosts `num_rooms` rooms. Each room is a tokio task owning one
//! [`TopicTailer`] and servicing the shard of logs with
//! `log_id % num_rooms == room`. All tailer state is single-threaded inside
//! its room; storage worker threads reach the room only through its bounded
//! event queue.
//!
//! ```text
//! [LogTailer workers] --try_send--> [Room queue] --> [Room task: TopicTailer]
//!                                                        |
//!                                                        v
//!                                              on_message(msg, recipients)
//! ```
//!
//! # Reader discipline
//!
//! Each room owns `readers_per_room` physical readers plus one virtual
//! reader. A new subscription goes to the cheapest reader; a subscription
//! that would rewind a live reader is parked on the virtual reader instead,
//! and taken over by a physical reader freed up by a merge. A live reader is
//! never rewound while it serves current subscribers.

mod cache;
mod error;
mod events;
mod metrics;
mod reader;
mod room;
mod subscriptions;
mod tailer;
mod topic;

pub use cache::DataCache;
pub use error::{Result, TowerError};
pub use events::{InspectRequest, RoomEvent, RoomHandle};
pub use metrics::{TailerMetrics, TailerMetricsSnapshot};
pub use reader::{LogReader, COST_REWIND};
pub use room::{ControlTower, Room};
pub use subscriptions::StreamSubscriptions;
pub use tailer::{MessageCallback, TopicTailer};
pub use topic::{TopicManager, TopicSubscription};

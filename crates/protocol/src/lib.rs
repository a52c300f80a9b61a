//! Skyway Protocol - Core types for the Skyway pub/sub service
//!
//! This crate provides the foundational types that flow through the read
//! path:
//! - `LogId`, `SequenceNumber` - position within the shared log space
//! - `TopicUuid` - (namespace, topic) pair routed onto a log
//! - `StreamId`, `SubscriptionId`, `CopilotSub` - subscriber addressing
//! - `LogRecord` - zero-copy record container using `bytes::Bytes`
//! - `TailerMessage` - outgoing deliveries and gaps
//!
//! # Design Principles
//!
//! - **Zero-copy**: record payloads are `bytes::Bytes`; records fan out to
//!   many subscribers behind `Arc` without copying
//! - **Copy identifiers**: ids are small `Copy` newtypes that fit in a
//!   register and index straight into per-room state

mod ids;
mod message;
mod record;
mod topic;

pub use ids::{CopilotSub, LogId, ReaderId, SequenceNumber, StreamId, SubscriptionId};
pub use message::{GapType, TailerMessage};
pub use record::LogRecord;
pub use topic::{is_reserved_namespace, TopicUuid};

// Re-export bytes for convenience
pub use bytes::Bytes;

// Test modules - only compiled during testing
#[cfg(test)]
mod ids_test;
#[cfg(test)]
mod topic_test;

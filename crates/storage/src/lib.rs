//! Skyway - Storage
//!
//! The contract between the read path and the external log store, plus an
//! in-memory implementation used by tests and local development.
//!
//! # Architecture
//!
//! The store exposes whole-log readers addressed by `ReaderId`. A reader is
//! opened (or rewound) at a sequence number and then pushes records and gaps
//! through [`Delivery`] callbacks on storage worker threads. The read path
//! never polls; backpressure flows the other way via
//! [`StorageError::NoBuffer`], which tells the store to hold its cursor and
//! retry.
//!
//! ```text
//! [Room] --start_reading/stop_reading--> [LogTailer]
//! [LogTailer worker] --on_record/on_gap--> [Room queue]
//! ```

mod error;
mod memory;
mod tailer;

pub use error::{Result, StorageError};
pub use memory::{MemoryTailer, TailerOp};
pub use tailer::{Delivery, GapCallback, LogTailer, RecordCallback, SeqnoCallback};

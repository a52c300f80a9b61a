//! Skyway - Routing
//!
//! Deterministic topic → log routing for the Skyway read and write paths.
//!
//! # Design
//!
//! Routing decisions are pure hashing, made per-call with no shared state.
//! The hash must be stable across process restarts and across hosts:
//! subscriptions persisted by clients name a `(topic, seqno)` position, and
//! replaying that position only works if the topic still routes to the same
//! log. `xxh3` gives a fixed, well-distributed 64-bit hash; the std hasher
//! is randomly keyed per process and must never be used here.

mod error;
mod router;

pub use error::{RoutingError, Result};
pub use router::{LogRange, LogRouter};

#[cfg(test)]
mod router_test;

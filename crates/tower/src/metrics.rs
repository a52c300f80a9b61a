//! Topic tailer metrics
//!
//! Atomic counters for the room hot path. All operations use relaxed
//! ordering; values are eventually consistent, not real-time. The room
//! thread is the only writer for most counters, but readers may snapshot
//! from anywhere.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for one room's topic tailer
#[derive(Debug, Default)]
pub struct TailerMetrics {
    /// Records received from the log store
    records_received: AtomicU64,

    /// Records at or past the cached tail estimate
    records_at_tail: AtomicU64,

    /// Records behind the cached tail estimate
    records_backlog: AtomicU64,

    /// Records fanned out to at least one subscriber
    records_with_subscriptions: AtomicU64,

    /// Records processed with no subscriber in range
    records_without_subscriptions: AtomicU64,

    /// Records dropped for arriving out of order or on a closed log
    records_out_of_order: AtomicU64,

    /// Records replayed to new subscribers from the cache
    records_served_from_cache: AtomicU64,

    /// Subscriptions advanced past silent ranges via benign gaps
    bumped_subscriptions: AtomicU64,

    /// Gaps received from the log store
    gaps_received: AtomicU64,

    /// Gaps dropped for arriving out of order or on a closed log
    gaps_out_of_order: AtomicU64,

    /// Per-topic gap messages delivered to at least one subscriber
    gaps_with_subscriptions: AtomicU64,

    /// Per-topic gap fan-outs with no subscriber in range
    gaps_without_subscriptions: AtomicU64,

    /// Benign gaps processed
    benign_gaps: AtomicU64,

    /// Retention / data-loss gaps processed
    malignant_gaps: AtomicU64,

    /// Subscribe requests received
    subscribe_requests: AtomicU64,

    /// Subscribe requests at seqno 0 (tail)
    subscribe_requests_at_tail: AtomicU64,

    /// Tail subscriptions resolved from the cached estimate
    tail_estimate_fast: AtomicU64,

    /// Tail subscriptions that required a store lookup
    tail_estimate_slow: AtomicU64,

    /// Subscriptions newly inserted (as opposed to seqno updates)
    subscriptions_added: AtomicU64,

    /// Unsubscribe requests received
    unsubscribe_requests: AtomicU64,

    /// Events rejected because the room queue was full
    forward_rejected: AtomicU64,
}

macro_rules! counter {
    ($record:ident, $get:ident) => {
        #[inline]
        pub(crate) fn $record(&self) {
            self.$get.fetch_add(1, Ordering::Relaxed);
        }

        /// Get the current counter value
        #[inline]
        pub fn $get(&self) -> u64 {
            self.$get.load(Ordering::Relaxed)
        }
    };
}

impl TailerMetrics {
    /// Create new metrics with all counters at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_received, records_received);
    counter!(record_at_tail, records_at_tail);
    counter!(record_backlog, records_backlog);
    counter!(record_with_subscriptions, records_with_subscriptions);
    counter!(record_without_subscriptions, records_without_subscriptions);
    counter!(record_out_of_order, records_out_of_order);
    counter!(record_served_from_cache, records_served_from_cache);
    counter!(gap_received, gaps_received);
    counter!(gap_out_of_order, gaps_out_of_order);
    counter!(gap_with_subscriptions, gaps_with_subscriptions);
    counter!(gap_without_subscriptions, gaps_without_subscriptions);
    counter!(benign_gap, benign_gaps);
    counter!(malignant_gap, malignant_gaps);
    counter!(subscribe_request, subscribe_requests);
    counter!(subscribe_request_at_tail, subscribe_requests_at_tail);
    counter!(tail_estimate_hit, tail_estimate_fast);
    counter!(tail_estimate_miss, tail_estimate_slow);
    counter!(subscription_added, subscriptions_added);
    counter!(unsubscribe_request, unsubscribe_requests);
    counter!(forward_rejection, forward_rejected);

    /// Record subscriptions bumped past a silent range
    #[inline]
    pub(crate) fn record_bumped(&self, count: u64) {
        self.bumped_subscriptions.fetch_add(count, Ordering::Relaxed);
    }

    /// Get the bumped subscription count
    #[inline]
    pub fn bumped_subscriptions(&self) -> u64 {
        self.bumped_subscriptions.load(Ordering::Relaxed)
    }

    /// Get a point-in-time snapshot of all counters
    #[must_use]
    pub fn snapshot(&self) -> TailerMetricsSnapshot {
        TailerMetricsSnapshot {
            records_received: self.records_received(),
            records_at_tail: self.records_at_tail(),
            records_backlog: self.records_backlog(),
            records_with_subscriptions: self.records_with_subscriptions(),
            records_without_subscriptions: self.records_without_subscriptions(),
            records_out_of_order: self.records_out_of_order(),
            records_served_from_cache: self.records_served_from_cache(),
            bumped_subscriptions: self.bumped_subscriptions(),
            gaps_received: self.gaps_received(),
            gaps_out_of_order: self.gaps_out_of_order(),
            gaps_with_subscriptions: self.gaps_with_subscriptions(),
            gaps_without_subscriptions: self.gaps_without_subscriptions(),
            benign_gaps: self.benign_gaps(),
            malignant_gaps: self.malignant_gaps(),
            subscribe_requests: self.subscribe_requests(),
            subscribe_requests_at_tail: self.subscribe_requests_at_tail(),
            tail_estimate_fast: self.tail_estimate_fast(),
            tail_estimate_slow: self.tail_estimate_slow(),
            subscriptions_added: self.subscriptions_added(),
            unsubscribe_requests: self.unsubscribe_requests(),
            forward_rejected: self.forward_rejected(),
        }
    }
}

/// Point-in-time copy of tailer metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TailerMetricsSnapshot {
    pub records_received: u64,
    pub records_at_tail: u64,
    pub records_backlog: u64,
    pub records_with_subscriptions: u64,
    pub records_without_subscriptions: u64,
    pub records_out_of_order: u64,
    pub records_served_from_cache: u64,
    pub bumped_subscriptions: u64,
    pub gaps_received: u64,
    pub gaps_out_of_order: u64,
    pub gaps_with_subscriptions: u64,
    pub gaps_without_subscriptions: u64,
    pub benign_gaps: u64,
    pub malignant_gaps: u64,
    pub subscribe_requests: u64,
    pub subscribe_requests_at_tail: u64,
    pub tail_estimate_fast: u64,
    pub tail_estimate_slow: u64,
    pub subscriptions_added: u64,
    pub unsubscribe_requests: u64,
    pub forward_rejected: u64,
}

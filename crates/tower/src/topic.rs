//! Per-log subscription bookkeeping
//!
//! A `TopicManager` tracks, for one log, which subscribers sit at which
//! sequence number on each topic. Fan-out visits subscribers by seqno range
//! and advances them in place.

use std::collections::HashMap;

use skyway_protocol::{CopilotSub, SequenceNumber, TopicUuid};

/// One subscriber's position on one topic
#[derive(Debug, Clone)]
pub struct TopicSubscription {
    id: CopilotSub,
    /// Next seqno this subscriber expects; strictly positive, non-decreasing
    next_seqno: SequenceNumber,
}

impl TopicSubscription {
    /// Create a subscription at a starting seqno
    #[inline]
    #[must_use]
    pub fn new(id: CopilotSub, next_seqno: SequenceNumber) -> Self {
        Self { id, next_seqno }
    }

    /// The subscriber's address
    #[inline]
    #[must_use]
    pub fn id(&self) -> CopilotSub {
        self.id
    }

    /// Next seqno this subscriber expects
    #[inline]
    #[must_use]
    pub fn next_seqno(&self) -> SequenceNumber {
        self.next_seqno
    }

    /// Advance the subscriber's position
    #[inline]
    pub fn set_next_seqno(&mut self, seqno: SequenceNumber) {
        self.next_seqno = seqno;
    }
}

/// Subscribers per topic, for one log
#[derive(Debug, Default)]
pub struct TopicManager {
    topics: HashMap<TopicUuid, Vec<TopicSubscription>>,
}

impl TopicManager {
    /// Create an empty manager
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber to a topic at `seqno`, or move an existing
    /// subscription of the same id to `seqno`.
    ///
    /// Returns true iff this inserted a *new* subscription rather than
    /// updating an existing one.
    pub fn add_subscriber(&mut self, topic: &TopicUuid, seqno: SequenceNumber, id: CopilotSub) -> bool {
        let subs = self.topics.entry(topic.clone()).or_default();
        for sub in subs.iter_mut() {
            if sub.id() == id {
                sub.set_next_seqno(seqno);
                return false;
            }
        }
        subs.push(TopicSubscription::new(id, seqno));
        true
    }

    /// Remove one subscriber from a topic.
    ///
    /// Returns true iff the topic has no subscribers left (including when
    /// the topic was already unknown); empty topics are dropped.
    pub fn remove_subscriber(&mut self, topic: &TopicUuid, id: CopilotSub) -> bool {
        let Some(subs) = self.topics.get_mut(topic) else {
            return true;
        };
        subs.retain(|sub| sub.id() != id);
        if subs.is_empty() {
            self.topics.remove(topic);
            return true;
        }
        false
    }

    /// Visit every subscriber on `topic` whose position lies in
    /// `[from, to]`. The visitor may advance the subscription in place.
    pub fn visit_subscribers(
        &mut self,
        topic: &TopicUuid,
        from: SequenceNumber,
        to: SequenceNumber,
        mut f: impl FnMut(&mut TopicSubscription),
    ) {
        if let Some(subs) = self.topics.get_mut(topic) {
            for sub in subs.iter_mut() {
                if sub.next_seqno() >= from && sub.next_seqno() <= to {
                    f(sub);
                }
            }
        }
    }

    /// Snapshot of the subscribed topics.
    ///
    /// Callers iterate this while mutating the manager (gap fan-out removes
    /// nothing, but unsubscribe paths may), so a detached list beats a
    /// borrowed iterator here.
    #[must_use]
    pub fn topics(&self) -> Vec<TopicUuid> {
        self.topics.keys().cloned().collect()
    }

    /// Number of subscribers on one topic
    #[must_use]
    pub fn subscriber_count(&self, topic: &TopicUuid) -> usize {
        self.topics.get(topic).map_or(0, Vec::len)
    }

    /// True if no topic has any subscriber
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyway_protocol::{StreamId, SubscriptionId};

    fn sub(stream: u64, sub: u64) -> CopilotSub {
        CopilotSub::new(StreamId::new(stream), SubscriptionId::new(sub))
    }

    fn topic(name: &str) -> TopicUuid {
        TopicUuid::new("test", name)
    }

    #[test]
    fn test_add_subscriber_new_vs_update() {
        let mut manager = TopicManager::new();
        let t = topic("a");

        assert!(manager.add_subscriber(&t, 10, sub(1, 1)));
        assert!(!manager.add_subscriber(&t, 20, sub(1, 1))); // seqno update
        assert!(manager.add_subscriber(&t, 10, sub(1, 2))); // distinct sub

        assert_eq!(manager.subscriber_count(&t), 2);
    }

    #[test]
    fn test_remove_subscriber() {
        let mut manager = TopicManager::new();
        let t = topic("a");
        manager.add_subscriber(&t, 10, sub(1, 1));
        manager.add_subscriber(&t, 10, sub(1, 2));

        assert!(!manager.remove_subscriber(&t, sub(1, 1)));
        assert!(manager.remove_subscriber(&t, sub(1, 2)));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_remove_from_unknown_topic() {
        let mut manager = TopicManager::new();
        assert!(manager.remove_subscriber(&topic("ghost"), sub(1, 1)));
    }

    #[test]
    fn test_visit_subscribers_range_is_inclusive() {
        let mut manager = TopicManager::new();
        let t = topic("a");
        manager.add_subscriber(&t, 5, sub(1, 1));
        manager.add_subscriber(&t, 10, sub(1, 2));
        manager.add_subscriber(&t, 15, sub(1, 3));

        let mut visited = Vec::new();
        manager.visit_subscribers(&t, 5, 10, |s| visited.push(s.id()));
        assert_eq!(visited, vec![sub(1, 1), sub(1, 2)]);
    }

    #[test]
    fn test_visitor_advances_in_place() {
        let mut manager = TopicManager::new();
        let t = topic("a");
        manager.add_subscriber(&t, 5, sub(1, 1));

        manager.visit_subscribers(&t, 1, 10, |s| s.set_next_seqno(11));

        let mut visited = 0;
        manager.visit_subscribers(&t, 1, 10, |_| visited += 1);
        assert_eq!(visited, 0); // moved out of range

        let mut seqno = 0;
        manager.visit_subscribers(&t, 11, 11, |s| seqno = s.next_seqno());
        assert_eq!(seqno, 11);
    }

    #[test]
    fn test_topics_snapshot_allows_removal() {
        let mut manager = TopicManager::new();
        manager.add_subscriber(&topic("a"), 1, sub(1, 1));
        manager.add_subscriber(&topic("b"), 1, sub(1, 2));

        for t in manager.topics() {
            manager.remove_subscriber(&t, sub(1, 1));
            manager.remove_subscriber(&t, sub(1, 2));
        }
        assert!(manager.is_empty());
    }
}

//! Stream subscription index
//!
//! Two-level map `(stream, sub) → topic` supporting fast unsubscribe by
//! handle and mass unsubscribe when a stream disconnects. The room thread
//! owns the index; nothing here is shared.

use std::collections::HashMap;

use skyway_protocol::{CopilotSub, StreamId, SubscriptionId, TopicUuid};

/// Index of live subscriptions keyed by stream and handle
#[derive(Debug, Default)]
pub struct StreamSubscriptions {
    streams: HashMap<StreamId, HashMap<SubscriptionId, TopicUuid>>,
}

impl StreamSubscriptions {
    /// Create an empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` is subscribed to `topic`.
    ///
    /// A second insert for the same id replaces the topic (subscription
    /// update).
    pub fn insert(&mut self, id: CopilotSub, topic: TopicUuid) {
        self.streams
            .entry(id.stream_id)
            .or_default()
            .insert(id.sub_id, topic);
    }

    /// Remove and return the topic `id` was subscribed to.
    ///
    /// Empty per-stream maps are pruned.
    pub fn take(&mut self, id: CopilotSub) -> Option<TopicUuid> {
        let subs = self.streams.get_mut(&id.stream_id)?;
        let topic = subs.remove(&id.sub_id)?;
        if subs.is_empty() {
            self.streams.remove(&id.stream_id);
        }
        Some(topic)
    }

    /// Remove and return every subscription on a stream.
    pub fn take_stream(&mut self, stream_id: StreamId) -> Vec<(SubscriptionId, TopicUuid)> {
        self.streams
            .remove(&stream_id)
            .map(|subs| subs.into_iter().collect())
            .unwrap_or_default()
    }

    /// True if `id` is currently subscribed
    #[must_use]
    pub fn contains(&self, id: CopilotSub) -> bool {
        self.streams
            .get(&id.stream_id)
            .is_some_and(|subs| subs.contains_key(&id.sub_id))
    }

    /// Total number of live subscriptions
    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.values().map(HashMap::len).sum()
    }

    /// True if no subscription is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(stream: u64, sub: u64) -> CopilotSub {
        CopilotSub::new(StreamId::new(stream), SubscriptionId::new(sub))
    }

    fn topic(name: &str) -> TopicUuid {
        TopicUuid::new("test", name)
    }

    #[test]
    fn test_insert_and_take() {
        let mut index = StreamSubscriptions::new();
        index.insert(id(1, 1), topic("a"));

        assert!(index.contains(id(1, 1)));
        assert_eq!(index.take(id(1, 1)), Some(topic("a")));
        assert!(!index.contains(id(1, 1)));
        assert!(index.is_empty());
    }

    #[test]
    fn test_take_unknown() {
        let mut index = StreamSubscriptions::new();
        assert_eq!(index.take(id(1, 1)), None);
    }

    #[test]
    fn test_insert_replaces_topic() {
        let mut index = StreamSubscriptions::new();
        index.insert(id(1, 1), topic("a"));
        index.insert(id(1, 1), topic("b"));

        assert_eq!(index.len(), 1);
        assert_eq!(index.take(id(1, 1)), Some(topic("b")));
    }

    #[test]
    fn test_take_stream() {
        let mut index = StreamSubscriptions::new();
        index.insert(id(1, 1), topic("a"));
        index.insert(id(1, 2), topic("b"));
        index.insert(id(2, 1), topic("c"));

        let mut taken = index.take_stream(StreamId::new(1));
        taken.sort_by_key(|(sub_id, _)| *sub_id);
        assert_eq!(
            taken,
            vec![
                (SubscriptionId::new(1), topic("a")),
                (SubscriptionId::new(2), topic("b")),
            ]
        );

        // Other streams untouched
        assert!(index.contains(id(2, 1)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_take_stream_unknown() {
        let mut index = StreamSubscriptions::new();
        assert!(index.take_stream(StreamId::new(9)).is_empty());
    }
}

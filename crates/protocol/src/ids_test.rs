//! Tests for identifier types

use crate::ids::{CopilotSub, LogId, ReaderId, StreamId, SubscriptionId};

#[test]
fn test_log_id_new() {
    let id = LogId::new(42);
    assert_eq!(id.value(), 42);
}

#[test]
fn test_log_id_copy() {
    let id1 = LogId::new(1);
    let id2 = id1; // Copy
    assert_eq!(id1, id2);
}

#[test]
fn test_log_id_ordering() {
    assert!(LogId::new(1) < LogId::new(2));
    assert!(LogId::new(2) < LogId::new(3));
}

#[test]
fn test_log_id_display() {
    assert_eq!(LogId::new(123).to_string(), "log:123");
}

#[test]
fn test_log_id_conversions() {
    let id: LogId = 99u64.into();
    assert_eq!(id.value(), 99);
    let value: u64 = id.into();
    assert_eq!(value, 99);
}

#[test]
fn test_log_id_hash() {
    use std::collections::HashSet;

    let mut set = HashSet::new();
    set.insert(LogId::new(1));
    set.insert(LogId::new(2));
    set.insert(LogId::new(1)); // Duplicate

    assert_eq!(set.len(), 2);
    assert!(set.contains(&LogId::new(1)));
}

#[test]
fn test_reader_id_virtual() {
    assert_eq!(ReaderId::VIRTUAL.value(), 0);
    assert_ne!(ReaderId::new(1), ReaderId::VIRTUAL);
}

#[test]
fn test_reader_id_display() {
    assert_eq!(ReaderId::new(3).to_string(), "reader:3");
}

#[test]
fn test_copilot_sub_equality() {
    let a = CopilotSub::new(StreamId::new(1), SubscriptionId::new(7));
    let b = CopilotSub::new(StreamId::new(1), SubscriptionId::new(7));
    let c = CopilotSub::new(StreamId::new(1), SubscriptionId::new(8));
    let d = CopilotSub::new(StreamId::new(2), SubscriptionId::new(7));

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_ne!(a, d);
}

#[test]
fn test_copilot_sub_display() {
    let id = CopilotSub::new(StreamId::new(3), SubscriptionId::new(9));
    assert_eq!(id.to_string(), "stream:3/sub:9");
}

#[test]
fn test_id_sizes() {
    // Ids stay register-sized
    assert_eq!(std::mem::size_of::<LogId>(), 8);
    assert_eq!(std::mem::size_of::<StreamId>(), 8);
    assert_eq!(std::mem::size_of::<CopilotSub>(), 16);
}

//! Tests for the log router

use skyway_protocol::{LogId, TopicUuid};

use crate::error::RoutingError;
use crate::router::{LogRange, LogRouter};

#[test]
fn test_log_range_new() {
    let range = LogRange::new(1, 100).unwrap();
    assert_eq!(range.first(), 1);
    assert_eq!(range.last(), 100);
    assert_eq!(range.count(), 100);
}

#[test]
fn test_log_range_single_log() {
    let range = LogRange::new(7, 7).unwrap();
    assert_eq!(range.count(), 1);
    assert!(range.contains(LogId::new(7)));
    assert!(!range.contains(LogId::new(8)));
}

#[test]
fn test_log_range_invalid() {
    let err = LogRange::new(10, 5).unwrap_err();
    assert!(matches!(
        err,
        RoutingError::InvalidLogRange { first: 10, last: 5 }
    ));
}

#[test]
fn test_route_is_deterministic() {
    let router = LogRouter::new(LogRange::new(1, 1000).unwrap());
    let topic = TopicUuid::new("guest", "orders");

    let first = router.route(&topic);
    for _ in 0..10 {
        assert_eq!(router.route(&topic), first);
    }
}

#[test]
fn test_route_stays_in_range() {
    let range = LogRange::new(100, 163).unwrap();
    let router = LogRouter::new(range);

    for i in 0..1000 {
        let topic = TopicUuid::new("guest", format!("topic-{i}"));
        assert!(range.contains(router.route(&topic)));
    }
}

#[test]
fn test_route_separates_namespace_and_name() {
    // ("ab", "c") and ("a", "bc") must not collide by construction
    let router = LogRouter::new(LogRange::new(1, u64::MAX - 1).unwrap());
    let a = router.route(&TopicUuid::new("ab", "c"));
    let b = router.route(&TopicUuid::new("a", "bc"));
    assert_ne!(a, b);
}

#[test]
fn test_route_known_values_are_stable() {
    // Pin the mapping: a change here breaks every client-persisted
    // subscription in the field.
    let router = LogRouter::new(LogRange::new(1, 100_000).unwrap());
    let log1 = router.route(&TopicUuid::new("guest", "orders"));
    let log2 = router.route(&TopicUuid::new("guest", "orders"));
    let log3 = router.route(&TopicUuid::new("_system", "heartbeat"));

    assert_eq!(log1, log2);
    // Distinct topics land on distinct logs for this seed set
    assert_ne!(log1, log3);
}

#[test]
fn test_route_distribution() {
    // Rough uniformity check: 10k topics over 16 logs, no log should be
    // starved or heavily overloaded.
    let range = LogRange::new(0, 15).unwrap();
    let router = LogRouter::new(range);

    let mut counts = [0usize; 16];
    for i in 0..10_000 {
        let topic = TopicUuid::new("bench", format!("t{i}"));
        counts[router.route(&topic).value() as usize] += 1;
    }

    for (log, &count) in counts.iter().enumerate() {
        assert!(
            count > 300 && count < 950,
            "log {log} has skewed share: {count}/10000"
        );
    }
}

#[test]
fn test_room_for() {
    assert_eq!(LogRouter::room_for(LogId::new(0), 4), 0);
    assert_eq!(LogRouter::room_for(LogId::new(5), 4), 1);
    assert_eq!(LogRouter::room_for(LogId::new(7), 4), 3);
    assert_eq!(LogRouter::room_for(LogId::new(8), 1), 0);
}

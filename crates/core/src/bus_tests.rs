// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::job::JobId;
use crate::task::TaskId;

fn cancelled(task: &str) -> Event {
    Event::TaskCancelled { job_id: JobId::from_string("job-x"), task_id: TaskId::new(task) }
}

fn stdout(chunk: &str) -> Event {
    Event::TerminalStdout { session_id: "ses-1".into(), chunk: chunk.into() }
}

// =============================================================================
// Pattern matching
// =============================================================================

#[test]
fn exact_topic_matches() {
    let pattern = TopicPattern::new("job.task_cancelled");
    assert!(pattern.matches("job.task_cancelled"));
    assert!(!pattern.matches("job.task_completed"));
    assert!(!pattern.matches("terminal.exit"));
}

#[test]
fn segment_wildcard_matches_one_segment() {
    let pattern = TopicPattern::new("job.*");
    assert!(pattern.matches("job.task_completed"));
    assert!(pattern.matches("job.claim_blocked"));
    assert!(!pattern.matches("terminal.stdout"));
}

#[test]
fn bare_wildcard_matches_everything() {
    let pattern = TopicPattern::new("*");
    assert!(pattern.matches("job.task_completed"));
    assert!(pattern.matches("terminal.stdout"));
}

#[test]
fn longer_topic_than_pattern_does_not_match() {
    let pattern = TopicPattern::new("job");
    assert!(!pattern.matches("job.task_completed"));
}

// =============================================================================
// Delivery
// =============================================================================

#[tokio::test]
async fn subscriber_receives_matching_events_in_order() {
    let bus = Bus::default();
    let mut sub = bus.subscribe("job.*");

    bus.publish(cancelled("t1"));
    bus.publish(stdout("ignored"));
    bus.publish(cancelled("t2"));

    match sub.recv().await {
        Some(BusPoll::Event(Event::TaskCancelled { task_id, .. })) => {
            assert_eq!(task_id.as_str(), "t1");
        }
        other => panic!("unexpected poll: {other:?}"),
    }
    match sub.recv().await {
        Some(BusPoll::Event(Event::TaskCancelled { task_id, .. })) => {
            assert_eq!(task_id.as_str(), "t2");
        }
        other => panic!("unexpected poll: {other:?}"),
    }
}

#[tokio::test]
async fn subscribe_sees_only_events_from_now_forward() {
    let bus = Bus::default();
    bus.publish(cancelled("before"));
    let mut sub = bus.subscribe("*");
    bus.publish(cancelled("after"));

    match sub.recv().await {
        Some(BusPoll::Event(Event::TaskCancelled { task_id, .. })) => {
            assert_eq!(task_id.as_str(), "after");
        }
        other => panic!("unexpected poll: {other:?}"),
    }
}

#[tokio::test]
async fn slow_subscriber_overflows_without_blocking_publisher() {
    let bus = Bus::new(4);
    let mut sub = bus.subscribe("*");

    for i in 0..64 {
        bus.publish(cancelled(&format!("t{i}")));
    }

    match sub.recv().await {
        Some(BusPoll::Overflow { skipped }) => assert!(skipped > 0),
        other => panic!("expected overflow, got: {other:?}"),
    }
    // After the overflow notice the subscriber keeps receiving the retained tail
    match sub.recv().await {
        Some(BusPoll::Event(_)) => {}
        other => panic!("expected event after overflow, got: {other:?}"),
    }
}

#[tokio::test]
async fn publish_without_subscribers_is_fine() {
    let bus = Bus::default();
    bus.publish(cancelled("t1"));
    assert_eq!(bus.stats().get("job.task_cancelled").map(|s| s.count), Some(1));
}

#[test]
fn stats_track_counts_per_topic() {
    let bus = Bus::default();
    bus.publish(cancelled("t1"));
    bus.publish(cancelled("t2"));
    bus.publish(stdout("x"));

    let stats = bus.stats();
    assert_eq!(stats.get("job.task_cancelled").map(|s| s.count), Some(2));
    assert_eq!(stats.get("terminal.stdout").map(|s| s.count), Some(1));
    assert!(stats.get("job.task_cancelled").map(|s| s.last_published_ms > 0).unwrap_or(false));
}

#[tokio::test]
async fn try_recv_returns_none_when_empty() {
    let bus = Bus::default();
    let mut sub = bus.subscribe("*");
    assert!(sub.try_recv().is_none());
    bus.publish(cancelled("t1"));
    assert!(matches!(sub.try_recv(), Some(BusPoll::Event(_))));
}

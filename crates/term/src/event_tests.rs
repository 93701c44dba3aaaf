// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn event_serde_round_trip() {
    let events = vec![
        TerminalEvent::Started { pid: 42, ts: 1 },
        TerminalEvent::Stdout { chunk: "hello\n".into(), ts: 2 },
        TerminalEvent::Exit { code: Some(0), ts: 3 },
        TerminalEvent::Error { kind: TerminalErrorKind::Overflow, ts: 4 },
    ];
    for ev in events {
        let json = serde_json::to_string(&ev).unwrap();
        let back: TerminalEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(ev, back);
    }
}

#[test]
fn exit_detection() {
    assert!(TerminalEvent::Exit { code: None, ts: 0 }.is_exit());
    assert!(!TerminalEvent::Started { pid: 1, ts: 0 }.is_exit());
}

#[tokio::test]
async fn lagged_subscriber_sees_overflow_then_tail() {
    let (tx, rx) = broadcast::channel(2);
    let mut sub = SessionSubscription { rx, ts: || 99 };

    for i in 0..10 {
        let _ = tx.send(TerminalEvent::Stdout { chunk: format!("c{i}"), ts: i });
    }

    match sub.recv().await {
        Some(TerminalEvent::Error { kind: TerminalErrorKind::Overflow, ts }) => {
            assert_eq!(ts, 99);
        }
        other => panic!("expected overflow error, got: {other:?}"),
    }
    // The retained tail still arrives in order
    match sub.recv().await {
        Some(TerminalEvent::Stdout { chunk, .. }) => assert_eq!(chunk, "c8"),
        other => panic!("expected retained chunk, got: {other:?}"),
    }
}

#[tokio::test]
async fn closed_stream_yields_none() {
    let (tx, rx) = broadcast::channel(2);
    let mut sub = SessionSubscription { rx, ts: || 0 };
    drop(tx);
    assert!(sub.recv().await.is_none());
}

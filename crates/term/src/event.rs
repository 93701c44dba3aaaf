// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured terminal event streams.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Subscriber-visible error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalErrorKind {
    /// This subscriber lagged; oldest chunks were dropped.
    Overflow,
    /// The session hit its spawn-time timeout and is being terminated.
    Timeout,
    /// Reading the PTY failed.
    Io,
}

nm_core::simple_display! {
    TerminalErrorKind {
        Overflow => "overflow",
        Timeout => "timeout",
        Io => "io",
    }
}

/// Events produced by a PTY session.
///
/// `stdout` and `stderr` are delivered in write order per stream. The PTY
/// merges the child's stdout and stderr into one byte stream, so captured
/// chunks surface as `Stdout`; `Stderr` exists for protocol completeness.
/// Exactly one `Exit` is published per spawned session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminalEvent {
    Started { pid: i32, ts: u64 },
    Stdout { chunk: String, ts: u64 },
    Stderr { chunk: String, ts: u64 },
    Exit { code: Option<i32>, ts: u64 },
    Error { kind: TerminalErrorKind, ts: u64 },
}

impl TerminalEvent {
    pub fn ts(&self) -> u64 {
        match self {
            TerminalEvent::Started { ts, .. }
            | TerminalEvent::Stdout { ts, .. }
            | TerminalEvent::Stderr { ts, .. }
            | TerminalEvent::Exit { ts, .. }
            | TerminalEvent::Error { ts, .. } => *ts,
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, TerminalEvent::Exit { .. })
    }
}

/// A live consumer of one session's event stream.
///
/// Sees events from subscription time forward (no replay). A slow consumer
/// rides a bounded ring: on overflow it observes
/// `Error { kind: overflow }` and continues with the retained tail, without
/// ever blocking the reader or other subscribers.
pub struct SessionSubscription {
    pub(crate) rx: broadcast::Receiver<TerminalEvent>,
    pub(crate) ts: fn() -> u64,
}

impl SessionSubscription {
    /// Receive the next event, or `None` once the stream is finished.
    pub async fn recv(&mut self) -> Option<TerminalEvent> {
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => Some(TerminalEvent::Error {
                kind: TerminalErrorKind::Overflow,
                ts: (self.ts)(),
            }),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

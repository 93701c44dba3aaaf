// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process topic pub/sub with per-subscriber buffering.
//!
//! A [`Bus`] is a value constructed at runner construction and passed by
//! reference to every component that needs it; there is no process-wide
//! singleton. Topics are dotted (`job.task_completed`, `terminal.stdout`)
//! and subscribers match with segment patterns (`job.*`, `*`).
//!
//! Each subscriber rides a bounded ring: a slow subscriber never blocks the
//! publisher or other subscribers. On overflow the oldest events are dropped
//! and the subscriber observes [`BusPoll::Overflow`] with the drop count.

use crate::clock::{Clock, SystemClock};
use crate::event::Event;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default per-subscriber ring capacity.
const DEFAULT_CAPACITY: usize = 256;

/// Per-topic publish metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicStats {
    pub count: u64,
    pub last_published_ms: u64,
}

/// Dotted-segment topic pattern.
///
/// `*` matches one segment; a trailing `*` matches the remainder, so `job.*`
/// matches `job.task_completed` and a bare `*` matches everything.
#[derive(Debug, Clone)]
struct TopicPattern {
    segments: Vec<String>,
}

impl TopicPattern {
    fn new(pattern: &str) -> Self {
        Self { segments: pattern.split('.').map(str::to_string).collect() }
    }

    fn matches(&self, topic: &str) -> bool {
        let mut topic_segs = topic.split('.');
        let last = self.segments.len() - 1;
        for (i, pat) in self.segments.iter().enumerate() {
            match topic_segs.next() {
                Some(seg) => {
                    if pat == "*" {
                        if i == last {
                            // Trailing wildcard consumes the rest
                            return true;
                        }
                        continue;
                    }
                    if pat != seg {
                        return false;
                    }
                }
                None => return false,
            }
        }
        topic_segs.next().is_none()
    }
}

struct BusInner {
    tx: broadcast::Sender<Event>,
    stats: Mutex<HashMap<&'static str, TopicStats>>,
    clock: SystemClock,
}

/// The in-process event bus.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                tx,
                stats: Mutex::new(HashMap::new()),
                clock: SystemClock,
            }),
        }
    }

    /// Publish an event to every matching subscriber.
    ///
    /// Never blocks and never fails: with no subscribers the event only
    /// counts toward stats.
    pub fn publish(&self, event: Event) {
        let topic = event.topic();
        {
            let mut stats = self.inner.stats.lock();
            let entry = stats
                .entry(topic)
                .or_insert(TopicStats { count: 0, last_published_ms: 0 });
            entry.count += 1;
            entry.last_published_ms = self.inner.clock.epoch_ms();
        }
        let _ = self.inner.tx.send(event);
    }

    /// Subscribe to topics matching `pattern`, from now forward.
    pub fn subscribe(&self, pattern: &str) -> Subscription {
        Subscription {
            rx: self.inner.tx.subscribe(),
            pattern: TopicPattern::new(pattern),
        }
    }

    /// Per-topic publish counts and last-publish timestamps.
    pub fn stats(&self) -> HashMap<&'static str, TopicStats> {
        self.inner.stats.lock().clone()
    }
}

/// What a subscriber sees on each poll.
#[derive(Debug, Clone, PartialEq)]
pub enum BusPoll {
    Event(Event),
    /// The subscriber lagged and `skipped` events were dropped (oldest first).
    Overflow { skipped: u64 },
}

/// A live subscription; dropping it unsubscribes.
pub struct Subscription {
    rx: broadcast::Receiver<Event>,
    pattern: TopicPattern,
}

impl Subscription {
    /// Receive the next matching event, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<BusPoll> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.pattern.matches(event.topic()) => {
                    return Some(BusPoll::Event(event));
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Some(BusPoll::Overflow { skipped });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<BusPoll> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.pattern.matches(event.topic()) => {
                    return Some(BusPoll::Event(event));
                }
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    return Some(BusPoll::Overflow { skipped });
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawn circuit breaker.
//!
//! Repeated spawn failures usually mean the agent binary is missing or the
//! host is out of PTYs; hammering on it only makes things worse. The breaker
//! opens after `threshold` failures inside `window` and rejects spawns for
//! `cooldown`, after which the next attempt is allowed through.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Failures within `window` that open the breaker.
    pub threshold: usize,
    /// Sliding window over which failures are counted.
    pub window: Duration,
    /// How long the breaker stays open once tripped.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
        }
    }
}

struct BreakerState {
    failures: VecDeque<Instant>,
    opened_until: Option<Instant>,
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState { failures: VecDeque::new(), opened_until: None }),
        }
    }

    /// True while the breaker is open (spawns must fail fast).
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock();
        match state.opened_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                // Cooldown elapsed; close and allow the next attempt
                state.opened_until = None;
                state.failures.clear();
                false
            }
            None => false,
        }
    }

    /// Record a spawn failure; may trip the breaker.
    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.failures.push_back(now);
        while let Some(first) = state.failures.front() {
            if now.duration_since(*first) > self.config.window {
                state.failures.pop_front();
            } else {
                break;
            }
        }
        if state.failures.len() >= self.config.threshold {
            state.opened_until = Some(now + self.config.cooldown);
            state.failures.clear();
        }
    }

    /// Record a successful spawn; clears the failure run.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.failures.clear();
        state.opened_until = None;
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal manager: session registry, spawning, signalling, pool stats.

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::error::TermError;
use crate::event::{SessionSubscription, TerminalErrorKind, TerminalEvent};
use crate::pty::Pty;
use crate::session::{self, Session};
use nm_core::{Clock, SystemClock};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

nm_core::define_id! {
    /// Handle for one spawned PTY session.
    pub struct SessionId("ses-");
}

/// Per-subscriber event ring capacity.
const EVENT_RING_CAPACITY: usize = 512;

/// Terminal rows/cols presented to the child.
const PTY_ROWS: u16 = 40;
const PTY_COLS: u16 = 120;

/// Everything needed to spawn one agent invocation.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub argv: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    /// Prompt written to the child's stdin after spawn, EOT-terminated.
    pub stdin_text: Option<String>,
    /// Hard deadline; on expiry the session is terminated (SIGTERM, then
    /// SIGKILL after `timeout_grace`).
    pub timeout: Option<Duration>,
    /// Grace between SIGTERM and SIGKILL on timeout termination.
    pub timeout_grace: Duration,
    /// Directory receiving `stdout.log` and `events.ndjson` mirrors.
    pub log_dir: Option<PathBuf>,
}

impl SpawnSpec {
    pub fn new(argv: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            cwd: cwd.into(),
            env: Vec::new(),
            stdin_text: None,
            timeout: None,
            timeout_grace: Duration::from_secs(5),
            log_dir: None,
        }
    }

    nm_core::setters! {
        set {
            env: Vec<(String, String)>,
            timeout: Option<Duration>,
        }
        option {
            stdin_text: String,
            log_dir: PathBuf,
        }
    }
}

/// Aggregate pool statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct PoolStats {
    pub active: usize,
    pub spawned_total: u64,
    pub exits_by_code: HashMap<i32, u64>,
}

struct ManagerInner {
    sessions: Mutex<HashMap<SessionId, Session>>,
    /// Exit codes of retired sessions, so late `wait` calls still resolve.
    retired: Mutex<HashMap<SessionId, i32>>,
    stats: Mutex<PoolStats>,
    breaker: CircuitBreaker,
}

/// Spawns and supervises agent PTY sessions.
#[derive(Clone)]
pub struct TerminalManager {
    inner: Arc<ManagerInner>,
}

impl Default for TerminalManager {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

impl TerminalManager {
    pub fn new(breaker: BreakerConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                sessions: Mutex::new(HashMap::new()),
                retired: Mutex::new(HashMap::new()),
                stats: Mutex::new(PoolStats::default()),
                breaker: CircuitBreaker::new(breaker),
            }),
        }
    }

    /// Allocate a PTY, fork the agent, and start the reader.
    ///
    /// Fails fast with [`TermError::SpawnCircuitOpen`] while the breaker is
    /// open; any real spawn failure feeds the breaker.
    pub fn spawn(&self, spec: SpawnSpec) -> Result<SessionId, TermError> {
        self.spawn_subscribed(spec).map(|(id, _)| id)
    }

    /// Like [`spawn`](Self::spawn), but returns a subscription created
    /// before the reader starts, so the consumer is guaranteed the full
    /// stream from the first chunk.
    pub fn spawn_subscribed(
        &self,
        spec: SpawnSpec,
    ) -> Result<(SessionId, SessionSubscription), TermError> {
        if self.inner.breaker.is_open() {
            return Err(TermError::SpawnCircuitOpen);
        }

        let pty = match Pty::spawn(&spec.argv, &spec.cwd, &spec.env, PTY_ROWS, PTY_COLS) {
            Ok(pty) => Arc::new(pty),
            Err(e) => {
                self.inner.breaker.record_failure();
                return Err(e);
            }
        };
        self.inner.breaker.record_success();

        let id = SessionId::new();
        let (event_tx, _) = broadcast::channel(EVENT_RING_CAPACITY);
        let (exit_tx, exit_rx) = watch::channel(None);

        tracing::info!(session_id = %id, pid = pty.pid(), argv = ?spec.argv, "session spawned");

        {
            let mut sessions = self.inner.sessions.lock();
            sessions.insert(
                id,
                Session { pty: Arc::clone(&pty), events: event_tx.clone(), exit: exit_rx },
            );
        }
        {
            let mut stats = self.inner.stats.lock();
            stats.spawned_total += 1;
            stats.active += 1;
        }

        // Subscribe before the reader starts so the caller misses nothing
        let subscription = SessionSubscription {
            rx: event_tx.subscribe(),
            ts: || SystemClock.epoch_ms(),
        };

        // Dedicated reader per PTY stream
        let reader_pty = Arc::clone(&pty);
        let manager = self.clone();
        let session_id = id;
        tokio::task::spawn_blocking(move || {
            session::run_reader(reader_pty, event_tx, exit_tx, spec.stdin_text, spec.log_dir);
            manager.on_session_exit(&session_id);
        });

        if let Some(timeout) = spec.timeout {
            let manager = self.clone();
            let grace = spec.timeout_grace;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                manager.on_timeout(&session_id, grace).await;
            });
        }

        Ok((id, subscription))
    }

    /// Subscribe to a session's event stream (live-forward, no replay).
    pub fn subscribe(&self, id: &SessionId) -> Result<SessionSubscription, TermError> {
        let sessions = self.inner.sessions.lock();
        let session = sessions.get(id).ok_or_else(|| TermError::UnknownSession(id.to_string()))?;
        Ok(SessionSubscription {
            rx: session.events.subscribe(),
            ts: || SystemClock.epoch_ms(),
        })
    }

    /// Connect a live consumer to an ongoing stream. Identical delivery
    /// semantics to [`subscribe`](Self::subscribe): attach-time forward only.
    pub fn attach(&self, id: &SessionId) -> Result<SessionSubscription, TermError> {
        self.subscribe(id)
    }

    /// Write bytes to the child's stdin via the PTY.
    pub fn send(&self, id: &SessionId, bytes: &[u8]) -> Result<(), TermError> {
        let pty = self.session_pty(id)?;
        if pty.try_wait().is_some() {
            return Err(TermError::SessionExited(id.to_string()));
        }
        pty.write_all(bytes)
    }

    /// Deliver a signal to the child process. Signalling an already-retired
    /// session is a no-op, not an error.
    pub fn kill(&self, id: &SessionId, signal: i32) -> Result<(), TermError> {
        let pty = match self.session_pty(id) {
            Ok(pty) => pty,
            // Session retired between lookup attempts: nothing to signal
            Err(TermError::UnknownSession(_))
                if self.inner.retired.lock().contains_key(id) =>
            {
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        tracing::info!(session_id = %id, signal, "signalling session");
        pty.signal(signal)
    }

    /// Standard shutdown: SIGTERM, wait up to `grace`, then SIGKILL.
    pub async fn terminate(&self, id: &SessionId, grace: Duration) -> Result<(), TermError> {
        self.kill(id, libc::SIGTERM)?;
        if self.wait_with_deadline(id, grace).await?.is_none() {
            tracing::warn!(session_id = %id, "grace expired, escalating to SIGKILL");
            self.kill(id, libc::SIGKILL)?;
        }
        Ok(())
    }

    /// Await the session's exit code.
    pub async fn wait(&self, id: &SessionId) -> Result<i32, TermError> {
        let mut exit = {
            let sessions = self.inner.sessions.lock();
            match sessions.get(id) {
                Some(session) => session.exit.clone(),
                None => {
                    // Already retired: resolve from the exit record
                    return self
                        .inner
                        .retired
                        .lock()
                        .get(id)
                        .copied()
                        .ok_or_else(|| TermError::UnknownSession(id.to_string()));
                }
            }
        };
        loop {
            if let Some(code) = *exit.borrow() {
                return Ok(code);
            }
            if exit.changed().await.is_err() {
                // Reader dropped without publishing: treat as signalled death
                return Ok(128 + libc::SIGKILL);
            }
        }
    }

    /// Await exit for up to `deadline`; `None` when the child is still alive.
    pub async fn wait_with_deadline(
        &self,
        id: &SessionId,
        deadline: Duration,
    ) -> Result<Option<i32>, TermError> {
        match tokio::time::timeout(deadline, self.wait(id)).await {
            Ok(code) => code.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// True while the session's child has not exited.
    pub fn is_active(&self, id: &SessionId) -> bool {
        let sessions = self.inner.sessions.lock();
        sessions.get(id).map(|s| s.exit.borrow().is_none()).unwrap_or(false)
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.stats.lock().clone()
    }

    fn session_pty(&self, id: &SessionId) -> Result<Arc<Pty>, TermError> {
        let sessions = self.inner.sessions.lock();
        sessions
            .get(id)
            .map(|s| Arc::clone(&s.pty))
            .ok_or_else(|| TermError::UnknownSession(id.to_string()))
    }

    /// Reader finished: exit is journaled and published, retire the handle.
    fn on_session_exit(&self, id: &SessionId) {
        let session = self.inner.sessions.lock().remove(id);
        if let Some(session) = session {
            let code = *session.exit.borrow();
            if let Some(code) = code {
                self.inner.retired.lock().insert(*id, code);
            }
            let mut stats = self.inner.stats.lock();
            stats.active = stats.active.saturating_sub(1);
            if let Some(code) = code {
                *stats.exits_by_code.entry(code).or_insert(0) += 1;
            }
            tracing::info!(session_id = %id, exit_code = ?code, "session retired");
        }
    }

    async fn on_timeout(&self, id: &SessionId, grace: Duration) {
        if !self.is_active(id) {
            return;
        }
        tracing::warn!(session_id = %id, "session timeout, terminating");
        {
            let sessions = self.inner.sessions.lock();
            if let Some(session) = sessions.get(id) {
                let _ = session.events.send(TerminalEvent::Error {
                    kind: TerminalErrorKind::Timeout,
                    ts: SystemClock.epoch_ms(),
                });
            }
        }
        if let Err(e) = self.terminate(id, grace).await {
            tracing::warn!(session_id = %id, error = %e, "timeout termination failed");
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

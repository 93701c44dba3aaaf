// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One live PTY session: reader loop, log mirroring, exit signalling.

use crate::event::{TerminalErrorKind, TerminalEvent};
use crate::pty::{Pty, ReadOutcome};
use nm_core::{Clock, SystemClock};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// How long the reader parks between polls of the master fd.
const POLL_INTERVAL_MS: i32 = 100;

/// ASCII EOT, terminating the prompt on the agent's stdin.
const EOT: u8 = 0x04;

pub(crate) struct Session {
    pub(crate) pty: Arc<Pty>,
    pub(crate) events: broadcast::Sender<TerminalEvent>,
    pub(crate) exit: watch::Receiver<Option<i32>>,
}

/// Drive one session to completion on a blocking thread.
///
/// Publishes `started`, then output chunks, then exactly one `exit`, and
/// the exit event is appended to the session's NDJSON log before it is
/// published, so a consumer that observed `exit` can rely on the log being
/// complete.
pub(crate) fn run_reader(
    pty: Arc<Pty>,
    events: broadcast::Sender<TerminalEvent>,
    exit_tx: watch::Sender<Option<i32>>,
    stdin_text: Option<String>,
    log_dir: Option<PathBuf>,
) {
    let clock = SystemClock;
    let mut logs = log_dir.as_deref().and_then(|dir| SessionLogs::open(dir));

    let started = TerminalEvent::Started { pid: pty.pid(), ts: clock.epoch_ms() };
    if let Some(logs) = logs.as_mut() {
        logs.append_event(&started);
    }
    let _ = events.send(started);

    if let Some(text) = stdin_text {
        let mut bytes = text.into_bytes();
        if bytes.last() != Some(&b'\n') {
            bytes.push(b'\n');
        }
        bytes.push(EOT);
        if let Err(e) = pty.write_all(&bytes) {
            tracing::warn!(pid = pty.pid(), error = %e, "failed to write prompt to agent stdin");
        }
    }

    loop {
        if pty.poll_readable(POLL_INTERVAL_MS) {
            match pty.read() {
                Ok(ReadOutcome::Data(bytes)) => {
                    emit_chunk(&events, &clock, logs.as_mut(), bytes);
                    continue;
                }
                Ok(ReadOutcome::WouldBlock) => {}
                Ok(ReadOutcome::Eof) => break,
                Err(e) => {
                    tracing::warn!(pid = pty.pid(), error = %e, "PTY read failed");
                    let event =
                        TerminalEvent::Error { kind: TerminalErrorKind::Io, ts: clock.epoch_ms() };
                    if let Some(logs) = logs.as_mut() {
                        logs.append_event(&event);
                    }
                    let _ = events.send(event);
                    break;
                }
            }
        }
        if pty.try_wait().is_some() {
            // Child exited; drain whatever it flushed on the way out
            while let Ok(ReadOutcome::Data(bytes)) = pty.read() {
                emit_chunk(&events, &clock, logs.as_mut(), bytes);
            }
            break;
        }
    }

    let code = pty.wait();
    let exit = TerminalEvent::Exit { code: Some(code), ts: clock.epoch_ms() };
    if let Some(logs) = logs.as_mut() {
        logs.append_event(&exit);
    }
    let _ = events.send(exit);
    let _ = exit_tx.send(Some(code));
}

fn emit_chunk(
    events: &broadcast::Sender<TerminalEvent>,
    clock: &SystemClock,
    logs: Option<&mut SessionLogs>,
    bytes: Vec<u8>,
) {
    let chunk = String::from_utf8_lossy(&bytes).into_owned();
    if let Some(logs) = logs {
        logs.append_stdout(&chunk);
        logs.append_event(&TerminalEvent::Stdout { chunk: chunk.clone(), ts: clock.epoch_ms() });
    }
    let _ = events.send(TerminalEvent::Stdout { chunk, ts: clock.epoch_ms() });
}

/// Best-effort mirror of the session to `stdout.log` + `events.ndjson`.
struct SessionLogs {
    stdout: File,
    events: File,
}

impl SessionLogs {
    fn open(dir: &Path) -> Option<Self> {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot create session log dir");
            return None;
        }
        let open = |name: &str| {
            std::fs::OpenOptions::new().create(true).append(true).open(dir.join(name))
        };
        match (open("stdout.log"), open("events.ndjson")) {
            (Ok(stdout), Ok(events)) => Some(Self { stdout, events }),
            (stdout, events) => {
                let err = stdout.err().or(events.err());
                tracing::warn!(dir = %dir.display(), error = ?err, "cannot open session logs");
                None
            }
        }
    }

    fn append_stdout(&mut self, chunk: &str) {
        if let Err(e) = self.stdout.write_all(chunk.as_bytes()).and_then(|_| self.stdout.flush()) {
            tracing::warn!(error = %e, "stdout.log append failed");
        }
    }

    fn append_event(&mut self, event: &TerminalEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "event serialization failed");
                return;
            }
        };
        let result = self
            .events
            .write_all(line.as_bytes())
            .and_then(|_| self.events.write_all(b"\n"))
            .and_then(|_| self.events.flush());
        if let Err(e) = result {
            tracing::warn!(error = %e, "events.ndjson append failed");
        }
    }
}

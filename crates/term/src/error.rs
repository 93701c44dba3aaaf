// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal manager errors.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TermError {
    #[error("failed to open PTY: {0}")]
    Open(io::Error),

    #[error("failed to fork: {0}")]
    Fork(io::Error),

    #[error("failed to spawn agent process: {0}")]
    Spawn(String),

    #[error("spawn circuit breaker is open")]
    SpawnCircuitOpen,

    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("session {0} has already exited")]
    SessionExited(String),

    #[error("empty argv")]
    EmptyArgv,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store errors and the busy-retry helper.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt row: {0}")]
    CorruptRow(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("illegal task transition for {task}: {from} -> {to}")]
    IllegalTransition { task: String, from: String, to: String },
}

impl StoreError {
    fn is_busy(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked
        )
    }
}

/// Retry an operation through transient `SQLITE_BUSY` contention with
/// exponential backoff. Non-busy errors propagate immediately.
pub(crate) fn with_busy_retry<T>(
    mut op: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    const ATTEMPTS: u32 = 3;
    let mut delay = Duration::from_millis(200);
    for attempt in 1..=ATTEMPTS {
        match op() {
            Err(e) if e.is_busy() && attempt < ATTEMPTS => {
                tracing::warn!(attempt, error = %e, "store busy, retrying");
                std::thread::sleep(delay);
                delay *= 2;
            }
            other => return other,
        }
    }
    unreachable!("loop always returns on the final attempt")
}

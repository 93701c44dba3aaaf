// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Custom error type that carries a process exit code.
//!
//! Commands return `ExitError` instead of calling `std::process::exit()`
//! directly, allowing `main()` to handle process termination.

use std::fmt;

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// Internal error (exit code 4).
    pub fn internal(message: impl fmt::Display) -> Self {
        Self::new(crate::EXIT_INTERNAL, message.to_string())
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}

impl From<anyhow::Error> for ExitError {
    fn from(e: anyhow::Error) -> Self {
        ExitError::internal(e)
    }
}

impl From<nm_runner::RunnerError> for ExitError {
    fn from(e: nm_runner::RunnerError) -> Self {
        ExitError::internal(e)
    }
}

impl From<nm_store::StoreError> for ExitError {
    fn from(e: nm_store::StoreError) -> Self {
        ExitError::internal(e)
    }
}

impl From<std::io::Error> for ExitError {
    fn from(e: std::io::Error) -> Self {
        ExitError::internal(e)
    }
}

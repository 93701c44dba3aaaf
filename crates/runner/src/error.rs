// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner errors.

use nm_core::TaskId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("plan error: {0}")]
    Plan(#[from] nm_plan::PlanError),

    #[error("store error: {0}")]
    Store(#[from] nm_store::StoreError),

    #[error("terminal error: {0}")]
    Term(#[from] nm_term::TermError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{phase} phase timed out")]
    PhaseTimeout { phase: &'static str },

    #[error("agent exited with status {code} in {phase} phase")]
    AgentExit { phase: &'static str, code: i32 },

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
}

impl RunnerError {
    /// Failures that count against a task's retry budget rather than
    /// failing the whole job.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RunnerError::Plan(_)
                | RunnerError::Term(_)
                | RunnerError::PhaseTimeout { .. }
                | RunnerError::AgentExit { .. }
        )
    }
}

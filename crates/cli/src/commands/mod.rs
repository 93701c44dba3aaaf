// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod kill;
pub mod logs;
pub mod run;
pub mod status;
pub mod worker;

use crate::exit_error::ExitError;
use nm_core::JobId;
use nm_runner::{JobRunner, RunnerConfig};
use nm_store::{MemoryStore, RecoveryMode, Store};
use std::sync::Arc;

/// Open the store and build a runner from the environment.
pub(crate) fn open_runner() -> Result<Arc<JobRunner>, ExitError> {
    let store = Store::open(&nm_core::env::store_path(), RecoveryMode::FailInterrupted)?;
    let memory = match MemoryStore::open(&nm_core::env::memory_store_path()) {
        Ok(memory) => Some(memory),
        Err(e) => {
            tracing::warn!(error = %e, "memory store unavailable, continuing without audit");
            None
        }
    };
    Ok(Arc::new(JobRunner::new(store, memory, RunnerConfig::from_env())))
}

/// Resolve a job id or unique prefix against the store.
pub(crate) fn resolve_job(runner: &JobRunner, raw: &str) -> Result<JobId, ExitError> {
    let jobs = runner.list_jobs()?;
    let matches: Vec<&nm_core::Job> =
        jobs.iter().filter(|j| j.id.as_str().starts_with(raw)).collect();
    match matches.as_slice() {
        [job] => Ok(job.id),
        [] => Err(ExitError::new(crate::EXIT_USAGE, format!("no job matches '{raw}'"))),
        _ => Err(ExitError::new(crate::EXIT_USAGE, format!("ambiguous job id '{raw}'"))),
    }
}

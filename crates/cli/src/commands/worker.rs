// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `numerus worker` - internal entrypoint driving a planned job.

use super::{open_runner, resolve_job};
use crate::exit_error::ExitError;
use crate::{EXIT_CANCELLED, EXIT_JOB_FAILED};
use nm_core::JobStatus;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};

pub async fn worker(raw_job_id: &str) -> Result<(), ExitError> {
    let runner = open_runner()?;
    let job_id = resolve_job(&runner, raw_job_id)?;

    // `numerus kill` delivers SIGTERM; translate it into job cancellation
    // so agents get the SIGTERM → grace → SIGKILL shutdown.
    let mut sigterm = signal(SignalKind::terminate()).map_err(ExitError::internal)?;
    let cancel_runner = Arc::clone(&runner);
    tokio::spawn(async move {
        sigterm.recv().await;
        tracing::info!(%job_id, "SIGTERM received, cancelling job");
        if let Err(e) = cancel_runner.cancel(&job_id) {
            tracing::error!(%job_id, error = %e, "cancel failed");
        }
    });

    let status = runner.run_job(&job_id).await?;
    match status {
        JobStatus::Done => Ok(()),
        JobStatus::Cancelled => Err(ExitError::new(EXIT_CANCELLED, String::new())),
        _ => Err(ExitError::new(EXIT_JOB_FAILED, String::new())),
    }
}

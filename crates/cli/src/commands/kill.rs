// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `numerus kill` - terminate a running job via its worker process.

use super::{open_runner, resolve_job};
use crate::exit_error::ExitError;
use crate::EXIT_USAGE;

pub fn kill(raw_job_id: &str) -> Result<(), ExitError> {
    let runner = open_runner()?;
    let job_id = resolve_job(&runner, raw_job_id)?;
    let snapshot = runner.status(&job_id)?;

    if snapshot.job.status.is_terminal() {
        return Err(ExitError::new(
            EXIT_USAGE,
            format!("job {} is already {}", job_id, snapshot.job.status),
        ));
    }
    let Some(pid) = snapshot.job.worker_pid else {
        return Err(ExitError::new(EXIT_USAGE, format!("job {} has no worker pid", job_id)));
    };

    // The worker translates SIGTERM into cancellation with the standard
    // SIGTERM → grace → SIGKILL agent shutdown.
    let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Err(ExitError::new(EXIT_USAGE, format!("worker process {pid} is gone")));
        }
        return Err(ExitError::internal(err));
    }

    println!("sent SIGTERM to job {} (worker pid {})", job_id, pid);
    Ok(())
}

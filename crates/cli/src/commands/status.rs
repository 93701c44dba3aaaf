// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `numerus status` - all jobs and their task states.

use super::open_runner;
use crate::exit_error::ExitError;

pub fn status() -> Result<(), ExitError> {
    let runner = open_runner()?;
    let jobs = runner.list_jobs()?;
    if jobs.is_empty() {
        println!("no jobs");
        return Ok(());
    }

    let header = format!(
        "{:<22} {:<11} {:<8} {:<6} OBJECTIVE",
        "JOB", "STATUS", "PID", "TASKS"
    );
    println!("{header}");
    println!("{}", "-".repeat(header.len().max(60)));

    for job in jobs {
        let snapshot = runner.status(&job.id)?;
        let done = snapshot
            .tasks
            .iter()
            .filter(|t| t.state == nm_core::TaskState::Completed)
            .count();
        let pid = job.worker_pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        println!(
            "{:<22} {:<11} {:<8} {:<6} {}",
            job.id,
            job.status.to_string(),
            pid,
            format!("{}/{}", done, snapshot.tasks.len()),
            truncate(&job.objective, 48),
        );
        for task in &snapshot.tasks {
            let detail = match (&task.blocking_reason, task.last_exit_code) {
                (Some(reason), _) => format!("  ({reason})"),
                (None, Some(code)) if code != 0 => format!("  (exit {code})"),
                _ => String::new(),
            };
            println!(
                "    {:<20} {:<16} attempt {}{}",
                task.id,
                task.state.to_string(),
                task.attempt,
                detail,
            );
        }
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> &str {
    nm_core::short(s, max)
}

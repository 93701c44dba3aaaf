// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `numerus run` / `numerus start` - plan a job and detach a worker.

use super::open_runner;
use crate::exit_error::ExitError;
use crate::{EXIT_JOB_FAILED, EXIT_USAGE};
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

/// Interactive variant: prompt for the objective when not supplied.
pub async fn start(objective: Option<String>) -> Result<(), ExitError> {
    let objective = match objective {
        Some(objective) => objective,
        None => {
            print!("numerus › objective: ");
            std::io::stdout().flush()?;
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            line.trim().to_string()
        }
    };
    if objective.is_empty() {
        return Err(ExitError::new(EXIT_USAGE, "no objective provided"));
    }
    println!("planning: {objective}");
    run(objective).await
}

/// Plan in the foreground (plan errors surface immediately), then hand the
/// job to a detached `numerus worker` process.
pub async fn run(objective: String) -> Result<(), ExitError> {
    let runner = open_runner()?;
    let working_dir = std::env::current_dir()?;
    let job_id = runner.create_job(&objective, &working_dir)?;

    let plan = runner
        .plan_job(&job_id)
        .await
        .map_err(|e| ExitError::new(EXIT_JOB_FAILED, format!("planning failed: {e}")))?;

    println!("plan ({} task(s)) → runs/{}/plan.json", plan.tasks.len(), job_id);
    for task in &plan.tasks {
        let role = task.role.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string());
        println!("  - {} [{}]: {}", task.id, role, task.summary);
    }

    // Detach the worker in its own session so it survives this process
    let exe = std::env::current_exe()?;
    let log_path = nm_core::env::runs_dir().join(job_id.as_str()).join("worker.log");
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log = std::fs::File::create(&log_path)?;
    let child = Command::new(exe)
        .arg("worker")
        .arg(job_id.as_str())
        .stdin(Stdio::null())
        .stdout(Stdio::from(log.try_clone()?))
        .stderr(Stdio::from(log))
        .process_group(0)
        .spawn()?;

    runner.record_worker_pid(&job_id, child.id())?;
    println!("job {} started (worker pid {})", job_id, child.id());
    Ok(())
}

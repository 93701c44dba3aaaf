// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `numerus` - local supervisor for generative-CLI agents.

mod commands;
mod exit_error;

use clap::{Parser, Subcommand};
use exit_error::ExitError;

/// Exit codes: 0 success, 1 usage, 2 job failed, 3 cancelled, 4 internal.
pub(crate) const EXIT_OK: i32 = 0;
pub(crate) const EXIT_USAGE: i32 = 1;
pub(crate) const EXIT_JOB_FAILED: i32 = 2;
pub(crate) const EXIT_CANCELLED: i32 = 3;
pub(crate) const EXIT_INTERNAL: i32 = 4;

#[derive(Parser)]
#[command(name = "numerus", about = "Decompose an objective into agent tasks and supervise them")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Prompt for an objective interactively and launch it
    Start {
        /// Objective to run (skips the prompt)
        #[arg(short, long)]
        objective: Option<String>,
    },
    /// Launch a job for the given objective
    Run {
        /// Objective text handed to the planner
        objective: String,
    },
    /// Show all jobs and their task states
    Status,
    /// Show logs for a job (or one of its tasks)
    Logs {
        /// Job id (or unique prefix)
        job_id: String,
        /// Task id within the job
        #[arg(long)]
        task: Option<String>,
        /// Follow log output
        #[arg(long, short)]
        follow: bool,
    },
    /// Terminate a running job
    Kill {
        /// Job id (or unique prefix)
        job_id: String,
    },
    /// Internal: drive a planned job to completion (spawned by `run`)
    #[command(hide = true)]
    Worker {
        job_id: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("numerus=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help/version are not usage errors
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    let _ = e.print();
                    EXIT_OK
                }
                _ => {
                    let _ = e.print();
                    EXIT_USAGE
                }
            };
            std::process::exit(code);
        }
    };

    let result = match cli.command {
        Command::Start { objective } => commands::run::start(objective).await,
        Command::Run { objective } => commands::run::run(objective).await,
        Command::Status => commands::status::status(),
        Command::Logs { job_id, task, follow } => commands::logs::logs(&job_id, task.as_deref(), follow),
        Command::Kill { job_id } => commands::kill::kill(&job_id),
        Command::Worker { job_id } => commands::worker::worker(&job_id).await,
    };

    match result {
        Ok(()) => std::process::exit(EXIT_OK),
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            std::process::exit(e.code);
        }
    }
}

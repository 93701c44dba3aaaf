// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access.

use std::path::PathBuf;
use std::time::Duration;

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse::<u64>().ok())
}

/// Root directory for per-job run artifacts: `RUNS_DIR`, default `./runs`.
pub fn runs_dir() -> PathBuf {
    std::env::var("RUNS_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("runs"))
}

/// Durable store path: `STORE_PATH`, default `./store/tasks.db`.
pub fn store_path() -> PathBuf {
    std::env::var("STORE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("store/tasks.db"))
}

/// Audit memory store path: `MEMORY_STORE_PATH`, default `./store/memory.db`.
pub fn memory_store_path() -> PathBuf {
    std::env::var("MEMORY_STORE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("store/memory.db"))
}

/// Agent binary invoked in plan/claim/execute modes: `AGENT_BIN`.
pub fn agent_bin() -> String {
    std::env::var("AGENT_BIN").unwrap_or_else(|_| "codex".to_string())
}

/// Concurrent executing-task cap per job: `MAX_PARALLEL_TASKS`, default 4.
pub fn max_parallel_tasks() -> usize {
    env_u64("MAX_PARALLEL_TASKS").map(|n| n.max(1) as usize).unwrap_or(4)
}

/// Execute-phase timeout: `TASK_TIMEOUT_SECONDS`, default 600.
pub fn task_timeout() -> Duration {
    Duration::from_secs(env_u64("TASK_TIMEOUT_SECONDS").unwrap_or(600))
}

/// Plan-phase timeout: `PLAN_TIMEOUT_SECONDS`, default 120.
pub fn plan_timeout() -> Duration {
    Duration::from_secs(env_u64("PLAN_TIMEOUT_SECONDS").unwrap_or(120))
}

/// Claim-phase timeout: `CLAIM_TIMEOUT_SECONDS`, default 120.
pub fn claim_timeout() -> Duration {
    Duration::from_secs(env_u64("CLAIM_TIMEOUT_SECONDS").unwrap_or(120))
}

/// Grace period between SIGTERM and SIGKILL on cancellation:
/// `CANCEL_GRACE_SECONDS`, default 10.
pub fn cancel_grace() -> Duration {
    Duration::from_secs(env_u64("CANCEL_GRACE_SECONDS").unwrap_or(10))
}

/// Retry budget per task: `TASK_RETRY_LIMIT`, default 2.
pub fn retry_limit() -> u32 {
    env_u64("TASK_RETRY_LIMIT").map(|n| n as u32).unwrap_or(2)
}

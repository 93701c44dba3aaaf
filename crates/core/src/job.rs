// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identifier and lifecycle state.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a job.
    ///
    /// Each submitted objective gets a job ID that names its run directory,
    /// its journal, and its rows in the store.
    pub struct JobId("job-");
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Agent is producing the plan
    Planning,
    /// Task DAG is being driven
    Running,
    /// Every task completed
    Done,
    /// Planning failed or a task exhausted its retries
    Failed,
    /// Cancellation requested, tasks draining
    Cancelling,
    /// All tasks reached a terminal state after cancellation
    Cancelled,
}

impl JobStatus {
    /// Terminal statuses are never left once persisted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Cancelled)
    }
}

crate::simple_display! {
    JobStatus {
        Planning => "planning",
        Running => "running",
        Done => "done",
        Failed => "failed",
        Cancelling => "cancelling",
        Cancelled => "cancelled",
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planning" => Ok(JobStatus::Planning),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            "cancelling" => Ok(JobStatus::Cancelling),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A submitted objective and its run state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// The user objective driving this job
    pub objective: String,
    pub status: JobStatus,
    /// Directory agent processes execute in
    pub working_dir: PathBuf,
    pub created_at_ms: u64,
    /// Pid of the detached worker process driving the DAG, once started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_pid: Option<u32>,
    /// Path of the persisted plan, once planning succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn new(
        id: JobId,
        objective: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        created_at_ms: u64,
    ) -> Self {
        Self {
            id,
            objective: objective.into(),
            status: JobStatus::Planning,
            working_dir: working_dir.into(),
            created_at_ms,
            worker_pid: None,
            plan_path: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            objective: String = "test objective",
            working_dir: PathBuf = "/tmp/test",
        }
        set {
            id: JobId = JobId::from_string("job-test0000"),
            status: JobStatus = JobStatus::Planning,
            created_at_ms: u64 = 1_000_000,
        }
        option {
            worker_pid: u32 = None,
            plan_path: PathBuf = None,
            error: String = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;

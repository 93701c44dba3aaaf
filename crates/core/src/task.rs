// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task identity, roles, and the per-task state machine.

use crate::job::JobId;
use serde::{Deserialize, Serialize};

/// Planner-chosen task identifier, unique within a job.
///
/// Unlike [`JobId`], task ids come from the plan JSON (kebab-case by
/// convention) and have no fixed length, so they are stored as owned strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for TaskId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

/// Per-task state machine.
///
/// Advanced only by the job runner:
/// `pending → analysis_pending → awaiting_go → executing → completed|failed`,
/// with `awaiting_go → analysis_pending` on a blocked claim and any
/// non-terminal state `→ cancelled` on job cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting on dependencies
    Pending,
    /// Agent is producing the resource claim
    AnalysisPending,
    /// Claim submitted to the arbiter, parked if blocked
    AwaitingGo,
    /// Locks held, agent executing
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }

    /// True for the transitions the state machine permits.
    pub fn can_transition(&self, next: TaskState) -> bool {
        use TaskState::*;
        match (self, next) {
            (Pending, AnalysisPending) => true,
            (AnalysisPending, AwaitingGo) => true,
            (AwaitingGo, Executing) => true,
            // Blocked claim parks the task back for re-evaluation
            (AwaitingGo, AnalysisPending) => true,
            (Executing, Completed) | (Executing, Failed) => true,
            // Claim-phase failures (parse error, spawn error, timeout)
            (AnalysisPending, Failed) | (AwaitingGo, Failed) => true,
            // Retry restarts the analysis with attempt += 1
            (Failed, AnalysisPending) => true,
            (s, Cancelled) => !s.is_terminal(),
            _ => false,
        }
    }
}

crate::simple_display! {
    TaskState {
        Pending => "pending",
        AnalysisPending => "analysis_pending",
        AwaitingGo => "awaiting_go",
        Executing => "executing",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskState::Pending),
            "analysis_pending" => Ok(TaskState::AnalysisPending),
            "awaiting_go" => Ok(TaskState::AwaitingGo),
            "executing" => Ok(TaskState::Executing),
            "completed" => Ok(TaskState::Completed),
            "failed" => Ok(TaskState::Failed),
            "cancelled" => Ok(TaskState::Cancelled),
            other => Err(format!("unknown task state: {other}")),
        }
    }
}

/// Role annotation produced by the role-assignment pass.
///
/// Metadata only: passed through to the execute prompt, never consulted by
/// the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Queen,
    Planner,
    Executor,
    Reviewer,
}

crate::simple_display! {
    Role {
        Queen => "queen",
        Planner => "planner",
        Executor => "executor",
        Reviewer => "reviewer",
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queen" => Ok(Role::Queen),
            "planner" => Ok(Role::Planner),
            "executor" => Ok(Role::Executor),
            "reviewer" => Ok(Role::Reviewer),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// One role entry from the role-assignment output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub task_id: TaskId,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A sub-task of a job: one node of the plan DAG.
///
/// Created once at plan parse, mutated only by the job runner, never deleted
/// (retained for audit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: JobId,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    /// Task ids within the same job that must complete first
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    /// Declared read intents (raw planner paths, normalized at claim time)
    #[serde(default)]
    pub reads: Vec<String>,
    /// Declared write intents
    #[serde(default)]
    pub writes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub state: TaskState,
    /// 1-based attempt counter, incremented on each retry
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_summary: Option<String>,
}

impl Task {
    /// Ready-queue ordering key: narrow write footprints first, then
    /// lexicographic task id. Biases scheduling away from head-of-line
    /// blocking on wide writers.
    pub fn schedule_key(&self) -> (usize, &str) {
        (self.writes.len(), self.id.as_str())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

crate::builder! {
    pub struct TaskBuilder => Task {
        into {
            id: TaskId = "t1",
            summary: String = "test task",
            description: String = "",
        }
        set {
            job_id: JobId = JobId::from_string("job-test0000"),
            dependencies: Vec<TaskId> = Vec::new(),
            reads: Vec<String> = Vec::new(),
            writes: Vec<String> = Vec::new(),
            state: TaskState = TaskState::Pending,
            attempt: u32 = 1,
        }
        option {
            role: Role = None,
            blocking_reason: String = None,
            last_exit_code: i32 = None,
            diff_summary: String = None,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;

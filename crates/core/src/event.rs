// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestration events published on the bus and mirrored to journals.
//!
//! Serializes with `{"event": "name", ...fields}` format. Topic names are
//! dotted: `job.*` for orchestration events, `terminal.*` for PTY events.

use crate::job::JobId;
use crate::respath::ResourcePath;
use crate::task::{RoleAssignment, TaskId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Events describing state transitions in the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    PlanCreated {
        job_id: JobId,
        objective: String,
        task_count: usize,
        plan_path: PathBuf,
    },

    PlanInvalid {
        job_id: JobId,
        reason: String,
    },

    RolesAssigned {
        job_id: JobId,
        roles: Vec<RoleAssignment>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strategy: Option<String>,
    },

    ClaimRecorded {
        job_id: JobId,
        task_id: TaskId,
        attempt: u32,
        reads: Vec<ResourcePath>,
        writes: Vec<ResourcePath>,
        commands: Vec<String>,
    },

    ClaimBlocked {
        job_id: JobId,
        task_id: TaskId,
        reason: String,
        waiting_for: Vec<ResourcePath>,
        holders: Vec<TaskId>,
    },

    ClaimUnblocked {
        job_id: JobId,
        task_id: TaskId,
    },

    ClaimApproved {
        job_id: JobId,
        task_id: TaskId,
        attempt: u32,
        writes: Vec<ResourcePath>,
    },

    LocksReleased {
        job_id: JobId,
        task_id: TaskId,
        paths: Vec<ResourcePath>,
    },

    TaskCompleted {
        job_id: JobId,
        task_id: TaskId,
        attempt: u32,
        exit_code: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stdout_log: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        diff_summary: Option<String>,
    },

    TaskFailed {
        job_id: JobId,
        task_id: TaskId,
        attempt: u32,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },

    TaskCancelled {
        job_id: JobId,
        task_id: TaskId,
    },

    StoreError {
        job_id: JobId,
        error: String,
    },

    TerminalStarted {
        session_id: String,
        pid: i32,
    },

    TerminalStdout {
        session_id: String,
        chunk: String,
    },

    TerminalStderr {
        session_id: String,
        chunk: String,
    },

    TerminalExit {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
}

impl Event {
    /// Dotted topic name used for bus matching and journal records.
    pub fn topic(&self) -> &'static str {
        match self {
            Event::PlanCreated { .. } => "job.plan_created",
            Event::PlanInvalid { .. } => "job.plan_invalid",
            Event::RolesAssigned { .. } => "job.roles_assigned",
            Event::ClaimRecorded { .. } => "job.claim_recorded",
            Event::ClaimBlocked { .. } => "job.claim_blocked",
            Event::ClaimUnblocked { .. } => "job.claim_unblocked",
            Event::ClaimApproved { .. } => "job.claim_approved",
            Event::LocksReleased { .. } => "job.locks_released",
            Event::TaskCompleted { .. } => "job.task_completed",
            Event::TaskFailed { .. } => "job.task_failed",
            Event::TaskCancelled { .. } => "job.task_cancelled",
            Event::StoreError { .. } => "job.store_error",
            Event::TerminalStarted { .. } => "terminal.started",
            Event::TerminalStdout { .. } => "terminal.stdout",
            Event::TerminalStderr { .. } => "terminal.stderr",
            Event::TerminalExit { .. } => "terminal.exit",
        }
    }

    /// Short name without the topic prefix (journal `event` field).
    pub fn name(&self) -> &'static str {
        let topic = self.topic();
        topic.split_once('.').map(|(_, name)| name).unwrap_or(topic)
    }

    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Event::PlanCreated { job_id, .. }
            | Event::PlanInvalid { job_id, .. }
            | Event::RolesAssigned { job_id, .. }
            | Event::ClaimRecorded { job_id, .. }
            | Event::ClaimBlocked { job_id, .. }
            | Event::ClaimUnblocked { job_id, .. }
            | Event::ClaimApproved { job_id, .. }
            | Event::LocksReleased { job_id, .. }
            | Event::TaskCompleted { job_id, .. }
            | Event::TaskFailed { job_id, .. }
            | Event::TaskCancelled { job_id, .. }
            | Event::StoreError { job_id, .. } => Some(job_id),
            _ => None,
        }
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Event::ClaimRecorded { task_id, .. }
            | Event::ClaimBlocked { task_id, .. }
            | Event::ClaimUnblocked { task_id, .. }
            | Event::ClaimApproved { task_id, .. }
            | Event::LocksReleased { task_id, .. }
            | Event::TaskCompleted { task_id, .. }
            | Event::TaskFailed { task_id, .. }
            | Event::TaskCancelled { task_id, .. } => Some(task_id),
            _ => None,
        }
    }

    /// Event fields as a JSON object, stripped of the tag and identity keys
    /// (those live at the top level of the journal record).
    pub fn payload(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(map) = value.as_object_mut() {
            map.remove("event");
            map.remove("job_id");
            map.remove("task_id");
        }
        value
    }

    /// Build the journal record for this event.
    pub fn record(&self, ts_ms: u64) -> JournalRecord {
        JournalRecord {
            ts: ts_ms,
            event: self.name().to_string(),
            job_id: self.job_id().copied(),
            task_id: self.task_id().cloned(),
            payload: self.payload(),
        }
    }
}

/// One NDJSON line of a job or terminal journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Epoch milliseconds
    pub ts: u64,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub payload: serde_json::Value,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parse and validation errors.

use nm_core::TaskId;
use thiserror::Error;

/// Errors from plan, claim, and role parsing.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("no JSON object found in agent output")]
    NoJson,

    #[error("unbalanced JSON object in agent output")]
    Unbalanced,

    #[error("invalid {context} JSON: {source}")]
    Parse {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("plan must contain at least one task")]
    EmptyPlan,

    #[error("duplicate task id: {0}")]
    DuplicateTaskId(TaskId),

    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("dependency cycle among tasks: {}", format_ids(.0))]
    CycleDetected(Vec<TaskId>),

    #[error("task {task} declares an empty resource path")]
    EmptyResourcePath { task: TaskId },

    #[error("task id must not be empty")]
    EmptyTaskId,
}

impl PlanError {
    /// True when the job should abort before any task runs.
    pub fn is_cycle(&self) -> bool {
        matches!(self, PlanError::CycleDetected(_))
    }
}

fn format_ids(ids: &[TaskId]) -> String {
    ids.iter().map(TaskId::as_str).collect::<Vec<_>>().join(", ")
}

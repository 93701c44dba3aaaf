// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claim wire shape.

use crate::error::PlanError;
use crate::extract::extract_json;
use crate::plan::ResourcesDoc;
use nm_core::TaskId;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClaimDoc {
    #[serde(alias = "id", default)]
    task_id: String,
    resources: ResourcesDoc,
    #[serde(default)]
    execution: ExecutionDoc,
}

/// Forward-compatible: unknown members inside `execution` are ignored.
#[derive(Debug, Default, Deserialize)]
struct ExecutionDoc {
    #[serde(default)]
    commands: Vec<String>,
}

/// A parsed claim declaration, not yet normalized or decided.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimSpec {
    pub task_id: TaskId,
    pub reads: Vec<String>,
    pub writes: Vec<String>,
    pub commands: Vec<String>,
}

/// Parse claim-mode agent output.
///
/// `expected_task` fills in a missing `task_id`; a present one is trusted
/// as-is (the runner keys claims by its own task anyway).
pub fn parse_claim(raw: &str, expected_task: &TaskId) -> Result<ClaimSpec, PlanError> {
    let json = extract_json(raw)?;
    let doc: ClaimDoc = serde_json::from_str(json)
        .map_err(|source| PlanError::Parse { context: "claim", source })?;

    for path in doc.resources.reads.iter().chain(doc.resources.writes.iter()) {
        if path.trim().is_empty() {
            return Err(PlanError::EmptyResourcePath { task: expected_task.clone() });
        }
    }

    let task_id = if doc.task_id.trim().is_empty() {
        expected_task.clone()
    } else {
        TaskId::new(doc.task_id)
    };

    Ok(ClaimSpec {
        task_id,
        reads: doc.resources.reads,
        writes: doc.resources.writes,
        commands: doc.execution.commands,
    })
}

#[cfg(test)]
#[path = "claim_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Role-assignment output parsing and the keyword fallback.

use crate::error::PlanError;
use crate::extract::extract_json;
use crate::plan::Plan;
use nm_core::{Role, RoleAssignment, TaskId};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RolesDoc {
    #[serde(default)]
    roles: Vec<RoleEntryDoc>,
    #[serde(default)]
    strategy: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoleEntryDoc {
    #[serde(alias = "task_id", default)]
    id: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    notes: Option<String>,
}

/// Parsed role assignments plus the planner's strategy note.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoleSheet {
    pub assignments: Vec<RoleAssignment>,
    pub strategy: Option<String>,
}

impl RoleSheet {
    pub fn role_for(&self, id: &TaskId) -> Option<Role> {
        self.assignments.iter().find(|a| &a.task_id == id).map(|a| a.role)
    }
}

/// Parse role-mode agent output.
///
/// Entries with an unknown role or a task id not present in the plan are
/// dropped rather than failing the pass; role assignment is advisory.
pub fn parse_roles(raw: &str, plan: &Plan) -> Result<RoleSheet, PlanError> {
    let json = extract_json(raw)?;
    let doc: RolesDoc = serde_json::from_str(json)
        .map_err(|source| PlanError::Parse { context: "roles", source })?;

    let mut assignments = Vec::new();
    for entry in doc.roles {
        let Ok(role) = entry.role.trim().to_ascii_lowercase().parse::<Role>() else {
            continue;
        };
        let task_id = TaskId::new(entry.id.trim());
        if task_id.is_empty() || plan.get(&task_id).is_none() {
            continue;
        }
        let notes = entry.notes.filter(|n| !n.trim().is_empty());
        assignments.push(RoleAssignment { task_id, role, notes });
    }

    Ok(RoleSheet { assignments, strategy: doc.strategy })
}

/// Keyword heuristic used when the role pass produced nothing usable:
/// planning-flavored summaries get `planner`, review/test summaries get
/// `reviewer`, everything else executes.
pub fn fallback_roles(plan: &Plan) -> RoleSheet {
    let assignments = plan
        .tasks
        .iter()
        .map(|task| {
            let lower = task.summary.to_lowercase();
            let role = if ["plan", "spec", "analysis"].iter().any(|k| lower.contains(k)) {
                Role::Planner
            } else if lower.contains("review") || lower.contains("test") {
                Role::Reviewer
            } else {
                Role::Executor
            };
            RoleAssignment { task_id: task.id.clone(), role, notes: None }
        })
        .collect();
    RoleSheet { assignments, strategy: None }
}

#[cfg(test)]
#[path = "roles_tests.rs"]
mod tests;

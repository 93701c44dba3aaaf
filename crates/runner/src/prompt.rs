// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt headers injected on the agent's stdin.
//!
//! The agent binary distinguishes its three modes (plus role assignment) by
//! the `NUMERUS_* V1` header on the first line.

use nm_core::{Claim, Task};
use nm_plan::Plan;

/// Plan-mode prompt: objective in, task-DAG JSON out.
pub(crate) fn plan_prompt(objective: &str) -> String {
    format!(
        "NUMERUS_PLAN V1. OBJECTIVE: {}. \
         Return JSON only with schema: \
         {{\"objective\": string, \"tasks\": [{{\"id\": string, \"summary\": string, \
         \"description\": string, \"dependencies\": [string], \
         \"resources\": {{\"reads\": [string], \"writes\": [string]}}}}]}}. \
         Use concise ids (kebab-case).",
        objective.trim()
    )
}

/// Role-mode prompt: annotate each task with a role.
pub(crate) fn roles_prompt(plan: &Plan) -> String {
    let tasks: String = plan
        .tasks
        .iter()
        .map(|t| format!("- {}: {}\n", t.id, t.summary))
        .collect();
    format!(
        "NUMERUS_ROLES V1\nOBJECTIVE: {}\nTASKS:\n{}\n\
         Assign a role from the set [queen, planner, executor, reviewer] to each task.\n\
         Return JSON with schema:\n\
         {{\"roles\": [{{\"id\": \"task-id\", \"role\": \"executor\", \"notes\": \"optional\"}}], \
         \"strategy\": \"short guidance\"}}",
        plan.objective, tasks
    )
}

/// Claim-mode prompt: one task's declared reads/writes/commands out.
pub(crate) fn claim_prompt(objective: &str, task: &Task) -> String {
    format!(
        "NUMERUS_CLAIM V1\nTASK_ID: {}\nOBJECTIVE: {}\nSUMMARY: {}\nDESCRIPTION: {}\n\
         Return JSON ONLY with keys: task_id, resources{{reads,writes}}, execution{{commands}}.",
        task.id, objective, task.summary, task.description
    )
}

/// Execute-mode prompt: approved claim attached, GO given.
pub(crate) fn execute_prompt(objective: &str, task: &Task, claim: &Claim) -> String {
    let resources = serde_json::json!({
        "reads": claim.reads,
        "writes": claim.writes,
        "commands": claim.commands,
    });
    let role_line = task.role.map(|r| format!("ROLE: {r}\n")).unwrap_or_default();
    format!(
        "NUMERUS_EXECUTE V1\nTASK_ID: {}\n{}OBJECTIVE: {}\nSUMMARY: {}\nDESCRIPTION: {}\n\
         RESOURCES: {}\nAPPROVAL: GO\n\
         Perform the task and exit 0 on success, non-zero on failure.",
        task.id, role_line, objective, task.summary, task.description, resources
    )
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan wire shape, validation, and topological ordering.

use crate::error::PlanError;
use crate::extract::extract_json;
use nm_core::{Role, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Wire shape of the planner output.
///
/// Unknown fields are rejected at the top level; the nested `resources`
/// block stays forward-compatible. Field aliases follow what planners
/// actually emit (`goal`, `task_id`, `title`, `details`, `requires`).
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct PlanDoc {
    #[serde(alias = "goal", default)]
    objective: String,
    tasks: Vec<TaskDoc>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct TaskDoc {
    #[serde(alias = "task_id")]
    id: String,
    #[serde(alias = "title", default)]
    summary: String,
    #[serde(alias = "details", default)]
    description: String,
    #[serde(alias = "requires", default)]
    dependencies: Vec<String>,
    resources: ResourcesDoc,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
}

/// Forward-compatible: unknown members inside `resources` are ignored.
#[derive(Debug, Default, Deserialize, Serialize)]
pub(crate) struct ResourcesDoc {
    pub(crate) reads: Vec<String>,
    pub(crate) writes: Vec<String>,
}

/// A validated plan: the objective plus an acyclic task graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub objective: String,
    pub tasks: Vec<PlanTask>,
}

/// One node of the plan DAG.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanTask {
    pub id: TaskId,
    pub summary: String,
    pub description: String,
    pub dependencies: Vec<TaskId>,
    pub reads: Vec<String>,
    pub writes: Vec<String>,
    pub role: Option<Role>,
}

impl Plan {
    /// Task ids in a dependency-respecting order.
    ///
    /// Guaranteed to succeed on a validated plan; validation already ran the
    /// same traversal.
    pub fn topo_order(&self) -> Vec<TaskId> {
        topo_sort(&self.tasks).unwrap_or_else(|_| self.tasks.iter().map(|t| t.id.clone()).collect())
    }

    pub fn get(&self, id: &TaskId) -> Option<&PlanTask> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Serialize back to the plan wire shape (`plan.json`).
    pub fn to_json(&self) -> String {
        let doc = PlanDoc {
            objective: self.objective.clone(),
            tasks: self
                .tasks
                .iter()
                .map(|t| TaskDoc {
                    id: t.id.as_str().to_string(),
                    summary: t.summary.clone(),
                    description: t.description.clone(),
                    dependencies: t.dependencies.iter().map(|d| d.as_str().to_string()).collect(),
                    resources: ResourcesDoc { reads: t.reads.clone(), writes: t.writes.clone() },
                    role: t.role,
                })
                .collect(),
        };
        // PlanDoc contains only JSON-safe types
        serde_json::to_string_pretty(&doc).unwrap_or_default()
    }
}

/// Parse and validate planner output into a [`Plan`].
///
/// `fallback_objective` is used when the planner omitted the objective field
/// (the submitted objective is authoritative anyway).
pub fn parse_plan(raw: &str, fallback_objective: &str) -> Result<Plan, PlanError> {
    let json = extract_json(raw)?;
    let doc: PlanDoc = serde_json::from_str(json)
        .map_err(|source| PlanError::Parse { context: "plan", source })?;

    if doc.tasks.is_empty() {
        return Err(PlanError::EmptyPlan);
    }

    let mut tasks = Vec::with_capacity(doc.tasks.len());
    for task in doc.tasks {
        if task.id.trim().is_empty() {
            return Err(PlanError::EmptyTaskId);
        }
        let id = TaskId::new(task.id);
        for path in task.resources.reads.iter().chain(task.resources.writes.iter()) {
            if path.trim().is_empty() {
                return Err(PlanError::EmptyResourcePath { task: id });
            }
        }
        let summary = if task.summary.is_empty() {
            "No summary provided".to_string()
        } else {
            task.summary
        };
        tasks.push(PlanTask {
            id,
            summary,
            description: task.description,
            dependencies: task.dependencies.into_iter().map(TaskId::new).collect(),
            reads: task.resources.reads,
            writes: task.resources.writes,
            role: task.role,
        });
    }

    validate_graph(&tasks)?;

    let objective = if doc.objective.is_empty() {
        fallback_objective.to_string()
    } else {
        doc.objective
    };
    Ok(Plan { objective, tasks })
}

fn validate_graph(tasks: &[PlanTask]) -> Result<(), PlanError> {
    let mut seen: HashSet<&TaskId> = HashSet::new();
    for task in tasks {
        if !seen.insert(&task.id) {
            return Err(PlanError::DuplicateTaskId(task.id.clone()));
        }
    }
    for task in tasks {
        for dep in &task.dependencies {
            if !seen.contains(dep) {
                return Err(PlanError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    topo_sort(tasks).map(|_| ())
}

/// Kahn topological sort; the error carries the tasks stuck on the cycle.
fn topo_sort(tasks: &[PlanTask]) -> Result<Vec<TaskId>, PlanError> {
    let mut in_degree: HashMap<&TaskId, usize> =
        tasks.iter().map(|t| (&t.id, t.dependencies.len())).collect();
    let mut dependents: HashMap<&TaskId, Vec<&TaskId>> = HashMap::new();
    for task in tasks {
        for dep in &task.dependencies {
            dependents.entry(dep).or_default().push(&task.id);
        }
    }

    // Seed with ready tasks in plan order for a stable result
    let mut queue: VecDeque<&TaskId> = tasks
        .iter()
        .filter(|t| t.dependencies.is_empty())
        .map(|t| &t.id)
        .collect();

    let mut order = Vec::with_capacity(tasks.len());
    while let Some(id) = queue.pop_front() {
        order.push(id.clone());
        if let Some(next) = dependents.get(id) {
            for &dependent in next {
                let degree = in_degree.get_mut(dependent).map(|d| {
                    *d -= 1;
                    *d
                });
                if degree == Some(0) {
                    queue.push_back(dependent);
                }
            }
        }
    }

    if order.len() != tasks.len() {
        let stuck: Vec<TaskId> = tasks
            .iter()
            .filter(|t| !order.contains(&t.id))
            .map(|t| t.id.clone())
            .collect();
        return Err(PlanError::CycleDetected(stuck));
    }
    Ok(order)
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;

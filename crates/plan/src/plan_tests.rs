// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

const TWO_TASK_PLAN: &str = r#"
Here is your plan:
{
  "objective": "ship the feature",
  "tasks": [
    {
      "id": "build",
      "summary": "Build it",
      "description": "",
      "dependencies": [],
      "resources": {"reads": [], "writes": ["src/lib.rs"]}
    },
    {
      "id": "test",
      "summary": "Test it",
      "description": "run the suite",
      "dependencies": ["build"],
      "resources": {"reads": ["src/lib.rs"], "writes": []}
    }
  ]
}
Thanks!
"#;

#[test]
fn parses_plan_with_surrounding_prose() {
    let plan = parse_plan(TWO_TASK_PLAN, "fallback").unwrap();
    assert_eq!(plan.objective, "ship the feature");
    assert_eq!(plan.tasks.len(), 2);
    assert_eq!(plan.tasks[1].dependencies, vec![TaskId::new("build")]);
    assert_eq!(plan.tasks[1].reads, vec!["src/lib.rs"]);
}

#[test]
fn missing_objective_uses_fallback() {
    let raw = r#"{"tasks": [{"id": "t1", "summary": "x", "resources": {"reads": [], "writes": []}}]}"#;
    let plan = parse_plan(raw, "the real objective").unwrap();
    assert_eq!(plan.objective, "the real objective");
}

#[test]
fn wire_aliases_are_accepted() {
    let raw = r#"{
      "goal": "aliased",
      "tasks": [{
        "task_id": "t1",
        "title": "aliased summary",
        "details": "aliased description",
        "requires": [],
        "resources": {"reads": [], "writes": []}
      }]
    }"#;
    let plan = parse_plan(raw, "").unwrap();
    assert_eq!(plan.objective, "aliased");
    assert_eq!(plan.tasks[0].summary, "aliased summary");
    assert_eq!(plan.tasks[0].description, "aliased description");
}

#[test]
fn unknown_top_level_field_is_rejected() {
    let raw = r#"{"tasks": [], "confidence": 0.9}"#;
    assert!(matches!(parse_plan(raw, ""), Err(PlanError::Parse { context: "plan", .. })));
}

#[test]
fn unknown_nested_resource_field_is_tolerated() {
    let raw = r#"{"tasks": [{"id": "t1", "summary": "x",
        "resources": {"reads": [], "writes": [], "network": true}}]}"#;
    assert!(parse_plan(raw, "").is_ok());
}

#[test]
fn empty_task_list_is_rejected() {
    assert!(matches!(parse_plan(r#"{"tasks": []}"#, ""), Err(PlanError::EmptyPlan)));
}

#[test]
fn empty_summary_gets_placeholder() {
    let raw = r#"{"tasks": [{"id": "t1", "resources": {"reads": [], "writes": []}}]}"#;
    let plan = parse_plan(raw, "").unwrap();
    assert_eq!(plan.tasks[0].summary, "No summary provided");
}

#[test]
fn duplicate_ids_are_rejected() {
    let raw = r#"{"tasks": [
        {"id": "t1", "summary": "a", "resources": {"reads": [], "writes": []}},
        {"id": "t1", "summary": "b", "resources": {"reads": [], "writes": []}}
    ]}"#;
    assert!(matches!(parse_plan(raw, ""), Err(PlanError::DuplicateTaskId(id)) if id.as_str() == "t1"));
}

#[test]
fn unknown_dependency_is_rejected() {
    let raw = r#"{"tasks": [
        {"id": "t1", "summary": "a", "dependencies": ["ghost"],
         "resources": {"reads": [], "writes": []}}
    ]}"#;
    assert!(matches!(
        parse_plan(raw, ""),
        Err(PlanError::UnknownDependency { dependency, .. }) if dependency.as_str() == "ghost"
    ));
}

#[test]
fn two_task_cycle_is_rejected() {
    let raw = r#"{"tasks": [
        {"id": "t1", "summary": "a", "dependencies": ["t2"],
         "resources": {"reads": [], "writes": []}},
        {"id": "t2", "summary": "b", "dependencies": ["t1"],
         "resources": {"reads": [], "writes": []}}
    ]}"#;
    match parse_plan(raw, "") {
        Err(PlanError::CycleDetected(stuck)) => assert_eq!(stuck.len(), 2),
        other => panic!("expected cycle, got: {other:?}"),
    }
}

#[test]
fn self_dependency_is_a_cycle() {
    let raw = r#"{"tasks": [
        {"id": "t1", "summary": "a", "dependencies": ["t1"],
         "resources": {"reads": [], "writes": []}}
    ]}"#;
    assert!(matches!(parse_plan(raw, ""), Err(PlanError::CycleDetected(_))));
}

#[test]
fn empty_resource_path_is_rejected() {
    let raw = r#"{"tasks": [
        {"id": "t1", "summary": "a", "resources": {"reads": [""], "writes": []}}
    ]}"#;
    assert!(matches!(parse_plan(raw, ""), Err(PlanError::EmptyResourcePath { .. })));
}

#[test]
fn missing_resources_block_is_rejected() {
    let raw = r#"{"tasks": [{"id": "t1", "summary": "a"}]}"#;
    assert!(matches!(parse_plan(raw, ""), Err(PlanError::Parse { .. })));
}

#[test]
fn topo_order_respects_dependencies() {
    let plan = parse_plan(TWO_TASK_PLAN, "").unwrap();
    let order = plan.topo_order();
    let build = order.iter().position(|t| t.as_str() == "build").unwrap();
    let test = order.iter().position(|t| t.as_str() == "test").unwrap();
    assert!(build < test);
}

#[test]
fn diamond_topo_order_is_valid() {
    let raw = r#"{"tasks": [
        {"id": "d", "summary": "x", "dependencies": ["b", "c"], "resources": {"reads": [], "writes": []}},
        {"id": "b", "summary": "x", "dependencies": ["a"], "resources": {"reads": [], "writes": []}},
        {"id": "c", "summary": "x", "dependencies": ["a"], "resources": {"reads": [], "writes": []}},
        {"id": "a", "summary": "x", "dependencies": [], "resources": {"reads": [], "writes": []}}
    ]}"#;
    let plan = parse_plan(raw, "").unwrap();
    let order = plan.topo_order();
    let pos = |id: &str| order.iter().position(|t| t.as_str() == id).unwrap();
    assert!(pos("a") < pos("b"));
    assert!(pos("a") < pos("c"));
    assert!(pos("b") < pos("d"));
    assert!(pos("c") < pos("d"));
}

#[test]
fn round_trip_preserves_plan() {
    let plan = parse_plan(TWO_TASK_PLAN, "").unwrap();
    let rehydrated = parse_plan(&plan.to_json(), "").unwrap();
    assert_eq!(plan, rehydrated);
}

// =============================================================================
// Property: serialize → parse is identity for arbitrary linear-chain plans
// =============================================================================

fn task_id_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,12}"
}

proptest! {
    #[test]
    fn chain_plan_round_trips(
        ids in proptest::collection::btree_set(task_id_strategy(), 1..8),
        objective in "[a-zA-Z0-9 ]{0,40}",
    ) {
        // Build a chain: each task depends on the previous one
        let ids: Vec<String> = ids.into_iter().collect();
        let tasks: Vec<PlanTask> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| PlanTask {
                id: TaskId::new(id.clone()),
                summary: format!("task {id}"),
                description: String::new(),
                dependencies: if i == 0 {
                    vec![]
                } else {
                    vec![TaskId::new(ids[i - 1].clone())]
                },
                reads: vec![format!("{id}.in")],
                writes: vec![format!("{id}.out")],
                role: None,
            })
            .collect();
        let plan = Plan { objective: objective.clone(), tasks };

        let rehydrated = parse_plan(&plan.to_json(), &objective).unwrap();
        prop_assert_eq!(plan, rehydrated);
    }
}

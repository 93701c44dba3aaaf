// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn sample_completed() -> Event {
    Event::TaskCompleted {
        job_id: JobId::from_string("job-abc"),
        task_id: TaskId::new("t1"),
        attempt: 2,
        exit_code: 0,
        stdout_log: Some(PathBuf::from("t1/stdout.log")),
        diff_summary: None,
    }
}

#[test]
fn topics_are_dotted() {
    assert_eq!(sample_completed().topic(), "job.task_completed");
    assert_eq!(
        Event::TerminalExit { session_id: "ses-1".into(), exit_code: Some(0) }.topic(),
        "terminal.exit"
    );
}

#[test]
fn name_strips_topic_prefix() {
    assert_eq!(sample_completed().name(), "task_completed");
    assert_eq!(
        Event::TerminalStdout { session_id: "s".into(), chunk: "x".into() }.name(),
        "stdout"
    );
}

#[test]
fn job_and_task_id_extraction() {
    let ev = sample_completed();
    assert_eq!(ev.job_id().map(|j| j.as_str()), Some("job-abc"));
    assert_eq!(ev.task_id().map(|t| t.as_str()), Some("t1"));

    let term = Event::TerminalStarted { session_id: "ses-1".into(), pid: 42 };
    assert!(term.job_id().is_none());
    assert!(term.task_id().is_none());
}

#[test]
fn payload_drops_identity_keys() {
    let payload = sample_completed().payload();
    let obj = payload.as_object().unwrap();
    assert!(!obj.contains_key("event"));
    assert!(!obj.contains_key("job_id"));
    assert!(!obj.contains_key("task_id"));
    assert_eq!(obj.get("exit_code"), Some(&serde_json::json!(0)));
    assert_eq!(obj.get("attempt"), Some(&serde_json::json!(2)));
}

#[test]
fn record_carries_identity_at_top_level() {
    let record = sample_completed().record(777);
    assert_eq!(record.ts, 777);
    assert_eq!(record.event, "task_completed");
    assert_eq!(record.job_id.map(|j| j.as_str().to_string()), Some("job-abc".to_string()));
    assert_eq!(record.task_id.as_deref(), Some("t1"));
}

#[test]
fn record_serializes_as_single_json_line() {
    let record = sample_completed().record(777);
    let line = serde_json::to_string(&record).unwrap();
    assert!(!line.contains('\n'));
    let back: JournalRecord = serde_json::from_str(&line).unwrap();
    assert_eq!(record, back);
}

#[test]
fn event_serde_round_trip() {
    let events = vec![
        Event::PlanCreated {
            job_id: JobId::from_string("job-abc"),
            objective: "obj".into(),
            task_count: 3,
            plan_path: PathBuf::from("runs/job-abc/plan.json"),
        },
        Event::ClaimBlocked {
            job_id: JobId::from_string("job-abc"),
            task_id: TaskId::new("t2"),
            reason: "write conflict on /w/a.txt".into(),
            waiting_for: vec![ResourcePath::from_normalized("/w/a.txt")],
            holders: vec![TaskId::new("t1")],
        },
        sample_completed(),
    ];
    for ev in events {
        let json = serde_json::to_string(&ev).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(ev, back);
    }
}

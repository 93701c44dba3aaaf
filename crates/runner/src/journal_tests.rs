// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nm_core::TaskId;

fn cancelled(job: &JobId, task: &str) -> Event {
    Event::TaskCancelled { job_id: *job, task_id: TaskId::new(task) }
}

#[test]
fn appends_ndjson_lines_per_job() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::new(dir.path());
    let job = JobId::from_string("job-a");

    journal.append(&cancelled(&job, "t1"), 1);
    journal.append(&cancelled(&job, "t2"), 2);

    let records = read_journal(&journal.job_dir(&job).join("events.ndjson")).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].task_id.as_deref(), Some("t1"));
    assert_eq!(records[0].ts, 1);
    assert_eq!(records[1].task_id.as_deref(), Some("t2"));
}

#[test]
fn jobs_get_separate_journals() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::new(dir.path());
    let a = JobId::from_string("job-a");
    let b = JobId::from_string("job-b");

    journal.append(&cancelled(&a, "t1"), 1);
    journal.append(&cancelled(&b, "t9"), 2);

    let a_records = read_journal(&journal.job_dir(&a).join("events.ndjson")).unwrap();
    let b_records = read_journal(&journal.job_dir(&b).join("events.ndjson")).unwrap();
    assert_eq!(a_records.len(), 1);
    assert_eq!(b_records.len(), 1);
    assert_eq!(b_records[0].task_id.as_deref(), Some("t9"));
}

#[test]
fn terminal_events_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::new(dir.path());
    journal.append(&Event::TerminalStdout { session_id: "ses-1".into(), chunk: "x".into() }, 1);
    // No job dir was created at all
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[test]
fn record_format_matches_contract() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::new(dir.path());
    let job = JobId::from_string("job-a");
    journal.append(&cancelled(&job, "t1"), 42);

    let content =
        std::fs::read_to_string(journal.job_dir(&job).join("events.ndjson")).unwrap();
    let value: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
    assert_eq!(value["ts"], 42);
    assert_eq!(value["event"], "task_cancelled");
    assert_eq!(value["job_id"], "job-a");
    assert_eq!(value["task_id"], "t1");
    assert!(value["payload"].is_object());
}

#[test]
fn task_dir_layout() {
    let journal = Journal::new("/runs");
    let job = JobId::from_string("job-a");
    assert_eq!(journal.job_dir(&job), std::path::Path::new("/runs/job-a"));
    assert_eq!(journal.task_dir(&job, "t1"), std::path::Path::new("/runs/job-a/t1"));
}

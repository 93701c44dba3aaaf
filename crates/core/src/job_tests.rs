// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_job_starts_planning() {
    let job = Job::new(JobId::new(), "refactor the parser", "/tmp/work", 1234);
    assert_eq!(job.status, JobStatus::Planning);
    assert_eq!(job.created_at_ms, 1234);
    assert!(job.worker_pid.is_none());
    assert!(!job.is_terminal());
}

#[test]
fn terminal_statuses() {
    assert!(JobStatus::Done.is_terminal());
    assert!(JobStatus::Failed.is_terminal());
    assert!(JobStatus::Cancelled.is_terminal());
    assert!(!JobStatus::Cancelling.is_terminal());
    assert!(!JobStatus::Running.is_terminal());
}

#[test]
fn status_display_parse_round_trip() {
    for status in [
        JobStatus::Planning,
        JobStatus::Running,
        JobStatus::Done,
        JobStatus::Failed,
        JobStatus::Cancelling,
        JobStatus::Cancelled,
    ] {
        let parsed: JobStatus = status.to_string().parse().unwrap();
        assert_eq!(parsed, status);
    }
}

#[test]
fn job_serde_round_trip() {
    let job = Job::builder().objective("ship it").error("boom").build();
    let json = serde_json::to_string(&job).unwrap();
    let back: Job = serde_json::from_str(&json).unwrap();
    assert_eq!(job, back);
}

#[test]
fn job_id_has_prefix() {
    let id = JobId::new();
    assert!(id.as_str().starts_with("job-"));
}

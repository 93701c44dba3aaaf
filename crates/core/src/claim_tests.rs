// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn claim(reads: &[&str], writes: &[&str]) -> Claim {
    Claim {
        job_id: JobId::from_string("job-x"),
        task_id: TaskId::new("t1"),
        attempt: 1,
        reads: reads.iter().map(|p| ResourcePath::from_normalized(*p)).collect(),
        writes: writes.iter().map(|p| ResourcePath::from_normalized(*p)).collect(),
        commands: vec![],
        decision: ClaimDecision::Pending,
        blocking_reason: None,
        created_at_ms: 0,
    }
}

#[test]
fn lock_requests_cover_reads_and_writes() {
    let c = claim(&["/w/in.txt"], &["/w/out.txt"]);
    let requests = c.lock_requests();
    assert_eq!(requests.len(), 2);
    assert!(requests
        .iter()
        .any(|(p, m)| p.as_str() == "/w/out.txt" && *m == LockMode::Write));
    assert!(requests
        .iter()
        .any(|(p, m)| p.as_str() == "/w/in.txt" && *m == LockMode::Read));
}

#[test]
fn write_dominates_read_on_same_path() {
    let c = claim(&["/w/both.txt"], &["/w/both.txt"]);
    let requests = c.lock_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].1, LockMode::Write);
}

#[test]
fn release_set_matches_request_set() {
    // Claim JSON → lock request set → release set is identity in the
    // multiset of paths.
    let c = claim(&["/w/a", "/w/b"], &["/w/c"]);
    let mut requested: Vec<String> =
        c.lock_requests().into_iter().map(|(p, _)| p.as_str().to_string()).collect();
    let mut declared: Vec<String> = c
        .reads
        .iter()
        .chain(c.writes.iter())
        .map(|p| p.as_str().to_string())
        .collect();
    requested.sort();
    declared.sort();
    assert_eq!(requested, declared);
}

#[test]
fn decision_parse_round_trip() {
    for d in [ClaimDecision::Pending, ClaimDecision::Approved, ClaimDecision::Blocked] {
        let parsed: ClaimDecision = d.to_string().parse().unwrap();
        assert_eq!(parsed, d);
    }
}

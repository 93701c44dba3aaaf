// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

fn job() -> JobId {
    JobId::from_string("job-arb")
}

fn path(s: &str) -> ResourcePath {
    ResourcePath::from_normalized(s)
}

fn write(s: &str) -> (ResourcePath, LockMode) {
    (path(s), LockMode::Write)
}

fn read(s: &str) -> (ResourcePath, LockMode) {
    (path(s), LockMode::Read)
}

fn grant(arbiter: &Arbiter, task: &str, requests: Vec<(ResourcePath, LockMode)>) -> Vec<Lock> {
    match arbiter.acquire_or_park(&job(), &task.into(), requests, 0) {
        AcquireOutcome::Granted(locks) => locks,
        AcquireOutcome::Parked { .. } => panic!("expected grant for {task}"),
    }
}

fn park(
    arbiter: &Arbiter,
    task: &str,
    requests: Vec<(ResourcePath, LockMode)>,
) -> (ParkTicket, Vec<TaskId>) {
    match arbiter.acquire_or_park(&job(), &task.into(), requests, 0) {
        AcquireOutcome::Parked { ticket, conflicting_holders, .. } => {
            (ticket, conflicting_holders)
        }
        AcquireOutcome::Granted(_) => panic!("expected park for {task}"),
    }
}

// =============================================================================
// Compatibility matrix
// =============================================================================

#[test]
fn disjoint_writes_are_granted() {
    let arbiter = Arbiter::new();
    grant(&arbiter, "t1", vec![write("/a")]);
    grant(&arbiter, "t2", vec![write("/b")]);
    assert_eq!(arbiter.active_locks().len(), 2);
}

#[test]
fn concurrent_reads_are_granted() {
    let arbiter = Arbiter::new();
    grant(&arbiter, "t1", vec![read("/shared")]);
    grant(&arbiter, "t2", vec![read("/shared")]);
    assert_eq!(arbiter.active_locks().len(), 2);
}

#[test]
fn write_blocks_write() {
    let arbiter = Arbiter::new();
    grant(&arbiter, "t1", vec![write("/a")]);
    let (_ticket, holders) = park(&arbiter, "t2", vec![write("/a")]);
    assert_eq!(holders, vec![TaskId::new("t1")]);
}

#[test]
fn write_blocks_read_and_read_blocks_write() {
    let arbiter = Arbiter::new();
    grant(&arbiter, "t1", vec![write("/a")]);
    park(&arbiter, "t2", vec![read("/a")]);

    let arbiter = Arbiter::new();
    grant(&arbiter, "t1", vec![read("/a")]);
    park(&arbiter, "t2", vec![write("/a")]);
}

#[test]
fn all_or_nothing_acquisition() {
    let arbiter = Arbiter::new();
    grant(&arbiter, "t1", vec![write("/a")]);
    // t2 wants /a and /b; it must not hold /b while parked on /a
    park(&arbiter, "t2", vec![write("/b"), write("/a")]);
    let held: Vec<_> = arbiter.active_locks().into_iter().map(|l| l.path).collect();
    assert_eq!(held, vec![path("/a")], "parked claim must hold nothing");
}

#[test]
fn evaluate_does_not_acquire() {
    let arbiter = Arbiter::new();
    assert_eq!(arbiter.evaluate(&[write("/a")]), Decision::Go);
    assert!(arbiter.active_locks().is_empty());
}

// =============================================================================
// Release and wake
// =============================================================================

#[tokio::test]
async fn release_grants_parked_claim() {
    let arbiter = Arbiter::new();
    grant(&arbiter, "t1", vec![write("/a")]);
    let (ticket, _) = park(&arbiter, "t2", vec![write("/a")]);

    let (released, woken) = arbiter.release(&job(), &"t1".into(), 1);
    assert_eq!(released, vec![path("/a")]);
    assert_eq!(woken, vec![(job(), TaskId::new("t2"))]);

    let locks = ticket.wait().await;
    assert_eq!(locks.len(), 1);
    assert_eq!(locks[0].holder_task.as_str(), "t2");
}

#[test]
fn release_is_total() {
    let arbiter = Arbiter::new();
    grant(&arbiter, "t1", vec![write("/a"), write("/b"), read("/c")]);
    let (released, _) = arbiter.release(&job(), &"t1".into(), 1);
    assert_eq!(released, vec![path("/a"), path("/b"), path("/c")]);
    assert!(arbiter.active_locks().is_empty());
}

#[tokio::test]
async fn parked_claims_wake_in_fifo_order() {
    let arbiter = Arbiter::new();
    grant(&arbiter, "holder", vec![write("/a")]);
    let (first, _) = park(&arbiter, "zz-first", vec![write("/a")]);
    let (_second, _) = park(&arbiter, "aa-second", vec![write("/a")]);

    let (_, woken) = arbiter.release(&job(), &"holder".into(), 1);
    // Only the earliest-parked conflicting claim gets the lock
    assert_eq!(woken, vec![(job(), TaskId::new("zz-first"))]);
    assert_eq!(arbiter.parked_count(), 1);

    let locks = first.wait().await;
    assert_eq!(locks[0].holder_task.as_str(), "zz-first");
}

#[test]
fn sweep_grants_every_claim_that_now_fits() {
    let arbiter = Arbiter::new();
    grant(&arbiter, "holder", vec![write("/a"), write("/b")]);
    park(&arbiter, "wants-a", vec![write("/a")]);
    park(&arbiter, "wants-b", vec![write("/b")]);

    let (_, woken) = arbiter.release(&job(), &"holder".into(), 1);
    assert_eq!(woken.len(), 2, "disjoint parked claims are granted in the same sweep");
    assert_eq!(arbiter.parked_count(), 0);
}

#[test]
fn granted_parked_claim_blocks_later_parked_claim() {
    let arbiter = Arbiter::new();
    grant(&arbiter, "holder", vec![write("/a")]);
    park(&arbiter, "early", vec![write("/a")]);
    park(&arbiter, "late", vec![write("/a")]);

    let (_, woken) = arbiter.release(&job(), &"holder".into(), 1);
    assert_eq!(woken, vec![(job(), TaskId::new("early"))]);
    // "late" stays parked behind the freshly granted "early"
    assert_eq!(arbiter.parked_count(), 1);
    assert_eq!(arbiter.active_locks()[0].holder_task.as_str(), "early");
}

#[test]
fn unpark_drops_a_waiting_claim() {
    let arbiter = Arbiter::new();
    grant(&arbiter, "t1", vec![write("/a")]);
    park(&arbiter, "t2", vec![write("/a")]);
    arbiter.unpark(&job(), &"t2".into());

    let (_, woken) = arbiter.release(&job(), &"t1".into(), 1);
    assert!(woken.is_empty());
    assert_eq!(arbiter.parked_count(), 0);
}

#[test]
fn release_without_locks_wakes_nobody() {
    let arbiter = Arbiter::new();
    grant(&arbiter, "t1", vec![write("/a")]);
    park(&arbiter, "t2", vec![write("/a")]);
    let (released, woken) = arbiter.release(&job(), &"stranger".into(), 1);
    assert!(released.is_empty());
    assert!(woken.is_empty());
    assert_eq!(arbiter.parked_count(), 1);
}

// =============================================================================
// Property: the lock table never violates the compatibility matrix
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    Acquire { task: u8, paths: Vec<(u8, bool)> },
    Release { task: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (
            0u8..6,
            proptest::collection::vec((0u8..4, proptest::bool::ANY), 1..4)
        )
            .prop_map(|(task, paths)| Op::Acquire { task, paths }),
        (0u8..6).prop_map(|task| Op::Release { task }),
    ]
}

proptest! {
    #[test]
    fn lock_table_exclusion_holds(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let arbiter = Arbiter::new();
        let mut held: std::collections::HashSet<u8> = std::collections::HashSet::new();

        for op in ops {
            match op {
                Op::Acquire { task, paths } => {
                    if held.contains(&task) {
                        continue; // one claim per executing task
                    }
                    let requests: Vec<(ResourcePath, LockMode)> = paths
                        .iter()
                        .map(|(p, is_write)| {
                            let mode = if *is_write { LockMode::Write } else { LockMode::Read };
                            (path(&format!("/p{p}")), mode)
                        })
                        .collect();
                    // Dedup: write dominates
                    let mut dedup: Vec<(ResourcePath, LockMode)> = Vec::new();
                    for (p, m) in requests {
                        if let Some(existing) = dedup.iter_mut().find(|(ep, _)| *ep == p) {
                            if m == LockMode::Write {
                                existing.1 = LockMode::Write;
                            }
                        } else {
                            dedup.push((p, m));
                        }
                    }
                    if let AcquireOutcome::Granted(_) = arbiter.acquire_or_park(
                        &job(),
                        &format!("t{task}").as_str().into(),
                        dedup,
                        0,
                    ) {
                        held.insert(task);
                    } else {
                        // Parked claims are dropped immediately so the model
                        // stays a pure acquire/release interleaving
                        arbiter.unpark(&job(), &format!("t{task}").as_str().into());
                    }
                }
                Op::Release { task } => {
                    arbiter.release(&job(), &format!("t{task}").as_str().into(), 0);
                    held.remove(&task);
                }
            }

            // Invariant: per path, at most one writer, and never a writer
            // alongside readers
            let locks = arbiter.active_locks();
            let mut by_path: std::collections::HashMap<&str, Vec<LockMode>> =
                std::collections::HashMap::new();
            for lock in &locks {
                by_path.entry(lock.path.as_str()).or_default().push(lock.mode);
            }
            for (p, modes) in by_path {
                let writers = modes.iter().filter(|m| **m == LockMode::Write).count();
                prop_assert!(writers <= 1, "multiple writers on {p}");
                if writers == 1 {
                    prop_assert_eq!(modes.len(), 1, "writer shares {} with other holders", p);
                }
            }
        }
    }
}

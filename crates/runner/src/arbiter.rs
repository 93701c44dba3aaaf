// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource arbiter: the per-file read/write lock table.
//!
//! One mutex guards the lock table and the park queue, so evaluate+acquire
//! is a single critical section and release+re-evaluation is another. Tasks
//! acquire all declared resources atomically and hold them only while
//! executing, so hold-and-wait (and with it deadlock) cannot occur.

use nm_core::{JobId, Lock, LockMode, ResourcePath, TaskId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;

/// Arbiter verdict on a claim.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Go,
    Blocked { reason: String, conflicting_holders: Vec<TaskId> },
}

/// Outcome of submitting a claim.
pub enum AcquireOutcome {
    /// All locks installed; the task may execute.
    Granted(Vec<Lock>),
    /// Conflict: the task is parked FIFO until a release lets it through.
    Parked { ticket: ParkTicket, reason: String, conflicting_holders: Vec<TaskId> },
}

/// A parked claim's wake-up handle.
///
/// The arbiter grants the locks inside its own critical section during a
/// release sweep; the waiter just picks them up here.
pub struct ParkTicket {
    inner: Arc<TicketInner>,
}

struct TicketInner {
    notify: Notify,
    granted: Mutex<Option<Vec<Lock>>>,
}

impl ParkTicket {
    /// Wait until a release sweep grants this claim.
    pub async fn wait(&self) -> Vec<Lock> {
        loop {
            if let Some(locks) = self.inner.granted.lock().take() {
                return locks;
            }
            self.inner.notify.notified().await;
        }
    }
}

#[derive(Clone)]
struct Holder {
    mode: LockMode,
    job: JobId,
    task: TaskId,
}

struct Parked {
    seq: u64,
    job: JobId,
    task: TaskId,
    requests: Vec<(ResourcePath, LockMode)>,
    ticket: Arc<TicketInner>,
}

#[derive(Default)]
struct ArbiterInner {
    /// Normalized path → current holders (one writer XOR n readers).
    locks: HashMap<ResourcePath, Vec<Holder>>,
    /// Blocked claims in park-sequence order.
    parked: Vec<Parked>,
    next_seq: u64,
}

/// The file-level lock arbiter.
#[derive(Default)]
pub struct Arbiter {
    inner: Mutex<ArbiterInner>,
}

impl Arbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate a claim without acquiring (two-phase check, test surface).
    pub fn evaluate(&self, requests: &[(ResourcePath, LockMode)]) -> Decision {
        let inner = self.inner.lock();
        evaluate_against(&inner.locks, requests)
    }

    /// Evaluate and, on GO, atomically install every requested lock.
    ///
    /// On conflict the claim is parked with a monotonic sequence; release
    /// sweeps re-evaluate parked claims in that order (FIFO among blockees).
    pub fn acquire_or_park(
        &self,
        job: &JobId,
        task: &TaskId,
        requests: Vec<(ResourcePath, LockMode)>,
        now_ms: u64,
    ) -> AcquireOutcome {
        let mut inner = self.inner.lock();
        match evaluate_against(&inner.locks, &requests) {
            Decision::Go => {
                let locks = install(&mut inner.locks, job, task, &requests, now_ms);
                AcquireOutcome::Granted(locks)
            }
            Decision::Blocked { reason, conflicting_holders } => {
                let seq = inner.next_seq;
                inner.next_seq += 1;
                let ticket = Arc::new(TicketInner {
                    notify: Notify::new(),
                    granted: Mutex::new(None),
                });
                inner.parked.push(Parked {
                    seq,
                    job: *job,
                    task: task.clone(),
                    requests,
                    ticket: Arc::clone(&ticket),
                });
                tracing::debug!(%job, %task, seq, reason, "claim parked");
                AcquireOutcome::Parked {
                    ticket: ParkTicket { inner: ticket },
                    reason,
                    conflicting_holders,
                }
            }
        }
    }

    /// Release every lock held by a task and wake parked claims.
    ///
    /// Parked claims are re-evaluated in park-sequence order; each one that
    /// now passes is granted inside this same critical section, with its
    /// locks installed before later claims are considered.
    ///
    /// Returns the released locks and the tasks granted by the sweep.
    pub fn release(&self, job: &JobId, task: &TaskId, now_ms: u64) -> (Vec<ResourcePath>, Vec<(JobId, TaskId)>) {
        let mut inner = self.inner.lock();

        let mut released = Vec::new();
        inner.locks.retain(|path, holders| {
            let before = holders.len();
            holders.retain(|h| !(h.job == *job && h.task == *task));
            if holders.len() != before {
                released.push(path.clone());
            }
            !holders.is_empty()
        });

        let mut woken = Vec::new();
        if !released.is_empty() {
            inner.parked.sort_by_key(|p| p.seq);
            let mut remaining = Vec::new();
            let parked = std::mem::take(&mut inner.parked);
            for entry in parked {
                match evaluate_against(&inner.locks, &entry.requests) {
                    Decision::Go => {
                        let locks = install(
                            &mut inner.locks,
                            &entry.job,
                            &entry.task,
                            &entry.requests,
                            now_ms,
                        );
                        *entry.ticket.granted.lock() = Some(locks);
                        entry.ticket.notify.notify_one();
                        woken.push((entry.job, entry.task.clone()));
                    }
                    Decision::Blocked { .. } => remaining.push(entry),
                }
            }
            inner.parked = remaining;
        }

        released.sort();
        (released, woken)
    }

    /// Drop a parked claim (task cancelled or failed while waiting).
    pub fn unpark(&self, job: &JobId, task: &TaskId) {
        let mut inner = self.inner.lock();
        inner.parked.retain(|p| !(p.job == *job && p.task == *task));
    }

    /// Current lock table contents.
    pub fn active_locks(&self) -> Vec<Lock> {
        let inner = self.inner.lock();
        let mut locks: Vec<Lock> = inner
            .locks
            .iter()
            .flat_map(|(path, holders)| {
                holders.iter().map(|h| Lock {
                    path: path.clone(),
                    mode: h.mode,
                    holder_task: h.task.clone(),
                    holder_job: h.job,
                    acquired_at_ms: 0,
                })
            })
            .collect();
        locks.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.holder_task.cmp(&b.holder_task)));
        locks
    }

    /// Number of claims currently parked.
    pub fn parked_count(&self) -> usize {
        self.inner.lock().parked.len()
    }
}

fn evaluate_against(
    locks: &HashMap<ResourcePath, Vec<Holder>>,
    requests: &[(ResourcePath, LockMode)],
) -> Decision {
    let mut conflicting: Vec<TaskId> = Vec::new();
    let mut blocked_paths: Vec<&ResourcePath> = Vec::new();

    for (path, mode) in requests {
        if let Some(holders) = locks.get(path) {
            for holder in holders {
                if !mode.compatible_with(holder.mode) {
                    if !conflicting.contains(&holder.task) {
                        conflicting.push(holder.task.clone());
                    }
                    if !blocked_paths.contains(&path) {
                        blocked_paths.push(path);
                    }
                }
            }
        }
    }

    if conflicting.is_empty() {
        Decision::Go
    } else {
        let paths: Vec<&str> = blocked_paths.iter().map(|p| p.as_str()).collect();
        Decision::Blocked {
            reason: format!("lock conflict on {}", paths.join(", ")),
            conflicting_holders: conflicting,
        }
    }
}

fn install(
    locks: &mut HashMap<ResourcePath, Vec<Holder>>,
    job: &JobId,
    task: &TaskId,
    requests: &[(ResourcePath, LockMode)],
    now_ms: u64,
) -> Vec<Lock> {
    requests
        .iter()
        .map(|(path, mode)| {
            locks.entry(path.clone()).or_default().push(Holder {
                mode: *mode,
                job: *job,
                task: task.clone(),
            });
            Lock {
                path: path.clone(),
                mode: *mode,
                holder_task: task.clone(),
                holder_job: *job,
                acquired_at_ms: now_ms,
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "arbiter_tests.rs"]
mod tests;

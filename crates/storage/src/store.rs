// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The authoritative orchestration store.
//!
//! Every state transition that touches more than one table (task state plus
//! lock mutations plus the event append) runs in a single transaction, so a
//! crash can never leave a task `executing` without its locks or vice versa.

use crate::error::{with_busy_retry, StoreError};
use crate::schema::SCHEMA;
use nm_core::{
    Claim, ClaimDecision, Event, Job, JobId, JobStatus, JournalRecord, Lock, LockMode,
    ResourcePath, Role, Task, TaskId, TaskState,
};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// What to do with tasks found `executing` after a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryMode {
    /// Reset interrupted tasks to `failed` (default).
    #[default]
    FailInterrupted,
    /// Re-queue interrupted tasks as `pending` for a fresh attempt.
    RequeueInterrupted,
}

/// Full durable state of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub job: Job,
    pub tasks: Vec<Task>,
}

/// SQLite-backed store for jobs, tasks, claims, locks, and events.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the store at `path` and run crash recovery.
    ///
    /// Recovery clears any lock whose holder is not `executing` and resets
    /// interrupted tasks per `recovery`.
    pub fn open(path: &Path, recovery: RecoveryMode) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        // journal_mode returns a result row, so it goes through query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;

        let mut store = Self { conn };
        store.recover(recovery)?;
        Ok(store)
    }

    /// Crash-recovery garbage collection.
    fn recover(&mut self, mode: RecoveryMode) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;

        let interrupted = match mode {
            RecoveryMode::FailInterrupted => tx.execute(
                "UPDATE tasks SET state = 'failed', blocking_reason = NULL
                 WHERE state = 'executing'",
                [],
            )?,
            RecoveryMode::RequeueInterrupted => tx.execute(
                "UPDATE tasks SET state = 'pending', blocking_reason = NULL
                 WHERE state = 'executing'",
                [],
            )?,
        };

        let stale = tx.execute(
            "DELETE FROM locks WHERE NOT EXISTS (
                 SELECT 1 FROM tasks t
                 WHERE t.job_id = locks.holder_job
                   AND t.id = locks.holder_task
                   AND t.state = 'executing'
             )",
            [],
        )?;

        tx.commit()?;
        if interrupted > 0 || stale > 0 {
            tracing::info!(interrupted, stale_locks = stale, "store crash recovery applied");
        }
        Ok(())
    }

    // === Jobs ===

    pub fn upsert_job(&mut self, job: &Job) -> Result<(), StoreError> {
        with_busy_retry(|| {
            self.conn.execute(
                "INSERT INTO jobs (id, objective, status, working_dir, created_at_ms,
                                   worker_pid, plan_path, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                     objective = excluded.objective,
                     status = excluded.status,
                     working_dir = excluded.working_dir,
                     worker_pid = excluded.worker_pid,
                     plan_path = excluded.plan_path,
                     error = excluded.error",
                params![
                    job.id.as_str(),
                    job.objective,
                    job.status.to_string(),
                    job.working_dir.to_string_lossy(),
                    job.created_at_ms,
                    job.worker_pid,
                    job.plan_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
                    job.error,
                ],
            )?;
            Ok(())
        })
    }

    pub fn update_job_status(
        &mut self,
        id: &JobId,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        with_busy_retry(|| {
            let changed = self.conn.execute(
                "UPDATE jobs SET status = ?2, error = COALESCE(?3, error) WHERE id = ?1",
                params![id.as_str(), status.to_string(), error],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound { kind: "job", id: id.to_string() });
            }
            Ok(())
        })
    }

    pub fn set_job_worker_pid(&mut self, id: &JobId, pid: u32) -> Result<(), StoreError> {
        with_busy_retry(|| {
            self.conn.execute(
                "UPDATE jobs SET worker_pid = ?2 WHERE id = ?1",
                params![id.as_str(), pid],
            )?;
            Ok(())
        })
    }

    pub fn set_job_plan_path(&mut self, id: &JobId, path: &Path) -> Result<(), StoreError> {
        with_busy_retry(|| {
            self.conn.execute(
                "UPDATE jobs SET plan_path = ?2 WHERE id = ?1",
                params![id.as_str(), path.to_string_lossy()],
            )?;
            Ok(())
        })
    }

    pub fn get_job(&self, id: &JobId) -> Result<Job, StoreError> {
        self.conn
            .query_row("SELECT * FROM jobs WHERE id = ?1", params![id.as_str()], job_from_row)
            .optional()?
            .ok_or_else(|| StoreError::NotFound { kind: "job", id: id.to_string() })
    }

    /// Jobs ordered newest first.
    pub fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let mut stmt =
            self.conn.prepare("SELECT * FROM jobs ORDER BY created_at_ms DESC, id DESC")?;
        let jobs = stmt.query_map([], job_from_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// Jobs whose status is not terminal (for restart re-hydration).
    pub fn active_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM jobs WHERE status NOT IN ('done', 'failed', 'cancelled')
             ORDER BY created_at_ms",
        )?;
        let jobs = stmt.query_map([], job_from_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    // === Tasks ===

    /// Insert a job's full task set in one transaction (plan parse time).
    pub fn insert_tasks(&mut self, tasks: &[Task]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        for task in tasks {
            tx.execute(
                "INSERT INTO tasks (job_id, id, summary, description, dependencies_json,
                                    reads_json, writes_json, role, state, attempt,
                                    blocking_reason, exit_code, diff_summary)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    task.job_id.as_str(),
                    task.id.as_str(),
                    task.summary,
                    task.description,
                    to_json(&task.dependencies)?,
                    to_json(&task.reads)?,
                    to_json(&task.writes)?,
                    task.role.map(|r| r.to_string()),
                    task.state.to_string(),
                    task.attempt,
                    task.blocking_reason,
                    task.last_exit_code,
                    task.diff_summary,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_task(&self, job_id: &JobId, task_id: &TaskId) -> Result<Task, StoreError> {
        self.conn
            .query_row(
                "SELECT * FROM tasks WHERE job_id = ?1 AND id = ?2",
                params![job_id.as_str(), task_id.as_str()],
                task_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound { kind: "task", id: task_id.to_string() })?
    }

    pub fn list_tasks(&self, job_id: &JobId) -> Result<Vec<Task>, StoreError> {
        let mut stmt =
            self.conn.prepare("SELECT * FROM tasks WHERE job_id = ?1 ORDER BY id")?;
        let tasks = stmt
            .query_map(params![job_id.as_str()], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        tasks.into_iter().collect()
    }

    pub fn set_task_role(
        &mut self,
        job_id: &JobId,
        task_id: &TaskId,
        role: Role,
    ) -> Result<(), StoreError> {
        with_busy_retry(|| {
            self.conn.execute(
                "UPDATE tasks SET role = ?3 WHERE job_id = ?1 AND id = ?2",
                params![job_id.as_str(), task_id.as_str(), role.to_string()],
            )?;
            Ok(())
        })
    }

    /// Advance a task's state, optionally recording a blocking reason and an
    /// event, inside one transaction. Rejects transitions the state machine
    /// does not permit.
    pub fn transition_task(
        &mut self,
        job_id: &JobId,
        task_id: &TaskId,
        next: TaskState,
        blocking_reason: Option<&str>,
        event: Option<(&Event, u64)>,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        check_transition(&tx, job_id, task_id, next)?;
        tx.execute(
            "UPDATE tasks SET state = ?3, blocking_reason = ?4 WHERE job_id = ?1 AND id = ?2",
            params![job_id.as_str(), task_id.as_str(), next.to_string(), blocking_reason],
        )?;
        if let Some((event, ts)) = event {
            append_event_tx(&tx, event, ts)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Increment the attempt counter (retry entering `analysis_pending`).
    pub fn bump_task_attempt(
        &mut self,
        job_id: &JobId,
        task_id: &TaskId,
    ) -> Result<u32, StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE tasks SET attempt = attempt + 1 WHERE job_id = ?1 AND id = ?2",
            params![job_id.as_str(), task_id.as_str()],
        )?;
        let attempt = tx.query_row(
            "SELECT attempt FROM tasks WHERE job_id = ?1 AND id = ?2",
            params![job_id.as_str(), task_id.as_str()],
            |row| row.get::<_, u32>(0),
        )?;
        tx.commit()?;
        Ok(attempt)
    }

    // === Claims ===

    pub fn record_claim(&mut self, claim: &Claim) -> Result<(), StoreError> {
        with_busy_retry(|| {
            self.conn.execute(
                "INSERT INTO claims (job_id, task_id, attempt, reads_json, writes_json,
                                     commands_json, decision, blocking_reason, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(job_id, task_id, attempt) DO UPDATE SET
                     reads_json = excluded.reads_json,
                     writes_json = excluded.writes_json,
                     commands_json = excluded.commands_json,
                     decision = excluded.decision,
                     blocking_reason = excluded.blocking_reason",
                params![
                    claim.job_id.as_str(),
                    claim.task_id.as_str(),
                    claim.attempt,
                    to_json(&claim.reads)?,
                    to_json(&claim.writes)?,
                    to_json(&claim.commands)?,
                    claim.decision.to_string(),
                    claim.blocking_reason,
                    claim.created_at_ms,
                ],
            )?;
            Ok(())
        })
    }

    pub fn update_claim_decision(
        &mut self,
        job_id: &JobId,
        task_id: &TaskId,
        attempt: u32,
        decision: ClaimDecision,
        blocking_reason: Option<&str>,
    ) -> Result<(), StoreError> {
        with_busy_retry(|| {
            self.conn.execute(
                "UPDATE claims SET decision = ?4, blocking_reason = ?5
                 WHERE job_id = ?1 AND task_id = ?2 AND attempt = ?3",
                params![
                    job_id.as_str(),
                    task_id.as_str(),
                    attempt,
                    decision.to_string(),
                    blocking_reason,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_claim(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
        attempt: u32,
    ) -> Result<Claim, StoreError> {
        self.conn
            .query_row(
                "SELECT * FROM claims WHERE job_id = ?1 AND task_id = ?2 AND attempt = ?3",
                params![job_id.as_str(), task_id.as_str(), attempt],
                claim_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound { kind: "claim", id: task_id.to_string() })?
    }

    // === Execution transitions (multi-table) ===

    /// `awaiting_go → executing`: persist the granted locks with the state
    /// change and the `claim_approved` event in one transaction.
    pub fn begin_execution(
        &mut self,
        job_id: &JobId,
        task_id: &TaskId,
        locks: &[Lock],
        event: &Event,
        ts_ms: u64,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        check_transition(&tx, job_id, task_id, TaskState::Executing)?;
        tx.execute(
            "UPDATE tasks SET state = 'executing', blocking_reason = NULL
             WHERE job_id = ?1 AND id = ?2",
            params![job_id.as_str(), task_id.as_str()],
        )?;
        for lock in locks {
            tx.execute(
                "INSERT INTO locks (path, mode, holder_job, holder_task, acquired_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    lock.path.as_str(),
                    lock.mode.to_string(),
                    lock.holder_job.as_str(),
                    lock.holder_task.as_str(),
                    lock.acquired_at_ms,
                ],
            )?;
        }
        append_event_tx(&tx, event, ts_ms)?;
        tx.commit()?;
        Ok(())
    }

    /// Terminal (or retryable-failed) transition out of `executing`: record
    /// the outcome, drop every lock the task holds, and append the outcome
    /// events, all in one transaction. Returns the released locks.
    pub fn finish_execution(
        &mut self,
        job_id: &JobId,
        task_id: &TaskId,
        next: TaskState,
        exit_code: Option<i32>,
        diff_summary: Option<&str>,
        events: &[(&Event, u64)],
    ) -> Result<Vec<Lock>, StoreError> {
        let tx = self.conn.transaction()?;
        check_transition(&tx, job_id, task_id, next)?;
        tx.execute(
            "UPDATE tasks SET state = ?3, exit_code = ?4,
                    diff_summary = COALESCE(?5, diff_summary), blocking_reason = NULL
             WHERE job_id = ?1 AND id = ?2",
            params![
                job_id.as_str(),
                task_id.as_str(),
                next.to_string(),
                exit_code,
                diff_summary,
            ],
        )?;
        let released = release_locks_tx(&tx, job_id, task_id)?;
        for (event, ts) in events {
            append_event_tx(&tx, event, *ts)?;
        }
        tx.commit()?;
        Ok(released)
    }

    // === Locks ===

    pub fn active_locks(&self) -> Result<Vec<Lock>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT * FROM locks ORDER BY path")?;
        let locks = stmt.query_map([], lock_from_row)?.collect::<Result<Vec<_>, _>>()?;
        locks.into_iter().collect()
    }

    // === Events ===

    pub fn append_event(&mut self, event: &Event, ts_ms: u64) -> Result<(), StoreError> {
        with_busy_retry(|| {
            append_event_conn(&self.conn, event, ts_ms)?;
            Ok(())
        })
    }

    /// A job's journal rows in append order.
    pub fn events_for_job(&self, job_id: &JobId) -> Result<Vec<JournalRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT ts_ms, event, job_id, task_id, payload_json
             FROM events WHERE job_id = ?1 ORDER BY seq",
        )?;
        let records = stmt
            .query_map(params![job_id.as_str()], |row| {
                Ok((
                    row.get::<_, u64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        records
            .into_iter()
            .map(|(ts, event, job, task, payload)| {
                Ok(JournalRecord {
                    ts,
                    event,
                    job_id: Some(JobId::from_string(job)),
                    task_id: task.map(TaskId::new),
                    payload: serde_json::from_str(&payload)
                        .map_err(|e| StoreError::CorruptRow(format!("event payload: {e}")))?,
                })
            })
            .collect()
    }

    // === Snapshots ===

    pub fn job_snapshot(&self, job_id: &JobId) -> Result<JobSnapshot, StoreError> {
        Ok(JobSnapshot { job: self.get_job(job_id)?, tasks: self.list_tasks(job_id)? })
    }
}

// === Row mapping ===

fn job_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let status: String = row.get("status")?;
    let working_dir: String = row.get("working_dir")?;
    let plan_path: Option<String> = row.get("plan_path")?;
    Ok(Job {
        id: JobId::from_string(row.get::<_, String>("id")?),
        objective: row.get("objective")?,
        status: JobStatus::from_str(&status).unwrap_or(JobStatus::Failed),
        working_dir: PathBuf::from(working_dir),
        created_at_ms: row.get("created_at_ms")?,
        worker_pid: row.get("worker_pid")?,
        plan_path: plan_path.map(PathBuf::from),
        error: row.get("error")?,
    })
}

fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Task, StoreError>> {
    let state: String = row.get("state")?;
    let role: Option<String> = row.get("role")?;
    let dependencies: String = row.get("dependencies_json")?;
    let reads: String = row.get("reads_json")?;
    let writes: String = row.get("writes_json")?;

    Ok((|| {
        Ok(Task {
            id: TaskId::new(row.get::<_, String>("id")?),
            job_id: JobId::from_string(row.get::<_, String>("job_id")?),
            summary: row.get("summary")?,
            description: row.get("description")?,
            dependencies: from_json(&dependencies)?,
            reads: from_json(&reads)?,
            writes: from_json(&writes)?,
            role: role.and_then(|r| Role::from_str(&r).ok()),
            state: TaskState::from_str(&state)
                .map_err(|e| StoreError::CorruptRow(format!("task state: {e}")))?,
            attempt: row.get("attempt")?,
            blocking_reason: row.get("blocking_reason")?,
            last_exit_code: row.get("exit_code")?,
            diff_summary: row.get("diff_summary")?,
        })
    })())
}

fn claim_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Claim, StoreError>> {
    let decision: String = row.get("decision")?;
    let reads: String = row.get("reads_json")?;
    let writes: String = row.get("writes_json")?;
    let commands: String = row.get("commands_json")?;

    Ok((|| {
        Ok(Claim {
            job_id: JobId::from_string(row.get::<_, String>("job_id")?),
            task_id: TaskId::new(row.get::<_, String>("task_id")?),
            attempt: row.get("attempt")?,
            reads: from_json(&reads)?,
            writes: from_json(&writes)?,
            commands: from_json(&commands)?,
            decision: ClaimDecision::from_str(&decision)
                .map_err(|e| StoreError::CorruptRow(format!("claim decision: {e}")))?,
            blocking_reason: row.get("blocking_reason")?,
            created_at_ms: row.get("created_at_ms")?,
        })
    })())
}

fn lock_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Lock, StoreError>> {
    let mode: String = row.get("mode")?;
    Ok((|| {
        Ok(Lock {
            path: ResourcePath::from_normalized(row.get::<_, String>("path")?),
            mode: LockMode::from_str(&mode)
                .map_err(|e| StoreError::CorruptRow(format!("lock mode: {e}")))?,
            holder_job: JobId::from_string(row.get::<_, String>("holder_job")?),
            holder_task: TaskId::new(row.get::<_, String>("holder_task")?),
            acquired_at_ms: row.get("acquired_at_ms")?,
        })
    })())
}

// === Transaction helpers ===

fn check_transition(
    tx: &Transaction<'_>,
    job_id: &JobId,
    task_id: &TaskId,
    next: TaskState,
) -> Result<(), StoreError> {
    let current: String = tx
        .query_row(
            "SELECT state FROM tasks WHERE job_id = ?1 AND id = ?2",
            params![job_id.as_str(), task_id.as_str()],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound { kind: "task", id: task_id.to_string() })?;
    let current = TaskState::from_str(&current)
        .map_err(|e| StoreError::CorruptRow(format!("task state: {e}")))?;
    if !current.can_transition(next) {
        return Err(StoreError::IllegalTransition {
            task: task_id.to_string(),
            from: current.to_string(),
            to: next.to_string(),
        });
    }
    Ok(())
}

fn release_locks_tx(
    tx: &Transaction<'_>,
    job_id: &JobId,
    task_id: &TaskId,
) -> Result<Vec<Lock>, StoreError> {
    let mut stmt = tx.prepare(
        "SELECT * FROM locks WHERE holder_job = ?1 AND holder_task = ?2 ORDER BY path",
    )?;
    let locks = stmt
        .query_map(params![job_id.as_str(), task_id.as_str()], lock_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    let locks: Vec<Lock> = locks.into_iter().collect::<Result<_, _>>()?;
    drop(stmt);
    tx.execute(
        "DELETE FROM locks WHERE holder_job = ?1 AND holder_task = ?2",
        params![job_id.as_str(), task_id.as_str()],
    )?;
    Ok(locks)
}

fn append_event_tx(tx: &Transaction<'_>, event: &Event, ts_ms: u64) -> Result<(), StoreError> {
    append_event_conn(tx, event, ts_ms)
}

fn append_event_conn(
    conn: &Connection,
    event: &Event,
    ts_ms: u64,
) -> Result<(), StoreError> {
    let record = event.record(ts_ms);
    conn.execute(
        "INSERT INTO events (job_id, task_id, ts_ms, event, payload_json)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.job_id.map(|j| j.as_str().to_string()).unwrap_or_default(),
            record.task_id.as_ref().map(|t| t.as_str()),
            record.ts,
            record.event,
            record.payload.to_string(),
        ],
    )?;
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::CorruptRow(format!("serialize: {e}")))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::CorruptRow(format!("deserialize: {e}")))
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job runner: submit, plan, drive, cancel.

use crate::arbiter::Arbiter;
use crate::error::RunnerError;
use crate::journal::Journal;
use crate::pipeline::PipelineOutcome;
use crate::prompt;
use nm_core::{
    Clock, Event, Job, JobId, JobStatus, SystemClock, Task, TaskId, TaskState,
};
use nm_plan::{fallback_roles, parse_plan, parse_roles, Plan};
use nm_store::{JobSnapshot, MemoryStore, Store};
use nm_term::{SessionId, TerminalManager};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Runner tuning, normally read from the environment.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub runs_dir: PathBuf,
    pub agent_bin: String,
    pub max_parallel: usize,
    pub plan_timeout: Duration,
    pub claim_timeout: Duration,
    pub execute_timeout: Duration,
    pub cancel_grace: Duration,
    pub retry_limit: u32,
}

impl RunnerConfig {
    pub fn from_env() -> Self {
        Self {
            runs_dir: nm_core::env::runs_dir(),
            agent_bin: nm_core::env::agent_bin(),
            max_parallel: nm_core::env::max_parallel_tasks(),
            plan_timeout: nm_core::env::plan_timeout(),
            claim_timeout: nm_core::env::claim_timeout(),
            execute_timeout: nm_core::env::task_timeout(),
            cancel_grace: nm_core::env::cancel_grace(),
            retry_limit: nm_core::env::retry_limit(),
        }
    }
}

/// The supervisor core: owns the store, arbiter, terminal manager, bus, and
/// journal, and drives jobs through their task DAGs.
pub struct JobRunner {
    pub(crate) config: RunnerConfig,
    pub(crate) store: Mutex<Store>,
    pub(crate) memory: Option<Mutex<MemoryStore>>,
    pub(crate) terminals: TerminalManager,
    pub(crate) arbiter: Arbiter,
    pub(crate) bus: nm_core::Bus,
    pub(crate) journal: Journal,
    pub(crate) clock: SystemClock,
    cancels: Mutex<HashMap<JobId, CancellationToken>>,
    pub(crate) live_sessions: Mutex<HashMap<JobId, Vec<SessionId>>>,
    banks: Mutex<HashMap<JobId, String>>,
}

impl JobRunner {
    pub fn new(store: Store, memory: Option<MemoryStore>, config: RunnerConfig) -> Self {
        let journal = Journal::new(config.runs_dir.clone());
        Self {
            config,
            store: Mutex::new(store),
            memory: memory.map(Mutex::new),
            terminals: TerminalManager::default(),
            arbiter: Arbiter::new(),
            bus: nm_core::Bus::default(),
            journal,
            clock: SystemClock,
            cancels: Mutex::new(HashMap::new()),
            live_sessions: Mutex::new(HashMap::new()),
            banks: Mutex::new(HashMap::new()),
        }
    }

    pub fn bus(&self) -> &nm_core::Bus {
        &self.bus
    }

    pub fn terminals(&self) -> &TerminalManager {
        &self.terminals
    }

    pub(crate) fn now(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// Journal + bus mirror for an event already persisted (or best-effort).
    pub(crate) fn mirror(&self, event: &Event, ts_ms: u64) {
        self.journal.append(event, ts_ms);
        self.bus.publish(event.clone());
    }

    /// Persist + journal + publish an event not tied to a store transition.
    pub(crate) fn emit(&self, event: &Event) {
        let ts = self.now();
        if let Err(e) = self.store.lock().append_event(event, ts) {
            tracing::warn!(error = %e, topic = event.topic(), "event row append failed");
        }
        self.mirror(event, ts);
    }

    // === Public contract ===

    /// Persist a new job and kick off planning + execution in the
    /// background. Returns as soon as the job row exists.
    pub async fn submit(
        self: &Arc<Self>,
        objective: &str,
        working_dir: &Path,
    ) -> Result<JobId, RunnerError> {
        let job_id = JobId::new();
        let job = Job::new(job_id, objective, working_dir, self.now());
        self.store.lock().upsert_job(&job)?;
        tracing::info!(%job_id, objective, "job submitted");

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = runner.plan_job(&job_id).await {
                tracing::error!(%job_id, error = %e, "planning failed");
                return;
            }
            if let Err(e) = runner.run_job(&job_id).await {
                tracing::error!(%job_id, error = %e, "job run failed");
            }
        });
        Ok(job_id)
    }

    /// Persist a new job without starting it (the CLI plans in the
    /// foreground and hands the job to a detached worker).
    pub fn create_job(
        &self,
        objective: &str,
        working_dir: &Path,
    ) -> Result<JobId, RunnerError> {
        let job_id = JobId::new();
        let job = Job::new(job_id, objective, working_dir, self.now());
        self.store.lock().upsert_job(&job)?;
        Ok(job_id)
    }

    /// Current state of a job and every task.
    pub fn status(&self, job_id: &JobId) -> Result<JobSnapshot, RunnerError> {
        Ok(self.store.lock().job_snapshot(job_id)?)
    }

    /// Durable lock table contents.
    pub fn persisted_locks(&self) -> Result<Vec<nm_core::Lock>, RunnerError> {
        Ok(self.store.lock().active_locks()?)
    }

    pub fn record_worker_pid(&self, job_id: &JobId, pid: u32) -> Result<(), RunnerError> {
        Ok(self.store.lock().set_job_worker_pid(job_id, pid)?)
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>, RunnerError> {
        Ok(self.store.lock().list_jobs()?)
    }

    /// Request cancellation: refuse new tasks, SIGTERM running agents, and
    /// SIGKILL whatever survives the grace period.
    pub fn cancel(&self, job_id: &JobId) -> Result<(), RunnerError> {
        tracing::info!(%job_id, "cancellation requested");
        self.cancel_token(job_id).cancel();
        Ok(())
    }

    // === Planning ===

    /// Run the plan and role-assignment agent invocations, validate the
    /// task DAG, and persist it.
    pub async fn plan_job(&self, job_id: &JobId) -> Result<Plan, RunnerError> {
        let job = self.store.lock().get_job(job_id)?;

        let planner_log = self.journal.job_dir(job_id).join("planner");
        let invocation = self
            .invoke_agent(
                job_id,
                prompt::plan_prompt(&job.objective),
                &job.working_dir,
                planner_log,
                self.config.plan_timeout,
                "plan",
            )
            .await;

        let raw = match invocation {
            Ok(inv) if inv.exit_code == 0 => inv.output,
            Ok(inv) => {
                return Err(self.fail_planning(
                    job_id,
                    RunnerError::AgentExit { phase: "plan", code: inv.exit_code },
                ));
            }
            Err(e) => return Err(self.fail_planning(job_id, e)),
        };

        let mut plan = match parse_plan(&raw, &job.objective) {
            Ok(plan) => plan,
            Err(e) => return Err(self.fail_planning(job_id, e.into())),
        };

        // Role assignment is advisory: fall back to the keyword heuristic
        // on any failure rather than failing the job.
        let sheet = match self
            .invoke_agent(
                job_id,
                prompt::roles_prompt(&plan),
                &job.working_dir,
                self.journal.job_dir(job_id).join("roles"),
                self.config.plan_timeout,
                "roles",
            )
            .await
        {
            Ok(inv) if inv.exit_code == 0 => {
                parse_roles(&inv.output, &plan).unwrap_or_else(|e| {
                    tracing::warn!(%job_id, error = %e, "role output unparsable, using fallback");
                    fallback_roles(&plan)
                })
            }
            other => {
                if let Err(e) = other {
                    tracing::warn!(%job_id, error = %e, "role pass failed, using fallback");
                }
                fallback_roles(&plan)
            }
        };
        let sheet = if sheet.assignments.is_empty() { fallback_roles(&plan) } else { sheet };
        for task in &mut plan.tasks {
            task.role = sheet.role_for(&task.id).or(task.role);
        }

        // Persist plan.json, the task rows, and the journal entries
        let job_dir = self.journal.job_dir(job_id);
        std::fs::create_dir_all(&job_dir)?;
        let plan_path = job_dir.join("plan.json");
        std::fs::write(&plan_path, plan.to_json())?;

        let tasks: Vec<Task> = plan
            .tasks
            .iter()
            .map(|t| Task {
                id: t.id.clone(),
                job_id: *job_id,
                summary: t.summary.clone(),
                description: t.description.clone(),
                dependencies: t.dependencies.clone(),
                reads: t.reads.clone(),
                writes: t.writes.clone(),
                role: t.role,
                state: TaskState::Pending,
                attempt: 1,
                blocking_reason: None,
                last_exit_code: None,
                diff_summary: None,
            })
            .collect();
        {
            let mut store = self.store.lock();
            store.insert_tasks(&tasks)?;
            store.set_job_plan_path(job_id, &plan_path)?;
        }

        self.emit(&Event::PlanCreated {
            job_id: *job_id,
            objective: plan.objective.clone(),
            task_count: plan.tasks.len(),
            plan_path: plan_path.clone(),
        });
        self.emit(&Event::RolesAssigned {
            job_id: *job_id,
            roles: sheet.assignments.clone(),
            strategy: sheet.strategy.clone(),
        });
        tracing::info!(%job_id, tasks = plan.tasks.len(), "plan persisted");
        Ok(plan)
    }

    fn fail_planning(&self, job_id: &JobId, error: RunnerError) -> RunnerError {
        tracing::error!(%job_id, error = %error, "planning failed");
        self.emit(&Event::PlanInvalid { job_id: *job_id, reason: error.to_string() });
        if let Err(e) =
            self.store.lock().update_job_status(job_id, JobStatus::Failed, Some(&error.to_string()))
        {
            tracing::error!(%job_id, error = %e, "could not record planning failure");
        }
        error
    }

    // === Driving ===

    /// Drive the job's task DAG to a terminal status.
    pub async fn run_job(self: &Arc<Self>, job_id: &JobId) -> Result<JobStatus, RunnerError> {
        let snapshot = self.store.lock().job_snapshot(job_id)?;
        if snapshot.job.status.is_terminal() {
            return Ok(snapshot.job.status);
        }
        self.store.lock().update_job_status(job_id, JobStatus::Running, None)?;
        self.ensure_bank(job_id);

        let cancel = self.cancel_token(job_id);
        let mut drive = DriveState::new(snapshot.tasks);
        let (outcome_tx, mut outcome_rx) =
            mpsc::channel::<PipelineOutcome>(drive.tasks.len().max(8));

        let mut cancelling = snapshot.job.status == JobStatus::Cancelling;
        if cancelling {
            self.begin_cancellation(job_id);
        }

        // Tasks found failed at startup (crash recovery) re-enter the retry
        // path if they still have budget.
        let recovered: Vec<TaskId> = drive
            .tasks
            .values()
            .filter(|t| t.state == TaskState::Failed)
            .map(|t| t.id.clone())
            .collect();
        for task_id in recovered {
            self.handle_failed_attempt(job_id, &task_id, &mut drive, &cancel, &outcome_tx, cancelling);
        }

        loop {
            if !cancelling {
                self.schedule_ready(job_id, &mut drive, &cancel, &outcome_tx);
            }

            if drive.in_flight.is_empty() {
                if cancelling {
                    self.cancel_pending(job_id, &mut drive);
                    break;
                }
                // Pending tasks whose dependencies can never complete
                self.cancel_unreachable(job_id, &mut drive);
                if drive.all_terminal() {
                    break;
                }
                // Unreachability may have freed nothing; try once more and
                // bail rather than hang on an unrunnable remainder.
                self.schedule_ready(job_id, &mut drive, &cancel, &outcome_tx);
                if drive.in_flight.is_empty() {
                    tracing::error!(%job_id, "no runnable tasks remain, cancelling leftovers");
                    self.cancel_pending(job_id, &mut drive);
                    drive.job_failed = true;
                    break;
                }
            }

            tokio::select! {
                _ = cancel.cancelled(), if !cancelling => {
                    cancelling = true;
                    self.begin_cancellation(job_id);
                }
                outcome = outcome_rx.recv() => {
                    let Some(outcome) = outcome else { break };
                    self.apply_outcome(job_id, outcome, &mut drive, &cancel, &outcome_tx, cancelling);
                }
            }
        }

        let status = if cancelling {
            JobStatus::Cancelled
        } else if drive.job_failed
            || drive.tasks.values().any(|t| t.state == TaskState::Failed)
        {
            JobStatus::Failed
        } else if drive.tasks.values().all(|t| t.state == TaskState::Completed) {
            JobStatus::Done
        } else {
            JobStatus::Cancelled
        };
        self.store.lock().update_job_status(job_id, status, None)?;
        self.cancels.lock().remove(job_id);
        tracing::info!(%job_id, %status, "job finished");
        Ok(status)
    }

    /// Spawn pipelines for ready tasks in deterministic order:
    /// `(declared_write_count asc, task_id asc)`, capped by `max_parallel`.
    fn schedule_ready(
        self: &Arc<Self>,
        job_id: &JobId,
        drive: &mut DriveState,
        cancel: &CancellationToken,
        outcome_tx: &mpsc::Sender<PipelineOutcome>,
    ) {
        let completed: HashSet<TaskId> = drive
            .tasks
            .values()
            .filter(|t| t.state == TaskState::Completed)
            .map(|t| t.id.clone())
            .collect();

        let mut ready: Vec<&Task> = drive
            .tasks
            .values()
            .filter(|t| !drive.in_flight.contains(&t.id))
            .filter(|t| match t.state {
                TaskState::Pending => t.dependencies.iter().all(|d| completed.contains(d)),
                // Interrupted claim phases resume directly
                TaskState::AnalysisPending | TaskState::AwaitingGo => true,
                _ => false,
            })
            .collect();
        ready.sort_by_key(|t| (t.writes.len(), t.id.clone()));

        let slots = self.config.max_parallel.saturating_sub(drive.in_flight.len());
        let chosen: Vec<TaskId> = ready.into_iter().take(slots).map(|t| t.id.clone()).collect();
        for task_id in chosen {
            self.spawn_pipeline(job_id, &task_id, drive, cancel, outcome_tx);
        }
    }

    fn spawn_pipeline(
        self: &Arc<Self>,
        job_id: &JobId,
        task_id: &TaskId,
        drive: &mut DriveState,
        cancel: &CancellationToken,
        outcome_tx: &mpsc::Sender<PipelineOutcome>,
    ) {
        drive.in_flight.insert(task_id.clone());
        let runner = Arc::clone(self);
        let job_id = *job_id;
        let task_id = task_id.clone();
        let cancel = cancel.clone();
        let tx = outcome_tx.clone();
        tokio::spawn(async move {
            let outcome = runner.run_task_pipeline(&job_id, &task_id, &cancel).await;
            let _ = tx.send(outcome).await;
        });
    }

    fn apply_outcome(
        self: &Arc<Self>,
        job_id: &JobId,
        outcome: PipelineOutcome,
        drive: &mut DriveState,
        cancel: &CancellationToken,
        outcome_tx: &mpsc::Sender<PipelineOutcome>,
        cancelling: bool,
    ) {
        let task_id = outcome.task_id().clone();
        drive.in_flight.remove(&task_id);

        match outcome {
            PipelineOutcome::Completed(_) => {
                drive.set_state(&task_id, TaskState::Completed);
                self.record_memory(job_id, &task_id, "completed");
            }
            PipelineOutcome::Cancelled(_) => {
                drive.set_state(&task_id, TaskState::Cancelled);
                self.record_memory(job_id, &task_id, "cancelled");
            }
            PipelineOutcome::FailedAttempt(_) => {
                drive.set_state(&task_id, TaskState::Failed);
                self.handle_failed_attempt(job_id, &task_id, drive, cancel, outcome_tx, cancelling);
            }
            PipelineOutcome::Fatal(_, ref error) => {
                tracing::error!(%job_id, %task_id, error, "fatal task pipeline error");
                drive.set_state(&task_id, TaskState::Failed);
                drive.job_failed = true;
            }
        }
    }

    /// Retry a failed task while budget remains; otherwise the failure is
    /// permanent and its dependents are cancelled.
    fn handle_failed_attempt(
        self: &Arc<Self>,
        job_id: &JobId,
        task_id: &TaskId,
        drive: &mut DriveState,
        cancel: &CancellationToken,
        outcome_tx: &mpsc::Sender<PipelineOutcome>,
        cancelling: bool,
    ) {
        if cancelling {
            return;
        }
        let attempt = drive.tasks.get(task_id).map(|t| t.attempt).unwrap_or(1);
        if attempt <= self.config.retry_limit {
            match self.store.lock().bump_task_attempt(job_id, task_id) {
                Ok(next) => {
                    tracing::info!(%job_id, %task_id, attempt = next, "retrying task");
                    drive.set_attempt(task_id, next);
                    self.record_memory(job_id, task_id, "retrying");
                    self.spawn_pipeline(job_id, task_id, drive, cancel, outcome_tx);
                }
                Err(e) => {
                    tracing::error!(%job_id, %task_id, error = %e, "could not bump attempt");
                    drive.job_failed = true;
                }
            }
        } else {
            tracing::warn!(%job_id, %task_id, attempt, "retry budget exhausted");
            drive.job_failed = true;
            self.record_memory(job_id, task_id, "failed");
            self.cancel_dependents(job_id, task_id, drive);
        }
    }

    /// Cancel every pending transitive dependent of a dead task.
    fn cancel_dependents(&self, job_id: &JobId, task_id: &TaskId, drive: &mut DriveState) {
        let mut queue: VecDeque<TaskId> = VecDeque::from([task_id.clone()]);
        let mut dead: HashSet<TaskId> = HashSet::new();
        while let Some(current) = queue.pop_front() {
            for task in drive.tasks.values() {
                if task.dependencies.contains(&current) && dead.insert(task.id.clone()) {
                    queue.push_back(task.id.clone());
                }
            }
        }
        for dep_id in dead {
            let state = drive.tasks.get(&dep_id).map(|t| t.state);
            if state == Some(TaskState::Pending) {
                self.cancel_task_row(job_id, &dep_id, drive);
            }
        }
    }

    fn cancel_unreachable(&self, job_id: &JobId, drive: &mut DriveState) {
        let dead: Vec<TaskId> = drive
            .tasks
            .values()
            .filter(|t| t.state.is_terminal() && t.state != TaskState::Completed)
            .map(|t| t.id.clone())
            .collect();
        for task_id in dead {
            self.cancel_dependents(job_id, &task_id, drive);
        }
    }

    fn cancel_pending(&self, job_id: &JobId, drive: &mut DriveState) {
        let pending: Vec<TaskId> = drive
            .tasks
            .values()
            .filter(|t| !t.state.is_terminal() && !drive.in_flight.contains(&t.id))
            .map(|t| t.id.clone())
            .collect();
        for task_id in pending {
            self.cancel_task_row(job_id, &task_id, drive);
        }
    }

    fn cancel_task_row(&self, job_id: &JobId, task_id: &TaskId, drive: &mut DriveState) {
        let ts = self.now();
        let event = Event::TaskCancelled { job_id: *job_id, task_id: task_id.clone() };
        match self.store.lock().transition_task(
            job_id,
            task_id,
            TaskState::Cancelled,
            None,
            Some((&event, ts)),
        ) {
            Ok(()) => {
                self.mirror(&event, ts);
                drive.set_state(task_id, TaskState::Cancelled);
            }
            Err(e) => {
                tracing::error!(%job_id, %task_id, error = %e, "could not cancel task");
            }
        }
    }

    /// Mark the job cancelling and SIGTERM every live agent; SIGKILL
    /// whatever is still alive after the grace period.
    fn begin_cancellation(&self, job_id: &JobId) {
        if let Err(e) = self.store.lock().update_job_status(job_id, JobStatus::Cancelling, None) {
            tracing::error!(%job_id, error = %e, "could not mark job cancelling");
        }
        let sessions: Vec<SessionId> =
            self.live_sessions.lock().get(job_id).cloned().unwrap_or_default();
        tracing::info!(%job_id, sessions = sessions.len(), "cancelling job");
        for session in &sessions {
            if let Err(e) = self.terminals.kill(session, libc::SIGTERM) {
                tracing::warn!(%session, error = %e, "SIGTERM failed");
            }
        }
        let terminals = self.terminals.clone();
        let grace = self.config.cancel_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            for session in &sessions {
                if terminals.is_active(session) {
                    tracing::warn!(%session, "grace expired, SIGKILL");
                    let _ = terminals.kill(session, libc::SIGKILL);
                }
            }
        });
    }

    // === Support ===

    pub(crate) fn cancel_token(&self, job_id: &JobId) -> CancellationToken {
        self.cancels.lock().entry(*job_id).or_default().clone()
    }

    pub(crate) fn register_session(&self, job_id: &JobId, session: SessionId) {
        self.live_sessions.lock().entry(*job_id).or_default().push(session);
    }

    pub(crate) fn unregister_session(&self, job_id: &JobId, session: &SessionId) {
        if let Some(sessions) = self.live_sessions.lock().get_mut(job_id) {
            sessions.retain(|s| s != session);
        }
    }

    fn ensure_bank(&self, job_id: &JobId) {
        let Some(memory) = &self.memory else { return };
        let mut banks = self.banks.lock();
        if banks.contains_key(job_id) {
            return;
        }
        match memory.lock().ensure_bank(job_id.as_str(), self.now()) {
            Ok(bank) => {
                banks.insert(*job_id, bank);
            }
            Err(e) => tracing::warn!(%job_id, error = %e, "memory bank creation failed"),
        }
    }

    /// Best-effort audit trail; never affects the job.
    fn record_memory(&self, job_id: &JobId, task_id: &TaskId, outcome: &str) {
        let Some(memory) = &self.memory else { return };
        let Some(bank) = self.banks.lock().get(job_id).cloned() else { return };
        let data = serde_json::json!({ "task_id": task_id.as_str(), "outcome": outcome });
        if let Err(e) = memory.lock().record(&bank, "task_outcome", &data, self.now()) {
            tracing::warn!(%job_id, %task_id, error = %e, "memory record failed");
        }
    }
}

/// In-driver view of the task DAG.
struct DriveState {
    tasks: HashMap<TaskId, Task>,
    in_flight: HashSet<TaskId>,
    job_failed: bool,
}

impl DriveState {
    fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks: tasks.into_iter().map(|t| (t.id.clone(), t)).collect(),
            in_flight: HashSet::new(),
            job_failed: false,
        }
    }

    fn set_state(&mut self, task_id: &TaskId, state: TaskState) {
        if let Some(task) = self.tasks.get_mut(task_id) {
            task.state = state;
        }
    }

    fn set_attempt(&mut self, task_id: &TaskId, attempt: u32) {
        if let Some(task) = self.tasks.get_mut(task_id) {
            task.attempt = attempt;
            task.state = TaskState::Failed;
        }
    }

    fn all_terminal(&self) -> bool {
        self.tasks.values().all(|t| t.state.is_terminal() || self.in_flight.contains(&t.id))
            && self.in_flight.is_empty()
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task pipeline: claim → arbiter → execute.
//!
//! Each in-flight task runs one attempt of this pipeline; the driver owns
//! retries and cascade cancellation. All store transitions here follow the
//! task state machine and the arbiter's lock discipline.

use crate::arbiter::AcquireOutcome;
use crate::error::RunnerError;
use crate::prompt;
use crate::runner::JobRunner;
use nm_core::{Claim, ClaimDecision, Event, Job, JobId, Lock, Task, TaskId, TaskState};
use nm_plan::parse_claim;
use nm_term::{SpawnSpec, TerminalEvent};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What one pipeline run reports back to the driver.
#[derive(Debug)]
pub(crate) enum PipelineOutcome {
    Completed(TaskId),
    FailedAttempt(TaskId),
    Cancelled(TaskId),
    /// Store failure or another unrecoverable error: fatal to the job.
    Fatal(TaskId, String),
}

impl PipelineOutcome {
    pub(crate) fn task_id(&self) -> &TaskId {
        match self {
            PipelineOutcome::Completed(id)
            | PipelineOutcome::FailedAttempt(id)
            | PipelineOutcome::Cancelled(id)
            | PipelineOutcome::Fatal(id, _) => id,
        }
    }
}

/// One completed agent invocation.
pub(crate) struct AgentInvocation {
    pub output: String,
    pub exit_code: i32,
    pub stdout_log: PathBuf,
}

impl JobRunner {
    pub(crate) async fn run_task_pipeline(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> PipelineOutcome {
        match self.task_attempt(job_id, task_id, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.emit(&Event::StoreError { job_id: *job_id, error: e.to_string() });
                PipelineOutcome::Fatal(task_id.clone(), e.to_string())
            }
        }
    }

    /// One attempt: claim analysis, arbitration, execution.
    ///
    /// Retryable failures surface as [`PipelineOutcome::FailedAttempt`];
    /// only store faults propagate as errors.
    async fn task_attempt(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<PipelineOutcome, RunnerError> {
        let job = self.store.lock().get_job(job_id)?;
        let task = self.store.lock().get_task(job_id, task_id)?;

        // Normalize the entry state: fresh tasks and retries both re-enter
        // analysis; a resumed awaiting_go claim is re-analyzed too.
        match task.state {
            TaskState::Pending | TaskState::Failed | TaskState::AwaitingGo => {
                self.store.lock().transition_task(
                    job_id,
                    task_id,
                    TaskState::AnalysisPending,
                    None,
                    None,
                )?;
            }
            TaskState::AnalysisPending => {}
            other => {
                return Err(RunnerError::Store(nm_store::StoreError::IllegalTransition {
                    task: task_id.to_string(),
                    from: other.to_string(),
                    to: TaskState::AnalysisPending.to_string(),
                }));
            }
        }
        if cancel.is_cancelled() {
            return self.cancel_before_locks(job_id, task_id);
        }

        // === Claim phase ===
        let claim = match self.claim_phase(&job, &task).await {
            Ok(claim) => claim,
            Err(e) if e.is_retryable() => {
                // A claim agent killed by cancellation is not a failure
                if cancel.is_cancelled() {
                    return self.cancel_before_locks(job_id, task_id);
                }
                return self.fail_attempt(job_id, task_id, task.attempt, &e.to_string(), None);
            }
            Err(e) => return Err(e),
        };
        if cancel.is_cancelled() {
            return self.cancel_before_locks(job_id, task_id);
        }

        // === Arbitration ===
        let requests = claim.lock_requests();
        let locks = match self.arbiter.acquire_or_park(job_id, task_id, requests, self.now()) {
            AcquireOutcome::Granted(locks) => locks,
            AcquireOutcome::Parked { ticket, reason, conflicting_holders } => {
                self.store.lock().update_claim_decision(
                    job_id,
                    task_id,
                    claim.attempt,
                    ClaimDecision::Blocked,
                    Some(&reason),
                )?;
                let ts = self.now();
                let blocked = Event::ClaimBlocked {
                    job_id: *job_id,
                    task_id: task_id.clone(),
                    reason: reason.clone(),
                    waiting_for: claim.writes.clone(),
                    holders: conflicting_holders,
                };
                self.store.lock().transition_task(
                    job_id,
                    task_id,
                    TaskState::AnalysisPending,
                    Some(&reason),
                    Some((&blocked, ts)),
                )?;
                self.mirror(&blocked, ts);
                tracing::info!(%job_id, %task_id, reason, "task parked");

                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.arbiter.unpark(job_id, task_id);
                        return self.cancel_before_locks(job_id, task_id);
                    }
                    locks = ticket.wait() => {
                        let unblocked = Event::ClaimUnblocked {
                            job_id: *job_id,
                            task_id: task_id.clone(),
                        };
                        self.emit(&unblocked);
                        self.store.lock().transition_task(
                            job_id,
                            task_id,
                            TaskState::AwaitingGo,
                            None,
                            None,
                        )?;
                        locks
                    }
                }
            }
        };

        // === Execution ===
        self.approve_and_execute(&job, &task, claim, locks, cancel).await
    }

    /// Invoke the agent in claim mode and persist the parsed claim.
    ///
    /// Leaves the task in `awaiting_go` with `claim_recorded` journaled.
    async fn claim_phase(&self, job: &Job, task: &Task) -> Result<Claim, RunnerError> {
        let claim_log = self.journal.task_dir(&job.id, task.id.as_str()).join("claim");
        let invocation = self
            .invoke_agent(
                &job.id,
                prompt::claim_prompt(&job.objective, task),
                &job.working_dir,
                claim_log,
                self.config.claim_timeout,
                "claim",
            )
            .await?;
        if invocation.exit_code != 0 {
            return Err(RunnerError::AgentExit { phase: "claim", code: invocation.exit_code });
        }

        let spec = parse_claim(&invocation.output, &task.id)?;
        let claim = Claim {
            job_id: job.id,
            task_id: task.id.clone(),
            attempt: task.attempt,
            reads: spec
                .reads
                .iter()
                .map(|p| nm_core::ResourcePath::normalize(p, &job.working_dir))
                .collect(),
            writes: spec
                .writes
                .iter()
                .map(|p| nm_core::ResourcePath::normalize(p, &job.working_dir))
                .collect(),
            commands: spec.commands,
            decision: ClaimDecision::Pending,
            blocking_reason: None,
            created_at_ms: self.now(),
        };

        let ts = self.now();
        let recorded = Event::ClaimRecorded {
            job_id: job.id,
            task_id: task.id.clone(),
            attempt: claim.attempt,
            reads: claim.reads.clone(),
            writes: claim.writes.clone(),
            commands: claim.commands.clone(),
        };
        {
            let mut store = self.store.lock();
            store.record_claim(&claim)?;
            store.transition_task(
                &job.id,
                &task.id,
                TaskState::AwaitingGo,
                None,
                Some((&recorded, ts)),
            )?;
        }
        self.mirror(&recorded, ts);
        Ok(claim)
    }

    /// GO received: persist approval and locks, run the agent, release.
    async fn approve_and_execute(
        &self,
        job: &Job,
        task: &Task,
        claim: Claim,
        locks: Vec<Lock>,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<PipelineOutcome, RunnerError> {
        let job_id = &job.id;
        let task_id = &task.id;

        self.store.lock().update_claim_decision(
            job_id,
            task_id,
            claim.attempt,
            ClaimDecision::Approved,
            None,
        )?;
        self.persist_claim_file(job_id, &claim);

        let ts = self.now();
        let approved = Event::ClaimApproved {
            job_id: *job_id,
            task_id: task_id.clone(),
            attempt: claim.attempt,
            writes: claim.writes.clone(),
        };
        self.store.lock().begin_execution(job_id, task_id, &locks, &approved, ts)?;
        self.mirror(&approved, ts);
        tracing::info!(%job_id, %task_id, locks = locks.len(), "task executing");

        let released_paths: Vec<nm_core::ResourcePath> =
            locks.iter().map(|l| l.path.clone()).collect();

        if cancel.is_cancelled() {
            return self.finish_with_locks(
                job_id,
                task_id,
                TaskState::Cancelled,
                None,
                released_paths,
                Event::TaskCancelled { job_id: *job_id, task_id: task_id.clone() },
            );
        }

        // Execute-phase agent invocation. Cancellation arrives as SIGTERM to
        // the registered session, so the wait below always resolves.
        let exec_log = self.journal.task_dir(job_id, task_id.as_str());
        let result = self
            .invoke_agent(
                job_id,
                prompt::execute_prompt(&job.objective, task, &claim),
                &job.working_dir,
                exec_log,
                self.config.execute_timeout,
                "execute",
            )
            .await;

        if cancel.is_cancelled() {
            // Cancellation killed (or raced) the agent; exit code is moot
            let exit_code = result.as_ref().ok().map(|inv| inv.exit_code);
            return self.finish_with_locks(
                job_id,
                task_id,
                TaskState::Cancelled,
                exit_code,
                released_paths,
                Event::TaskCancelled { job_id: *job_id, task_id: task_id.clone() },
            );
        }

        match result {
            Ok(invocation) if invocation.exit_code == 0 => self.finish_with_locks(
                job_id,
                task_id,
                TaskState::Completed,
                Some(0),
                released_paths,
                Event::TaskCompleted {
                    job_id: *job_id,
                    task_id: task_id.clone(),
                    attempt: claim.attempt,
                    exit_code: 0,
                    stdout_log: Some(invocation.stdout_log),
                    diff_summary: None,
                },
            ),
            Ok(invocation) => self.finish_with_locks(
                job_id,
                task_id,
                TaskState::Failed,
                Some(invocation.exit_code),
                released_paths,
                Event::TaskFailed {
                    job_id: *job_id,
                    task_id: task_id.clone(),
                    attempt: claim.attempt,
                    error: format!("agent exited with status {}", invocation.exit_code),
                    exit_code: Some(invocation.exit_code),
                },
            ),
            Err(e) if e.is_retryable() => self.finish_with_locks(
                job_id,
                task_id,
                TaskState::Failed,
                None,
                released_paths,
                Event::TaskFailed {
                    job_id: *job_id,
                    task_id: task_id.clone(),
                    attempt: claim.attempt,
                    error: e.to_string(),
                    exit_code: None,
                },
            ),
            Err(e) => {
                // Store fault while executing: release locks before bubbling
                let _ = self.arbiter.release(job_id, task_id, self.now());
                Err(e)
            }
        }
    }

    /// Terminal transition out of `executing`: task row, lock rows, and the
    /// outcome + `locks_released` events commit in one transaction, then
    /// the in-memory arbiter releases and wakes parked claims.
    fn finish_with_locks(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
        next: TaskState,
        exit_code: Option<i32>,
        released_paths: Vec<nm_core::ResourcePath>,
        outcome_event: Event,
    ) -> Result<PipelineOutcome, RunnerError> {
        let ts = self.now();
        let released = Event::LocksReleased {
            job_id: *job_id,
            task_id: task_id.clone(),
            paths: released_paths,
        };
        self.store.lock().finish_execution(
            job_id,
            task_id,
            next,
            exit_code,
            None,
            &[(&outcome_event, ts), (&released, ts)],
        )?;
        self.mirror(&outcome_event, ts);
        self.mirror(&released, ts);

        // Wake parked claims only after locks_released is journaled
        let (_, woken) = self.arbiter.release(job_id, task_id, self.now());
        if !woken.is_empty() {
            tracing::debug!(%job_id, %task_id, woken = woken.len(), "release woke parked claims");
        }

        Ok(match next {
            TaskState::Completed => PipelineOutcome::Completed(task_id.clone()),
            TaskState::Cancelled => PipelineOutcome::Cancelled(task_id.clone()),
            _ => PipelineOutcome::FailedAttempt(task_id.clone()),
        })
    }

    /// Cancellation before any lock was held.
    fn cancel_before_locks(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
    ) -> Result<PipelineOutcome, RunnerError> {
        let ts = self.now();
        let event = Event::TaskCancelled { job_id: *job_id, task_id: task_id.clone() };
        self.store.lock().transition_task(
            job_id,
            task_id,
            TaskState::Cancelled,
            None,
            Some((&event, ts)),
        )?;
        self.mirror(&event, ts);
        Ok(PipelineOutcome::Cancelled(task_id.clone()))
    }

    /// Claim-phase failure: no locks held, just record the failed attempt.
    fn fail_attempt(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
        attempt: u32,
        error: &str,
        exit_code: Option<i32>,
    ) -> Result<PipelineOutcome, RunnerError> {
        let ts = self.now();
        let event = Event::TaskFailed {
            job_id: *job_id,
            task_id: task_id.clone(),
            attempt,
            error: error.to_string(),
            exit_code,
        };
        self.store.lock().transition_task(
            job_id,
            task_id,
            TaskState::Failed,
            None,
            Some((&event, ts)),
        )?;
        self.mirror(&event, ts);
        tracing::warn!(%job_id, %task_id, attempt, error, "task attempt failed");
        Ok(PipelineOutcome::FailedAttempt(task_id.clone()))
    }

    fn persist_claim_file(&self, job_id: &JobId, claim: &Claim) {
        let path = self.journal.job_dir(job_id).join(format!("{}_claim.json", claim.task_id));
        let doc = serde_json::json!({
            "task_id": claim.task_id,
            "resources": { "reads": claim.reads, "writes": claim.writes },
            "execution": { "commands": claim.commands },
        });
        let pretty = serde_json::to_string_pretty(&doc).unwrap_or_default();
        if let Err(e) = std::fs::write(&path, pretty) {
            tracing::warn!(%job_id, path = %path.display(), error = %e, "claim file write failed");
        }
    }

    /// Spawn the agent binary in a PTY, stream its output, and wait for
    /// exit within `timeout`. Terminal events are forwarded onto the bus.
    pub(crate) async fn invoke_agent(
        &self,
        job_id: &JobId,
        prompt: String,
        cwd: &Path,
        log_dir: PathBuf,
        timeout: Duration,
        phase: &'static str,
    ) -> Result<AgentInvocation, RunnerError> {
        let spec = SpawnSpec::new(
            vec![self.config.agent_bin.clone(), "exec".to_string()],
            cwd,
        )
        .stdin_text(prompt)
        .log_dir(log_dir.clone());

        let (session, mut subscription) = self.terminals.spawn_subscribed(spec)?;
        self.register_session(job_id, session);
        tracing::debug!(%job_id, %session, phase, "agent invoked");

        // A spawn racing job cancellation would miss the SIGTERM sweep
        if self.cancel_token(job_id).is_cancelled() {
            let _ = self.terminals.kill(&session, libc::SIGTERM);
        }

        let bus = self.bus.clone();
        let collect = async move {
            let mut output = String::new();
            let mut exit_code = None;
            while let Some(event) = subscription.recv().await {
                match event {
                    TerminalEvent::Started { pid, .. } => {
                        bus.publish(Event::TerminalStarted {
                            session_id: session.to_string(),
                            pid,
                        });
                    }
                    TerminalEvent::Stdout { chunk, .. } => {
                        output.push_str(&chunk);
                        bus.publish(Event::TerminalStdout {
                            session_id: session.to_string(),
                            chunk,
                        });
                    }
                    TerminalEvent::Stderr { chunk, .. } => {
                        output.push_str(&chunk);
                        bus.publish(Event::TerminalStderr {
                            session_id: session.to_string(),
                            chunk,
                        });
                    }
                    TerminalEvent::Exit { code, .. } => {
                        bus.publish(Event::TerminalExit {
                            session_id: session.to_string(),
                            exit_code: code,
                        });
                        exit_code = code;
                        break;
                    }
                    TerminalEvent::Error { .. } => {}
                }
            }
            (output, exit_code)
        };

        let result = tokio::time::timeout(timeout, collect).await;
        self.unregister_session(job_id, &session);

        match result {
            Ok((output, exit_code)) => {
                let exit_code = match exit_code {
                    Some(code) => code,
                    // Stream ended without an exit event: resolve via wait
                    None => self.terminals.wait(&session).await?,
                };
                Ok(AgentInvocation { output, exit_code, stdout_log: log_dir.join("stdout.log") })
            }
            Err(_) => {
                tracing::warn!(%job_id, %session, phase, "phase timeout, terminating agent");
                if let Err(e) = self.terminals.terminate(&session, Duration::from_secs(5)).await {
                    tracing::warn!(%session, error = %e, "terminate failed");
                }
                Err(RunnerError::PhaseTimeout { phase })
            }
        }
    }
}

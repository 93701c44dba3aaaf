// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only per-job NDJSON journal.
//!
//! Mirrors every `job.*` event to `runs/<job_id>/events.ndjson`, fsyncing
//! each append so the journal survives a crash. Journaling is a best-effort
//! mirror: write failures are logged, never propagated.

use nm_core::{Event, JobId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct Journal {
    runs_dir: PathBuf,
    files: Mutex<HashMap<JobId, File>>,
}

impl Journal {
    pub fn new(runs_dir: impl Into<PathBuf>) -> Self {
        Self { runs_dir: runs_dir.into(), files: Mutex::new(HashMap::new()) }
    }

    /// Directory holding one job's run artifacts.
    pub fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.runs_dir.join(job_id.as_str())
    }

    /// Directory holding one task's session logs.
    pub fn task_dir(&self, job_id: &JobId, task: &str) -> PathBuf {
        self.job_dir(job_id).join(task)
    }

    /// Append one event to its job's journal, fsynced.
    ///
    /// Events without a job id (terminal events mirrored elsewhere) are
    /// skipped.
    pub fn append(&self, event: &Event, ts_ms: u64) {
        let Some(job_id) = event.job_id().copied() else {
            return;
        };
        let record = event.record(ts_ms);
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(%job_id, error = %e, "journal record serialization failed");
                return;
            }
        };

        let mut files = self.files.lock();
        let file = match self.open_for(&mut files, job_id) {
            Some(file) => file,
            None => return,
        };
        let result = file
            .write_all(line.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .and_then(|_| file.sync_data());
        if let Err(e) = result {
            tracing::warn!(%job_id, error = %e, "journal append failed");
        }
    }

    fn open_for<'a>(
        &self,
        files: &'a mut HashMap<JobId, File>,
        job_id: JobId,
    ) -> Option<&'a mut File> {
        if !files.contains_key(&job_id) {
            let dir = self.job_dir(&job_id);
            if let Err(e) = std::fs::create_dir_all(&dir) {
                tracing::warn!(%job_id, error = %e, "cannot create job run dir");
                return None;
            }
            let path = dir.join("events.ndjson");
            match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => {
                    files.insert(job_id, file);
                }
                Err(e) => {
                    tracing::warn!(%job_id, path = %path.display(), error = %e, "cannot open journal");
                    return None;
                }
            }
        }
        files.get_mut(&job_id)
    }
}

/// Read a journal file back as records (test and CLI surface).
pub fn read_journal(path: &Path) -> std::io::Result<Vec<nm_core::JournalRecord>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect())
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;

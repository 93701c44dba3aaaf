// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite schema for the orchestration store.

pub(crate) const SCHEMA: &str = r#"
        CREATE TABLE IF NOT EXISTS jobs (
          id TEXT PRIMARY KEY,
          objective TEXT NOT NULL,
          status TEXT NOT NULL,
          working_dir TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          worker_pid INTEGER,
          plan_path TEXT,
          error TEXT
        );

        CREATE TABLE IF NOT EXISTS tasks (
          job_id TEXT NOT NULL,
          id TEXT NOT NULL,
          summary TEXT NOT NULL,
          description TEXT NOT NULL DEFAULT '',
          dependencies_json TEXT NOT NULL DEFAULT '[]',
          reads_json TEXT NOT NULL DEFAULT '[]',
          writes_json TEXT NOT NULL DEFAULT '[]',
          role TEXT,
          state TEXT NOT NULL,
          attempt INTEGER NOT NULL DEFAULT 1,
          blocking_reason TEXT,
          exit_code INTEGER,
          diff_summary TEXT,
          PRIMARY KEY (job_id, id),
          FOREIGN KEY (job_id) REFERENCES jobs(id)
        );

        CREATE TABLE IF NOT EXISTS claims (
          job_id TEXT NOT NULL,
          task_id TEXT NOT NULL,
          attempt INTEGER NOT NULL,
          reads_json TEXT NOT NULL DEFAULT '[]',
          writes_json TEXT NOT NULL DEFAULT '[]',
          commands_json TEXT NOT NULL DEFAULT '[]',
          decision TEXT NOT NULL,
          blocking_reason TEXT,
          created_at_ms INTEGER NOT NULL,
          PRIMARY KEY (job_id, task_id, attempt),
          FOREIGN KEY (job_id) REFERENCES jobs(id)
        );

        CREATE TABLE IF NOT EXISTS locks (
          path TEXT NOT NULL,
          mode TEXT NOT NULL,
          holder_job TEXT NOT NULL,
          holder_task TEXT NOT NULL,
          acquired_at_ms INTEGER NOT NULL,
          PRIMARY KEY (path, holder_job, holder_task)
        );

        CREATE TABLE IF NOT EXISTS events (
          seq INTEGER PRIMARY KEY AUTOINCREMENT,
          job_id TEXT NOT NULL,
          task_id TEXT,
          ts_ms INTEGER NOT NULL,
          event TEXT NOT NULL,
          payload_json TEXT NOT NULL DEFAULT '{}'
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_state ON tasks(job_id, state);
        CREATE INDEX IF NOT EXISTS idx_events_job ON events(job_id, seq);
        CREATE INDEX IF NOT EXISTS idx_locks_holder ON locks(holder_job, holder_task);
"#;

pub(crate) const MEMORY_SCHEMA: &str = r#"
        CREATE TABLE IF NOT EXISTS banks (
          bank_id TEXT PRIMARY KEY,
          label TEXT,
          created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS entries (
          entry_id TEXT PRIMARY KEY,
          bank_id TEXT NOT NULL,
          entry_type TEXT NOT NULL,
          data TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          FOREIGN KEY (bank_id) REFERENCES banks(bank_id)
        );
"#;

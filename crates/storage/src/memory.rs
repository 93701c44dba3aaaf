// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only audit memory.
//!
//! A second, non-authoritative database recording task outcomes per job.
//! Its absence or failure never affects orchestration; callers log and move
//! on.

use crate::error::{with_busy_retry, StoreError};
use crate::schema::MEMORY_SCHEMA;
use rusqlite::{params, Connection};
use std::path::Path;

/// One audit entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEntry {
    pub entry_id: String,
    pub bank_id: String,
    pub entry_type: String,
    pub data: serde_json::Value,
    pub created_at_ms: u64,
}

/// SQLite-backed audit store (`store/memory.db`).
pub struct MemoryStore {
    conn: Connection,
}

impl MemoryStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(MEMORY_SCHEMA)?;
        Ok(Self { conn })
    }

    /// Create a bank for a job (or any other scope) and return its id.
    pub fn ensure_bank(&mut self, label: &str, now_ms: u64) -> Result<String, StoreError> {
        let bank_id = format!("bank-{}", nanoid::nanoid!(8));
        with_busy_retry(|| {
            self.conn.execute(
                "INSERT INTO banks (bank_id, label, created_at_ms) VALUES (?1, ?2, ?3)",
                params![bank_id, label, now_ms],
            )?;
            Ok(())
        })?;
        Ok(bank_id)
    }

    /// Append one entry. Entries are never updated or deleted.
    pub fn record(
        &mut self,
        bank_id: &str,
        entry_type: &str,
        data: &serde_json::Value,
        now_ms: u64,
    ) -> Result<MemoryEntry, StoreError> {
        let entry = MemoryEntry {
            entry_id: format!("mem-{}", nanoid::nanoid!(8)),
            bank_id: bank_id.to_string(),
            entry_type: entry_type.to_string(),
            data: data.clone(),
            created_at_ms: now_ms,
        };
        with_busy_retry(|| {
            self.conn.execute(
                "INSERT INTO entries (entry_id, bank_id, entry_type, data, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.entry_id,
                    entry.bank_id,
                    entry.entry_type,
                    entry.data.to_string(),
                    entry.created_at_ms,
                ],
            )?;
            Ok(())
        })?;
        Ok(entry)
    }

    /// Entries in a bank, newest first, optionally filtered by type.
    pub fn list_entries(
        &self,
        bank_id: &str,
        entry_type: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryEntry>, StoreError> {
        let mut sql = String::from("SELECT * FROM entries WHERE bank_id = ?1");
        if entry_type.is_some() {
            sql.push_str(" AND entry_type = ?2");
        }
        sql.push_str(" ORDER BY created_at_ms DESC, entry_id DESC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, String, String, String, u64)> {
            Ok((
                row.get("entry_id")?,
                row.get("bank_id")?,
                row.get("entry_type")?,
                row.get("data")?,
                row.get("created_at_ms")?,
            ))
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match entry_type {
            Some(t) => stmt.query_map(params![bank_id, t], map_row)?.collect::<Result<Vec<_>, _>>()?,
            None => stmt.query_map(params![bank_id], map_row)?.collect::<Result<Vec<_>, _>>()?,
        };

        rows.into_iter()
            .map(|(entry_id, bank_id, entry_type, data, created_at_ms)| {
                Ok(MemoryEntry {
                    entry_id,
                    bank_id,
                    entry_type,
                    data: serde_json::from_str(&data)
                        .map_err(|e| StoreError::CorruptRow(format!("memory data: {e}")))?,
                    created_at_ms,
                })
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn open_memory(dir: &tempfile::TempDir) -> MemoryStore {
    MemoryStore::open(&dir.path().join("memory.db")).unwrap()
}

#[test]
fn bank_and_entry_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut memory = open_memory(&dir);

    let bank = memory.ensure_bank("job-abc", 100).unwrap();
    assert!(bank.starts_with("bank-"));

    let entry = memory
        .record(&bank, "task_outcome", &serde_json::json!({"task": "t1", "exit": 0}), 101)
        .unwrap();
    assert!(entry.entry_id.starts_with("mem-"));

    let entries = memory.list_entries(&bank, None, None).unwrap();
    assert_eq!(entries, vec![entry]);
}

#[test]
fn entries_filter_by_type_and_limit() {
    let dir = tempfile::tempdir().unwrap();
    let mut memory = open_memory(&dir);
    let bank = memory.ensure_bank("job-abc", 100).unwrap();

    for i in 0..5 {
        memory
            .record(&bank, "task_outcome", &serde_json::json!({"i": i}), 100 + i)
            .unwrap();
    }
    memory.record(&bank, "note", &serde_json::json!({"text": "hi"}), 200).unwrap();

    let outcomes = memory.list_entries(&bank, Some("task_outcome"), None).unwrap();
    assert_eq!(outcomes.len(), 5);

    let limited = memory.list_entries(&bank, Some("task_outcome"), Some(2)).unwrap();
    assert_eq!(limited.len(), 2);
    // Newest first
    assert_eq!(limited[0].data, serde_json::json!({"i": 4}));
}

#[test]
fn banks_are_distinct() {
    let dir = tempfile::tempdir().unwrap();
    let mut memory = open_memory(&dir);
    let a = memory.ensure_bank("job-a", 1).unwrap();
    let b = memory.ensure_bank("job-b", 1).unwrap();
    assert_ne!(a, b);

    memory.record(&a, "note", &serde_json::json!({}), 2).unwrap();
    assert!(memory.list_entries(&b, None, None).unwrap().is_empty());
}

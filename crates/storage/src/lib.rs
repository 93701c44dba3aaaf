// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nm-store: Durable state for jobs, tasks, claims, locks, and events.
//!
//! One SQLite database holds the authoritative orchestration state; a second
//! optional database (`memory.db`) keeps a non-authoritative audit trail of
//! task outcomes.

mod error;
mod memory;
mod schema;
mod store;

pub use error::StoreError;
pub use memory::{MemoryEntry, MemoryStore};
pub use store::{JobSnapshot, RecoveryMode, Store};

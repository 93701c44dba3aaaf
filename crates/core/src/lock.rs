// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock records handed out by the resource arbiter.

use crate::job::JobId;
use crate::respath::ResourcePath;
use crate::task::TaskId;
use serde::{Deserialize, Serialize};

/// Access mode of a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    Read,
    Write,
}

impl LockMode {
    /// Compatibility matrix: only concurrent reads are allowed on one path.
    pub fn compatible_with(self, held: LockMode) -> bool {
        matches!((self, held), (LockMode::Read, LockMode::Read))
    }
}

crate::simple_display! {
    LockMode {
        Read => "read",
        Write => "write",
    }
}

impl std::str::FromStr for LockMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(LockMode::Read),
            "write" => Ok(LockMode::Write),
            other => Err(format!("unknown lock mode: {other}")),
        }
    }
}

/// One granted lock: a task's exclusive or shared hold on a path.
///
/// Locks exist only while the holder executes; release is total (every lock
/// held by a task goes away together on task exit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lock {
    pub path: ResourcePath,
    pub mode: LockMode,
    pub holder_task: TaskId,
    pub holder_job: JobId,
    pub acquired_at_ms: u64,
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-attempt resource claims.

use crate::job::JobId;
use crate::lock::LockMode;
use crate::respath::ResourcePath;
use crate::task::TaskId;
use serde::{Deserialize, Serialize};

/// Arbiter decision recorded on a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimDecision {
    Pending,
    Approved,
    Blocked,
}

crate::simple_display! {
    ClaimDecision {
        Pending => "pending",
        Approved => "approved",
        Blocked => "blocked",
    }
}

impl std::str::FromStr for ClaimDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ClaimDecision::Pending),
            "approved" => Ok(ClaimDecision::Approved),
            "blocked" => Ok(ClaimDecision::Blocked),
            other => Err(format!("unknown claim decision: {other}")),
        }
    }
}

/// A task's declaration, for one attempt, of the files it will read and
/// write and the commands it intends to run. Identified by
/// `(job_id, task_id, attempt)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub job_id: JobId,
    pub task_id: TaskId,
    pub attempt: u32,
    pub reads: Vec<ResourcePath>,
    pub writes: Vec<ResourcePath>,
    pub commands: Vec<String>,
    pub decision: ClaimDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking_reason: Option<String>,
    pub created_at_ms: u64,
}

impl Claim {
    /// The lock set this claim requires, with write dominating read on any
    /// path declared in both lists.
    pub fn lock_requests(&self) -> Vec<(ResourcePath, LockMode)> {
        let mut requests: Vec<(ResourcePath, LockMode)> =
            self.writes.iter().map(|p| (p.clone(), LockMode::Write)).collect();
        for read in &self.reads {
            if !self.writes.contains(read) {
                requests.push((read.clone(), LockMode::Read));
            }
        }
        requests
    }
}

#[cfg(test)]
#[path = "claim_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nm-plan: Parsing and validation of agent planner output.
//!
//! Agents emit JSON on a PTY; prose may surround the object. This crate
//! extracts the outermost balanced object, parses the plan/claim/role wire
//! shapes, and validates the plan into an acyclic task graph.

mod claim;
mod error;
mod extract;
mod plan;
mod roles;

pub use claim::{parse_claim, ClaimSpec};
pub use error::PlanError;
pub use extract::extract_json;
pub use plan::{parse_plan, Plan, PlanTask};
pub use roles::{fallback_roles, parse_roles, RoleSheet};

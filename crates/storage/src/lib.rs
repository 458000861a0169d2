// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! drover-storage: durable on-disk state for the fleet supervisor.
//!
//! Layout under the state directory:
//!
//! ```text
//! fleet-state.json            — single snapshot, atomically replaced
//! fleet-state.lock            — lockfile guarding snapshot writers
//! jobs/<jobId>.meta.json      — job metadata (terminal-immutable)
//! jobs/<jobId>.jsonl          — append-only output, one record per line
//! jobs/<jobId>/output.log     — optional plain-text mirror
//! sessions/<agent>.chat.json  — chat session map for that agent
//! schedules/<agent>.state.json — per-schedule runtime state
//! ```
//!
//! Every identifier embedded in these paths passes the safe-identifier
//! check and a resolved-prefix containment check before use.

pub mod atomic;
pub mod error;
pub mod fleet_state;
pub mod jobs;
pub mod output;
pub mod paths;
pub mod schedules;
pub mod sessions;

mod store;

pub use error::StorageError;
pub use jobs::{JobFilter, JobPage, JobPatch, NewJob};
pub use output::{parse_records_from, JobOutputWriter, OutputWatch};
pub use paths::build_safe_file_path;
pub use store::StateStore;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule runtime state.
//!
//! The declarative side (interval expressions, cron expressions, prompts)
//! lives in the config crate; this is the per-schedule state the scheduler
//! and job runner mutate and the state store persists.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a schedule decides when to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Interval,
    Cron,
    Manual,
    Chat,
}

impl ScheduleType {
    /// Whether the tick loop ever fires this schedule on its own.
    pub fn fires_on_tick(self) -> bool {
        matches!(self, Self::Interval | Self::Cron)
    }
}

impl fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Interval => "interval",
            Self::Cron => "cron",
            Self::Manual => "manual",
            Self::Chat => "chat",
        };
        write!(f, "{s}")
    }
}

/// Current status of a schedule.
///
/// `Idle ↔ Running` transitions are driven by the scheduler and job runner.
/// `Disabled` is sticky: only an operator action enters or leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    #[default]
    Idle,
    Running,
    Disabled,
}

/// Persisted runtime state of one schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ScheduleState {
    #[serde(default)]
    pub status: ScheduleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ScheduleState {
    pub fn is_disabled(&self) -> bool {
        self.status == ScheduleStatus::Disabled
    }
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;

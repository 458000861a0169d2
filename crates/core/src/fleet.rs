// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide fleet state snapshot.

use crate::id::JobId;
use crate::schedule::ScheduleState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coarse agent status for the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Running,
}

/// Runtime state of one agent within the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AgentRuntimeState {
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_job_id: Option<JobId>,
    #[serde(default)]
    pub schedules: BTreeMap<String, ScheduleState>,
}

/// Snapshot of the whole fleet, persisted on shutdown and on transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FleetState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at_ms: Option<u64>,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentRuntimeState>,
}

impl FleetState {
    /// Get-or-create the runtime entry for an agent.
    pub fn agent_mut(&mut self, name: &str) -> &mut AgentRuntimeState {
        self.agents.entry(name.to_string()).or_default()
    }
}

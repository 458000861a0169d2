// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status query DTOs.

use crate::error::FleetError;
use crate::manager::FleetManager;
use drover_core::{Clock, JobId, ScheduleState, ScheduleType};
use serde::Serialize;

/// One schedule in the status view.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleStatusView {
    pub name: String,
    #[serde(rename = "type")]
    pub schedule_type: ScheduleType,
    #[serde(flatten)]
    pub state: ScheduleState,
}

/// One agent in the status view.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatusView {
    pub name: String,
    pub description: String,
    pub running_jobs: u32,
    pub max_concurrent: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_job_id: Option<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_job_id: Option<JobId>,
    pub schedules: Vec<ScheduleStatusView>,
}

/// Snapshot of the whole fleet for operators.
#[derive(Debug, Clone, Serialize)]
pub struct FleetStatus {
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fleet_name: Option<String>,
    pub agents: Vec<AgentStatusView>,
}

impl<C: Clock> FleetManager<C> {
    /// Build the operator status view from config, store and live counts.
    pub fn status(&self) -> Result<FleetStatus, FleetError> {
        let config = self.require_config()?;
        let store = self.require_store()?;
        let fleet_state = store.read_fleet_state().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "unreadable fleet snapshot, status shows live data only");
            Default::default()
        });

        let mut agents = Vec::with_capacity(config.agents.len());
        for agent in &config.agents {
            let states = store
                .schedule_states(agent.name.as_str())
                .unwrap_or_default();
            let schedules = agent
                .def
                .schedules
                .iter()
                .map(|(name, def)| ScheduleStatusView {
                    name: name.clone(),
                    schedule_type: def.schedule_type,
                    state: states.get(name).cloned().unwrap_or_default(),
                })
                .collect();

            let runtime = fleet_state.agents.get(agent.name.as_str());
            let current_job_id = {
                let active = self.inner.active.lock();
                active
                    .iter()
                    .find(|(_, job)| job.agent == agent.name)
                    .map(|(id, _)| id.clone())
            };

            agents.push(AgentStatusView {
                name: agent.name.to_string(),
                description: agent.def.description.clone(),
                running_jobs: self.inner.counts.count(&agent.name),
                max_concurrent: agent.max_concurrent(),
                current_job_id,
                last_job_id: runtime.and_then(|r| r.last_job_id.clone()),
                schedules,
            });
        }

        Ok(FleetStatus {
            phase: self.phase().to_string(),
            fleet_name: config.fleet_name.clone(),
            agents,
        })
    }
}

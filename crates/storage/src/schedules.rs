// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-schedule runtime state persistence.
//!
//! One `schedules/<agent>.state.json` per agent holding a schedule-name →
//! state map. Entries appear lazily on first update.

use crate::atomic::{read_json, write_json};
use crate::error::StorageError;
use crate::store::StateStore;
use drover_core::ScheduleState;
use std::collections::BTreeMap;

type ScheduleMap = BTreeMap<String, ScheduleState>;

impl StateStore {
    /// All persisted schedule states for an agent.
    pub fn schedule_states(&self, agent: &str) -> Result<ScheduleMap, StorageError> {
        Ok(read_json(&self.schedule_file_path(agent)?)?.unwrap_or_default())
    }

    /// One schedule's state, default when never persisted.
    pub fn schedule_state(
        &self,
        agent: &str,
        schedule: &str,
    ) -> Result<ScheduleState, StorageError> {
        Ok(self
            .schedule_states(agent)?
            .get(schedule)
            .cloned()
            .unwrap_or_default())
    }

    /// Read-modify-write one schedule's state under the store lock.
    pub fn update_schedule_state(
        &self,
        agent: &str,
        schedule: &str,
        patch: impl FnOnce(&mut ScheduleState),
    ) -> Result<ScheduleState, StorageError> {
        let _guard = self.schedules_lock.lock();
        let path = self.schedule_file_path(agent)?;
        let mut map: ScheduleMap = read_json(&path)?.unwrap_or_default();
        let state = map.entry(schedule.to_string()).or_default();
        patch(state);
        let updated = state.clone();
        write_json(&path, &map)?;
        Ok(updated)
    }
}

#[cfg(test)]
#[path = "schedules_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleet snapshot persistence.
//!
//! A single `fleet-state.json`, atomically replaced. Writers take the
//! in-process mutex plus an exclusive lock on the `fleet-state.lock`
//! sibling, so two supervisors pointed at the same state directory cannot
//! interleave writes.

use crate::atomic::{read_json, write_json};
use crate::error::StorageError;
use crate::store::StateStore;
use drover_core::FleetState;
use fs2::FileExt;
use std::fs::OpenOptions;

impl StateStore {
    /// Read the fleet snapshot; default when missing or corrupt.
    pub fn read_fleet_state(&self) -> Result<FleetState, StorageError> {
        Ok(read_json(&self.fleet_state_path())?.unwrap_or_default())
    }

    /// Replace the fleet snapshot atomically under the write lock.
    pub fn write_fleet_state(&self, state: &FleetState) -> Result<(), StorageError> {
        let _guard = self.fleet_lock.lock();

        let lock_path = self.fleet_lock_path();
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| StorageError::io(&lock_path, source))?;
        lock_file
            .lock_exclusive()
            .map_err(|source| StorageError::io(&lock_path, source))?;

        let result = write_json(&self.fleet_state_path(), state);
        let _ = fs2::FileExt::unlock(&lock_file);
        result
    }
}

#[cfg(test)]
#[path = "fleet_state_tests.rs"]
mod tests;

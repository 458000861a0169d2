// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The state store facade.
//!
//! One instance per state directory. Operations are grouped by concern in
//! sibling modules (`jobs`, `output`, `sessions`, `schedules`,
//! `fleet_state`); this module owns the directory layout and the locks.

use crate::error::StorageError;
use crate::output::{self, JobOutputWriter, OutputWatch};
use crate::paths::{build_safe_file_path, ensure_dir};
use drover_core::JobId;
use parking_lot::Mutex;
use serde_json::Value;
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// Durable state rooted at one base directory.
pub struct StateStore {
    base: PathBuf,
    jobs_dir: PathBuf,
    sessions_dir: PathBuf,
    schedules_dir: PathBuf,
    /// Serializes fleet snapshot writers within this process; the on-disk
    /// lockfile covers other processes.
    pub(crate) fleet_lock: Mutex<()>,
    pub(crate) sessions_lock: Mutex<()>,
    pub(crate) schedules_lock: Mutex<()>,
}

impl StateStore {
    /// Open (and idempotently initialize) a state directory.
    pub fn open(base: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base: PathBuf = base.into();
        ensure_dir(&base)?;
        let base = base.canonicalize().map_err(|source| StorageError::StateDir {
            path: base.clone(),
            source,
        })?;

        let jobs_dir = base.join("jobs");
        let sessions_dir = base.join("sessions");
        let schedules_dir = base.join("schedules");
        ensure_dir(&jobs_dir)?;
        ensure_dir(&sessions_dir)?;
        ensure_dir(&schedules_dir)?;

        Ok(Self {
            base,
            jobs_dir,
            sessions_dir,
            schedules_dir,
            fleet_lock: Mutex::new(()),
            sessions_lock: Mutex::new(()),
            schedules_lock: Mutex::new(()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub(crate) fn fleet_state_path(&self) -> PathBuf {
        self.base.join("fleet-state.json")
    }

    pub(crate) fn fleet_lock_path(&self) -> PathBuf {
        self.base.join("fleet-state.lock")
    }

    pub(crate) fn job_meta_path(&self, id: &JobId) -> Result<PathBuf, StorageError> {
        build_safe_file_path(&self.jobs_dir, id.as_str(), ".meta.json")
    }

    pub(crate) fn job_output_path(&self, id: &JobId) -> Result<PathBuf, StorageError> {
        build_safe_file_path(&self.jobs_dir, id.as_str(), ".jsonl")
    }

    pub(crate) fn session_file_path(&self, agent: &str) -> Result<PathBuf, StorageError> {
        build_safe_file_path(&self.sessions_dir, agent, ".chat.json")
    }

    pub(crate) fn schedule_file_path(&self, agent: &str) -> Result<PathBuf, StorageError> {
        build_safe_file_path(&self.schedules_dir, agent, ".state.json")
    }

    pub(crate) fn jobs_dir(&self) -> &Path {
        &self.jobs_dir
    }

    // -- output log operations --

    /// Open the append handle for a job's output log.
    pub fn open_job_output(&self, id: &JobId) -> Result<JobOutputWriter, StorageError> {
        JobOutputWriter::open(self.job_output_path(id)?)
    }

    /// Read a whole output log; `skip_invalid_lines` tolerates interior
    /// malformed lines. A partial trailing line is skipped either way.
    pub fn read_job_output(
        &self,
        id: &JobId,
        skip_invalid_lines: bool,
    ) -> Result<Vec<Value>, StorageError> {
        output::read_all(&self.job_output_path(id)?, skip_invalid_lines)
    }

    /// Read records plus the end offset, for seamless history-then-follow.
    pub fn read_job_output_offset(
        &self,
        id: &JobId,
    ) -> Result<(Vec<Value>, u64), StorageError> {
        output::parse_records_from(&self.job_output_path(id)?, 0)
    }

    /// Tail a job's output log from `offset`.
    pub fn watch_job_output(&self, id: &JobId, offset: u64) -> Result<OutputWatch, StorageError> {
        Ok(output::watch(self.job_output_path(id)?, offset))
    }

    /// Append a line to the optional plain-text mirror at
    /// `jobs/<id>/output.log`.
    pub fn append_output_mirror(&self, id: &JobId, text: &str) -> Result<(), StorageError> {
        let dir = build_safe_file_path(&self.jobs_dir, id.as_str(), "")?;
        ensure_dir(&dir)?;
        let path = dir.join("output.log");
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StorageError::io(&path, source))?;
        file.write_all(text.as_bytes())
            .and_then(|()| file.write_all(b"\n"))
            .map_err(|source| StorageError::io(&path, source))
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job metadata persistence.
//!
//! One `jobs/<id>.meta.json` per job, written atomically. Terminal jobs are
//! immutable: any patch against one fails closed.

use crate::atomic::{read_json, write_json};
use crate::error::StorageError;
use crate::store::StateStore;
use drover_core::{
    AgentName, Clock, ExitReason, JobId, JobMetadata, JobStatus, RunnerErrorDetails, SessionId,
    TriggerType,
};
use tracing::warn;

/// Input for creating a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub agent: AgentName,
    pub trigger: TriggerType,
    pub schedule: Option<String>,
    pub prompt: String,
    pub forked_from: Option<JobId>,
}

/// Partial update to job metadata. Unset fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub exit_reason: Option<ExitReason>,
    pub session_id: Option<SessionId>,
    pub started_at_ms: Option<u64>,
    pub finished_at_ms: Option<u64>,
    pub error: Option<RunnerErrorDetails>,
}

impl JobPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.exit_reason.is_none()
            && self.session_id.is_none()
            && self.started_at_ms.is_none()
            && self.finished_at_ms.is_none()
            && self.error.is_none()
    }
}

/// Filter and cursor for [`StateStore::list_jobs`].
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub agent: Option<AgentName>,
    pub status: Option<JobStatus>,
    /// Page size; unlimited when `None`.
    pub limit: Option<usize>,
    /// Resume after this job id (exclusive), as returned in [`JobPage`].
    pub after: Option<JobId>,
}

/// One page of jobs in chronological order.
#[derive(Debug, Clone)]
pub struct JobPage {
    pub jobs: Vec<JobMetadata>,
    /// Present when more jobs remain; pass back as `JobFilter::after`.
    pub cursor: Option<JobId>,
}

impl StateStore {
    /// Allocate an id and write initial metadata atomically.
    pub fn create_job(&self, new: NewJob, clock: &impl Clock) -> Result<JobMetadata, StorageError> {
        let id = JobId::allocate(clock);
        let meta = JobMetadata {
            id: id.clone(),
            agent: new.agent,
            trigger: new.trigger,
            schedule: new.schedule,
            prompt: new.prompt,
            session_id: None,
            forked_from: new.forked_from,
            status: JobStatus::Pending,
            exit_reason: None,
            created_at_ms: clock.epoch_ms(),
            started_at_ms: None,
            finished_at_ms: None,
            error: None,
        };
        write_json(&self.job_meta_path(&id)?, &meta)?;
        Ok(meta)
    }

    /// Read one job's metadata, `None` when unknown.
    pub fn get_job(&self, id: &JobId) -> Result<Option<JobMetadata>, StorageError> {
        read_json(&self.job_meta_path(id)?)
    }

    /// Apply a patch to a job's metadata.
    ///
    /// Fails closed with [`StorageError::TerminalJobImmutable`] when the job
    /// is already terminal and the patch would change anything.
    pub fn update_job(&self, id: &JobId, patch: JobPatch) -> Result<JobMetadata, StorageError> {
        let path = self.job_meta_path(id)?;
        let mut meta: JobMetadata =
            read_json(&path)?.ok_or_else(|| StorageError::JobNotFound(id.to_string()))?;

        if meta.is_terminal() {
            if patch.is_empty() {
                return Ok(meta);
            }
            return Err(StorageError::TerminalJobImmutable(id.to_string()));
        }

        if let Some(status) = patch.status {
            meta.status = status;
        }
        if let Some(reason) = patch.exit_reason {
            meta.exit_reason = Some(reason);
        }
        if let Some(session_id) = patch.session_id {
            meta.session_id = Some(session_id);
        }
        if let Some(at) = patch.started_at_ms {
            meta.started_at_ms = Some(at);
        }
        if let Some(at) = patch.finished_at_ms {
            meta.finished_at_ms = Some(at);
        }
        if let Some(error) = patch.error {
            meta.error = Some(error);
        }

        write_json(&path, &meta)?;
        Ok(meta)
    }

    /// List jobs chronologically with filtering and cursor paging.
    pub fn list_jobs(&self, filter: &JobFilter) -> Result<JobPage, StorageError> {
        let mut jobs: Vec<JobMetadata> = Vec::new();
        let entries = std::fs::read_dir(self.jobs_dir())
            .map_err(|source| StorageError::io(self.jobs_dir(), source))?;

        for entry in entries {
            let entry = entry.map_err(|source| StorageError::io(self.jobs_dir(), source))?;
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.ends_with(".meta.json") {
                continue;
            }
            match read_json::<JobMetadata>(&path) {
                Ok(Some(meta)) => jobs.push(meta),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable job metadata");
                }
            }
        }

        jobs.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });

        if let Some(after) = &filter.after {
            if let Some(pos) = jobs.iter().position(|j| j.id == *after) {
                jobs.drain(..=pos);
            }
        }

        jobs.retain(|j| {
            filter.agent.as_ref().is_none_or(|a| j.agent == *a)
                && filter.status.is_none_or(|s| j.status == s)
        });

        let cursor = match filter.limit {
            Some(limit) if jobs.len() > limit => {
                jobs.truncate(limit);
                jobs.last().map(|j| j.id.clone())
            }
            _ => None,
        };

        Ok(JobPage { jobs, cursor })
    }
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;

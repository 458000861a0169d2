// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job control: cancel and fork.

use crate::error::{CancelReason, FleetError, ForkReason};
use crate::manager::FleetManager;
use crate::trigger::{RunSpec, TriggerResult};
use drover_core::{
    Clock, ExitReason, FleetEvent, JobId, JobStatus, TerminationType, TriggerType,
};
use drover_storage::JobPatch;
use std::time::Duration;
use tracing::{info, warn};

/// How often cancellation polls for the job to reach a terminal state.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Overrides for [`FleetManager::fork_job`].
#[derive(Debug, Clone, Default)]
pub struct ForkOverrides {
    pub prompt: Option<String>,
    pub schedule: Option<String>,
}

impl<C: Clock> FleetManager<C> {
    /// Cancel a running job.
    ///
    /// Already-terminal jobs return `AlreadyStopped` without emitting
    /// anything. A live job is signalled and given `timeout` (default: the
    /// configured cancel grace) to wind down; overrun forces the terminal
    /// record.
    pub async fn cancel_job(
        &self,
        job_id: &JobId,
        timeout: Option<Duration>,
    ) -> Result<TerminationType, FleetError> {
        let store = self.require_store()?;
        let meta = store
            .get_job(job_id)?
            .ok_or_else(|| FleetError::JobNotFound(job_id.to_string()))?;

        if meta.is_terminal() {
            return Ok(TerminationType::AlreadyStopped);
        }

        let timeout = timeout.unwrap_or_else(|| {
            self.config()
                .map(|c| c.settings.cancel_timeout)
                .unwrap_or(Duration::from_secs(10))
        });

        let token = {
            let active = self.inner.active.lock();
            active.get(job_id).map(|job| job.cancel.clone())
        };

        match token {
            Some(token) => {
                token.cancel();
                let deadline = tokio::time::Instant::now() + timeout;
                loop {
                    if let Some(meta) = store.get_job(job_id)? {
                        if meta.is_terminal() {
                            info!(job = %job_id, "job cancelled gracefully");
                            return Ok(TerminationType::Graceful);
                        }
                    }
                    if tokio::time::Instant::now() >= deadline {
                        warn!(job = %job_id, "graceful cancel timed out, forcing");
                        self.force_cancel(job_id, &meta.agent)?;
                        return Ok(TerminationType::Forced);
                    }
                    tokio::time::sleep(CANCEL_POLL_INTERVAL).await;
                }
            }
            None => {
                // Not running in this process (crash leftover): force the
                // terminal record so the job cannot linger as `running`.
                warn!(job = %job_id, "cancel for a job with no live runner, forcing terminal state");
                self.force_cancel(job_id, &meta.agent)?;
                Ok(TerminationType::Forced)
            }
        }
    }

    fn force_cancel(
        &self,
        job_id: &JobId,
        agent: &drover_core::AgentName,
    ) -> Result<(), FleetError> {
        let store = self.require_store()?;
        let patch = JobPatch {
            status: Some(JobStatus::Cancelled),
            exit_reason: Some(ExitReason::Cancelled),
            finished_at_ms: Some(self.inner.clock.epoch_ms()),
            ..Default::default()
        };
        match store.update_job(job_id, patch) {
            Ok(_) => {
                self.inner.active.lock().remove(job_id);
                self.inner.bus.emit(FleetEvent::JobCancelled {
                    job: job_id.clone(),
                    agent: agent.clone(),
                    termination: TerminationType::Forced,
                });
                Ok(())
            }
            // The runner won the race and wrote its own terminal record.
            Err(drover_storage::StorageError::TerminalJobImmutable(_)) => Ok(()),
            Err(e) => Err(FleetError::Cancel {
                reason: CancelReason::ProcessError,
                message: e.to_string(),
            }),
        }
    }

    /// Fork a job: a new job on the same agent that resumes the original's
    /// session with the driver's fork flag set.
    pub async fn fork_job(
        &self,
        job_id: &JobId,
        overrides: ForkOverrides,
    ) -> Result<TriggerResult, FleetError> {
        self.check_active("fork")?;
        let store = self.require_store()?;

        let original = store.get_job(job_id)?.ok_or(FleetError::Fork {
            reason: ForkReason::JobNotFound,
            message: format!("job not found: {job_id}"),
        })?;

        let config = self.require_config()?;
        let agent = config
            .agent(original.agent.as_str())
            .ok_or(FleetError::Fork {
                reason: ForkReason::AgentNotFound,
                message: format!("agent no longer configured: {}", original.agent),
            })?
            .clone();

        let session_id = original.session_id.clone().ok_or(FleetError::Fork {
            reason: ForkReason::NoSession,
            message: format!("job {job_id} has no session to fork"),
        })?;

        let schedule = overrides.schedule.or(original.schedule);
        let output_to_file = schedule
            .as_deref()
            .and_then(|name| agent.schedule(name))
            .is_some_and(|s| s.output_to_file);

        let spec = RunSpec {
            trigger: TriggerType::Fork,
            schedule,
            prompt: overrides.prompt.unwrap_or(original.prompt),
            resume: Some(session_id),
            fork_session: true,
            forked_from: Some(job_id.clone()),
            output_to_file,
            bypass_concurrency_limit: false,
            extra_mcp_servers: Default::default(),
            message_tx: None,
            accept_tx: None,
            agent,
        };
        self.run_job(spec).await
    }
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;

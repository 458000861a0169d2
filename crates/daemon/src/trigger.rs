// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Triggering jobs: manual, scheduled and chat paths.
//!
//! All three converge on [`FleetManager::run_job`], which enforces the
//! concurrency cap, resolves the prompt, registers the job for cancellation
//! and awaits the runner's terminal result. The scheduler path wraps it in a
//! spawned task and acknowledges as soon as the job is accepted.

use crate::error::FleetError;
use crate::manager::{ActiveJob, FleetManager, Phase};
use async_trait::async_trait;
use drover_bridge::{ChatTarget, ChatTriggerOutcome, ChatTriggerRequest};
use drover_config::{McpServerDef, ResolvedAgent};
use drover_core::{
    AgentName, Clock, DriverMessage, EventSink, JobId, RunnerErrorDetails, SessionId, TriggerType,
};
use drover_engine::{HookExecutor, JobRunner, RunnerRequest};
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Fallback prompt when neither the caller, the schedule nor the agent
/// provides one.
const DEFAULT_PROMPT: &str = "Execute your configured task";

/// Options for [`FleetManager::trigger`].
#[derive(Default)]
pub struct TriggerOptions {
    pub prompt: Option<String>,
    /// Resume this driver session.
    pub resume: Option<SessionId>,
    /// Skip the concurrency check for this one trigger.
    pub bypass_concurrency_limit: bool,
    /// Ephemeral tool servers for this run only.
    pub extra_mcp_servers: IndexMap<String, McpServerDef>,
    /// Live typed messages from the running job.
    pub message_tx: Option<mpsc::UnboundedSender<DriverMessage>>,
}

/// Terminal result of a trigger.
#[derive(Debug, Clone)]
pub struct TriggerResult {
    pub job_id: JobId,
    pub agent_name: AgentName,
    pub schedule_name: Option<String>,
    pub started_at_ms: u64,
    pub prompt: String,
    pub success: bool,
    pub session_id: Option<SessionId>,
    pub error: Option<String>,
    pub error_details: Option<RunnerErrorDetails>,
}

/// Everything `run_job` needs beyond the public trigger options.
pub(crate) struct RunSpec {
    pub agent: Arc<ResolvedAgent>,
    pub trigger: TriggerType,
    pub schedule: Option<String>,
    pub prompt: String,
    pub resume: Option<SessionId>,
    pub fork_session: bool,
    pub forked_from: Option<JobId>,
    pub output_to_file: bool,
    pub bypass_concurrency_limit: bool,
    pub extra_mcp_servers: IndexMap<String, McpServerDef>,
    pub message_tx: Option<mpsc::UnboundedSender<DriverMessage>>,
    /// Fired once the job exists (scheduler acknowledgement).
    pub accept_tx: Option<oneshot::Sender<JobId>>,
}

impl<C: Clock> FleetManager<C> {
    /// Trigger an agent and await the job's terminal result.
    pub async fn trigger(
        &self,
        agent: &str,
        schedule: Option<&str>,
        options: TriggerOptions,
    ) -> Result<TriggerResult, FleetError> {
        self.check_active("trigger")?;
        let config = self.require_config()?;
        let resolved = config
            .agent(agent)
            .ok_or_else(|| FleetError::AgentNotFound(agent.to_string()))?
            .clone();

        let schedule_def = match schedule {
            Some(name) => Some(resolved.schedule(name).ok_or_else(|| {
                FleetError::ScheduleNotFound {
                    agent: agent.to_string(),
                    schedule: name.to_string(),
                }
            })?),
            None => None,
        };

        let prompt = options
            .prompt
            .or_else(|| schedule_def.and_then(|s| s.prompt.clone()))
            .or_else(|| resolved.def.default_prompt.clone())
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string());

        let spec = RunSpec {
            trigger: TriggerType::Manual,
            schedule: schedule.map(String::from),
            prompt,
            resume: options.resume,
            fork_session: false,
            forked_from: None,
            output_to_file: schedule_def.is_some_and(|s| s.output_to_file),
            bypass_concurrency_limit: options.bypass_concurrency_limit,
            extra_mcp_servers: options.extra_mcp_servers,
            message_tx: options.message_tx,
            accept_tx: None,
            agent: resolved,
        };
        self.run_job(spec).await
    }

    /// Scheduler path: spawn the run and return once the job is accepted.
    pub(crate) async fn execute_scheduled(
        &self,
        agent: AgentName,
        schedule: String,
    ) -> Result<(), String> {
        let config = self.require_config().map_err(|e| e.to_string())?;
        let resolved = config
            .agent(agent.as_str())
            .ok_or_else(|| format!("agent not found: {agent}"))?
            .clone();
        let schedule_def = resolved
            .schedule(&schedule)
            .ok_or_else(|| format!("schedule not found: {agent}/{schedule}"))?;

        let prompt = schedule_def
            .prompt
            .clone()
            .or_else(|| resolved.def.default_prompt.clone())
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string());
        let output_to_file = schedule_def.output_to_file;

        let (accept_tx, accept_rx) = oneshot::channel();
        let spec = RunSpec {
            trigger: TriggerType::Schedule,
            schedule: Some(schedule.clone()),
            prompt,
            resume: None,
            fork_session: false,
            forked_from: None,
            output_to_file,
            bypass_concurrency_limit: false,
            extra_mcp_servers: IndexMap::new(),
            message_tx: None,
            accept_tx: Some(accept_tx),
            agent: resolved,
        };

        let manager = self.clone();
        let schedule_name = schedule.clone();
        let agent_name = agent.clone();
        tokio::spawn(async move {
            let result = manager.run_job(spec).await;
            // The executor owns returning the schedule to idle.
            let error = match &result {
                Ok(result) if result.success => None,
                Ok(result) => Some(result.error.clone().unwrap_or_else(|| "job failed".into())),
                Err(e) => Some(e.to_string()),
            };
            let store = manager.store();
            if let Some(store) = store {
                let updated = store.update_schedule_state(
                    agent_name.as_str(),
                    &schedule_name,
                    |s| {
                        if s.status == drover_core::ScheduleStatus::Running {
                            s.status = drover_core::ScheduleStatus::Idle;
                        }
                        if let Some(error) = &error {
                            s.last_error = Some(error.clone());
                        }
                    },
                );
                if let Err(e) = updated {
                    warn!(agent = %agent_name, schedule = %schedule_name, error = %e,
                        "failed to return schedule to idle");
                }
            }
        });

        // Acceptance, not completion: the job exists (or the run died early).
        accept_rx
            .await
            .map(|_| ())
            .map_err(|_| "job was not accepted".to_string())
    }

    /// Common run path. Enforces the concurrency cap, registers the active
    /// job for cancellation, executes, persists the snapshot transition.
    pub(crate) async fn run_job(&self, spec: RunSpec) -> Result<TriggerResult, FleetError> {
        let store = self.require_store()?;

        if !spec.bypass_concurrency_limit {
            let limit = spec.agent.max_concurrent();
            let running = self.inner.counts.count(&spec.agent.name);
            if running >= limit {
                return Err(FleetError::Capacity {
                    agent: spec.agent.name.to_string(),
                    limit,
                });
            }
        }

        let cancel = CancellationToken::new();
        let (register_tx, register_rx) = oneshot::channel::<JobId>();

        // Register the job for cancellation as soon as it exists, while the
        // runner keeps driving.
        let registration = {
            let manager = self.clone();
            let agent = spec.agent.name.clone();
            let cancel = cancel.clone();
            let forward = spec.accept_tx;
            tokio::spawn(async move {
                if let Ok(job_id) = register_rx.await {
                    manager
                        .inner
                        .active
                        .lock()
                        .insert(job_id.clone(), ActiveJob { agent, cancel });
                    if let Some(forward) = forward {
                        let _ = forward.send(job_id);
                    }
                }
            })
        };

        let runner = JobRunner::new(
            Arc::clone(&store),
            Arc::clone(&self.inner.driver),
            Arc::new(self.inner.bus.clone()) as Arc<dyn EventSink>,
            HookExecutor::default(),
            self.inner.clock.clone(),
        );

        let request = RunnerRequest {
            agent: spec.agent,
            prompt: spec.prompt,
            trigger: spec.trigger,
            schedule: spec.schedule,
            resume: spec.resume,
            fork_session: spec.fork_session,
            forked_from: spec.forked_from,
            output_to_file: spec.output_to_file,
            extra_mcp_servers: spec.extra_mcp_servers,
            message_tx: spec.message_tx,
            accept_tx: Some(register_tx),
            cancel,
        };

        let result = runner.execute(request).await;
        // The registration either inserted already or never will (the runner
        // dropped the oneshot); waiting here rules out a stale insert.
        let _ = registration.await;
        let result = result?;
        self.inner.active.lock().remove(&result.job_id);

        if let Err(e) = self.persist_fleet_state(false) {
            warn!(error = %e, "failed to persist fleet state after job");
        }

        Ok(TriggerResult {
            job_id: result.job_id,
            agent_name: result.agent,
            schedule_name: result.schedule,
            started_at_ms: result.started_at_ms,
            prompt: result.prompt,
            success: result.success,
            session_id: result.session_id,
            error: result.error.as_ref().map(|e| e.message.clone()),
            error_details: result.error,
        })
    }

    pub(crate) fn check_active(&self, operation: &'static str) -> Result<(), FleetError> {
        let phase = self.phase();
        if matches!(phase, Phase::Initialized | Phase::Running) {
            Ok(())
        } else {
            Err(FleetError::InvalidState {
                operation,
                phase: phase.to_string(),
            })
        }
    }
}

#[async_trait]
impl<C: Clock> ChatTarget for FleetManager<C> {
    async fn trigger_chat(
        &self,
        agent: &AgentName,
        request: ChatTriggerRequest,
    ) -> Result<ChatTriggerOutcome, String> {
        let result = self
            .trigger(
                agent.as_str(),
                None,
                TriggerOptions {
                    prompt: Some(request.prompt),
                    resume: request.resume,
                    bypass_concurrency_limit: false,
                    extra_mcp_servers: request.extra_mcp_servers,
                    message_tx: Some(request.message_tx),
                },
            )
            .await
            .map_err(|e| e.to_string())?;

        Ok(ChatTriggerOutcome {
            job_id: result.job_id,
            success: result.success,
            session_id: result.session_id,
            error: result.error,
        })
    }
}

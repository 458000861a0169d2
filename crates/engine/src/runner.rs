// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job execution.
//!
//! The runner owns a job from creation to its terminal record: it creates
//! the metadata, drives the query driver, appends every record to the
//! durable output log, emits lifecycle events, and runs hooks at the end.
//! Once the terminal record is written the job belongs to the read-only
//! side of the state store.

use crate::driver::{DriverError, QueryDriver, QueryOptions};
use crate::hooks::{
    HookAgentInfo, HookContext, HookExecutor, HookJobInfo, HookResultInfo,
};
use drover_config::{HookStage, McpServerDef, ResolvedAgent};
use drover_core::{
    AgentName, Clock, DriverMessage, EventSink, ExitReason, FleetEvent, JobId, JobStatus,
    RunnerErrorDetails, RunnerErrorKind, SessionId, TerminationType, TriggerType,
};
use drover_storage::{JobPatch, NewJob, StateStore, StorageError};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One execution request.
pub struct RunnerRequest {
    pub agent: Arc<ResolvedAgent>,
    pub prompt: String,
    pub trigger: TriggerType,
    pub schedule: Option<String>,
    /// Resume this driver session.
    pub resume: Option<SessionId>,
    /// Fork instead of continuing the resumed session. Requires `resume`.
    pub fork_session: bool,
    pub forked_from: Option<JobId>,
    /// Mirror assistant text to `jobs/<id>/output.log`.
    pub output_to_file: bool,
    /// Caller-scoped tool servers merged into the agent's set for this run.
    pub extra_mcp_servers: IndexMap<String, McpServerDef>,
    /// Live typed messages for the caller (chat routers). Send failures are
    /// logged and never abort the run.
    pub message_tx: Option<mpsc::UnboundedSender<DriverMessage>>,
    /// Fired with the job id as soon as the job exists — the scheduler's
    /// start acknowledgement, and how callers learn the id for cancellation.
    pub accept_tx: Option<oneshot::Sender<JobId>>,
    pub cancel: CancellationToken,
}

/// Terminal summary of one job execution.
#[derive(Debug, Clone)]
pub struct RunnerResult {
    pub job_id: JobId,
    pub agent: AgentName,
    pub schedule: Option<String>,
    pub prompt: String,
    pub started_at_ms: u64,
    pub status: JobStatus,
    pub success: bool,
    pub session_id: Option<SessionId>,
    pub error: Option<RunnerErrorDetails>,
    pub termination: Option<TerminationType>,
}

/// How the message loop ended.
enum LoopEnd {
    Clean,
    Cancelled,
    Failed(RunnerErrorDetails),
}

/// Drives the query driver for one job at a time.
pub struct JobRunner<C: Clock> {
    store: Arc<StateStore>,
    driver: Arc<dyn QueryDriver>,
    sink: Arc<dyn EventSink>,
    hooks: HookExecutor,
    clock: C,
}

impl<C: Clock> JobRunner<C> {
    pub fn new(
        store: Arc<StateStore>,
        driver: Arc<dyn QueryDriver>,
        sink: Arc<dyn EventSink>,
        hooks: HookExecutor,
        clock: C,
    ) -> Self {
        Self {
            store,
            driver,
            sink,
            hooks,
            clock,
        }
    }

    /// Execute one job to its terminal state.
    ///
    /// Failures after the job exists are recorded on the job and reported in
    /// the result; only failures to touch the store at all surface as `Err`.
    pub async fn execute(&self, mut request: RunnerRequest) -> Result<RunnerResult, StorageError> {
        let meta = self.store.create_job(
            NewJob {
                agent: request.agent.name.clone(),
                trigger: request.trigger,
                schedule: request.schedule.clone(),
                prompt: request.prompt.clone(),
                forked_from: request.forked_from.clone(),
            },
            &self.clock,
        )?;
        let job_id = meta.id.clone();

        self.sink.emit(FleetEvent::JobCreated {
            job: job_id.clone(),
            agent: request.agent.name.clone(),
            trigger: request.trigger,
            schedule: request.schedule.clone(),
        });
        if let Some(original) = &request.forked_from {
            self.sink.emit(FleetEvent::JobForked {
                original: original.clone(),
                fork: job_id.clone(),
                agent: request.agent.name.clone(),
            });
        }
        if let Some(accept_tx) = request.accept_tx.take() {
            let _ = accept_tx.send(job_id.clone());
        }

        let started_at_ms = self.clock.epoch_ms();
        // Acceptance has fired; from here on failures are recorded on the
        // job instead of surfacing, so the caller's registration stays valid.
        if let Err(e) = self.store.update_job(
            &job_id,
            JobPatch {
                status: Some(JobStatus::Running),
                started_at_ms: Some(started_at_ms),
                ..Default::default()
            },
        ) {
            warn!(job = %job_id, error = %e, "failed to mark job running");
        }

        let run = Run {
            runner: self,
            request: &request,
            job_id: &job_id,
            started_at_ms,
        };
        let state = run.drive().await;
        run.finish(state).await
    }
}

/// Mutable state accumulated while consuming the driver stream.
#[derive(Default)]
struct StreamState {
    end: Option<LoopEnd>,
    session_id: Option<SessionId>,
    messages_received: u64,
    last_assistant_text: Option<String>,
}

/// One in-flight execution.
struct Run<'a, C: Clock> {
    runner: &'a JobRunner<C>,
    request: &'a RunnerRequest,
    job_id: &'a JobId,
    started_at_ms: u64,
}

impl<C: Clock> Run<'_, C> {
    /// Run `before_run` hooks, open the driver stream and consume it.
    async fn drive(&self) -> StreamState {
        let mut state = StreamState::default();
        let request = self.request;

        let before = self
            .runner
            .hooks
            .execute(
                &request.agent.def.hooks,
                HookStage::BeforeRun,
                &self.hook_context("job:started", &state, false),
                &request.agent.working_dir,
                &request.cancel,
            )
            .await;
        if before.should_fail_job {
            state.end = Some(LoopEnd::Failed(RunnerErrorDetails {
                kind: RunnerErrorKind::Initialization,
                recoverable: false,
                messages_received: 0,
                message: "before_run hook failed".to_string(),
            }));
            return state;
        }

        let options = QueryOptions {
            resume: request.resume.clone(),
            fork_session: request.fork_session,
            ..QueryOptions::for_agent(&request.agent)
        }
        .with_extra_mcp_servers(request.extra_mcp_servers.clone());

        let mut stream = match self.runner.driver.query(&request.prompt, options).await {
            Ok(stream) => stream,
            Err(e) => {
                state.end = Some(LoopEnd::Failed(RunnerErrorDetails {
                    kind: RunnerErrorKind::Initialization,
                    recoverable: true,
                    messages_received: 0,
                    message: e.to_string(),
                }));
                return state;
            }
        };

        let mut output = match self.runner.store.open_job_output(self.job_id) {
            Ok(writer) => writer,
            Err(e) => {
                state.end = Some(LoopEnd::Failed(RunnerErrorDetails {
                    kind: RunnerErrorKind::Unknown,
                    recoverable: false,
                    messages_received: 0,
                    message: e.to_string(),
                }));
                return state;
            }
        };

        let mut open_tool_uses: HashSet<String> = HashSet::new();

        loop {
            let item = tokio::select! {
                () = request.cancel.cancelled() => {
                    state.end = Some(LoopEnd::Cancelled);
                    break;
                }
                item = stream.next() => item,
            };

            let record = match item {
                None => {
                    state.end = Some(LoopEnd::Clean);
                    break;
                }
                Some(Ok(record)) => record,
                Some(Err(e)) => {
                    state.end = Some(LoopEnd::Failed(RunnerErrorDetails {
                        kind: RunnerErrorKind::Streaming,
                        recoverable: matches!(e, DriverError::Stream(_)),
                        messages_received: state.messages_received,
                        message: e.to_string(),
                    }));
                    break;
                }
            };

            state.messages_received += 1;
            if let Err(e) = output.append(&record) {
                state.end = Some(LoopEnd::Failed(RunnerErrorDetails {
                    kind: RunnerErrorKind::Unknown,
                    recoverable: false,
                    messages_received: state.messages_received,
                    message: format!("output log write failed: {e}"),
                }));
                break;
            }

            let message = match DriverMessage::from_value(&record) {
                Ok(message) => message,
                Err(e) => {
                    state.end = Some(LoopEnd::Failed(RunnerErrorDetails {
                        kind: RunnerErrorKind::MalformedResponse,
                        recoverable: false,
                        messages_received: state.messages_received,
                        message: e.to_string(),
                    }));
                    break;
                }
            };

            if let Some(session_id) = message.session_id() {
                state.session_id = Some(session_id.clone());
                if let Err(e) = self.runner.store.update_job(
                    self.job_id,
                    JobPatch {
                        session_id: Some(session_id.clone()),
                        ..Default::default()
                    },
                ) {
                    warn!(job = %self.job_id, error = %e, "failed to persist session id");
                }
            }

            // Best-effort tool pairing; an unknown id is only worth a debug line.
            track_tool_pairing(&message, &mut open_tool_uses, self.job_id);

            if let Some(text) = message.assistant_text() {
                state.last_assistant_text = Some(text.clone());
                if self.request.output_to_file {
                    if let Err(e) = self.runner.store.append_output_mirror(self.job_id, &text) {
                        warn!(job = %self.job_id, error = %e, "output mirror write failed");
                    }
                }
            }

            if let DriverMessage::Error { message: text } = &message {
                state.end = Some(LoopEnd::Failed(RunnerErrorDetails {
                    kind: RunnerErrorKind::Streaming,
                    recoverable: true,
                    messages_received: state.messages_received,
                    message: text.clone(),
                }));
                break;
            }
            if let DriverMessage::Result(summary) = &message {
                if summary.is_error {
                    state.end = Some(LoopEnd::Failed(RunnerErrorDetails {
                        kind: RunnerErrorKind::Unknown,
                        recoverable: false,
                        messages_received: state.messages_received,
                        message: summary
                            .result
                            .clone()
                            .unwrap_or_else(|| "engine reported an error result".to_string()),
                    }));
                    break;
                }
            }

            if let Some(tx) = &request.message_tx {
                if tx.send(message).is_err() {
                    debug!(job = %self.job_id, "message consumer gone, continuing without it");
                }
            }

            self.runner.sink.emit(FleetEvent::JobOutput {
                job: self.job_id.clone(),
                agent: request.agent.name.clone(),
                record,
            });
        }

        state
    }

    /// Write the terminal record, emit the terminal event, run hooks.
    async fn finish(&self, state: StreamState) -> Result<RunnerResult, StorageError> {
        let finished_at_ms = self.runner.clock.epoch_ms();
        let duration_ms = finished_at_ms.saturating_sub(self.started_at_ms);
        let request = self.request;

        let (status, exit_reason, error, termination) = match &state.end {
            Some(LoopEnd::Clean) | None => {
                (JobStatus::Completed, ExitReason::Success, None, None)
            }
            Some(LoopEnd::Cancelled) => (
                JobStatus::Cancelled,
                ExitReason::Cancelled,
                None,
                Some(TerminationType::Graceful),
            ),
            Some(LoopEnd::Failed(details)) => (
                JobStatus::Failed,
                ExitReason::Error,
                Some(details.clone()),
                None,
            ),
        };

        self.runner.store.update_job(
            self.job_id,
            JobPatch {
                status: Some(status),
                exit_reason: Some(exit_reason),
                finished_at_ms: Some(finished_at_ms),
                error: error.clone(),
                ..Default::default()
            },
        )?;

        let success = status == JobStatus::Completed;
        let event_name = match status {
            JobStatus::Completed => "job:completed",
            JobStatus::Cancelled => "job:cancelled",
            _ => "job:failed",
        };

        match status {
            JobStatus::Completed => self.runner.sink.emit(FleetEvent::JobCompleted {
                job: self.job_id.clone(),
                agent: request.agent.name.clone(),
                duration_ms,
                session_id: state.session_id.clone(),
            }),
            JobStatus::Cancelled => self.runner.sink.emit(FleetEvent::JobCancelled {
                job: self.job_id.clone(),
                agent: request.agent.name.clone(),
                termination: TerminationType::Graceful,
            }),
            _ => self.runner.sink.emit(FleetEvent::JobFailed {
                job: self.job_id.clone(),
                agent: request.agent.name.clone(),
                error: error.clone().unwrap_or(RunnerErrorDetails {
                    kind: RunnerErrorKind::Unknown,
                    recoverable: false,
                    messages_received: state.messages_received,
                    message: "unknown failure".to_string(),
                }),
            }),
        }

        // Terminal hooks run outside the job's cancellation scope so an
        // aborted job still gets its notifications.
        let hook_cancel = CancellationToken::new();
        let mut context = self.hook_context(event_name, &state, success);
        context.job.completed_at_ms = Some(finished_at_ms);
        context.job.duration_ms = Some(duration_ms);

        let after = self
            .runner
            .hooks
            .execute(
                &request.agent.def.hooks,
                HookStage::AfterRun,
                &context,
                &request.agent.working_dir,
                &hook_cancel,
            )
            .await;
        if after.should_fail_job {
            // The job is already terminal; a fatal after_run hook is an
            // operator signal, not a re-run.
            warn!(job = %self.job_id, "fatal after_run hook on terminal job");
            self.runner.sink.emit(FleetEvent::Error {
                message: format!("fatal after_run hook for job {}", self.job_id),
            });
        }
        if !success {
            self.runner
                .hooks
                .execute(
                    &request.agent.def.hooks,
                    HookStage::OnError,
                    &context,
                    &request.agent.working_dir,
                    &hook_cancel,
                )
                .await;
        }

        Ok(RunnerResult {
            job_id: self.job_id.clone(),
            agent: request.agent.name.clone(),
            schedule: request.schedule.clone(),
            prompt: request.prompt.clone(),
            started_at_ms: self.started_at_ms,
            status,
            success,
            session_id: state.session_id,
            error,
            termination,
        })
    }

    fn hook_context(&self, event: &str, state: &StreamState, success: bool) -> HookContext {
        let metadata = self.request.agent.metadata_path().and_then(|path| {
            std::fs::read_to_string(path)
                .ok()
                .and_then(|text| serde_json::from_str::<Value>(&text).ok())
        });

        HookContext {
            event: event.to_string(),
            job: HookJobInfo {
                id: self.job_id.to_string(),
                agent_id: self.request.agent.name.to_string(),
                schedule: self.request.schedule.clone(),
                started_at_ms: Some(self.started_at_ms),
                completed_at_ms: None,
                duration_ms: None,
            },
            result: HookResultInfo {
                success,
                output: state.last_assistant_text.clone().unwrap_or_default(),
                error: match &state.end {
                    Some(LoopEnd::Failed(details)) => Some(details.message.clone()),
                    _ => None,
                },
            },
            agent: HookAgentInfo {
                id: self.request.agent.name.to_string(),
                name: self.request.agent.name.to_string(),
            },
            metadata,
        }
    }
}

/// Track tool_use ids and flag unpaired tool_results. Pairing never blocks
/// or fails the stream.
fn track_tool_pairing(message: &DriverMessage, open: &mut HashSet<String>, job_id: &JobId) {
    use drover_core::ContentBlock;

    let blocks = match message {
        DriverMessage::Assistant { content } | DriverMessage::User { content } => content,
        _ => return,
    };
    for block in blocks {
        match block {
            ContentBlock::ToolUse { id, .. } => {
                open.insert(id.clone());
            }
            ContentBlock::ToolResult { tool_use_id, .. } => {
                if !open.remove(tool_use_id) {
                    debug!(job = %job_id, tool_use_id, "tool_result without a matching tool_use");
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;

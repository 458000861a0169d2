// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle events published on the fleet event bus.
//!
//! Serializes with `{"type": "job:created", ...fields}` format. Bridge
//! events carry the bridge kind as a field; [`FleetEvent::name`] renders the
//! `{bridge}:message:handled` form used in logs.

use crate::id::{AgentName, ChannelId, JobId, SessionId};
use crate::job::{RunnerErrorDetails, TerminationType, TriggerType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why the scheduler skipped a due schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    MaxConcurrent,
}

/// Chat session lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionLifecycle {
    Created,
    Resumed,
    Cleared,
}

/// Kind of a configuration change detected at reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// What a configuration change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    Agent,
    Schedule,
}

/// One entry in the change list carried by `config:reloaded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigChange {
    pub kind: ChangeKind,
    pub category: ChangeCategory,
    /// `"writer"` for agents, `"writer/tick"` for schedules.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Events that flow over the fleet event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FleetEvent {
    // -- lifecycle --
    #[serde(rename = "initialized")]
    Initialized,

    #[serde(rename = "started")]
    Started,

    #[serde(rename = "stopped")]
    Stopped,

    #[serde(rename = "error")]
    Error { message: String },

    #[serde(rename = "config:reloaded")]
    ConfigReloaded { changes: Vec<ConfigChange> },

    // -- agent --
    #[serde(rename = "agent:started")]
    AgentStarted { agent: AgentName },

    #[serde(rename = "agent:stopped")]
    AgentStopped { agent: AgentName },

    // -- schedule --
    #[serde(rename = "schedule:triggered")]
    ScheduleTriggered { agent: AgentName, schedule: String },

    #[serde(rename = "schedule:skipped")]
    ScheduleSkipped {
        agent: AgentName,
        schedule: String,
        reason: SkipReason,
    },

    // -- job --
    #[serde(rename = "job:created")]
    JobCreated {
        job: JobId,
        agent: AgentName,
        trigger: TriggerType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schedule: Option<String>,
    },

    #[serde(rename = "job:output")]
    JobOutput {
        job: JobId,
        agent: AgentName,
        record: Value,
    },

    #[serde(rename = "job:completed")]
    JobCompleted {
        job: JobId,
        agent: AgentName,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },

    #[serde(rename = "job:failed")]
    JobFailed {
        job: JobId,
        agent: AgentName,
        error: RunnerErrorDetails,
    },

    #[serde(rename = "job:cancelled")]
    JobCancelled {
        job: JobId,
        agent: AgentName,
        termination: TerminationType,
    },

    #[serde(rename = "job:forked")]
    JobForked {
        original: JobId,
        fork: JobId,
        agent: AgentName,
    },

    // -- chat bridges --
    #[serde(rename = "bridge:message:handled")]
    BridgeMessageHandled {
        bridge: String,
        agent: AgentName,
        channel: ChannelId,
    },

    #[serde(rename = "bridge:message:error")]
    BridgeMessageError {
        bridge: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<AgentName>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<ChannelId>,
        message: String,
    },

    #[serde(rename = "bridge:error")]
    BridgeError { bridge: String, message: String },

    #[serde(rename = "bridge:session:lifecycle")]
    BridgeSessionLifecycle {
        bridge: String,
        agent: AgentName,
        channel: ChannelId,
        event: SessionLifecycle,
    },
}

impl FleetEvent {
    /// Log-facing event name; bridge events render their bridge kind prefix.
    pub fn name(&self) -> String {
        match self {
            Self::Initialized => "initialized".to_string(),
            Self::Started => "started".to_string(),
            Self::Stopped => "stopped".to_string(),
            Self::Error { .. } => "error".to_string(),
            Self::ConfigReloaded { .. } => "config:reloaded".to_string(),
            Self::AgentStarted { .. } => "agent:started".to_string(),
            Self::AgentStopped { .. } => "agent:stopped".to_string(),
            Self::ScheduleTriggered { .. } => "schedule:triggered".to_string(),
            Self::ScheduleSkipped { .. } => "schedule:skipped".to_string(),
            Self::JobCreated { .. } => "job:created".to_string(),
            Self::JobOutput { .. } => "job:output".to_string(),
            Self::JobCompleted { .. } => "job:completed".to_string(),
            Self::JobFailed { .. } => "job:failed".to_string(),
            Self::JobCancelled { .. } => "job:cancelled".to_string(),
            Self::JobForked { .. } => "job:forked".to_string(),
            Self::BridgeMessageHandled { bridge, .. } => format!("{bridge}:message:handled"),
            Self::BridgeMessageError { bridge, .. } => format!("{bridge}:message:error"),
            Self::BridgeError { bridge, .. } => format!("{bridge}:error"),
            Self::BridgeSessionLifecycle { bridge, .. } => format!("{bridge}:session:lifecycle"),
        }
    }

    /// Job id this event concerns, if any.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::JobCreated { job, .. }
            | Self::JobOutput { job, .. }
            | Self::JobCompleted { job, .. }
            | Self::JobFailed { job, .. }
            | Self::JobCancelled { job, .. } => Some(job),
            Self::JobForked { fork, .. } => Some(fork),
            _ => None,
        }
    }

    /// Agent this event concerns, if any.
    pub fn agent(&self) -> Option<&AgentName> {
        match self {
            Self::AgentStarted { agent }
            | Self::AgentStopped { agent }
            | Self::ScheduleTriggered { agent, .. }
            | Self::ScheduleSkipped { agent, .. }
            | Self::JobCreated { agent, .. }
            | Self::JobOutput { agent, .. }
            | Self::JobCompleted { agent, .. }
            | Self::JobFailed { agent, .. }
            | Self::JobCancelled { agent, .. }
            | Self::JobForked { agent, .. }
            | Self::BridgeMessageHandled { agent, .. }
            | Self::BridgeSessionLifecycle { agent, .. } => Some(agent),
            Self::BridgeMessageError { agent, .. } => agent.as_ref(),
            _ => None,
        }
    }

    /// Whether this is a terminal job event.
    pub fn is_job_terminal(&self) -> bool {
        matches!(
            self,
            Self::JobCompleted { .. } | Self::JobFailed { .. } | Self::JobCancelled { .. }
        )
    }
}

/// Emit operation handed to sub-modules.
///
/// The fleet manager owns the bus; schedulers, runners and routers only see
/// this narrow surface, which keeps the observation graph acyclic.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: FleetEvent);
}

/// Sink that drops everything. Useful as a default in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: FleetEvent) {}
}

/// Sink that records every event, for assertions in tests.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: parking_lot::Mutex<Vec<FleetEvent>>,
}

#[cfg(any(test, feature = "test-support"))]
impl CollectingSink {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<FleetEvent> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(FleetEvent::name).collect()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl EventSink for CollectingSink {
    fn emit(&self, event: FleetEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

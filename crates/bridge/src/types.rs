// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat bridge and fleet-side contracts.
//!
//! A bridge is the platform connector; it delivers [`InboundMessage`]s and
//! carries replies back. The routers talk to the fleet manager only through
//! the narrow [`ChatTarget`] interface, which keeps the observation graph
//! acyclic.

use async_trait::async_trait;
use drover_config::McpServerDef;
use drover_core::{AgentName, ChannelId, DriverMessage, JobId, SessionId};
use indexmap::IndexMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors at the bridge boundary.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge connect failed: {0}")]
    Connect(String),
    #[error("bridge send failed: {0}")]
    Send(String),
}

/// Where a message came from.
#[derive(Debug, Clone)]
pub struct MessageMeta {
    pub channel_id: ChannelId,
    pub message_id: String,
    pub user_id: String,
    /// Whether the bot was explicitly addressed (mention-mode gating).
    pub was_mentioned: bool,
}

/// Outbound reply callback. May be called zero or more times per inbound
/// message.
#[async_trait]
pub trait Replier: Send + Sync {
    async fn reply(&self, text: &str) -> Result<(), BridgeError>;
}

/// The platform's "typing…" affordance. `stop` is called exactly once per
/// inbound message, in a final handler.
#[async_trait]
pub trait ProcessingIndicator: Send + Sync {
    async fn start(&self);
    async fn stop(&self);
}

/// One inbound chat message, as delivered by a bridge.
pub struct InboundMessage {
    /// Target agent when the bridge itself knows it (per-agent connectors).
    pub agent: Option<AgentName>,
    pub prompt: String,
    pub meta: MessageMeta,
    pub replier: Arc<dyn Replier>,
    pub indicator: Arc<dyn ProcessingIndicator>,
    /// Ephemeral tool servers scoped to this message's channel, e.g. a file
    /// sender. Injected into the triggered job for its duration only.
    pub tool_servers: IndexMap<String, McpServerDef>,
}

/// A chat platform connector.
#[async_trait]
pub trait ChatBridge: Send + Sync {
    /// Bridge kind, used as the event-name prefix (`telegram`, `discord`).
    fn kind(&self) -> &str;

    /// Maximum reply size the platform accepts.
    fn reply_limit(&self) -> usize;

    /// Start delivering messages into `inbox` until disconnected.
    async fn connect(&self, inbox: mpsc::Sender<InboundMessage>) -> Result<(), BridgeError>;

    async fn disconnect(&self) -> Result<(), BridgeError>;
}

/// Trigger request a router hands to the fleet manager.
pub struct ChatTriggerRequest {
    pub prompt: String,
    pub resume: Option<SessionId>,
    pub extra_mcp_servers: IndexMap<String, McpServerDef>,
    /// Live typed messages from the running job.
    pub message_tx: mpsc::UnboundedSender<DriverMessage>,
}

/// Terminal outcome of a chat-triggered job.
#[derive(Debug, Clone)]
pub struct ChatTriggerOutcome {
    pub job_id: JobId,
    pub success: bool,
    pub session_id: Option<SessionId>,
    pub error: Option<String>,
}

/// The slice of the fleet manager visible to routers.
#[async_trait]
pub trait ChatTarget: Send + Sync {
    async fn trigger_chat(
        &self,
        agent: &AgentName,
        request: ChatTriggerRequest,
    ) -> Result<ChatTriggerOutcome, String>;
}

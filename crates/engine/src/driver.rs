// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Query driver contract.
//!
//! The underlying LLM engine sits behind [`QueryDriver`]: a prompt plus
//! options in, a lazy finite sequence of raw JSON records out. The runner
//! types the records; the driver only promises one JSON value per message
//! and an end-of-stream.

use async_trait::async_trait;
use drover_config::{McpServerDef, PermissionMode, ResolvedAgent, SystemPromptDef};
use drover_core::SessionId;
use indexmap::IndexMap;
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from the driver boundary.
#[derive(Debug, Error, Clone)]
pub enum DriverError {
    #[error("driver initialization failed: {0}")]
    Init(String),
    #[error("driver stream failed: {0}")]
    Stream(String),
}

/// Options translated from an agent's configuration, passed through to the
/// driver on every query.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub allowed_tools: Vec<String>,
    pub denied_tools: Vec<String>,
    pub permission_mode: PermissionMode,
    pub system_prompt: Option<SystemPromptDef>,
    pub setting_sources: Vec<String>,
    pub mcp_servers: IndexMap<String, McpServerDef>,
    pub resume: Option<SessionId>,
    pub fork_session: bool,
    pub max_turns: Option<u32>,
    pub cwd: PathBuf,
    pub model: Option<String>,
}

impl QueryOptions {
    /// Base options for an agent. Callers layer resume/fork and ephemeral
    /// tool servers on top.
    pub fn for_agent(agent: &ResolvedAgent) -> Self {
        Self {
            allowed_tools: agent.def.allowed_tools.clone(),
            denied_tools: agent.def.denied_tools.clone(),
            permission_mode: agent.def.permission_mode.unwrap_or_default(),
            system_prompt: agent.def.system_prompt.clone(),
            setting_sources: agent.def.setting_sources.clone(),
            mcp_servers: agent.def.mcp_servers.clone(),
            resume: None,
            fork_session: false,
            max_turns: agent.def.max_turns,
            cwd: agent.working_dir.clone(),
            model: agent.def.model.clone(),
        }
    }

    /// Merge caller-supplied ephemeral tool servers. On a name collision the
    /// ephemeral server wins for this query only.
    pub fn with_extra_mcp_servers(mut self, extra: IndexMap<String, McpServerDef>) -> Self {
        for (name, server) in extra {
            self.mcp_servers.insert(name, server);
        }
        self
    }
}

/// Lazy sequence of raw driver records.
///
/// Backed by a channel so drivers can produce from any task; dropping the
/// stream tells a well-behaved driver to stop producing.
#[derive(Debug)]
pub struct MessageStream {
    rx: mpsc::Receiver<Result<Value, DriverError>>,
}

impl MessageStream {
    /// Build a stream plus the sender half for the producing task.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Result<Value, DriverError>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }

    /// Next record, or `None` at end-of-stream.
    pub async fn next(&mut self) -> Option<Result<Value, DriverError>> {
        self.rx.recv().await
    }
}

/// The external LLM engine.
#[async_trait]
pub trait QueryDriver: Send + Sync {
    /// Start one query. The returned stream ends when the engine is done.
    async fn query(&self, prompt: &str, options: QueryOptions)
        -> Result<MessageStream, DriverError>;
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;

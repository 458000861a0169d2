// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-backed query driver.
//!
//! Spawns the engine CLI (`claude` by default) in headless streaming mode
//! and turns its stdout JSONL into a [`MessageStream`]. The child is killed
//! when the stream is dropped, which is how cooperative cancellation reaches
//! the process.

use crate::driver::{DriverError, MessageStream, QueryDriver, QueryOptions};
use async_trait::async_trait;
use drover_config::{McpServerDef, PermissionMode, SystemPromptDef};
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Driver that shells out to the engine CLI.
#[derive(Debug, Clone)]
pub struct CommandDriver {
    program: String,
}

impl CommandDriver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CommandDriver {
    fn default() -> Self {
        Self::new("claude")
    }
}

fn permission_mode_flag(mode: PermissionMode) -> &'static str {
    match mode {
        PermissionMode::Default => "default",
        PermissionMode::AcceptEdits => "acceptEdits",
        PermissionMode::BypassPermissions => "bypassPermissions",
        PermissionMode::Plan => "plan",
        PermissionMode::Delegate => "delegate",
        PermissionMode::DontAsk => "dontAsk",
    }
}

/// Serialize the injected tool servers into the CLI's `--mcp-config` shape.
fn mcp_config_json(options: &QueryOptions) -> Value {
    let mut servers = serde_json::Map::new();
    for (name, server) in &options.mcp_servers {
        let value = match server {
            McpServerDef::Http { url, .. } => json!({"type": "http", "url": url}),
            McpServerDef::Command { command, args, env } => {
                json!({"command": command, "args": args, "env": env})
            }
        };
        servers.insert(name.clone(), value);
    }
    json!({ "mcpServers": servers })
}

/// Build the full argument list for one query.
fn build_args(prompt: &str, options: &QueryOptions) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--print".into(),
        "--output-format".into(),
        "stream-json".into(),
        "--verbose".into(),
    ];

    if let Some(model) = &options.model {
        args.push("--model".into());
        args.push(model.clone());
    }
    if let Some(max_turns) = options.max_turns {
        args.push("--max-turns".into());
        args.push(max_turns.to_string());
    }
    args.push("--permission-mode".into());
    args.push(permission_mode_flag(options.permission_mode).into());

    if !options.allowed_tools.is_empty() {
        args.push("--allowed-tools".into());
        args.push(options.allowed_tools.join(","));
    }
    if !options.denied_tools.is_empty() {
        args.push("--disallowed-tools".into());
        args.push(options.denied_tools.join(","));
    }
    match &options.system_prompt {
        Some(SystemPromptDef::Plain(text)) => {
            args.push("--system-prompt".into());
            args.push(text.clone());
        }
        Some(SystemPromptDef::Preset { append, .. }) => {
            if let Some(append) = append {
                args.push("--append-system-prompt".into());
                args.push(append.clone());
            }
        }
        None => {}
    }
    if !options.setting_sources.is_empty() {
        args.push("--setting-sources".into());
        args.push(options.setting_sources.join(","));
    }
    if !options.mcp_servers.is_empty() {
        args.push("--mcp-config".into());
        args.push(mcp_config_json(options).to_string());
    }
    if let Some(resume) = &options.resume {
        args.push("--resume".into());
        args.push(resume.to_string());
        if options.fork_session {
            args.push("--fork-session".into());
        }
    }

    args.push(prompt.to_string());
    args
}

#[async_trait]
impl QueryDriver for CommandDriver {
    async fn query(
        &self,
        prompt: &str,
        options: QueryOptions,
    ) -> Result<MessageStream, DriverError> {
        let args = build_args(prompt, &options);
        debug!(program = %self.program, cwd = %options.cwd.display(), "spawning engine process");

        let mut child = Command::new(&self.program)
            .args(&args)
            .current_dir(&options.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DriverError::Init(format!("failed to spawn {}: {e}", self.program)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Init("engine stdout unavailable".to_string()))?;

        let (tx, stream) = MessageStream::channel(64);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                let line = tokio::select! {
                    line = lines.next_line() => line,
                    () = tx.closed() => {
                        // Consumer gone: kill the child and stop producing.
                        let _ = child.start_kill();
                        return;
                    }
                };
                match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let item = serde_json::from_str::<Value>(line).map_err(|e| {
                            DriverError::Stream(format!("unparseable engine output: {e}"))
                        });
                        if tx.send(item).await.is_err() {
                            let _ = child.start_kill();
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(DriverError::Stream(e.to_string()))).await;
                        return;
                    }
                }
            }

            match child.wait().await {
                Ok(status) if !status.success() => {
                    let _ = tx
                        .send(Err(DriverError::Stream(format!(
                            "engine exited with {status}"
                        ))))
                        .await;
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "failed to reap engine process"),
            }
        });

        Ok(stream)
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-defined hook execution.
//!
//! Hooks are shell commands run in the agent's working directory at
//! lifecycle transitions. Each hook gets a bounded time budget (graceful
//! stop, then a forced kill after a short grace window), captured output,
//! and an optional `when` predicate evaluated over the hook context.

use drover_config::{HookDef, HookStage, HooksDef};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Grace window between the graceful stop and the forced kill.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Job facts exposed to hooks.
#[derive(Debug, Clone, Serialize, Default)]
pub struct HookJobInfo {
    pub id: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Run outcome exposed to hooks.
#[derive(Debug, Clone, Serialize, Default)]
pub struct HookResultInfo {
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Agent identity exposed to hooks.
#[derive(Debug, Clone, Serialize, Default)]
pub struct HookAgentInfo {
    pub id: String,
    pub name: String,
}

/// Everything a hook can see.
#[derive(Debug, Clone, Serialize, Default)]
pub struct HookContext {
    pub event: String,
    pub job: HookJobInfo,
    pub result: HookResultInfo,
    pub agent: HookAgentInfo,
    /// JSON content of the agent's metadata file, when present and readable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// How one hook run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookRunStatus {
    Succeeded,
    Failed { exit_code: Option<i32> },
    TimedOut,
    Skipped,
}

/// Result of one hook run.
#[derive(Debug, Clone)]
pub struct HookRunResult {
    pub name: String,
    pub status: HookRunStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Result of a stage's worth of hooks.
#[derive(Debug, Clone, Default)]
pub struct HookOutcome {
    /// True iff any hook failed and its `continue_on_error` is false.
    pub should_fail_job: bool,
    pub results: Vec<HookRunResult>,
}

/// Executes hook stages with bounded output capture.
#[derive(Debug, Clone)]
pub struct HookExecutor {
    max_capture_bytes: usize,
}

impl Default for HookExecutor {
    fn default() -> Self {
        Self {
            max_capture_bytes: 64 * 1024,
        }
    }
}

impl HookExecutor {
    pub fn new(max_capture_bytes: usize) -> Self {
        Self { max_capture_bytes }
    }

    /// Run a stage's hooks in declaration order.
    ///
    /// A `false` `when` predicate skips the hook. A failed hook stops the
    /// stage only through the returned `should_fail_job` flag; later hooks
    /// in the stage still run.
    pub async fn execute(
        &self,
        hooks: &HooksDef,
        stage: HookStage,
        context: &HookContext,
        cwd: &Path,
        cancel: &CancellationToken,
    ) -> HookOutcome {
        let mut outcome = HookOutcome::default();

        for hook in hooks.stage(stage) {
            if cancel.is_cancelled() {
                break;
            }

            if !when_matches(hook, context) {
                debug!(hook = %hook.name, "hook skipped by `when` predicate");
                outcome.results.push(HookRunResult {
                    name: hook.name.clone(),
                    status: HookRunStatus::Skipped,
                    stdout: String::new(),
                    stderr: String::new(),
                });
                continue;
            }

            let result = self.run_hook(hook, context, cwd, cancel).await;
            let failed = !matches!(
                result.status,
                HookRunStatus::Succeeded | HookRunStatus::Skipped
            );
            if failed {
                warn!(hook = %hook.name, status = ?result.status, "hook failed");
                if !hook.continue_on_error {
                    outcome.should_fail_job = true;
                }
            }
            outcome.results.push(result);
        }

        outcome
    }

    async fn run_hook(
        &self,
        hook: &HookDef,
        context: &HookContext,
        cwd: &Path,
        cancel: &CancellationToken,
    ) -> HookRunResult {
        let context_json =
            serde_json::to_string(context).unwrap_or_else(|_| "{}".to_string());

        let spawned = Command::new("sh")
            .arg("-c")
            .arg(&hook.command)
            .current_dir(cwd)
            .env("DROVER_EVENT", &context.event)
            .env("DROVER_JOB_ID", &context.job.id)
            .env("DROVER_AGENT", &context.agent.name)
            .env("DROVER_SUCCESS", context.result.success.to_string())
            .env("DROVER_HOOK_CONTEXT", context_json)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return HookRunResult {
                    name: hook.name.clone(),
                    status: HookRunStatus::Failed { exit_code: None },
                    stdout: String::new(),
                    stderr: format!("failed to spawn: {e}"),
                }
            }
        };

        let stdout_task = capture(child.stdout.take(), self.max_capture_bytes);
        let stderr_task = capture(child.stderr.take(), self.max_capture_bytes);
        let timeout = Duration::from_millis(hook.timeout_ms);

        let status = tokio::select! {
            status = child.wait() => match status {
                Ok(status) if status.success() => HookRunStatus::Succeeded,
                Ok(status) => HookRunStatus::Failed { exit_code: status.code() },
                Err(_) => HookRunStatus::Failed { exit_code: None },
            },
            _ = tokio::time::sleep(timeout) => {
                stop_child(&mut child).await;
                HookRunStatus::TimedOut
            }
            () = cancel.cancelled() => {
                stop_child(&mut child).await;
                HookRunStatus::Failed { exit_code: None }
            }
        };

        HookRunResult {
            name: hook.name.clone(),
            status,
            stdout: stdout_task.await.unwrap_or_default(),
            stderr: stderr_task.await.unwrap_or_default(),
        }
    }
}

/// Graceful stop, then a forced kill after the grace window.
async fn stop_child(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.kill().await;
}

/// Evaluate a hook's `when` predicate. Missing predicate means run; an
/// evaluation error means skip (logged), never a crashed job.
fn when_matches(hook: &HookDef, context: &HookContext) -> bool {
    let Some(expr) = &hook.when else {
        return true;
    };

    let mut eval_context = evalexpr::HashMapContext::new();
    let set = |ctx: &mut evalexpr::HashMapContext, name: &str, value: evalexpr::Value| {
        let _ = evalexpr::ContextWithMutableVariables::set_value(ctx, name.to_string(), value);
    };
    set(&mut eval_context, "event", context.event.clone().into());
    set(&mut eval_context, "success", context.result.success.into());
    set(&mut eval_context, "agent", context.agent.name.clone().into());
    set(
        &mut eval_context,
        "schedule",
        context.job.schedule.clone().unwrap_or_default().into(),
    );
    if let Some(Value::Object(map)) = &context.metadata {
        for (key, value) in map {
            let translated = match value {
                Value::Bool(b) => Some(evalexpr::Value::from(*b)),
                Value::Number(n) => n.as_f64().map(evalexpr::Value::Float),
                Value::String(s) => Some(evalexpr::Value::from(s.clone())),
                _ => None,
            };
            if let Some(v) = translated {
                set(&mut eval_context, &format!("metadata_{key}"), v);
            }
        }
    }

    match evalexpr::eval_boolean_with_context(expr, &eval_context) {
        Ok(result) => result,
        Err(e) => {
            warn!(when = %expr, error = %e, "hook `when` predicate failed to evaluate, skipping hook");
            false
        }
    }
}

fn capture(
    reader: Option<impl tokio::io::AsyncRead + Unpin + Send + 'static>,
    max_bytes: usize,
) -> tokio::task::JoinHandle<String> {
    tokio::spawn(async move {
        let Some(mut reader) = reader else {
            return String::new();
        };
        let mut buf = Vec::with_capacity(1024);
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let take = n.min(max_bytes.saturating_sub(buf.len()));
                    buf.extend_from_slice(&chunk[..take]);
                    if buf.len() >= max_bytes {
                        // Keep draining so the child never blocks on a full
                        // pipe, but stop growing the buffer.
                        continue;
                    }
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

#[cfg(test)]
#[path = "hooks_tests.rs"]
mod tests;

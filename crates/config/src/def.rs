// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative definitions for fleet files.
//!
//! Agent objects are strict: unknown keys are rejected so typos fail loudly
//! at load time instead of silently configuring nothing.

use drover_core::ScheduleType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level fleet file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetDef {
    /// Fleet display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// State directory override (relative to the fleet file).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    /// Supervisor tuning knobs.
    #[serde(default)]
    pub settings: SupervisorSettings,
    /// Fleet-level defaults, shallow-merged into each agent.
    #[serde(default)]
    pub defaults: FleetDefaults,
    /// Agents by name (map key becomes the agent name).
    #[serde(default)]
    pub agents: IndexMap<String, AgentEntry>,
}

/// An agent declaration: inline, or a reference to a separate file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentEntry {
    /// `writer: { file: agents/writer.yaml }`
    File { file: PathBuf },
    /// Inline definition.
    Inline(Box<AgentDef>),
}

/// Supervisor tuning knobs with the documented defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SupervisorSettings {
    /// Scheduler tick interval.
    pub check_interval: String,
    /// Chat session expiry age.
    pub session_max_age: String,
    /// Graceful stop budget.
    pub stop_timeout: String,
    /// Per-job cancel grace.
    pub cancel_timeout: String,
    /// Minimum interval between chat replies.
    pub reply_min_interval: String,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            check_interval: "1s".to_string(),
            session_max_age: "24h".to_string(),
            stop_timeout: "30s".to_string(),
            cancel_timeout: "10s".to_string(),
            reply_min_interval: "1000ms".to_string(),
        }
    }
}

/// Fleet-level defaults. Only a closed set of agent fields may be defaulted;
/// explicit agent values always win.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<PermissionMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub denied_tools: Vec<String>,
}

/// Working directory: plain string or `{path: ...}` object form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkingDirDef {
    Plain(PathBuf),
    Object { path: PathBuf },
}

impl WorkingDirDef {
    /// Normalized path, independent of the declaration form.
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Plain(p) => p,
            Self::Object { path } => path,
        }
    }
}

/// Permission mode passed through to the query driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    #[default]
    Default,
    AcceptEdits,
    BypassPermissions,
    Plan,
    Delegate,
    DontAsk,
}

/// System prompt: plain string, or preset with optional append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPromptDef {
    Plain(String),
    Preset {
        #[serde(rename = "type")]
        kind: PresetTag,
        preset: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        append: Option<String>,
    },
}

/// Tag value for the preset form (`type: preset`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetTag {
    Preset,
}

/// Injected tool server: network URL form or local process form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum McpServerDef {
    Http {
        #[serde(rename = "type")]
        kind: HttpTag,
        url: String,
    },
    Command {
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
}

/// Tag value for the HTTP form (`type: http`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpTag {
    Http,
}

/// One schedule declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleDef {
    #[serde(rename = "type")]
    pub schedule_type: ScheduleType,
    /// Human duration, interval schedules only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    /// Cron expression, cron schedules only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Mirror output to a plain-text `output.log` next to the job records.
    #[serde(default)]
    pub output_to_file: bool,
}

/// Hook stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookStage {
    BeforeRun,
    AfterRun,
    OnError,
}

/// One user-defined hook command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookDef {
    pub name: String,
    pub command: String,
    #[serde(default = "default_hook_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_true")]
    pub continue_on_error: bool,
    /// Boolean predicate over the hook context; skipped when false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
}

fn default_hook_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

/// Hooks grouped by stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HooksDef {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before_run: Vec<HookDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after_run: Vec<HookDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_error: Vec<HookDef>,
}

impl HooksDef {
    pub fn stage(&self, stage: HookStage) -> &[HookDef] {
        match stage {
            HookStage::BeforeRun => &self.before_run,
            HookStage::AfterRun => &self.after_run,
            HookStage::OnError => &self.on_error,
        }
    }
}

/// How a shared-connector channel claim behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    /// Act only when explicitly addressed.
    #[default]
    Mention,
    /// Act on every message in the channel.
    Auto,
}

/// Per-bridge chat binding for one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatBindingDef {
    /// Channels this agent claims on a shared connector.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<String>,
    #[serde(default)]
    pub mode: ChannelMode,
}

/// One agent definition. Strict: unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentDef {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<WorkingDirDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<PermissionMode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub denied_tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<SystemPromptDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setting_sources: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub mcp_servers: IndexMap<String, McpServerDef>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub schedules: IndexMap<String, ScheduleDef>,
    #[serde(default, skip_serializing_if = "HooksDef::is_empty")]
    pub hooks: HooksDef,
    /// Chat bindings by bridge kind (`telegram`, `discord`, ...).
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub chat: IndexMap<String, ChatBindingDef>,
    /// Relative path under the working directory the agent may write
    /// arbitrary JSON into; read back into hook contexts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_file: Option<PathBuf>,
    /// Cap on simultaneous jobs. `None` inherits the fleet default, else 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_prompt: Option<String>,
}

impl AgentDef {
    /// Effective concurrency cap (defaults to 1).
    pub fn max_concurrent(&self) -> u32 {
        self.max_concurrent.unwrap_or(1)
    }
}

impl HooksDef {
    pub fn is_empty(&self) -> bool {
        self.before_run.is_empty() && self.after_run.is_empty() && self.on_error.is_empty()
    }
}

#[cfg(test)]
#[path = "def_tests.rs"]
mod tests;

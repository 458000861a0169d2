// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! drover-config: declarative fleet description loading and validation.
//!
//! A fleet file (YAML, TOML or JSON) declares named agents, each with LLM
//! options, schedules, hooks and chat bindings. Loading produces an
//! immutable [`ResolvedConfig`]; a failed load never disturbs a previously
//! loaded one.

pub mod def;
pub mod diff;
pub mod error;
pub mod interpolate;
pub mod loader;

pub use def::{
    AgentDef, ChannelMode, ChatBindingDef, FleetDef, FleetDefaults, HookDef, HookStage, HooksDef,
    HttpTag, McpServerDef, PermissionMode, PresetTag, ScheduleDef, SupervisorSettings,
    SystemPromptDef, WorkingDirDef,
};
pub use diff::diff_configs;
pub use error::{ConfigError, ValidationEntry};
pub use loader::{
    find_fleet_file, load_config, load_config_from, parse_cron, Format, ResolvedAgent,
    ResolvedConfig, ResolvedSettings,
};

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleet file loading, merging and validation.
//!
//! Loading is a pipeline: find the file, interpolate `${VAR}` references,
//! parse by format, pull in referenced agent files, shallow-merge fleet
//! defaults, then validate the whole thing strictly. The output is an
//! immutable [`ResolvedConfig`]; a failed load leaves any previously loaded
//! config untouched because nothing is mutated in place.

use crate::def::{AgentDef, AgentEntry, FleetDef, ScheduleDef, SupervisorSettings};
use crate::error::{ConfigError, ValidationEntry};
use crate::interpolate::interpolate_env;
use drover_core::{is_safe_identifier, parse_duration, AgentName, ScheduleType};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Fleet file format, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Toml,
    Json,
}

impl Format {
    /// Pick a format from a file extension. Unknown extensions read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::Toml,
            Some("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// File names probed during the upward search.
const FLEET_FILE_NAMES: &[&str] = &["fleet.yaml", "fleet.yml", "fleet.toml", "fleet.json"];

/// Search upward from `start` for a fleet file.
pub fn find_fleet_file(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(d) = dir {
        for name in FLEET_FILE_NAMES {
            let candidate = d.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        dir = d.parent();
    }
    None
}

/// Supervisor settings with durations parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub check_interval: Duration,
    pub session_max_age: Duration,
    pub stop_timeout: Duration,
    pub cancel_timeout: Duration,
    pub reply_min_interval: Duration,
}

/// One agent with defaults merged and paths resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAgent {
    pub name: AgentName,
    pub def: AgentDef,
    /// Absolute working directory (defaults to the config directory).
    pub working_dir: PathBuf,
}

impl ResolvedAgent {
    pub fn schedule(&self, name: &str) -> Option<&ScheduleDef> {
        self.def.schedules.get(name)
    }

    /// Effective concurrency cap (defaults to 1).
    pub fn max_concurrent(&self) -> u32 {
        self.def.max_concurrent()
    }

    /// Absolute path of the agent's metadata file, if declared.
    pub fn metadata_path(&self) -> Option<PathBuf> {
        self.def
            .metadata_file
            .as_ref()
            .map(|rel| self.working_dir.join(rel))
    }
}

/// An immutable, fully merged fleet configuration.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config_path: PathBuf,
    pub config_dir: PathBuf,
    pub fleet_name: Option<String>,
    /// Absolute state directory.
    pub state_dir: PathBuf,
    pub settings: ResolvedSettings,
    /// Agents in declaration order.
    pub agents: Vec<Arc<ResolvedAgent>>,
}

impl ResolvedConfig {
    pub fn agent(&self, name: &str) -> Option<&Arc<ResolvedAgent>> {
        self.agents.iter().find(|a| a.name == *name)
    }

    pub fn agent_names(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(|a| a.name.as_str())
    }
}

/// Load the fleet configuration, searching upward when no path is given.
pub fn load_config(path_hint: Option<&Path>) -> Result<ResolvedConfig, ConfigError> {
    let path = match path_hint {
        Some(p) => p.to_path_buf(),
        None => {
            let cwd = std::env::current_dir().map_err(|source| ConfigError::Io {
                path: PathBuf::from("."),
                source,
            })?;
            find_fleet_file(&cwd).ok_or(ConfigError::NotFound { searched_from: cwd })?
        }
    };
    load_config_from(&path)
}

/// Load the fleet configuration from an explicit file path.
pub fn load_config_from(path: &Path) -> Result<ResolvedConfig, ConfigError> {
    let text = read_interpolated(path)?;
    let format = Format::from_path(path);
    let fleet: FleetDef = parse_as(&text, format, path)?;

    let config_path = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());
    let config_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let settings = resolve_settings(&fleet.settings)?;
    let state_dir = match &fleet.state_dir {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => config_dir.join(dir),
        None => config_dir.join("state"),
    };

    let mut agents: Vec<Arc<ResolvedAgent>> = Vec::with_capacity(fleet.agents.len());
    let mut entries: Vec<ValidationEntry> = Vec::new();

    for (name, entry) in &fleet.agents {
        if agents.iter().any(|a| a.name == name.as_str()) {
            return Err(ConfigError::DuplicateAgent { name: name.clone() });
        }

        let mut def = match entry {
            AgentEntry::Inline(def) => (**def).clone(),
            AgentEntry::File { file } => {
                let agent_path = if file.is_absolute() {
                    file.clone()
                } else {
                    config_dir.join(file)
                };
                let text = read_interpolated(&agent_path)?;
                parse_as::<AgentDef>(&text, Format::from_path(&agent_path), &agent_path)?
            }
        };

        merge_defaults(&mut def, &fleet);
        validate_agent(name, &def, &mut entries);

        let working_dir = match def.working_dir.as_ref().map(|w| w.path().clone()) {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => config_dir.join(dir),
            None => config_dir.clone(),
        };

        agents.push(Arc::new(ResolvedAgent {
            name: AgentName::new(name.clone()),
            def,
            working_dir,
        }));
    }

    if !entries.is_empty() {
        return Err(ConfigError::Validation { entries });
    }

    Ok(ResolvedConfig {
        config_path,
        config_dir,
        fleet_name: fleet.name,
        state_dir,
        settings,
        agents,
    })
}

/// Parse a cron expression, accepting both the standard 5-field form and the
/// 6/7-field form with seconds. Five fields get a `0` seconds prefix.
pub fn parse_cron(expression: &str) -> Result<cron::Schedule, String> {
    let trimmed = expression.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };
    cron::Schedule::from_str(&normalized).map_err(|e| e.to_string())
}

fn read_interpolated(path: &Path) -> Result<String, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let result = interpolate_env(&raw, |name| std::env::var(name).ok());
    if let Some(name) = result.missing.into_iter().next() {
        return Err(ConfigError::UndefinedVar {
            name,
            path: path.to_path_buf(),
        });
    }
    Ok(result.text)
}

fn parse_as<T: serde::de::DeserializeOwned>(
    text: &str,
    format: Format,
    path: &Path,
) -> Result<T, ConfigError> {
    let result = match format {
        Format::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
        Format::Toml => toml::from_str(text).map_err(|e| e.to_string()),
        Format::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
    };
    result.map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

fn resolve_settings(settings: &SupervisorSettings) -> Result<ResolvedSettings, ConfigError> {
    let parse = |field: &str, value: &str| {
        parse_duration(value).map_err(|e| {
            ConfigError::invalid(
                format!("settings.{field}"),
                e.to_string(),
                Some(value.to_string()),
            )
        })
    };
    Ok(ResolvedSettings {
        check_interval: parse("check_interval", &settings.check_interval)?,
        session_max_age: parse("session_max_age", &settings.session_max_age)?,
        stop_timeout: parse("stop_timeout", &settings.stop_timeout)?,
        cancel_timeout: parse("cancel_timeout", &settings.cancel_timeout)?,
        reply_min_interval: parse("reply_min_interval", &settings.reply_min_interval)?,
    })
}

/// Shallow-merge fleet defaults into an agent. Explicit agent values win;
/// list defaults apply only when the agent declares none.
fn merge_defaults(def: &mut AgentDef, fleet: &FleetDef) {
    let defaults = &fleet.defaults;
    if def.model.is_none() {
        def.model = defaults.model.clone();
    }
    if def.max_turns.is_none() {
        def.max_turns = defaults.max_turns;
    }
    if def.permission_mode.is_none() {
        def.permission_mode = defaults.permission_mode;
    }
    if def.max_concurrent.is_none() {
        def.max_concurrent = defaults.max_concurrent;
    }
    if def.allowed_tools.is_empty() {
        def.allowed_tools = defaults.allowed_tools.clone();
    }
    if def.denied_tools.is_empty() {
        def.denied_tools = defaults.denied_tools.clone();
    }
}

fn validate_agent(name: &str, def: &AgentDef, entries: &mut Vec<ValidationEntry>) {
    let mut push = |path: String, message: String, value: Option<String>| {
        entries.push(ValidationEntry {
            path,
            message,
            value,
        });
    };

    if !is_safe_identifier(name) {
        push(
            format!("agents.{name}"),
            "agent name must start alphanumeric and contain only letters, digits, `_` or `-`"
                .to_string(),
            Some(name.to_string()),
        );
    }

    if def.max_concurrent == Some(0) {
        push(
            format!("agents.{name}.max_concurrent"),
            "must be at least 1".to_string(),
            Some("0".to_string()),
        );
    }

    if let Some(file) = &def.metadata_file {
        let escapes = file.is_absolute()
            || file
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir));
        if escapes {
            push(
                format!("agents.{name}.metadata_file"),
                "must be a relative path without `..` segments".to_string(),
                Some(file.display().to_string()),
            );
        }
    }

    for (schedule_name, schedule) in &def.schedules {
        let loc = format!("agents.{name}.schedules.{schedule_name}");
        if !is_safe_identifier(schedule_name) {
            push(
                loc.clone(),
                "schedule name must be a safe identifier".to_string(),
                Some(schedule_name.clone()),
            );
        }
        validate_schedule(&loc, schedule, &mut push);
    }
}

fn validate_schedule(
    loc: &str,
    schedule: &ScheduleDef,
    push: &mut impl FnMut(String, String, Option<String>),
) {
    match schedule.schedule_type {
        ScheduleType::Interval => {
            match &schedule.interval {
                None => push(
                    format!("{loc}.interval"),
                    "interval schedules require an `interval`".to_string(),
                    None,
                ),
                Some(value) => {
                    if let Err(e) = parse_duration(value) {
                        push(format!("{loc}.interval"), e.to_string(), Some(value.clone()));
                    }
                }
            }
            if schedule.expression.is_some() {
                push(
                    format!("{loc}.expression"),
                    "`expression` is only valid on cron schedules".to_string(),
                    None,
                );
            }
        }
        ScheduleType::Cron => {
            match &schedule.expression {
                None => push(
                    format!("{loc}.expression"),
                    "cron schedules require an `expression`".to_string(),
                    None,
                ),
                Some(value) => {
                    if let Err(e) = parse_cron(value) {
                        push(format!("{loc}.expression"), e, Some(value.clone()));
                    }
                }
            }
            if schedule.interval.is_some() {
                push(
                    format!("{loc}.interval"),
                    "`interval` is only valid on interval schedules".to_string(),
                    None,
                );
            }
        }
        ScheduleType::Manual | ScheduleType::Chat => {
            if schedule.interval.is_some() || schedule.expression.is_some() {
                push(
                    loc.to_string(),
                    format!(
                        "{} schedules take neither `interval` nor `expression`",
                        schedule.schedule_type
                    ),
                    None,
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;

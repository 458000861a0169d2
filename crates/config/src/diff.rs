// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration change diffing for hot reload.
//!
//! Modification is detected over a closed set of fields: anything outside
//! these sets (hooks, tool lists, chat bindings) swaps silently with the new
//! config and is not reported. Agents compare `{description, model,
//! max_turns, system_prompt, working_dir, max_concurrent}`; schedules
//! compare `{type, interval, expression, prompt}`.

use crate::def::{ScheduleDef, SystemPromptDef};
use crate::loader::{ResolvedAgent, ResolvedConfig};
use drover_core::{format_duration, parse_duration, ChangeCategory, ChangeKind, ConfigChange};

/// Compute the change list between two resolved configs.
pub fn diff_configs(old: &ResolvedConfig, new: &ResolvedConfig) -> Vec<ConfigChange> {
    let mut changes = Vec::new();

    // Removed agents (and their schedules)
    for agent in &old.agents {
        if new.agent(agent.name.as_str()).is_none() {
            changes.push(change(
                ChangeKind::Removed,
                ChangeCategory::Agent,
                agent.name.as_str(),
                None,
            ));
            for schedule_name in agent.def.schedules.keys() {
                changes.push(change(
                    ChangeKind::Removed,
                    ChangeCategory::Schedule,
                    &format!("{}/{}", agent.name, schedule_name),
                    None,
                ));
            }
        }
    }

    for agent in &new.agents {
        match old.agent(agent.name.as_str()) {
            None => {
                // Added agent (and its schedules)
                changes.push(change(
                    ChangeKind::Added,
                    ChangeCategory::Agent,
                    agent.name.as_str(),
                    None,
                ));
                for schedule_name in agent.def.schedules.keys() {
                    changes.push(change(
                        ChangeKind::Added,
                        ChangeCategory::Schedule,
                        &format!("{}/{}", agent.name, schedule_name),
                        None,
                    ));
                }
            }
            Some(previous) => {
                if let Some(details) = agent_changes(previous, agent) {
                    changes.push(change(
                        ChangeKind::Modified,
                        ChangeCategory::Agent,
                        agent.name.as_str(),
                        Some(details),
                    ));
                }
                diff_schedules(previous, agent, &mut changes);
            }
        }
    }

    changes
}

fn change(
    kind: ChangeKind,
    category: ChangeCategory,
    name: &str,
    details: Option<String>,
) -> ConfigChange {
    ConfigChange {
        kind,
        category,
        name: name.to_string(),
        details,
    }
}

/// Describe field-level differences between two versions of an agent, or
/// `None` when the compared set is identical.
fn agent_changes(old: &ResolvedAgent, new: &ResolvedAgent) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    if old.def.description != new.def.description {
        parts.push("description".to_string());
    }
    if old.def.model != new.def.model {
        parts.push(field_change(
            "model",
            old.def.model.as_deref(),
            new.def.model.as_deref(),
        ));
    }
    if old.def.max_turns != new.def.max_turns {
        parts.push(field_change(
            "max_turns",
            old.def.max_turns.map(|v| v.to_string()).as_deref(),
            new.def.max_turns.map(|v| v.to_string()).as_deref(),
        ));
    }
    if system_prompt_text(&old.def.system_prompt) != system_prompt_text(&new.def.system_prompt) {
        parts.push("system_prompt".to_string());
    }
    if old.working_dir != new.working_dir {
        parts.push(field_change(
            "working_dir",
            Some(&old.working_dir.display().to_string()),
            Some(&new.working_dir.display().to_string()),
        ));
    }
    if old.max_concurrent() != new.max_concurrent() {
        parts.push(field_change(
            "max_concurrent",
            Some(&old.max_concurrent().to_string()),
            Some(&new.max_concurrent().to_string()),
        ));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

fn diff_schedules(old: &ResolvedAgent, new: &ResolvedAgent, changes: &mut Vec<ConfigChange>) {
    for name in old.def.schedules.keys() {
        if !new.def.schedules.contains_key(name) {
            changes.push(change(
                ChangeKind::Removed,
                ChangeCategory::Schedule,
                &format!("{}/{}", old.name, name),
                None,
            ));
        }
    }
    for (name, schedule) in &new.def.schedules {
        let qualified = format!("{}/{}", new.name, name);
        match old.def.schedules.get(name) {
            None => changes.push(change(
                ChangeKind::Added,
                ChangeCategory::Schedule,
                &qualified,
                None,
            )),
            Some(previous) => {
                if let Some(details) = schedule_changes(previous, schedule) {
                    changes.push(change(
                        ChangeKind::Modified,
                        ChangeCategory::Schedule,
                        &qualified,
                        Some(details),
                    ));
                }
            }
        }
    }
}

fn schedule_changes(old: &ScheduleDef, new: &ScheduleDef) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    if old.schedule_type != new.schedule_type {
        parts.push(format!("type: {} → {}", old.schedule_type, new.schedule_type));
    }
    let old_interval = old.interval.as_deref().map(normalize_duration);
    let new_interval = new.interval.as_deref().map(normalize_duration);
    if old_interval != new_interval {
        parts.push(field_change(
            "interval",
            old_interval.as_deref(),
            new_interval.as_deref(),
        ));
    }
    if old.expression != new.expression {
        parts.push(field_change(
            "expression",
            old.expression.as_deref(),
            new.expression.as_deref(),
        ));
    }
    if old.prompt != new.prompt {
        parts.push("prompt".to_string());
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

fn field_change(field: &str, old: Option<&str>, new: Option<&str>) -> String {
    format!(
        "{field}: {} → {}",
        old.unwrap_or("(unset)"),
        new.unwrap_or("(unset)")
    )
}

/// Normalize a duration string so `60m` and `1h` compare and print equal.
fn normalize_duration(s: &str) -> String {
    match parse_duration(s) {
        Ok(d) => format_duration(d),
        Err(_) => s.to_string(),
    }
}

fn system_prompt_text(prompt: &Option<SystemPromptDef>) -> Option<String> {
    prompt.as_ref().map(|p| match p {
        SystemPromptDef::Plain(text) => text.clone(),
        SystemPromptDef::Preset { preset, append, .. } => {
            format!("preset:{preset}+{}", append.as_deref().unwrap_or(""))
        }
    })
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod tests;

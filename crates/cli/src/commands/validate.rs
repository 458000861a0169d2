// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `drover validate` — load and validate the fleet file.

use crate::exit_error::ExitError;
use crate::output::{print_json, OutputFormat};
use anyhow::Result;
use drover_config::{find_fleet_file, load_config_from};
use std::path::PathBuf;

pub fn run(config: Option<PathBuf>, output: OutputFormat) -> Result<()> {
    let path = match config {
        Some(path) => path,
        None => {
            let cwd = std::env::current_dir()?;
            find_fleet_file(&cwd)
                .ok_or_else(|| ExitError::validation("no fleet file found"))?
        }
    };

    let resolved = load_config_from(&path).map_err(|e| ExitError::validation(e.to_string()))?;

    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "config": resolved.config_path,
            "agents": resolved.agent_names().collect::<Vec<_>>(),
        }))?,
        OutputFormat::Text => {
            println!("{} is valid", resolved.config_path.display());
            for agent in &resolved.agents {
                println!(
                    "  {} ({} schedules, max_concurrent {})",
                    agent.name,
                    agent.def.schedules.len(),
                    agent.max_concurrent()
                );
            }
        }
    }
    Ok(())
}

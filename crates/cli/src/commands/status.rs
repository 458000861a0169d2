// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `drover status` — fleet overview.

use crate::commands::initialized_manager;
use crate::exit_error;
use crate::output::{print_json, OutputFormat};
use anyhow::Result;
use std::path::PathBuf;

pub async fn run(config: Option<PathBuf>, output: OutputFormat) -> Result<()> {
    let manager = initialized_manager(config).await?;
    let status = manager.status().map_err(exit_error::from_fleet)?;

    match output {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Text => {
            if let Some(name) = &status.fleet_name {
                println!("fleet: {name}");
            }
            for agent in &status.agents {
                println!(
                    "{}  [{}/{} running]{}",
                    agent.name,
                    agent.running_jobs,
                    agent.max_concurrent,
                    agent
                        .last_job_id
                        .as_ref()
                        .map(|id| format!("  last: {id}"))
                        .unwrap_or_default()
                );
                for schedule in &agent.schedules {
                    println!(
                        "    {} ({}) {:?}{}",
                        schedule.name,
                        schedule.schedule_type,
                        schedule.state.status,
                        schedule
                            .state
                            .last_error
                            .as_ref()
                            .map(|e| format!("  last error: {e}"))
                            .unwrap_or_default()
                    );
                }
            }
        }
    }
    Ok(())
}

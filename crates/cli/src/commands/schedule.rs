// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `drover schedule enable|disable`.

use crate::commands::initialized_manager;
use crate::exit_error;
use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Args)]
pub struct ScheduleArgs {
    #[command(subcommand)]
    pub command: ScheduleCommand,
}

#[derive(Subcommand)]
pub enum ScheduleCommand {
    /// Re-enable a disabled schedule
    Enable { agent: String, schedule: String },
    /// Disable a schedule (sticky until enabled again)
    Disable { agent: String, schedule: String },
}

pub async fn run(config: Option<PathBuf>, args: ScheduleArgs) -> Result<()> {
    let manager = initialized_manager(config).await?;

    match args.command {
        ScheduleCommand::Enable { agent, schedule } => {
            manager
                .enable_schedule(&agent, &schedule)
                .map_err(exit_error::from_fleet)?;
            println!("{agent}/{schedule} enabled");
        }
        ScheduleCommand::Disable { agent, schedule } => {
            manager
                .disable_schedule(&agent, &schedule)
                .map_err(exit_error::from_fleet)?;
            println!("{agent}/{schedule} disabled");
        }
    }
    Ok(())
}

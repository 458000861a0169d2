// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `drover cancel` and `drover fork`.

use crate::commands::initialized_manager;
use crate::exit_error;
use crate::output::{print_json, OutputFormat};
use anyhow::Result;
use clap::Args;
use drover_core::JobId;
use drover_daemon::ForkOverrides;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args)]
pub struct CancelArgs {
    /// Job id
    pub job_id: String,

    /// Grace period in seconds before forcing
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,
}

pub async fn cancel(config: Option<PathBuf>, output: OutputFormat, args: CancelArgs) -> Result<()> {
    let manager = initialized_manager(config).await?;
    let termination = manager
        .cancel_job(
            &JobId::new(args.job_id.clone()),
            Some(Duration::from_secs(args.timeout)),
        )
        .await
        .map_err(exit_error::from_fleet)?;

    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "job_id": args.job_id,
            "termination": termination,
        }))?,
        OutputFormat::Text => println!("{}: {:?}", args.job_id, termination),
    }
    Ok(())
}

#[derive(Args)]
pub struct ForkArgs {
    /// Job id to fork from
    pub job_id: String,

    /// Prompt override for the forked job
    #[arg(long)]
    pub prompt: Option<String>,

    /// Schedule to attribute the forked job to
    #[arg(long)]
    pub schedule: Option<String>,
}

pub async fn fork(config: Option<PathBuf>, output: OutputFormat, args: ForkArgs) -> Result<()> {
    let manager = initialized_manager(config).await?;
    let result = manager
        .fork_job(
            &JobId::new(args.job_id),
            ForkOverrides {
                prompt: args.prompt,
                schedule: args.schedule,
            },
        )
        .await
        .map_err(exit_error::from_fleet)?;

    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "job_id": result.job_id,
            "agent": result.agent_name,
            "success": result.success,
            "error": result.error,
        }))?,
        OutputFormat::Text => println!(
            "forked into {} ({})",
            result.job_id,
            if result.success { "completed" } else { "failed" }
        ),
    }
    Ok(())
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `drover trigger` — run one agent job and wait for its result.

use crate::commands::initialized_manager;
use crate::exit_error::{self, ExitError};
use crate::output::{print_json, OutputFormat};
use anyhow::Result;
use clap::Args;
use drover_daemon::TriggerOptions;
use std::path::PathBuf;

#[derive(Args)]
pub struct TriggerArgs {
    /// Agent name
    pub agent: String,

    /// Schedule to attribute the run to
    #[arg(long)]
    pub schedule: Option<String>,

    /// Prompt override
    #[arg(long)]
    pub prompt: Option<String>,

    /// Skip the agent's concurrency cap for this run
    #[arg(long)]
    pub bypass_limit: bool,
}

pub async fn run(config: Option<PathBuf>, output: OutputFormat, args: TriggerArgs) -> Result<()> {
    let manager = initialized_manager(config).await?;

    let result = manager
        .trigger(
            &args.agent,
            args.schedule.as_deref(),
            TriggerOptions {
                prompt: args.prompt,
                bypass_concurrency_limit: args.bypass_limit,
                ..Default::default()
            },
        )
        .await
        .map_err(exit_error::from_fleet)?;

    let final_output = manager
        .get_job_final_output(&result.job_id)
        .unwrap_or_default();

    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "job_id": result.job_id,
            "agent": result.agent_name,
            "success": result.success,
            "session_id": result.session_id,
            "error": result.error,
            "output": final_output,
        }))?,
        OutputFormat::Text => {
            println!("job {} ({})", result.job_id, if result.success { "completed" } else { "failed" });
            if !final_output.is_empty() {
                println!("{final_output}");
            }
            if let Some(error) = &result.error {
                eprintln!("error: {error}");
            }
        }
    }

    if result.success {
        Ok(())
    } else {
        Err(ExitError::operational(
            result.error.unwrap_or_else(|| "job failed".to_string()),
        )
        .into())
    }
}

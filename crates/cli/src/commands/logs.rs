// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `drover logs` — replay and optionally follow fleet logs.

use crate::commands::initialized_manager;
use anyhow::Result;
use clap::Args;
use drover_core::{AgentName, JobId};
use drover_daemon::{LogLevel, LogStreamOptions};
use std::path::PathBuf;

#[derive(Args)]
pub struct LogsArgs {
    /// Only this agent's entries
    #[arg(long)]
    pub agent: Option<String>,

    /// Only this job's output
    #[arg(long)]
    pub job: Option<String>,

    /// Minimum level (debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub level: String,

    /// Keep following live events
    #[arg(long, short)]
    pub follow: bool,

    /// Number of recent jobs to replay
    #[arg(short = 'n', long, default_value_t = 10)]
    pub limit: usize,
}

fn parse_level(s: &str) -> Option<LogLevel> {
    match s {
        "debug" => Some(LogLevel::Debug),
        "info" => Some(LogLevel::Info),
        "warn" => Some(LogLevel::Warn),
        "error" => Some(LogLevel::Error),
        _ => None,
    }
}

pub async fn run(config: Option<PathBuf>, args: LogsArgs) -> Result<()> {
    let manager = initialized_manager(config).await?;

    let mut rx = match &args.job {
        Some(job) => manager.stream_job_output(JobId::new(job.clone()), true),
        None => manager.stream_logs(LogStreamOptions {
            agent: args.agent.as_deref().map(AgentName::new),
            job: None,
            min_level: parse_level(&args.level),
            include_history: true,
            history_limit: Some(args.limit),
            follow: args.follow,
        }),
    };

    while let Some(entry) = rx.recv().await {
        let scope = entry
            .agent
            .as_ref()
            .map(|a| format!(" [{a}]"))
            .unwrap_or_default();
        let job = entry
            .job
            .as_ref()
            .map(|j| format!(" {j}"))
            .unwrap_or_default();
        println!(
            "{} {:>5}{scope}{job} {}",
            entry.timestamp_ms,
            format!("{:?}", entry.level).to_lowercase(),
            entry.message
        );
    }
    Ok(())
}

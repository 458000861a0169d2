// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! drover - fleet supervisor CLI

mod commands;
mod exit_error;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{jobs, logs, schedule, start, status, trigger, validate};
use output::OutputFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "drover",
    version,
    about = "drover - a fleet supervisor for autonomous agents"
)]
struct Cli {
    /// Change to <dir> before doing anything
    #[arg(short = 'C', global = true, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Fleet file (searched upward from the cwd when omitted)
    #[arg(long = "config", global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        default_value_t,
        global = true
    )]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the supervisor until interrupted (SIGHUP reloads)
    Start(start::StartArgs),
    /// Load and validate the fleet file
    Validate,
    /// Show fleet status
    Status,
    /// Trigger one agent run and wait for it
    Trigger(trigger::TriggerArgs),
    /// Cancel a running job
    Cancel(jobs::CancelArgs),
    /// Fork a job into a new one resuming its session
    Fork(jobs::ForkArgs),
    /// Stream logs
    Logs(logs::LogsArgs),
    /// Enable or disable a schedule
    Schedule(schedule::ScheduleArgs),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        let code = e
            .downcast_ref::<exit_error::ExitError>()
            .map_or(1, |c| c.code);
        let msg = format_error(&e);
        if !msg.is_empty() {
            eprintln!("Error: {}", msg);
        }
        std::process::exit(code);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(dir) = &cli.directory {
        std::env::set_current_dir(dir)?;
    }

    match cli.command {
        Commands::Start(args) => start::run(cli.config, args).await,
        Commands::Validate => validate::run(cli.config, cli.output),
        Commands::Status => status::run(cli.config, cli.output).await,
        Commands::Trigger(args) => trigger::run(cli.config, cli.output, args).await,
        Commands::Cancel(args) => jobs::cancel(cli.config, cli.output, args).await,
        Commands::Fork(args) => jobs::fork(cli.config, cli.output, args).await,
        Commands::Logs(args) => logs::run(cli.config, args).await,
        Commands::Schedule(args) => schedule::run(cli.config, args).await,
    }
}

/// Format an anyhow error, deduplicating the chain.
///
/// If the top-level Display already contains the source error text, skip the
/// "Caused by" chain to avoid duplicate output; otherwise render the chain
/// so context is not lost.
fn format_error(err: &anyhow::Error) -> String {
    let top = err.to_string();
    let mut chain = err.chain().skip(1).peekable();
    if chain.peek().is_none() {
        return top;
    }
    let rest: Vec<String> = chain.map(|e| e.to_string()).collect();
    if rest.iter().all(|cause| top.contains(cause.as_str())) {
        return top;
    }
    let mut out = top;
    for cause in rest {
        out.push_str("\n  caused by: ");
        out.push_str(&cause);
    }
    out
}

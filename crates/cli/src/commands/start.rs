// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `drover start` — run the supervisor until interrupted.

use crate::commands::build_manager;
use crate::exit_error;
use anyhow::Result;
use clap::Args;
use drover_daemon::StopOptions;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Args)]
pub struct StartArgs {
    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Cancel still-running jobs when the stop timeout elapses
    #[arg(long)]
    pub cancel_on_timeout: bool,

    /// Graceful stop budget in seconds
    #[arg(long, default_value_t = 30)]
    pub stop_timeout: u64,
}

pub async fn run(config: Option<PathBuf>, args: StartArgs) -> Result<()> {
    let _log_guard = init_logging(args.log_file.as_deref());

    let manager = build_manager(config);
    manager.initialize().await.map_err(exit_error::from_fleet)?;
    manager.start().await.map_err(exit_error::from_fleet)?;
    info!("supervisor running; SIGHUP reloads, Ctrl-C stops");

    wait_for_shutdown(&manager).await;

    manager
        .stop(StopOptions {
            wait_for_jobs: true,
            timeout: Duration::from_secs(args.stop_timeout),
            cancel_on_timeout: args.cancel_on_timeout,
            cancel_timeout: Duration::from_secs(10),
        })
        .await
        .map_err(exit_error::from_fleet)?;
    Ok(())
}

/// Block until Ctrl-C / SIGTERM; SIGHUP triggers a hot reload in place.
async fn wait_for_shutdown(manager: &drover_daemon::FleetManager) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "SIGHUP handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => return,
                _ = terminate.recv() => return,
                _ = hangup.recv() => {
                    match manager.reload().await {
                        Ok(changes) => info!(changes = changes.len(), "reloaded on SIGHUP"),
                        Err(e) => warn!(error = %e, "SIGHUP reload failed, keeping old config"),
                    }
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = manager;
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_logging(log_file: Option<&std::path::Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path.file_name().map(PathBuf::from).unwrap_or_else(|| "drover.log".into());
            let appender = tracing_appender::rolling::never(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

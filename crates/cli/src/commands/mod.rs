// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI subcommands — thin wrappers over the fleet manager API.

pub mod jobs;
pub mod logs;
pub mod schedule;
pub mod start;
pub mod status;
pub mod trigger;
pub mod validate;

use crate::exit_error;
use anyhow::Result;
use drover_daemon::{FleetManager, FleetManagerOptions};
use drover_engine::{CommandDriver, QueryDriver};
use std::path::PathBuf;
use std::sync::Arc;

/// Engine program override for the process driver.
const ENGINE_ENV: &str = "DROVER_ENGINE";

/// Build a manager wired to the process-backed driver.
pub(crate) fn build_manager(config: Option<PathBuf>) -> FleetManager {
    let program = std::env::var(ENGINE_ENV).unwrap_or_else(|_| "claude".to_string());
    FleetManager::new(FleetManagerOptions {
        config_path: config,
        driver: Arc::new(CommandDriver::new(program)) as Arc<dyn QueryDriver>,
        bridges: Vec::new(),
        clock: drover_core::SystemClock,
    })
}

/// Build and initialize a manager for a one-shot command.
pub(crate) async fn initialized_manager(config: Option<PathBuf>) -> Result<FleetManager> {
    let manager = build_manager(config);
    manager
        .initialize()
        .await
        .map_err(exit_error::from_fleet)?;
    Ok(manager)
}

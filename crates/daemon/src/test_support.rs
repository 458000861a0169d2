// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test harness for the daemon crate's unit tests.

use crate::manager::{FleetManager, FleetManagerOptions};
use drover_core::FakeClock;
use drover_engine::{FakeDriver, QueryDriver};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

pub(crate) const BASIC_FLEET: &str = r#"
agents:
  writer:
    description: writes things
    default_prompt: write something
    schedules:
      tick:
        type: interval
        interval: 1h
        prompt: scheduled write
"#;

pub(crate) struct Harness {
    pub dir: TempDir,
    pub manager: FleetManager<FakeClock>,
    pub driver: FakeDriver,
    pub clock: FakeClock,
}

impl Harness {
    pub(crate) async fn initialized(fleet_yaml: &str, driver: FakeDriver) -> Self {
        let h = Self::new(fleet_yaml, driver);
        h.manager.initialize().await.unwrap();
        h
    }

    pub(crate) fn new(fleet_yaml: &str, driver: FakeDriver) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("fleet.yaml");
        fs::write(&config_path, fleet_yaml).unwrap();

        let clock = FakeClock::new();
        let manager = FleetManager::new(FleetManagerOptions {
            config_path: Some(config_path),
            driver: Arc::new(driver.clone()) as Arc<dyn QueryDriver>,
            bridges: Vec::new(),
            clock: clock.clone(),
        });
        Self {
            dir,
            manager,
            driver,
            clock,
        }
    }

    pub(crate) fn rewrite_fleet(&self, fleet_yaml: &str) {
        fs::write(self.dir.path().join("fleet.yaml"), fleet_yaml).unwrap();
    }
}

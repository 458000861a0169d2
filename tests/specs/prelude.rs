//! Shared harness for the behavioral specs.

use drover_bridge::{ChatBridge, FakeBridge};
use drover_daemon::{FleetManager, FleetManagerOptions, StopOptions};
use drover_engine::{FakeDriver, QueryDriver};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub struct Fleet {
    pub dir: TempDir,
    pub manager: FleetManager,
    pub driver: FakeDriver,
    pub bridge: Arc<FakeBridge>,
}

impl Fleet {
    /// Write the fleet file and build an uninitialized manager around the
    /// scripted driver and one fake bridge (kind `fake`).
    pub fn new(fleet_yaml: &str, driver: FakeDriver) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("fleet.yaml");
        std::fs::write(&config_path, fleet_yaml).unwrap();

        let bridge = FakeBridge::new("fake", 2000);
        let manager = FleetManager::new(FleetManagerOptions {
            config_path: Some(config_path),
            driver: Arc::new(driver.clone()) as Arc<dyn QueryDriver>,
            bridges: vec![bridge.clone() as Arc<dyn ChatBridge>],
            clock: drover_core::SystemClock,
        });

        Self {
            dir,
            manager,
            driver,
            bridge,
        }
    }

    pub async fn started(fleet_yaml: &str, driver: FakeDriver) -> Self {
        let fleet = Self::new(fleet_yaml, driver);
        fleet.manager.initialize().await.unwrap();
        fleet.manager.start().await.unwrap();
        fleet
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("fleet.yaml")
    }

    pub fn rewrite_fleet(&self, fleet_yaml: &str) {
        std::fs::write(self.config_path(), fleet_yaml).unwrap();
    }

    /// Stop, cancelling anything still running.
    pub async fn shutdown(&self) {
        let _ = self
            .manager
            .stop(StopOptions {
                wait_for_jobs: true,
                timeout: Duration::from_millis(500),
                cancel_on_timeout: true,
                cancel_timeout: Duration::from_secs(2),
            })
            .await;
    }
}

/// Poll `check` until it returns `Some`, or panic after `timeout`.
pub async fn wait_for<T>(
    timeout: Duration,
    what: &str,
    mut check: impl FnMut() -> Option<T>,
) -> T {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = check() {
            return value;
        }
        if Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

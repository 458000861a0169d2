//! Hot reload: change reporting, atomicity, idempotence.

use crate::prelude::{wait_for, Fleet};
use drover_core::{ChangeCategory, ChangeKind, FleetEvent, JobStatus};
use drover_engine::FakeDriver;
use drover_storage::JobFilter;
use std::time::Duration;

const SLOW_FLEET: &str = r#"
settings:
  check_interval: 25ms
agents:
  writer:
    schedules:
      tick:
        type: interval
        interval: 1h
        prompt: hi
"#;

#[tokio::test(flavor = "multi_thread")]
async fn reload_reports_the_schedule_modification() {
    let fleet = Fleet::started(SLOW_FLEET, FakeDriver::completing("s1", "ok")).await;
    let mut events = fleet.manager.subscribe();

    fleet.rewrite_fleet(&SLOW_FLEET.replace("interval: 1h", "interval: 2h"));
    let changes = fleet.manager.reload().await.unwrap();

    assert_eq!(changes.len(), 1);
    let change = &changes[0];
    assert_eq!(change.kind, ChangeKind::Modified);
    assert_eq!(change.category, ChangeCategory::Schedule);
    assert_eq!(change.name, "writer/tick");
    assert_eq!(change.details.as_deref(), Some("interval: 1h → 2h"));

    // The event carries the same list
    let event_changes = wait_for(Duration::from_millis(500), "config:reloaded", || {
        while let Some(event) = events.try_recv() {
            if let FleetEvent::ConfigReloaded { changes } = event {
                return Some(changes);
            }
        }
        None
    })
    .await;
    assert_eq!(event_changes, changes);

    fleet.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn reload_to_a_shorter_interval_re_anchors_and_fires() {
    // Armed under a 1h interval nothing fires; after reloading to 40ms the
    // schedule must re-anchor and begin firing on the new cadence.
    let fleet = Fleet::started(SLOW_FLEET, FakeDriver::completing("s1", "ok")).await;

    // Let a few ticks arm the schedule under the old interval
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(fleet
        .manager
        .list_jobs(&JobFilter::default())
        .unwrap()
        .jobs
        .is_empty());

    fleet.rewrite_fleet(&SLOW_FLEET.replace("interval: 1h", "interval: 40ms"));
    let changes = fleet.manager.reload().await.unwrap();
    assert_eq!(changes.len(), 1);

    // The stale 1h due time must not survive the reload
    wait_for(Duration::from_secs(2), "a fire on the new cadence", || {
        let page = fleet.manager.list_jobs(&JobFilter::default()).ok()?;
        page.jobs
            .iter()
            .any(|j| j.status == JobStatus::Completed)
            .then_some(())
    })
    .await;

    fleet.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn reload_switches_the_live_interval() {
    // Fast schedule, then reload to a glacial one: firing stops.
    let fast = SLOW_FLEET.replace("interval: 1h", "interval: 40ms");
    let fleet = Fleet::started(&fast, FakeDriver::completing("s1", "ok")).await;

    wait_for(Duration::from_millis(500), "first fire", || {
        let page = fleet.manager.list_jobs(&JobFilter::default()).ok()?;
        (!page.jobs.is_empty()).then_some(())
    })
    .await;

    fleet.rewrite_fleet(SLOW_FLEET);
    fleet.manager.reload().await.unwrap();
    // Drain in-flight work, then observe quiet
    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = fleet
        .manager
        .list_jobs(&JobFilter::default())
        .unwrap()
        .jobs
        .iter()
        .filter(|j| j.status == JobStatus::Completed)
        .count();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let after = fleet
        .manager
        .list_jobs(&JobFilter::default())
        .unwrap()
        .jobs
        .iter()
        .filter(|j| j.status == JobStatus::Completed)
        .count();
    assert_eq!(after, settled, "reloaded 1h interval should not keep firing");

    fleet.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn identical_reload_is_a_no_op() {
    let fleet = Fleet::started(SLOW_FLEET, FakeDriver::completing("s1", "ok")).await;
    let changes = fleet.manager.reload().await.unwrap();
    assert!(changes.is_empty());
    fleet.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_reload_keeps_the_old_config_running() {
    let fleet = Fleet::started(SLOW_FLEET, FakeDriver::completing("s1", "ok")).await;

    fleet.rewrite_fleet("agents:\n  broken: [nope");
    assert!(fleet.manager.reload().await.is_err());

    // The old agent is still there and triggerable
    let result = fleet
        .manager
        .trigger("writer", None, Default::default())
        .await
        .unwrap();
    assert!(result.success);

    fleet.shutdown().await;
}

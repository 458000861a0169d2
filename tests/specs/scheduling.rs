//! Interval scheduling end to end: firing, event order, concurrency caps.

use crate::prelude::{wait_for, Fleet};
use drover_core::{FleetEvent, JobStatus, SkipReason};
use drover_engine::{records, FakeDriver, ScriptStep};
use drover_storage::JobFilter;
use std::time::Duration;

const FAST_TICK_FLEET: &str = r#"
settings:
  check_interval: 25ms
agents:
  writer:
    schedules:
      tick:
        type: interval
        interval: 50ms
        prompt: hi
"#;

#[tokio::test(flavor = "multi_thread")]
async fn interval_schedule_fires_and_job_completes() {
    let fleet = Fleet::started(FAST_TICK_FLEET, FakeDriver::completing("s1", "hello")).await;
    let mut events = fleet.manager.subscribe();

    // Within 500ms a completed job exists
    let job = wait_for(Duration::from_millis(500), "a completed job", || {
        let page = fleet.manager.list_jobs(&JobFilter::default()).ok()?;
        page.jobs
            .into_iter()
            .find(|j| j.status == JobStatus::Completed)
    })
    .await;

    assert_eq!(job.agent, "writer");
    assert_eq!(job.schedule.as_deref(), Some("tick"));
    assert_eq!(job.session_id.as_ref().map(|s| s.as_str()), Some("s1"));

    // Output file holds the three scripted records
    let store = fleet.manager.store().unwrap();
    let records = store.read_job_output(&job.id, true).unwrap();
    assert_eq!(records.len(), 3);

    // Event pattern for the job: created · output* · completed
    let mut seen = Vec::new();
    while let Some(event) = events.try_recv() {
        if event.job_id() == Some(&job.id) {
            seen.push(event.name());
        }
    }
    assert_eq!(seen.first().map(String::as_str), Some("job:created"));
    assert_eq!(seen.last().map(String::as_str), Some("job:completed"));
    assert!(seen.iter().filter(|n| *n == "job:output").count() >= 1);

    // Fleet state reflects the terminal job
    let state = store.read_fleet_state().unwrap();
    let writer = &state.agents["writer"];
    assert_eq!(writer.last_job_id.as_ref(), Some(&job.id));
    assert!(writer.current_job_id.is_none());

    fleet.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrency_cap_holds_one_running_job() {
    let driver = FakeDriver::with_script(vec![
        ScriptStep::Record(records::init("s1")),
        ScriptStep::WaitGate,
        ScriptStep::Record(records::result_success("done")),
    ]);
    let fleet = Fleet::started(
        &FAST_TICK_FLEET.replace("50ms", "10ms"),
        driver.clone(),
    )
    .await;
    let mut events = fleet.manager.subscribe();

    // The first job starts and parks on the gate
    wait_for(Duration::from_millis(500), "first job to start", || {
        (driver.call_count() >= 1).then_some(())
    })
    .await;

    // Let several ticks pass at capacity
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Never more than one running/pending job
    let page = fleet.manager.list_jobs(&JobFilter::default()).unwrap();
    let live = page
        .jobs
        .iter()
        .filter(|j| !j.status.is_terminal())
        .count();
    assert_eq!(live, 1);
    assert_eq!(driver.call_count(), 1);

    // Skipped ticks were reported with the capacity reason
    let saw_capacity_skip = {
        let mut saw = false;
        while let Some(event) = events.try_recv() {
            if matches!(
                event,
                FleetEvent::ScheduleSkipped {
                    reason: SkipReason::MaxConcurrent,
                    ..
                }
            ) {
                saw = true;
            }
        }
        saw
    };
    assert!(saw_capacity_skip);

    // Release: the running job completes and a new one fires
    driver.release();
    wait_for(Duration::from_millis(1000), "a second job", || {
        (driver.call_count() >= 2).then_some(())
    })
    .await;

    fleet.shutdown().await;
}

//! Cancellation: mid-stream, idempotent, shutdown-driven.

use crate::prelude::{wait_for, Fleet};
use drover_core::{JobStatus, TerminationType};
use drover_engine::{records, FakeDriver, ScriptStep};
use drover_storage::JobFilter;
use std::time::Duration;

const MANUAL_FLEET: &str = r#"
agents:
  writer:
    default_prompt: write
"#;

fn suspending_driver() -> FakeDriver {
    FakeDriver::with_script(vec![
        ScriptStep::Record(records::init("s1")),
        ScriptStep::Record(records::assistant_text("part1")),
        ScriptStep::WaitGate, // suspends indefinitely
    ])
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_mid_stream_is_graceful_and_output_is_clean() {
    let fleet = Fleet::started(MANUAL_FLEET, suspending_driver()).await;
    let mut events = fleet.manager.subscribe();

    let manager = fleet.manager.clone();
    let run = tokio::spawn(async move {
        manager.trigger("writer", None, Default::default()).await
    });

    let job = wait_for(Duration::from_secs(2), "running job", || {
        let page = fleet.manager.list_jobs(&JobFilter::default()).ok()?;
        page.jobs.into_iter().find(|j| j.status == JobStatus::Running)
    })
    .await;

    let termination = fleet
        .manager
        .cancel_job(&job.id, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(termination, TerminationType::Graceful);

    let result = run.await.unwrap().unwrap();
    assert!(!result.success);

    // Terminal state and event
    let meta = fleet.manager.store().unwrap().get_job(&job.id).unwrap().unwrap();
    assert_eq!(meta.status, JobStatus::Cancelled);
    let saw_cancelled = {
        let mut saw = false;
        while let Some(event) = events.try_recv() {
            if event.name() == "job:cancelled" {
                saw = true;
            }
        }
        saw
    };
    assert!(saw_cancelled);

    // Output file ends cleanly: strict parsing accepts every line
    let records = fleet
        .manager
        .store()
        .unwrap()
        .read_job_output(&job.id, false)
        .unwrap();
    assert_eq!(records.len(), 2);

    fleet.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelling_a_terminal_job_again_is_silent() {
    let fleet = Fleet::started(MANUAL_FLEET, FakeDriver::completing("s1", "ok")).await;
    let result = fleet
        .manager
        .trigger("writer", None, Default::default())
        .await
        .unwrap();

    let mut events = fleet.manager.subscribe();
    let termination = fleet.manager.cancel_job(&result.job_id, None).await.unwrap();
    assert_eq!(termination, TerminationType::AlreadyStopped);
    assert!(events.try_recv().is_none());

    fleet.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_with_cancel_on_timeout_reaps_running_jobs() {
    let fleet = Fleet::started(MANUAL_FLEET, suspending_driver()).await;

    let manager = fleet.manager.clone();
    let run = tokio::spawn(async move {
        manager.trigger("writer", None, Default::default()).await
    });
    wait_for(Duration::from_secs(2), "running job", || {
        let page = fleet.manager.list_jobs(&JobFilter::default()).ok()?;
        page.jobs.iter().any(|j| j.status == JobStatus::Running).then_some(())
    })
    .await;

    fleet
        .manager
        .stop(drover_daemon::StopOptions {
            wait_for_jobs: true,
            timeout: Duration::from_millis(200),
            cancel_on_timeout: true,
            cancel_timeout: Duration::from_secs(2),
        })
        .await
        .unwrap();

    let result = run.await.unwrap().unwrap();
    assert!(!result.success);
    let page = fleet.manager.list_jobs(&JobFilter::default()).unwrap();
    assert!(page.jobs.iter().all(|j| j.status.is_terminal()));
}

//! Failure classification and hook firing.

use crate::prelude::Fleet;
use drover_core::{JobStatus, RunnerErrorKind};
use drover_engine::{records, FakeDriver, ScriptStep};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
async fn malformed_record_fails_the_job_and_runs_error_hooks() {
    let fleet_yaml = r#"
agents:
  writer:
    default_prompt: write
    working_dir: work
    hooks:
      after_run:
        - name: always
          command: touch after-ran
      on_error:
        - name: on-error
          command: touch on-error-ran
"#;
    let driver = FakeDriver::with_script(vec![
        ScriptStep::Record(records::init("s1")),
        ScriptStep::Record(records::missing_type()),
    ]);
    let fleet = Fleet::new(fleet_yaml, driver);
    std::fs::create_dir_all(fleet.dir.path().join("work")).unwrap();
    fleet.manager.initialize().await.unwrap();

    let result = fleet
        .manager
        .trigger("writer", None, Default::default())
        .await
        .unwrap();

    assert!(!result.success);
    let details = result.error_details.unwrap();
    assert_eq!(details.kind, RunnerErrorKind::MalformedResponse);
    assert!(details.messages_received >= 1);
    assert!(!details.recoverable);

    let meta = fleet
        .manager
        .store()
        .unwrap()
        .get_job(&result.job_id)
        .unwrap()
        .unwrap();
    assert_eq!(meta.status, JobStatus::Failed);

    // Both hook stages ran
    assert!(fleet.dir.path().join("work/after-ran").exists());
    assert!(fleet.dir.path().join("work/on-error-ran").exists());

    fleet.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn driver_init_failure_is_recoverable() {
    let fleet = Fleet::new(
        "agents:\n  writer:\n    default_prompt: write\n",
        FakeDriver::failing_init("engine offline"),
    );
    fleet.manager.initialize().await.unwrap();

    let result = fleet
        .manager
        .trigger("writer", None, Default::default())
        .await
        .unwrap();
    let details = result.error_details.unwrap();
    assert_eq!(details.kind, RunnerErrorKind::Initialization);
    assert!(details.recoverable);
    assert_eq!(details.messages_received, 0);

    fleet.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn scheduled_job_failure_lands_in_schedule_state() {
    let fleet_yaml = r#"
settings:
  check_interval: 25ms
agents:
  writer:
    schedules:
      tick:
        type: interval
        interval: 40ms
        prompt: hi
"#;
    let driver = FakeDriver::with_script(vec![
        ScriptStep::Record(records::init("s1")),
        ScriptStep::Fail("stream broke".into()),
    ]);
    let fleet = Fleet::started(fleet_yaml, driver).await;

    let state = crate::prelude::wait_for(
        Duration::from_secs(2),
        "schedule error recorded",
        || {
            let store = fleet.manager.store()?;
            let state = store.schedule_state("writer", "tick").ok()?;
            state.last_error.is_some().then_some(state)
        },
    )
    .await;
    assert!(state.last_error.unwrap().contains("stream broke"));

    fleet.shutdown().await;
}

//! Durable output behavior under imperfect conditions.

use crate::prelude::{wait_for, Fleet};
use drover_engine::FakeDriver;
use drover_storage::JobFilter;
use std::io::Write as _;
use std::time::Duration;

const MANUAL_FLEET: &str = r#"
agents:
  writer:
    default_prompt: write
"#;

#[tokio::test(flavor = "multi_thread")]
async fn job_stream_skips_a_partially_written_trailing_line() {
    let fleet = Fleet::started(MANUAL_FLEET, FakeDriver::completing("s1", "hello")).await;
    let result = fleet
        .manager
        .trigger("writer", None, Default::default())
        .await
        .unwrap();

    // Tear the tail of the output file, as a crash mid-append would
    let output_path = fleet
        .manager
        .store()
        .unwrap()
        .base_dir()
        .join(format!("jobs/{}.jsonl", result.job_id));
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&output_path)
        .unwrap();
    file.write_all(b"{\"type\": \"assistant\", \"trunca").unwrap();

    // The stream yields the three complete records and omits the torn one
    let mut rx = fleet.manager.stream_job_output(result.job_id.clone(), true);
    let mut entries = Vec::new();
    while let Some(entry) = rx.recv().await {
        entries.push(entry);
    }
    assert_eq!(entries.len(), 3);

    // And the reader API agrees without raising
    let records = fleet
        .manager
        .store()
        .unwrap()
        .read_job_output(&result.job_id, true)
        .unwrap();
    assert_eq!(records.len(), 3);

    fleet.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn final_output_falls_back_to_tool_results() {
    use drover_engine::{records, ScriptStep};

    // A job that only used tools and never produced assistant text
    let driver = FakeDriver::with_script(vec![
        ScriptStep::Record(records::init("s1")),
        ScriptStep::Record(records::tool_use("t1", "Bash")),
        ScriptStep::Record(records::tool_result("t1", "tool said this")),
        ScriptStep::Record(records::result_success("")),
    ]);
    let fleet = Fleet::started(MANUAL_FLEET, driver).await;

    let result = fleet
        .manager
        .trigger("writer", None, Default::default())
        .await
        .unwrap();
    assert!(result.success);

    let output = fleet.manager.get_job_final_output(&result.job_id).unwrap();
    assert_eq!(output, "tool said this");

    fleet.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn output_mirror_follows_the_schedule_flag() {
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
        output_to_file: true
"#;
    let fleet = Fleet::started(fleet_yaml, FakeDriver::completing("s1", "mirrored text")).await;

    let job = wait_for(Duration::from_secs(2), "completed job", || {
        let page = fleet.manager.list_jobs(&JobFilter::default()).ok()?;
        page.jobs.into_iter().find(|j| j.status.is_terminal())
    })
    .await;

    let mirror = fleet
        .manager
        .store()
        .unwrap()
        .base_dir()
        .join(format!("jobs/{}/output.log", job.id));
    let content = std::fs::read_to_string(mirror).unwrap();
    assert!(content.contains("mirrored text"));

    fleet.shutdown().await;
}

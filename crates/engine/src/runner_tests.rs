// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::fake::{records, FakeDriver, ScriptStep};
use drover_config::{AgentDef, HookDef, HooksDef};
use drover_core::{CollectingSink, FakeClock};
use std::time::Duration;
use tempfile::tempdir;

struct Harness {
    _dir: tempfile::TempDir,
    store: Arc<StateStore>,
    sink: Arc<CollectingSink>,
    clock: FakeClock,
    agent_dir: std::path::PathBuf,
}

impl Harness {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let store = Arc::new(StateStore::open(dir.path().join("state")).unwrap());
        let agent_dir = dir.path().join("work");
        std::fs::create_dir_all(&agent_dir).unwrap();
        Self {
            _dir: dir,
            store,
            sink: CollectingSink::new(),
            clock: FakeClock::new(),
            agent_dir,
        }
    }

    fn agent(&self, def: AgentDef) -> Arc<ResolvedAgent> {
        Arc::new(ResolvedAgent {
            name: AgentName::new("writer"),
            def,
            working_dir: self.agent_dir.clone(),
        })
    }

    fn runner(&self, driver: FakeDriver) -> JobRunner<FakeClock> {
        JobRunner::new(
            Arc::clone(&self.store),
            Arc::new(driver),
            self.sink.clone(),
            HookExecutor::default(),
            self.clock.clone(),
        )
    }

    fn request(&self, agent: Arc<ResolvedAgent>) -> RunnerRequest {
        RunnerRequest {
            agent,
            prompt: "hi".to_string(),
            trigger: TriggerType::Manual,
            schedule: None,
            resume: None,
            fork_session: false,
            forked_from: None,
            output_to_file: false,
            extra_mcp_servers: Default::default(),
            message_tx: None,
            accept_tx: None,
            cancel: CancellationToken::new(),
        }
    }
}

#[tokio::test]
async fn successful_run_completes_the_job() {
    let h = Harness::new();
    let runner = h.runner(FakeDriver::completing("s1", "hello"));
    let result = runner.execute(h.request(h.agent(AgentDef::default()))).await.unwrap();

    assert!(result.success);
    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!(result.session_id.as_ref().map(|s| s.as_str()), Some("s1"));

    let meta = h.store.get_job(&result.job_id).unwrap().unwrap();
    assert_eq!(meta.status, JobStatus::Completed);
    assert_eq!(meta.exit_reason, Some(ExitReason::Success));
    assert_eq!(meta.session_id.as_ref().map(|s| s.as_str()), Some("s1"));
    assert!(meta.finished_at_ms.is_some());

    let output = h.store.read_job_output(&result.job_id, true).unwrap();
    assert_eq!(output.len(), 3);
}

#[tokio::test]
async fn events_follow_created_output_terminal_order() {
    let h = Harness::new();
    let runner = h.runner(FakeDriver::completing("s1", "hello"));
    runner.execute(h.request(h.agent(AgentDef::default()))).await.unwrap();

    let names = h.sink.names();
    assert_eq!(names.first().map(String::as_str), Some("job:created"));
    assert_eq!(names.last().map(String::as_str), Some("job:completed"));
    assert!(names.iter().filter(|n| *n == "job:output").count() >= 1);
    // No output after the terminal event
    let terminal_pos = names.iter().position(|n| n == "job:completed").unwrap();
    assert!(names.iter().skip(terminal_pos + 1).all(|n| n != "job:output"));
}

#[tokio::test]
async fn accept_fires_with_the_job_id_before_completion() {
    let h = Harness::new();
    let driver = FakeDriver::with_script(vec![
        ScriptStep::Record(records::init("s1")),
        ScriptStep::WaitGate,
        ScriptStep::Record(records::result_success("done")),
    ]);
    let runner = h.runner(driver.clone());

    let (accept_tx, accept_rx) = tokio::sync::oneshot::channel();
    let mut request = h.request(h.agent(AgentDef::default()));
    request.accept_tx = Some(accept_tx);

    let handle = tokio::spawn(async move { runner.execute(request).await });

    let job_id = tokio::time::timeout(Duration::from_secs(2), accept_rx)
        .await
        .unwrap()
        .unwrap();
    assert!(job_id.as_str().starts_with("job-"));

    driver.release();
    let result = handle.await.unwrap().unwrap();
    assert_eq!(result.job_id, job_id);
}

#[tokio::test]
async fn malformed_record_fails_the_job() {
    let h = Harness::new();
    let driver = FakeDriver::with_script(vec![
        ScriptStep::Record(records::init("s1")),
        ScriptStep::Record(records::missing_type()),
    ]);
    let runner = h.runner(driver);
    let result = runner.execute(h.request(h.agent(AgentDef::default()))).await.unwrap();

    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.kind, RunnerErrorKind::MalformedResponse);
    assert!(!error.recoverable);
    assert!(error.messages_received >= 1);

    let meta = h.store.get_job(&result.job_id).unwrap().unwrap();
    assert_eq!(meta.status, JobStatus::Failed);
    assert!(h.sink.names().contains(&"job:failed".to_string()));
}

#[tokio::test]
async fn init_failure_is_recoverable_initialization() {
    let h = Harness::new();
    let runner = h.runner(FakeDriver::failing_init("engine offline"));
    let result = runner.execute(h.request(h.agent(AgentDef::default()))).await.unwrap();

    let error = result.error.unwrap();
    assert_eq!(error.kind, RunnerErrorKind::Initialization);
    assert!(error.recoverable);
    assert_eq!(error.messages_received, 0);
}

#[tokio::test]
async fn stream_error_is_a_streaming_failure() {
    let h = Harness::new();
    let driver = FakeDriver::with_script(vec![
        ScriptStep::Record(records::init("s1")),
        ScriptStep::Fail("connection reset".into()),
    ]);
    let result = h
        .runner(driver)
        .execute(h.request(h.agent(AgentDef::default())))
        .await
        .unwrap();
    assert_eq!(result.error.unwrap().kind, RunnerErrorKind::Streaming);
}

#[tokio::test]
async fn driver_error_record_fails_the_job() {
    let h = Harness::new();
    let driver = FakeDriver::with_script(vec![
        ScriptStep::Record(records::init("s1")),
        ScriptStep::Record(serde_json::json!({"type": "error", "message": "quota exhausted"})),
    ]);
    let result = h
        .runner(driver)
        .execute(h.request(h.agent(AgentDef::default())))
        .await
        .unwrap();
    let error = result.error.unwrap();
    assert_eq!(error.kind, RunnerErrorKind::Streaming);
    assert!(error.message.contains("quota"));
}

#[tokio::test]
async fn error_result_record_fails_the_job() {
    let h = Harness::new();
    let driver = FakeDriver::with_script(vec![
        ScriptStep::Record(records::init("s1")),
        ScriptStep::Record(records::result_error("ran out of turns")),
    ]);
    let result = h
        .runner(driver)
        .execute(h.request(h.agent(AgentDef::default())))
        .await
        .unwrap();
    assert_eq!(result.status, JobStatus::Failed);
    assert!(result.error.unwrap().message.contains("ran out of turns"));
}

#[tokio::test]
async fn cancellation_ends_gracefully_with_clean_output() {
    let h = Harness::new();
    let driver = FakeDriver::with_script(vec![
        ScriptStep::Record(records::init("s1")),
        ScriptStep::Record(records::assistant_text("part1")),
        ScriptStep::WaitGate, // suspends indefinitely
    ]);
    let runner = h.runner(driver);

    let cancel = CancellationToken::new();
    let mut request = h.request(h.agent(AgentDef::default()));
    request.cancel = cancel.clone();

    let handle = tokio::spawn(async move { runner.execute(request).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(result.status, JobStatus::Cancelled);
    assert_eq!(result.termination, Some(TerminationType::Graceful));

    // Output file ends cleanly: every line parses
    let records = h.store.read_job_output(&result.job_id, false).unwrap();
    assert_eq!(records.len(), 2);
    assert!(h.sink.names().contains(&"job:cancelled".to_string()));
}

#[tokio::test]
async fn message_tx_receives_typed_messages() {
    let h = Harness::new();
    let runner = h.runner(FakeDriver::completing("s1", "streamed text"));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut request = h.request(h.agent(AgentDef::default()));
    request.message_tx = Some(tx);

    runner.execute(request).await.unwrap();

    let mut texts = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let Some(text) = msg.assistant_text() {
            texts.push(text);
        }
    }
    assert_eq!(texts, vec!["streamed text"]);
}

#[tokio::test]
async fn output_mirror_collects_assistant_text() {
    let h = Harness::new();
    let runner = h.runner(FakeDriver::completing("s1", "mirrored"));
    let mut request = h.request(h.agent(AgentDef::default()));
    request.output_to_file = true;

    let result = runner.execute(request).await.unwrap();

    let mirror = h
        .store
        .base_dir()
        .join(format!("jobs/{}/output.log", result.job_id));
    assert_eq!(std::fs::read_to_string(mirror).unwrap(), "mirrored\n");
}

#[tokio::test]
async fn resume_and_fork_reach_the_driver() {
    let h = Harness::new();
    let driver = FakeDriver::completing("s2", "ok");
    let runner = h.runner(driver.clone());
    let mut request = h.request(h.agent(AgentDef::default()));
    request.resume = Some(SessionId::new("s42"));
    request.fork_session = true;
    request.forked_from = Some(JobId::new("job-2026-08-01-cafe0000"));

    let result = runner.execute(request).await.unwrap();

    let call = &driver.calls()[0];
    assert_eq!(call.options.resume.as_ref().map(|s| s.as_str()), Some("s42"));
    assert!(call.options.fork_session);

    let meta = h.store.get_job(&result.job_id).unwrap().unwrap();
    assert_eq!(
        meta.forked_from.as_ref().map(|j| j.as_str()),
        Some("job-2026-08-01-cafe0000")
    );
}

#[tokio::test]
async fn fatal_before_run_hook_fails_the_job_without_querying() {
    let h = Harness::new();
    let driver = FakeDriver::completing("s1", "never");
    let def = AgentDef {
        hooks: HooksDef {
            before_run: vec![HookDef {
                name: "guard".into(),
                command: "exit 1".into(),
                timeout_ms: 5_000,
                continue_on_error: false,
                when: None,
            }],
            ..Default::default()
        },
        ..Default::default()
    };
    let runner = h.runner(driver.clone());
    let result = runner.execute(h.request(h.agent(def))).await.unwrap();

    assert_eq!(result.status, JobStatus::Failed);
    assert_eq!(result.error.unwrap().kind, RunnerErrorKind::Initialization);
    assert_eq!(driver.call_count(), 0);
}

#[tokio::test]
async fn on_error_hooks_run_only_on_failure() {
    let h = Harness::new();
    let marker = h.agent_dir.join("on-error-ran");
    let def = AgentDef {
        hooks: HooksDef {
            on_error: vec![HookDef {
                name: "mark".into(),
                command: format!("touch {}", marker.display()),
                timeout_ms: 5_000,
                continue_on_error: true,
                when: None,
            }],
            ..Default::default()
        },
        ..Default::default()
    };

    // Success: no marker
    let runner = h.runner(FakeDriver::completing("s1", "ok"));
    runner.execute(h.request(h.agent(def.clone()))).await.unwrap();
    assert!(!marker.exists());

    // Failure: marker appears
    let runner = h.runner(FakeDriver::with_script(vec![ScriptStep::Record(
        records::missing_type(),
    )]));
    runner.execute(h.request(h.agent(def))).await.unwrap();
    assert!(marker.exists());
}

#[tokio::test]
async fn metadata_file_reaches_hook_context() {
    let h = Harness::new();
    std::fs::write(h.agent_dir.join("meta.json"), r#"{"ready": true}"#).unwrap();
    let marker = h.agent_dir.join("saw-metadata");
    let def = AgentDef {
        metadata_file: Some("meta.json".into()),
        hooks: HooksDef {
            after_run: vec![HookDef {
                name: "gated".into(),
                command: format!("touch {}", marker.display()),
                timeout_ms: 5_000,
                continue_on_error: true,
                when: Some("metadata_ready".into()),
            }],
            ..Default::default()
        },
        ..Default::default()
    };

    h.runner(FakeDriver::completing("s1", "ok"))
        .execute(h.request(h.agent(def)))
        .await
        .unwrap();
    assert!(marker.exists());
}

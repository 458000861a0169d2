// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use tempfile::tempdir;

fn hook(name: &str, command: &str) -> HookDef {
    HookDef {
        name: name.to_string(),
        command: command.to_string(),
        timeout_ms: 30_000,
        continue_on_error: true,
        when: None,
    }
}

fn hooks_after(hooks: Vec<HookDef>) -> HooksDef {
    HooksDef {
        after_run: hooks,
        ..Default::default()
    }
}

fn context(success: bool) -> HookContext {
    HookContext {
        event: "job:completed".to_string(),
        job: HookJobInfo {
            id: "job-2026-08-01-aaaa0000".to_string(),
            agent_id: "writer".to_string(),
            schedule: Some("tick".to_string()),
            ..Default::default()
        },
        result: HookResultInfo {
            success,
            output: "done".to_string(),
            error: None,
        },
        agent: HookAgentInfo {
            id: "writer".to_string(),
            name: "writer".to_string(),
        },
        metadata: None,
    }
}

#[tokio::test]
async fn runs_hooks_and_captures_output() {
    let dir = tempdir().unwrap();
    let executor = HookExecutor::default();
    let outcome = executor
        .execute(
            &hooks_after(vec![hook("echoer", "echo hello from $DROVER_AGENT")]),
            HookStage::AfterRun,
            &context(true),
            dir.path(),
            &CancellationToken::new(),
        )
        .await;

    assert!(!outcome.should_fail_job);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].status, HookRunStatus::Succeeded);
    assert_eq!(outcome.results[0].stdout.trim(), "hello from writer");
}

#[tokio::test]
async fn failing_hook_with_continue_does_not_fail_job() {
    let dir = tempdir().unwrap();
    let outcome = HookExecutor::default()
        .execute(
            &hooks_after(vec![hook("bad", "exit 3"), hook("good", "true")]),
            HookStage::AfterRun,
            &context(true),
            dir.path(),
            &CancellationToken::new(),
        )
        .await;

    assert!(!outcome.should_fail_job);
    assert_eq!(
        outcome.results[0].status,
        HookRunStatus::Failed { exit_code: Some(3) }
    );
    // Later hooks in the stage still ran
    assert_eq!(outcome.results[1].status, HookRunStatus::Succeeded);
}

#[tokio::test]
async fn fatal_hook_sets_should_fail_job() {
    let dir = tempdir().unwrap();
    let mut fatal = hook("fatal", "exit 1");
    fatal.continue_on_error = false;
    let outcome = HookExecutor::default()
        .execute(
            &hooks_after(vec![fatal]),
            HookStage::AfterRun,
            &context(true),
            dir.path(),
            &CancellationToken::new(),
        )
        .await;
    assert!(outcome.should_fail_job);
}

#[tokio::test]
async fn when_predicate_gates_execution() {
    let dir = tempdir().unwrap();
    let mut on_success = hook("on-success", "echo ran");
    on_success.when = Some("success".to_string());
    let mut on_failure = hook("on-failure", "echo ran");
    on_failure.when = Some("!success".to_string());

    let outcome = HookExecutor::default()
        .execute(
            &hooks_after(vec![on_success, on_failure]),
            HookStage::AfterRun,
            &context(false),
            dir.path(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.results[0].status, HookRunStatus::Skipped);
    assert_eq!(outcome.results[1].status, HookRunStatus::Succeeded);
}

#[tokio::test]
async fn when_can_match_event_and_agent() {
    let dir = tempdir().unwrap();
    let mut gated = hook("gated", "echo ran");
    gated.when = Some("event == \"job:completed\" && agent == \"writer\"".to_string());

    let outcome = HookExecutor::default()
        .execute(
            &hooks_after(vec![gated]),
            HookStage::AfterRun,
            &context(true),
            dir.path(),
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome.results[0].status, HookRunStatus::Succeeded);
}

#[tokio::test]
async fn when_sees_metadata_scalars() {
    let dir = tempdir().unwrap();
    let mut gated = hook("gated", "echo ran");
    gated.when = Some("metadata_ready".to_string());
    let mut ctx = context(true);
    ctx.metadata = Some(json!({"ready": true, "count": 3}));

    let outcome = HookExecutor::default()
        .execute(
            &hooks_after(vec![gated]),
            HookStage::AfterRun,
            &ctx,
            dir.path(),
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome.results[0].status, HookRunStatus::Succeeded);
}

#[tokio::test]
async fn invalid_when_skips_the_hook() {
    let dir = tempdir().unwrap();
    let mut broken = hook("broken", "echo ran");
    broken.when = Some("nonsense ===".to_string());

    let outcome = HookExecutor::default()
        .execute(
            &hooks_after(vec![broken]),
            HookStage::AfterRun,
            &context(true),
            dir.path(),
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome.results[0].status, HookRunStatus::Skipped);
}

#[tokio::test]
async fn timeout_stops_the_hook() {
    let dir = tempdir().unwrap();
    let mut slow = hook("slow", "sleep 30");
    slow.timeout_ms = 100;

    let start = std::time::Instant::now();
    let outcome = HookExecutor::default()
        .execute(
            &hooks_after(vec![slow]),
            HookStage::AfterRun,
            &context(true),
            dir.path(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.results[0].status, HookRunStatus::TimedOut);
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn hooks_run_in_the_given_cwd() {
    let dir = tempdir().unwrap();
    let outcome = HookExecutor::default()
        .execute(
            &hooks_after(vec![hook("pwd", "pwd")]),
            HookStage::AfterRun,
            &context(true),
            dir.path(),
            &CancellationToken::new(),
        )
        .await;
    let reported = outcome.results[0].stdout.trim();
    let expected = dir.path().canonicalize().unwrap();
    assert_eq!(
        std::path::Path::new(reported).canonicalize().unwrap(),
        expected
    );
}

#[tokio::test]
async fn capture_is_bounded() {
    let dir = tempdir().unwrap();
    let executor = HookExecutor::new(100);
    let outcome = executor
        .execute(
            &hooks_after(vec![hook("noisy", "yes x | head -c 10000")]),
            HookStage::AfterRun,
            &context(true),
            dir.path(),
            &CancellationToken::new(),
        )
        .await;
    assert!(outcome.results[0].stdout.len() <= 100);
}

//! Chat routing end to end: session creation, resume, reset.

use crate::prelude::{wait_for, Fleet};
use drover_bridge::{FakeBridge, FakeIndicator, FakeReplier};
use drover_core::{ChannelId, FleetEvent, SessionLifecycle};
use drover_engine::FakeDriver;
use std::time::Duration;

const CHAT_FLEET: &str = r#"
agents:
  support:
    description: answers questions
    chat:
      fake:
        channels: [C1]
        mode: auto
"#;

#[tokio::test(flavor = "multi_thread")]
async fn chat_messages_create_then_resume_a_session() {
    let fleet = Fleet::started(CHAT_FLEET, FakeDriver::completing("s42", "hi there")).await;
    let mut events = fleet.manager.subscribe();
    assert!(fleet.bridge.is_connected());

    // First message: no session yet
    let replier = FakeReplier::new();
    let indicator = FakeIndicator::new();
    fleet
        .bridge
        .deliver(FakeBridge::message(
            None,
            "hello",
            "C1",
            false,
            replier.clone(),
            indicator.clone(),
        ))
        .await;

    wait_for(Duration::from_secs(2), "first reply", || {
        (!replier.sent().is_empty()).then_some(())
    })
    .await;
    assert_eq!(replier.sent(), vec!["hi there"]);
    assert_eq!(indicator.starts(), 1);
    assert_eq!(indicator.stops(), 1);

    // Session was stored under (support, C1)
    let store = fleet.manager.store().unwrap();
    let session = wait_for(Duration::from_secs(1), "stored session", || {
        store
            .chat_session("support", &ChannelId::new("C1"))
            .ok()
            .flatten()
    })
    .await;
    assert_eq!(session.session_id.as_str(), "s42");

    // Second message on the same channel resumes
    let replier2 = FakeReplier::new();
    fleet
        .bridge
        .deliver(FakeBridge::message(
            None,
            "and another thing",
            "C1",
            false,
            replier2.clone(),
            FakeIndicator::new(),
        ))
        .await;
    wait_for(Duration::from_secs(2), "second reply", || {
        (!replier2.sent().is_empty()).then_some(())
    })
    .await;

    // The second query carried resume=s42
    let calls = fleet.driver.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].options.resume, None);
    assert_eq!(
        calls[1].options.resume.as_ref().map(|s| s.as_str()),
        Some("s42")
    );

    // Lifecycle events: created, then resumed
    let mut lifecycles = Vec::new();
    while let Some(event) = events.try_recv() {
        if let FleetEvent::BridgeSessionLifecycle { event, .. } = event {
            lifecycles.push(event);
        }
    }
    assert_eq!(
        lifecycles,
        vec![SessionLifecycle::Created, SessionLifecycle::Resumed]
    );

    fleet.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_chat_job_keeps_the_session_and_reports() {
    let fleet = Fleet::started(CHAT_FLEET, FakeDriver::failing_init("engine offline")).await;

    let replier = FakeReplier::new();
    fleet
        .bridge
        .deliver(FakeBridge::message(
            None,
            "hello",
            "C1",
            false,
            replier.clone(),
            FakeIndicator::new(),
        ))
        .await;

    wait_for(Duration::from_secs(2), "error reply", || {
        (!replier.sent().is_empty()).then_some(())
    })
    .await;
    let sent = replier.sent();
    assert!(sent[0].starts_with("⚠️"));
    assert!(sent[0].contains("!reset"));

    let store = fleet.manager.store().unwrap();
    assert!(store
        .chat_session("support", &ChannelId::new("C1"))
        .unwrap()
        .is_none());

    fleet.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn reset_command_clears_and_next_message_starts_fresh() {
    let fleet = Fleet::started(CHAT_FLEET, FakeDriver::completing("s42", "ok")).await;

    // Establish a session
    let replier = FakeReplier::new();
    fleet
        .bridge
        .deliver(FakeBridge::message(
            None,
            "hello",
            "C1",
            false,
            replier.clone(),
            FakeIndicator::new(),
        ))
        .await;
    wait_for(Duration::from_secs(2), "reply", || {
        (!replier.sent().is_empty()).then_some(())
    })
    .await;

    // Reset
    let reset_replier = FakeReplier::new();
    fleet
        .bridge
        .deliver(FakeBridge::message(
            None,
            "!reset",
            "C1",
            false,
            reset_replier.clone(),
            FakeIndicator::new(),
        ))
        .await;
    wait_for(Duration::from_secs(2), "reset reply", || {
        (!reset_replier.sent().is_empty()).then_some(())
    })
    .await;

    let store = fleet.manager.store().unwrap();
    assert!(store
        .chat_session("support", &ChannelId::new("C1"))
        .unwrap()
        .is_none());

    // Next message starts a fresh conversation (no resume)
    let replier3 = FakeReplier::new();
    fleet
        .bridge
        .deliver(FakeBridge::message(
            None,
            "fresh start",
            "C1",
            false,
            replier3.clone(),
            FakeIndicator::new(),
        ))
        .await;
    wait_for(Duration::from_secs(2), "fresh reply", || {
        (!replier3.sent().is_empty()).then_some(())
    })
    .await;

    let calls = fleet.driver.calls();
    assert_eq!(calls.last().unwrap().options.resume, None);

    fleet.shutdown().await;
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::fake::FakeReplier;

fn responder(replier: &Arc<FakeReplier>, limit: usize) -> StreamingResponder {
    StreamingResponder::new(
        Arc::clone(replier) as Arc<dyn Replier>,
        limit,
        Duration::from_millis(1000),
    )
}

#[test]
fn short_text_is_one_chunk() {
    let (chunk, rest) = split_message("hello", 2000);
    assert_eq!(chunk, "hello");
    assert!(rest.is_empty());
}

#[test]
fn limit_plus_one_splits_in_two() {
    let text = "a".repeat(2001);
    let (chunk, rest) = split_message(&text, 2000);
    assert_eq!(chunk.len(), 2000);
    assert_eq!(rest.len(), 1);
}

#[test]
fn prefers_paragraph_break_near_window_end() {
    let text = format!("{}\n\n{}", "a".repeat(1800), "b".repeat(400));
    let (chunk, rest) = split_message(&text, 2000);
    assert_eq!(chunk, "a".repeat(1800));
    assert_eq!(rest, "b".repeat(400));
}

#[test]
fn falls_back_to_newline_then_space() {
    let newline_text = format!("{}\n{}", "a".repeat(1900), "b".repeat(400));
    let (chunk, _) = split_message(&newline_text, 2000);
    assert_eq!(chunk, "a".repeat(1900));

    let space_text = format!("{} {}", "a".repeat(1950), "b".repeat(400));
    let (chunk, rest) = split_message(&space_text, 2000);
    assert_eq!(chunk, "a".repeat(1950));
    assert!(rest.starts_with('b'));
}

#[test]
fn hard_cut_without_natural_breaks() {
    let text = "a".repeat(4100);
    let (chunk, rest) = split_message(&text, 2000);
    assert_eq!(chunk.len(), 2000);
    assert_eq!(rest.len(), 2100);
}

#[test]
fn hard_cut_respects_char_boundaries() {
    let text = "é".repeat(1500); // 2 bytes each
    let (chunk, rest) = split_message(&text, 2001);
    assert!(chunk.len() <= 2001);
    assert!(chunk.is_char_boundary(chunk.len()));
    assert_eq!(chunk.len() + rest.len(), 3000);
}

#[test]
fn open_code_fence_is_closed_and_reopened() {
    let code = "x".repeat(2100);
    let text = format!("intro\n```rust\n{code}");
    let (chunk, rest) = split_message(&text, 2000);

    assert!(chunk.len() <= 2000);
    assert!(chunk.ends_with("```"), "chunk should close the fence: ...{}", &chunk[chunk.len().saturating_sub(20)..]);
    assert!(rest.starts_with("```rust\n"), "rest should reopen with the tag: {}", &rest[..20.min(rest.len())]);
}

#[test]
fn closed_fences_are_left_alone() {
    let text = format!("```sh\nls\n```\n{}", "a".repeat(2100));
    let (chunk, rest) = split_message(&text, 2000);
    assert!(!rest.starts_with("```sh"));
    assert_eq!(fence_count(&chunk) % 2, 0);
}

#[test]
fn tiny_limits_still_make_progress() {
    let (chunk, rest) = split_message("ééé", 1);
    assert_eq!(chunk, "é");
    assert_eq!(rest, "éé");
}

#[tokio::test(start_paused = true)]
async fn sends_everything_in_order() {
    let replier = FakeReplier::new();
    let mut responder = responder(&replier, 2000);

    responder.add_and_send("first ").await;
    responder.add_and_send("second").await;
    responder.flush().await;

    assert!(responder.has_sent_messages());
    let sent = replier.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], "first ");
    assert_eq!(sent[1], "second");
}

#[tokio::test(start_paused = true)]
async fn long_text_fans_out_into_limited_chunks() {
    let replier = FakeReplier::new();
    let mut responder = responder(&replier, 100);

    responder.add_and_send(&"a".repeat(250)).await;
    responder.flush().await;

    let sent = replier.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|m| m.len() <= 100));
    assert_eq!(sent.concat(), "a".repeat(250));
}

#[tokio::test(start_paused = true)]
async fn respects_min_interval_between_sends() {
    let replier = FakeReplier::new();
    let mut responder = StreamingResponder::new(
        Arc::clone(&replier) as Arc<dyn Replier>,
        100,
        Duration::from_millis(1000),
    );

    let start = tokio::time::Instant::now();
    responder.add_and_send(&"a".repeat(250)).await;
    // Three sends: the second and third each wait out the interval
    assert!(start.elapsed() >= Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn nothing_sent_for_whitespace_only() {
    let replier = FakeReplier::new();
    let mut responder = responder(&replier, 100);
    responder.add_and_send("  \n  ").await;
    responder.flush().await;
    assert!(!responder.has_sent_messages());
    assert!(replier.sent().is_empty());
}

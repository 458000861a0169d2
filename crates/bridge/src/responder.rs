// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streaming reply assembly.
//!
//! Collects assistant text and sends it through the bridge in chunks no
//! larger than the platform limit, at most one send per minimum interval.
//! Splitting prefers natural breaks near the end of the window and is
//! code-block-aware: a chunk that would end inside a fenced block closes the
//! fence and the next chunk reopens it with the same language tag.

use crate::types::Replier;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Room reserved for the closing fence when a chunk ends inside a block.
const FENCE_CLOSE_LEN: usize = 4; // "\n```"

/// Preference windows, measured back from the split window's end.
const PARAGRAPH_ZONE: usize = 500;
const NEWLINE_ZONE: usize = 200;
const SPACE_ZONE: usize = 100;

/// Rate-limited, size-limited reply sender for one inbound message.
pub struct StreamingResponder {
    replier: Arc<dyn Replier>,
    limit: usize,
    min_interval: Duration,
    buffer: String,
    last_send: Option<tokio::time::Instant>,
    sent_count: usize,
}

impl StreamingResponder {
    pub fn new(replier: Arc<dyn Replier>, limit: usize, min_interval: Duration) -> Self {
        Self {
            replier,
            limit,
            min_interval,
            buffer: String::new(),
            last_send: None,
            sent_count: 0,
        }
    }

    /// Append text and send everything buffered, paced by the interval.
    pub async fn add_and_send(&mut self, text: &str) {
        self.buffer.push_str(text);
        self.drain().await;
    }

    /// Send whatever is still buffered.
    pub async fn flush(&mut self) {
        self.drain().await;
    }

    /// Whether any reply went out for this message.
    pub fn has_sent_messages(&self) -> bool {
        self.sent_count > 0
    }

    async fn drain(&mut self) {
        while !self.buffer.trim().is_empty() {
            let (chunk, rest) = split_message(&self.buffer, self.limit);
            self.buffer = rest;

            if let Some(last) = self.last_send {
                let since = last.elapsed();
                if since < self.min_interval {
                    tokio::time::sleep(self.min_interval - since).await;
                }
            }

            if let Err(e) = self.replier.reply(&chunk).await {
                warn!(error = %e, "reply failed, dropping remaining buffer");
                self.buffer.clear();
                return;
            }
            self.last_send = Some(tokio::time::Instant::now());
            self.sent_count += 1;
        }
        self.buffer.clear();
    }
}

/// Split `text` into one chunk of at most `limit` bytes plus the remainder.
///
/// The split point prefers, in order: a paragraph break within the last
/// [`PARAGRAPH_ZONE`] bytes of the window, a newline within the last
/// [`NEWLINE_ZONE`], a space within the last [`SPACE_ZONE`], otherwise a
/// hard cut at the window end (on a char boundary). A chunk ending inside a
/// fenced code block is closed, and the remainder reopens the fence with the
/// original language tag.
pub fn split_message(text: &str, limit: usize) -> (String, String) {
    if text.len() <= limit {
        return (text.to_string(), String::new());
    }

    let (head, tail) = split_at_best(text, limit);

    if fence_count(&head) % 2 == 1 {
        // Ends inside a fence: re-split with headroom for the closing fence
        // so the chunk stays within the limit.
        let (mut head, tail) = if head.len() + FENCE_CLOSE_LEN > limit {
            split_at_best(text, limit.saturating_sub(FENCE_CLOSE_LEN).max(1))
        } else {
            (head, tail)
        };
        let tag = open_fence_tag(&head).unwrap_or_default();
        head.push_str("\n```");
        let reopened = format!("```{tag}\n{}", tail.trim_start_matches('\n'));
        return (head, reopened);
    }

    (head, tail)
}

/// Pick the split point and return trimmed (head, tail).
fn split_at_best(text: &str, limit: usize) -> (String, String) {
    let window_end = floor_char_boundary(text, limit);
    let window = &text[..window_end];

    let split = find_in_zone(window, "\n\n", PARAGRAPH_ZONE)
        .or_else(|| find_in_zone(window, "\n", NEWLINE_ZONE))
        .or_else(|| find_in_zone(window, " ", SPACE_ZONE));

    match split {
        Some((at, separator_len)) => {
            let head = text[..at].trim_end().to_string();
            let tail = text[at + separator_len..].trim_start_matches('\n').to_string();
            (head, tail)
        }
        None => {
            // Hard cut; always make progress even for tiny limits.
            let at = if window_end == 0 {
                text.chars().next().map_or(0, char::len_utf8)
            } else {
                window_end
            };
            (text[..at].to_string(), text[at..].to_string())
        }
    }
}

/// Rightmost occurrence of `pattern` within the last `zone` bytes of
/// `window`. Returns `(byte_index, pattern_len)`.
fn find_in_zone(window: &str, pattern: &str, zone: usize) -> Option<(usize, usize)> {
    let start = floor_char_boundary(window, window.len().saturating_sub(zone));
    window[start..]
        .rfind(pattern)
        .filter(|pos| start + pos > 0) // an empty head chunk helps nobody
        .map(|pos| (start + pos, pattern.len()))
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn fence_count(text: &str) -> usize {
    text.matches("```").count()
}

/// Language tag of the fence left open in `text`, if any.
fn open_fence_tag(text: &str) -> Option<String> {
    let open_at = text.rfind("```")?;
    let after = &text[open_at + 3..];
    let tag: String = after
        .chars()
        .take_while(|c| !c.is_whitespace())
        .collect();
    Some(tag)
}

#[cfg(test)]
#[path = "responder_tests.rs"]
mod tests;

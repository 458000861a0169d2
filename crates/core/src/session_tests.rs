// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fresh_session_is_not_expired() {
    let s = ChatSession::new(SessionId::new("s1"), 10_000);
    assert!(!s.is_expired(Duration::from_secs(60), 10_000));
    assert!(!s.is_expired(Duration::from_secs(60), 70_000));
}

#[test]
fn old_session_expires() {
    let s = ChatSession::new(SessionId::new("s1"), 10_000);
    assert!(s.is_expired(Duration::from_secs(60), 70_001));
}

#[test]
fn expiry_tolerates_clock_going_backwards() {
    let s = ChatSession::new(SessionId::new("s1"), 10_000);
    assert!(!s.is_expired(Duration::from_secs(60), 5_000));
}

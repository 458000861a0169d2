// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn validation_errors_exit_2() {
    let err = from_fleet(FleetError::AgentNotFound("ghost".into()));
    assert_eq!(err.code, 1);

    let err = from_fleet(FleetError::InvalidState {
        operation: "start",
        phase: "stopped".into(),
    });
    assert_eq!(err.code, 2);
}

#[test]
fn hints_render_under_the_message() {
    let err = from_fleet(FleetError::JobNotFound("job-x".into()));
    let text = err.to_string();
    assert!(text.contains("job-x"));
    assert!(text.contains("hint:"));
}

#[test]
fn constructors_pick_codes() {
    assert_eq!(ExitError::operational("x").code, 1);
    assert_eq!(ExitError::validation("x").code, 2);
}

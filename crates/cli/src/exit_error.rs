// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error wrapper carrying a process exit code.
//!
//! Exit codes: 0 success, 1 operational failure, 2 validation failure.

use drover_daemon::FleetError;
use std::fmt;

/// An error with a chosen exit code and an operator-facing hint.
#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
    pub hint: Option<&'static str>,
}

impl ExitError {
    pub fn operational(message: impl Into<String>) -> Self {
        Self {
            code: 1,
            message: message.into(),
            hint: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            code: 2,
            message: message.into(),
            hint: None,
        }
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(hint) = self.hint {
            write!(f, "\n  hint: {hint}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ExitError {}

/// Map a fleet error to an exit error with a short hint.
pub fn from_fleet(err: FleetError) -> ExitError {
    let hint = match &err {
        FleetError::Configuration(_) => Some("run `drover validate` for the full error list"),
        FleetError::AgentNotFound(_) => Some("check `drover status` for configured agents"),
        FleetError::JobNotFound(_) => Some("job ids look like job-YYYY-MM-DD-xxxxxxxx"),
        FleetError::Capacity { .. } => Some("raise max_concurrent or wait for the running job"),
        FleetError::ShutdownTimedOut { .. } => Some("re-run with --cancel-on-timeout"),
        _ => None,
    };
    ExitError {
        code: if err.is_validation() { 2 } else { 1 },
        message: err.to_string(),
        hint,
    }
}

#[cfg(test)]
#[path = "exit_error_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleet manager error taxonomy.

use drover_config::ConfigError;
use drover_core::RunnerErrorDetails;
use drover_storage::StorageError;
use thiserror::Error;

/// Why a cancel request could not do its normal work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    NotRunning,
    ProcessError,
    Timeout,
    Unknown,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotRunning => "not_running",
            Self::ProcessError => "process_error",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Why a fork request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkReason {
    NoSession,
    JobNotFound,
    AgentNotFound,
    Unknown,
}

impl std::fmt::Display for ForkReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoSession => "no_session",
            Self::JobNotFound => "job_not_found",
            Self::AgentNotFound => "agent_not_found",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Errors surfaced by the fleet manager API.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("operation `{operation}` is not valid while {phase}")]
    InvalidState {
        operation: &'static str,
        phase: String,
    },

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("schedule not found: {agent}/{schedule}")]
    ScheduleNotFound { agent: String, schedule: String },

    #[error("agent {agent} is at its concurrency limit ({limit})")]
    Capacity { agent: String, limit: u32 },

    #[error("cancel failed ({reason}): {message}")]
    Cancel { reason: CancelReason, message: String },

    #[error("fork failed ({reason}): {message}")]
    Fork { reason: ForkReason, message: String },

    #[error("job runner failed: {}", details.message)]
    Runner { details: RunnerErrorDetails },

    #[error("state store error: {0}")]
    Storage(#[from] StorageError),

    #[error("shutdown timed out with {still_running} jobs still running")]
    ShutdownTimedOut { still_running: u32 },
}

impl FleetError {
    /// Exit-code class: 2 for validation-style errors, 1 otherwise.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::InvalidState { .. })
    }
}

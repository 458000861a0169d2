// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! drover-core: shared types for the drover fleet supervisor

pub mod clock;
pub mod duration;
pub mod event;
pub mod fleet;
pub mod id;
pub mod job;
pub mod message;
pub mod schedule;
pub mod session;

pub use clock::{Clock, FakeClock, SystemClock};
pub use duration::{format_duration, parse_duration, DurationError};
pub use event::{
    ChangeCategory, ChangeKind, ConfigChange, EventSink, FleetEvent, NullSink, SessionLifecycle,
    SkipReason,
};
pub use fleet::{AgentRuntimeState, AgentStatus, FleetState};
pub use id::{is_safe_identifier, AgentName, ChannelId, JobId, SessionId};
pub use job::{
    ExitReason, JobMetadata, JobStatus, RunnerErrorDetails, RunnerErrorKind, TerminationType,
    TriggerType,
};
pub use message::{ContentBlock, DriverMessage, MalformedMessage, ResultSummary};
pub use schedule::{ScheduleState, ScheduleStatus, ScheduleType};
pub use session::ChatSession;

#[cfg(feature = "test-support")]
pub use event::CollectingSink;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! drover-bridge: chat platform routing.
//!
//! Bridges deliver inbound messages with a reply callback and a processing
//! indicator; routers resolve the target agent, resume the channel's
//! session, stream assistant output back through a rate-limited,
//! size-limited responder, and keep the session store current.

pub mod channel_router;
pub mod responder;
pub mod router;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use channel_router::SharedChannelRouter;
pub use responder::{split_message, StreamingResponder};
pub use router::{AgentRouter, RouterContext, RouterHandle};
pub use types::{
    BridgeError, ChatBridge, ChatTarget, ChatTriggerOutcome, ChatTriggerRequest, InboundMessage,
    MessageMeta, ProcessingIndicator, Replier,
};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeBridge, FakeIndicator, FakeReplier};

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capturing fakes for the bridge contracts.

use crate::types::{
    BridgeError, ChatBridge, InboundMessage, MessageMeta, ProcessingIndicator, Replier,
};
use async_trait::async_trait;
use drover_core::{AgentName, ChannelId};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Replier that records every reply.
#[derive(Default)]
pub struct FakeReplier {
    sent: Mutex<Vec<String>>,
    /// When set, every reply fails with this message.
    fail_with: Mutex<Option<String>>,
}

impl FakeReplier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(message: &str) -> Arc<Self> {
        let replier = Self::default();
        *replier.fail_with.lock() = Some(message.to_string());
        Arc::new(replier)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Replier for FakeReplier {
    async fn reply(&self, text: &str) -> Result<(), BridgeError> {
        if let Some(message) = self.fail_with.lock().clone() {
            return Err(BridgeError::Send(message));
        }
        self.sent.lock().push(text.to_string());
        Ok(())
    }
}

/// Indicator that counts starts and stops.
#[derive(Default)]
pub struct FakeIndicator {
    starts: Mutex<u32>,
    stops: Mutex<u32>,
}

impl FakeIndicator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn starts(&self) -> u32 {
        *self.starts.lock()
    }

    pub fn stops(&self) -> u32 {
        *self.stops.lock()
    }
}

#[async_trait]
impl ProcessingIndicator for FakeIndicator {
    async fn start(&self) {
        *self.starts.lock() += 1;
    }

    async fn stop(&self) {
        *self.stops.lock() += 1;
    }
}

/// Bridge that hands messages to the router on demand.
pub struct FakeBridge {
    kind: String,
    reply_limit: usize,
    inbox: Mutex<Option<mpsc::Sender<InboundMessage>>>,
    connected: Mutex<bool>,
}

impl FakeBridge {
    pub fn new(kind: &str, reply_limit: usize) -> Arc<Self> {
        Arc::new(Self {
            kind: kind.to_string(),
            reply_limit,
            inbox: Mutex::new(None),
            connected: Mutex::new(false),
        })
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    /// Deliver one message as the platform would.
    pub async fn deliver(&self, message: InboundMessage) {
        let inbox = self.inbox.lock().clone();
        if let Some(inbox) = inbox {
            let _ = inbox.send(message).await;
        }
    }

    /// Convenience: build a plain inbound message.
    pub fn message(
        agent: Option<&str>,
        prompt: &str,
        channel: &str,
        was_mentioned: bool,
        replier: Arc<dyn Replier>,
        indicator: Arc<dyn ProcessingIndicator>,
    ) -> InboundMessage {
        InboundMessage {
            agent: agent.map(AgentName::new),
            prompt: prompt.to_string(),
            meta: MessageMeta {
                channel_id: ChannelId::new(channel),
                message_id: "m1".to_string(),
                user_id: "u1".to_string(),
                was_mentioned,
            },
            replier,
            indicator,
            tool_servers: Default::default(),
        }
    }
}

#[async_trait]
impl ChatBridge for FakeBridge {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn reply_limit(&self) -> usize {
        self.reply_limit
    }

    async fn connect(&self, inbox: mpsc::Sender<InboundMessage>) -> Result<(), BridgeError> {
        *self.inbox.lock() = Some(inbox);
        *self.connected.lock() = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BridgeError> {
        *self.inbox.lock() = None;
        *self.connected.lock() = false;
        Ok(())
    }
}

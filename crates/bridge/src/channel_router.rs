// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared-connector router (shape B).
//!
//! One bridge connector serves many agents. Routing is channel-based: each
//! agent claims channels in its chat binding; a later claim on the same
//! channel wins and the loser is logged. `mention` channels act only on
//! explicit addressing, `auto` channels on every message.

use crate::router::{handle_message, RouterContext, RouterHandle};
use crate::types::{BridgeError, ChatBridge, InboundMessage};
use drover_config::{ChannelMode, ChatBindingDef};
use drover_core::{AgentName, ChannelId, Clock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One channel claim after conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRoute {
    pub agent: AgentName,
    pub mode: ChannelMode,
}

/// Build the channel → agent routing table. Later declarations win.
pub fn build_routes(
    bindings: &[(AgentName, ChatBindingDef)],
) -> HashMap<ChannelId, ChannelRoute> {
    let mut routes: HashMap<ChannelId, ChannelRoute> = HashMap::new();
    for (agent, binding) in bindings {
        for channel in &binding.channels {
            let channel = ChannelId::new(channel.clone());
            let route = ChannelRoute {
                agent: agent.clone(),
                mode: binding.mode,
            };
            if let Some(previous) = routes.insert(channel.clone(), route) {
                if previous.agent != *agent {
                    warn!(
                        channel = %channel,
                        loser = %previous.agent,
                        winner = %agent,
                        "conflicting channel claim, later declaration wins"
                    );
                }
            }
        }
    }
    routes
}

/// Shape B: a single bridge connector with channel routing.
pub struct SharedChannelRouter<C: Clock> {
    bridge: Arc<dyn ChatBridge>,
    routes: HashMap<ChannelId, ChannelRoute>,
    context: Arc<RouterContext<C>>,
}

impl<C: Clock> SharedChannelRouter<C> {
    pub fn new(
        bridge: Arc<dyn ChatBridge>,
        bindings: &[(AgentName, ChatBindingDef)],
        context: Arc<RouterContext<C>>,
    ) -> Self {
        Self {
            bridge,
            routes: build_routes(bindings),
            context,
        }
    }

    /// Resolve the agent for a message, honoring the channel mode.
    fn resolve(&self, message: &InboundMessage) -> Option<AgentName> {
        let route = self.routes.get(&message.meta.channel_id)?;
        match route.mode {
            ChannelMode::Auto => Some(route.agent.clone()),
            ChannelMode::Mention if message.meta.was_mentioned => Some(route.agent.clone()),
            ChannelMode::Mention => None,
        }
    }

    /// Connect the bridge and process messages sequentially until stopped.
    pub async fn start(self) -> Result<RouterHandle, BridgeError> {
        let (inbox_tx, mut inbox_rx) = mpsc::channel::<InboundMessage>(32);
        self.bridge.connect(inbox_tx).await?;

        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let bridge_kind = self.bridge.kind().to_string();
        let reply_limit = self.bridge.reply_limit();
        let bridge = Arc::clone(&self.bridge);
        let router = self;

        let task = tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    () = loop_cancel.cancelled() => break,
                    message = inbox_rx.recv() => match message {
                        Some(message) => message,
                        None => break,
                    },
                };

                let Some(agent) = router.resolve(&message) else {
                    debug!(
                        channel = %message.meta.channel_id,
                        "no route for channel (or not addressed), dropping message"
                    );
                    continue;
                };
                handle_message(&router.context, &bridge_kind, reply_limit, &agent, message)
                    .await;
            }
            debug!("shared channel router stopped");
        });

        Ok(RouterHandle::new(bridge, cancel, task))
    }
}

#[cfg(test)]
#[path = "channel_router_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat message pipeline and the per-agent router (shape A).
//!
//! Pipeline per inbound message: resolve the agent, read the channel's
//! session, start the processing indicator, trigger the job with resume and
//! any channel-scoped tool servers, stream assistant turns back through a
//! [`StreamingResponder`], then update the session only on success. The
//! indicator is stopped exactly once, in the final step, no matter how the
//! message ended.

use crate::responder::StreamingResponder;
use crate::types::{ChatBridge, ChatTarget, ChatTriggerRequest, InboundMessage};
use drover_core::{
    AgentName, ChatSession, Clock, EventSink, FleetEvent, SessionLifecycle,
};
use drover_storage::StateStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Channel command that clears the stored session.
const RESET_COMMAND: &str = "!reset";

/// Shared dependencies for routers.
pub struct RouterContext<C: Clock> {
    pub target: Arc<dyn ChatTarget>,
    pub store: Arc<StateStore>,
    pub sink: Arc<dyn EventSink>,
    pub session_max_age: Duration,
    pub reply_min_interval: Duration,
    pub clock: C,
}

/// Running router task plus its bridge, for orderly disconnect.
pub struct RouterHandle {
    bridge: Arc<dyn ChatBridge>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl RouterHandle {
    pub(crate) fn new(
        bridge: Arc<dyn ChatBridge>,
        cancel: CancellationToken,
        task: tokio::task::JoinHandle<()>,
    ) -> Self {
        Self {
            bridge,
            cancel,
            task,
        }
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.bridge.disconnect().await {
            warn!(error = %e, "bridge disconnect failed");
        }
        let _ = self.task.await;
    }
}

/// Shape A: one bridge connector bound to exactly one agent.
pub struct AgentRouter<C: Clock> {
    agent: AgentName,
    bridge: Arc<dyn ChatBridge>,
    context: Arc<RouterContext<C>>,
}

impl<C: Clock> AgentRouter<C> {
    pub fn new(agent: AgentName, bridge: Arc<dyn ChatBridge>, context: Arc<RouterContext<C>>) -> Self {
        Self {
            agent,
            bridge,
            context,
        }
    }

    /// Connect the bridge and process messages sequentially until stopped.
    pub async fn start(self) -> Result<RouterHandle, crate::types::BridgeError> {
        let (inbox_tx, mut inbox_rx) = mpsc::channel::<InboundMessage>(32);
        self.bridge.connect(inbox_tx).await?;

        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let bridge_kind = self.bridge.kind().to_string();
        let reply_limit = self.bridge.reply_limit();
        let agent = self.agent.clone();
        let context = Arc::clone(&self.context);

        let task = tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    () = loop_cancel.cancelled() => break,
                    message = inbox_rx.recv() => match message {
                        Some(message) => message,
                        None => break,
                    },
                };
                handle_message(&context, &bridge_kind, reply_limit, &agent, message).await;
            }
            debug!(agent = %agent, "agent router stopped");
        });

        Ok(RouterHandle {
            bridge: self.bridge,
            cancel,
            task,
        })
    }
}

/// The shared pipeline, used by both router shapes.
pub(crate) async fn handle_message<C: Clock>(
    context: &RouterContext<C>,
    bridge_kind: &str,
    reply_limit: usize,
    agent: &AgentName,
    message: InboundMessage,
) {
    let channel = message.meta.channel_id.clone();
    let now_ms = context.clock.epoch_ms();

    if message.prompt.trim() == RESET_COMMAND {
        let cleared = context
            .store
            .clear_chat_session(agent.as_str(), &channel)
            .unwrap_or(false);
        let text = if cleared {
            "Session reset. The next message starts a fresh conversation."
        } else {
            "No session to reset."
        };
        if let Err(e) = message.replier.reply(text).await {
            warn!(error = %e, "reset reply failed");
        }
        if cleared {
            context.sink.emit(FleetEvent::BridgeSessionLifecycle {
                bridge: bridge_kind.to_string(),
                agent: agent.clone(),
                channel,
                event: SessionLifecycle::Cleared,
            });
        }
        return;
    }

    // Opportunistic expiry sweep before reading the session.
    if let Err(e) =
        context
            .store
            .cleanup_expired_sessions(agent.as_str(), context.session_max_age, now_ms)
    {
        warn!(agent = %agent, error = %e, "session cleanup failed");
    }
    let prior = context
        .store
        .chat_session(agent.as_str(), &channel)
        .unwrap_or_default();

    message.indicator.start().await;

    // Collect complete assistant turns into the responder, serialized per
    // message by this single consumer task.
    let (message_tx, mut message_rx) = mpsc::unbounded_channel();
    let mut responder = StreamingResponder::new(
        Arc::clone(&message.replier),
        reply_limit,
        context.reply_min_interval,
    );
    let responder_task = tokio::spawn(async move {
        while let Some(msg) = message_rx.recv().await {
            if let Some(text) = drover_core::DriverMessage::assistant_text(&msg) {
                responder.add_and_send(&text).await;
            }
        }
        responder.flush().await;
        responder
    });

    let outcome = context
        .target
        .trigger_chat(
            agent,
            ChatTriggerRequest {
                prompt: message.prompt.clone(),
                resume: prior.as_ref().map(|s| s.session_id.clone()),
                extra_mcp_servers: message.tool_servers.clone(),
                message_tx,
            },
        )
        .await;

    let responder = match responder_task.await {
        Ok(responder) => Some(responder),
        Err(e) => {
            warn!(error = %e, "responder task failed");
            None
        }
    };

    match &outcome {
        Ok(result) if result.success => {
            if let Some(session_id) = &result.session_id {
                let lifecycle = if prior.is_some() {
                    SessionLifecycle::Resumed
                } else {
                    SessionLifecycle::Created
                };
                let stored = context.store.set_chat_session(
                    agent.as_str(),
                    &channel,
                    ChatSession::new(session_id.clone(), context.clock.epoch_ms()),
                );
                match stored {
                    Ok(()) => context.sink.emit(FleetEvent::BridgeSessionLifecycle {
                        bridge: bridge_kind.to_string(),
                        agent: agent.clone(),
                        channel: channel.clone(),
                        event: lifecycle,
                    }),
                    Err(e) => warn!(error = %e, "failed to store chat session"),
                }
            }

            if responder.as_ref().is_some_and(|r| !r.has_sent_messages()) {
                let fallback = context
                    .store
                    .read_job_output(&result.job_id, true)
                    .map(|records| drover_core::message::extract_final_output(&records))
                    .unwrap_or_default();
                let text = if fallback.trim().is_empty() {
                    "Done.".to_string()
                } else {
                    fallback
                };
                if let Err(e) = message.replier.reply(&text).await {
                    warn!(error = %e, "fallback reply failed");
                }
            }

            info!(agent = %agent, channel = %channel, "chat message handled");
            context.sink.emit(FleetEvent::BridgeMessageHandled {
                bridge: bridge_kind.to_string(),
                agent: agent.clone(),
                channel,
            });
        }
        Ok(result) => {
            let reason = result
                .error
                .clone()
                .unwrap_or_else(|| "job failed".to_string());
            reply_error(&message, &reason).await;
            context.sink.emit(FleetEvent::BridgeMessageError {
                bridge: bridge_kind.to_string(),
                agent: Some(agent.clone()),
                channel: Some(channel),
                message: reason,
            });
        }
        Err(reason) => {
            reply_error(&message, reason).await;
            context.sink.emit(FleetEvent::BridgeMessageError {
                bridge: bridge_kind.to_string(),
                agent: Some(agent.clone()),
                channel: Some(channel),
                message: reason.clone(),
            });
        }
    }

    // Final step, exactly once per inbound message.
    message.indicator.stop().await;
}

async fn reply_error(message: &InboundMessage, reason: &str) {
    let text = format!("⚠️ {reason} — send {RESET_COMMAND} to start a fresh session.");
    if let Err(e) = message.replier.reply(&text).await {
        warn!(error = %e, "error reply failed");
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;

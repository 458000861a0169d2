// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed publish/subscribe for fleet events.
//!
//! Each subscriber gets its own unbounded channel; `emit` fans out in
//! registration order. A slow or dead subscriber can neither block the
//! emitter nor hide the event from the others — closed channels are pruned
//! on the next emit.

use drover_core::{EventSink, FleetEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// The fleet event bus. Cloning shares the subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<FleetEvent>>>>,
}

/// One subscriber's view of the bus.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<FleetEvent>,
}

impl EventStream {
    /// Next event; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<FleetEvent> {
        self.rx.recv().await
    }

    /// Non-blocking drain, for tests and polling callers.
    pub fn try_recv(&mut self) -> Option<FleetEvent> {
        self.rx.try_recv().ok()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Events emitted after this call are delivered
    /// in emit order.
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        EventStream { rx }
    }

    /// Deliver an event to every live subscriber, in registration order.
    pub fn emit(&self, event: FleetEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: FleetEvent) {
        EventBus::emit(self, event);
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted query driver for tests.
//!
//! Plays a fixed script of records per query, with optional gate steps that
//! block until [`FakeDriver::release`] is called. Every call's prompt and
//! options are recorded for assertions.

use crate::driver::{DriverError, MessageStream, QueryDriver, QueryOptions};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// One step in a driver script.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Emit this record.
    Record(Value),
    /// Fail the stream with this message.
    Fail(String),
    /// Block until a permit is released (or the consumer goes away).
    WaitGate,
}

/// A recorded `query` invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub options: QueryOptions,
}

/// Scripted driver. Clones share the script, the gate and the call log.
#[derive(Clone)]
pub struct FakeDriver {
    script: Arc<Mutex<Vec<ScriptStep>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    gate: Arc<Semaphore>,
    /// When set, `query` itself fails before producing a stream.
    init_error: Arc<Mutex<Option<String>>>,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self {
            script: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            gate: Arc::new(Semaphore::new(0)),
            init_error: Arc::new(Mutex::new(None)),
        }
    }
}

impl FakeDriver {
    /// Driver that plays the given steps on every query.
    pub fn with_script(steps: Vec<ScriptStep>) -> Self {
        Self {
            script: Arc::new(Mutex::new(steps)),
            ..Default::default()
        }
    }

    /// Driver that reports init, says `text`, and succeeds.
    pub fn completing(session_id: &str, text: &str) -> Self {
        Self::with_script(vec![
            ScriptStep::Record(records::init(session_id)),
            ScriptStep::Record(records::assistant_text(text)),
            ScriptStep::Record(records::result_success(text)),
        ])
    }

    /// Driver whose `query` call fails outright.
    pub fn failing_init(message: &str) -> Self {
        let driver = Self::default();
        *driver.init_error.lock() = Some(message.to_string());
        driver
    }

    /// Replace the script for subsequent queries.
    pub fn set_script(&self, steps: Vec<ScriptStep>) {
        *self.script.lock() = steps;
    }

    /// Release one gated step.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl QueryDriver for FakeDriver {
    async fn query(
        &self,
        prompt: &str,
        options: QueryOptions,
    ) -> Result<MessageStream, DriverError> {
        self.calls.lock().push(RecordedCall {
            prompt: prompt.to_string(),
            options,
        });

        if let Some(message) = self.init_error.lock().clone() {
            return Err(DriverError::Init(message));
        }

        let steps = self.script.lock().clone();
        let gate = Arc::clone(&self.gate);
        let (tx, stream) = MessageStream::channel(16);

        tokio::spawn(async move {
            for step in steps {
                match step {
                    ScriptStep::Record(value) => {
                        if tx.send(Ok(value)).await.is_err() {
                            return;
                        }
                    }
                    ScriptStep::Fail(message) => {
                        let _ = tx.send(Err(DriverError::Stream(message))).await;
                        return;
                    }
                    ScriptStep::WaitGate => {
                        tokio::select! {
                            permit = gate.acquire() => {
                                if let Ok(permit) = permit {
                                    permit.forget();
                                }
                            }
                            () = tx.closed() => return,
                        }
                    }
                }
            }
        });

        Ok(stream)
    }
}

/// Canned driver records for scripts and assertions.
pub mod records {
    use super::*;

    pub fn init(session_id: &str) -> Value {
        json!({"type": "system", "subtype": "init", "session_id": session_id})
    }

    pub fn status(status: &str) -> Value {
        json!({"type": "system", "subtype": "status", "status": status})
    }

    pub fn assistant_text(text: &str) -> Value {
        json!({"type": "assistant", "message": {"content": [{"type": "text", "text": text}]}})
    }

    pub fn tool_use(id: &str, name: &str) -> Value {
        json!({"type": "assistant", "message": {"content": [
            {"type": "tool_use", "id": id, "name": name, "input": {}}
        ]}})
    }

    pub fn tool_result(tool_use_id: &str, content: &str) -> Value {
        json!({"type": "user", "message": {"content": [
            {"type": "tool_result", "tool_use_id": tool_use_id, "content": content}
        ]}})
    }

    pub fn result_success(text: &str) -> Value {
        json!({
            "type": "result",
            "duration_ms": 1200,
            "num_turns": 1,
            "is_error": false,
            "result": text
        })
    }

    pub fn result_error(message: &str) -> Value {
        json!({
            "type": "result",
            "duration_ms": 1200,
            "num_turns": 1,
            "is_error": true,
            "result": message
        })
    }

    /// A record with no `type` field — malformed by contract.
    pub fn missing_type() -> Value {
        json!({"data": "no type here"})
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;

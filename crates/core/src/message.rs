// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed view over the query driver's message records.
//!
//! The driver speaks JSON records. The raw [`serde_json::Value`] is what gets
//! appended to the job output log (so unknown record types survive verbatim);
//! [`DriverMessage::from_value`] produces the typed view the runner and the
//! chat routers act on. A record without a `type` field is malformed; a
//! record with an unrecognized `type` is stored and otherwise ignored.

use crate::id::SessionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A driver record that could not be interpreted.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed driver record: {reason}")]
pub struct MalformedMessage {
    pub reason: String,
}

impl MalformedMessage {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// One block of assistant content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    /// Anything else inside a content array is carried along untouched.
    #[serde(untagged)]
    Other(Value),
}

/// Payload of the driver's final `result` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResultSummary {
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Typed view of a driver record.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverMessage {
    /// `system` / `init` — carries the session id for resume.
    Init { session_id: SessionId },
    /// `system` / `status` — e.g. `compacting`.
    Status { status: String },
    /// Assistant turn with content blocks.
    Assistant { content: Vec<ContentBlock> },
    /// User-side record (tool results travel here).
    User { content: Vec<ContentBlock> },
    /// Low-level stream event, passed through.
    StreamEvent(Value),
    /// Tool progress notification, passed through.
    ToolProgress(Value),
    /// Authentication status notification, passed through.
    AuthStatus(Value),
    /// Final record of the stream.
    Result(ResultSummary),
    /// Driver-reported error.
    Error { message: String },
    /// Unknown record type, stored verbatim and ignored semantically.
    Other(Value),
}

impl DriverMessage {
    /// Interpret a raw driver record.
    pub fn from_value(value: &Value) -> Result<Self, MalformedMessage> {
        let obj = value
            .as_object()
            .ok_or_else(|| MalformedMessage::new("record is not an object"))?;
        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| MalformedMessage::new("missing `type` field"))?;

        match kind {
            "system" => match obj.get("subtype").and_then(Value::as_str) {
                Some("init") => {
                    let session_id = obj
                        .get("session_id")
                        .and_then(Value::as_str)
                        .ok_or_else(|| MalformedMessage::new("init without session_id"))?;
                    Ok(Self::Init {
                        session_id: SessionId::new(session_id),
                    })
                }
                Some("status") => Ok(Self::Status {
                    status: obj
                        .get("status")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                }),
                _ => Ok(Self::Other(value.clone())),
            },
            "assistant" => Ok(Self::Assistant {
                content: parse_content(obj.get("message").unwrap_or(value))?,
            }),
            "user" => Ok(Self::User {
                content: parse_content(obj.get("message").unwrap_or(value))?,
            }),
            "stream_event" => Ok(Self::StreamEvent(value.clone())),
            "tool_progress" => Ok(Self::ToolProgress(value.clone())),
            "auth_status" => Ok(Self::AuthStatus(value.clone())),
            "result" => {
                let summary = serde_json::from_value(value.clone())
                    .map_err(|e| MalformedMessage::new(format!("bad result record: {e}")))?;
                Ok(Self::Result(summary))
            }
            "error" => Ok(Self::Error {
                message: obj
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown driver error")
                    .to_string(),
            }),
            _ => Ok(Self::Other(value.clone())),
        }
    }

    /// Session id carried by this record, if any.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::Init { session_id } => Some(session_id),
            _ => None,
        }
    }

    /// Concatenated text of all text blocks in an assistant record.
    pub fn assistant_text(&self) -> Option<String> {
        let Self::Assistant { content } = self else {
            return None;
        };
        let mut out = String::new();
        for block in content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    pub fn is_result(&self) -> bool {
        matches!(self, Self::Result(_))
    }
}

/// Pull the content-block array out of an assistant/user record.
///
/// Accepts both the nested `{message: {content: [...]}}` wire shape and a
/// flat `{content: [...]}` shape.
fn parse_content(container: &Value) -> Result<Vec<ContentBlock>, MalformedMessage> {
    let content = match container.get("content") {
        Some(Value::Array(items)) => items,
        Some(Value::String(text)) => {
            return Ok(vec![ContentBlock::Text { text: text.clone() }]);
        }
        _ => return Ok(Vec::new()),
    };
    content
        .iter()
        .map(|item| {
            serde_json::from_value(item.clone())
                .map_err(|e| MalformedMessage::new(format!("bad content block: {e}")))
        })
        .collect()
}

/// Extract a job's "final output" from its raw output records.
///
/// The last assistant text wins; a job that produced no assistant text falls
/// back to the last tool result's content serialized as JSON, else the empty
/// string. Records that fail to parse are skipped.
pub fn extract_final_output(records: &[Value]) -> String {
    let mut last_text: Option<String> = None;
    let mut last_tool_result: Option<Value> = None;

    for record in records {
        let Ok(msg) = DriverMessage::from_value(record) else {
            continue;
        };
        if let Some(text) = msg.assistant_text() {
            last_text = Some(text);
        }
        if let DriverMessage::User { content } = &msg {
            for block in content {
                if let ContentBlock::ToolResult { content, .. } = block {
                    last_tool_result = Some(content.clone());
                }
            }
        }
    }

    if let Some(text) = last_text {
        return text;
    }
    match last_tool_result {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

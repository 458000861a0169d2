// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration error taxonomy.

use std::path::PathBuf;
use thiserror::Error;

/// One schema-validation failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationEntry {
    /// Dotted path into the document, e.g. `agents.writer.schedules.tick`.
    pub path: String,
    pub message: String,
    /// Offending value, when it helps the operator.
    pub value: Option<String>,
}

impl std::fmt::Display for ValidationEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}: {} (got {v})", self.path, self.message),
            None => write!(f, "{}: {}", self.path, self.message),
        }
    }
}

/// Errors that can occur while loading a fleet configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no fleet file found (searched upward from {searched_from})")]
    NotFound { searched_from: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration:\n{}", format_entries(entries))]
    Validation { entries: Vec<ValidationEntry> },

    #[error("duplicate agent name: {name}")]
    DuplicateAgent { name: String },

    #[error("undefined environment variable ${{{name}}} referenced in {path}")]
    UndefinedVar { name: String, path: PathBuf },
}

impl ConfigError {
    /// Single-entry validation error helper.
    pub fn invalid(path: impl Into<String>, message: impl Into<String>, value: Option<String>) -> Self {
        Self::Validation {
            entries: vec![ValidationEntry {
                path: path.into(),
                message: message.into(),
                value,
            }],
        }
    }
}

fn format_entries(entries: &[ValidationEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage error taxonomy.
//!
//! Nothing here is retried internally; callers decide what a failure means.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the state store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("path escapes its base directory: {path}")]
    PathEscape { path: PathBuf },

    #[error("state directory error at {path}: {source}")]
    StateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("atomic write to {path} failed: {source}")]
    AtomicWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt state file {path}: {source}")]
    CorruptState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job {0} is terminal; its metadata is immutable")]
    TerminalJobImmutable(String),

    #[error("malformed record at {path}:{line}")]
    MalformedRecord { path: PathBuf, line: usize },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

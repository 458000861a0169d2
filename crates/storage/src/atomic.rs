// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic JSON file persistence.
//!
//! Writes go through write-to-temp-then-rename with a sync before the
//! rename, so a crash mid-write never leaves a torn file behind. Reads fail
//! closed: a file that exists but does not parse is a `CorruptState` error,
//! never treated as absent — job metadata must not silently vanish because
//! its file got damaged. The only tolerated damage in this store is the
//! partial trailing line on append-only output logs.

use crate::error::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::Path;

/// Serialize `value` to `path` atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let atomic_err = |source: std::io::Error| StorageError::AtomicWrite {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(atomic_err)?;
    }

    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path).map_err(atomic_err)?;
        file.write_all(&bytes).map_err(atomic_err)?;
        file.sync_all().map_err(atomic_err)?;
    }
    fs::rename(&tmp_path, path).map_err(atomic_err)
}

/// Load a JSON file, returning `Ok(None)` when it does not exist.
///
/// An unparseable file is left in place for inspection and surfaced as
/// [`StorageError::CorruptState`]; the caller decides what a damaged file
/// means for its records.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(StorageError::io(path, source)),
    };

    let value =
        serde_json::from_slice(&bytes).map_err(|source| StorageError::CorruptState {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(Some(value))
}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod tests;

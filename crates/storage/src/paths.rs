// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path-safe file name construction.
//!
//! Identifiers are checked against the safe grammar *before* any filesystem
//! call, then the joined result is re-verified to sit strictly inside the
//! resolved base. The grammar alone rules out traversal; the containment
//! check stays as a second, independent gate.

use crate::error::StorageError;
use drover_core::is_safe_identifier;
use std::path::{Path, PathBuf};

/// Build `base/<identifier><extension>`, rejecting anything that could
/// resolve outside `base`.
///
/// Invalid identifiers fail without touching the filesystem.
pub fn build_safe_file_path(
    base: &Path,
    identifier: &str,
    extension: &str,
) -> Result<PathBuf, StorageError> {
    if !is_safe_identifier(identifier) {
        return Err(StorageError::InvalidIdentifier(identifier.to_string()));
    }

    let resolved_base = base.canonicalize().map_err(|source| StorageError::StateDir {
        path: base.to_path_buf(),
        source,
    })?;

    let candidate = resolved_base.join(format!("{identifier}{extension}"));
    let contained = candidate
        .parent()
        .is_some_and(|parent| parent == resolved_base)
        && candidate != resolved_base;
    if !contained {
        return Err(StorageError::PathEscape { path: candidate });
    }
    Ok(candidate)
}

/// Idempotently create a directory, mapping failures to `StateDir`.
pub(crate) fn ensure_dir(path: &Path) -> Result<(), StorageError> {
    std::fs::create_dir_all(path).map_err(|source| StorageError::StateDir {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;

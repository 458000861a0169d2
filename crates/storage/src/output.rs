// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only job output logs.
//!
//! One JSONL file per job with a single writer (the job runner) and any
//! number of readers. The writer flushes and syncs on every record so a
//! reader never observes a torn record *followed by* more data; at worst the
//! file ends in one partial line, which every reader here skips.

use crate::error::StorageError;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Append handle for one job's output log.
///
/// Held for the life of the job run; every append is flushed and synced
/// before returning so the record is durable at the event boundary.
#[derive(Debug)]
pub struct JobOutputWriter {
    file: File,
    path: PathBuf,
    records_written: u64,
}

impl JobOutputWriter {
    pub(crate) fn open(path: PathBuf) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StorageError::io(&path, source))?;
        Ok(Self {
            file,
            path,
            records_written: 0,
        })
    }

    /// Append one record as a single JSON line.
    pub fn append(&mut self, record: &Value) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .and_then(|()| self.file.flush())
            .and_then(|()| self.file.sync_data())
            .map_err(|source| StorageError::io(&self.path, source))?;
        self.records_written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse complete records starting at `offset`.
///
/// Returns the parsed values and the new offset, which only ever advances
/// past complete (newline-terminated) lines — a partially written trailing
/// line is left for the next call. Malformed complete lines are skipped with
/// a warning.
pub fn parse_records_from(path: &Path, offset: u64) -> Result<(Vec<Value>, u64), StorageError> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), offset)),
        Err(source) => return Err(StorageError::io(path, source)),
    };

    let len = file
        .metadata()
        .map_err(|source| StorageError::io(path, source))?
        .len();
    if len <= offset {
        return Ok((Vec::new(), offset));
    }

    file.seek(SeekFrom::Start(offset))
        .map_err(|source| StorageError::io(path, source))?;
    let mut buf = Vec::with_capacity((len - offset) as usize);
    file.read_to_end(&mut buf)
        .map_err(|source| StorageError::io(path, source))?;

    let mut records = Vec::new();
    let mut consumed = 0usize;
    for line in buf.split_inclusive(|b| *b == b'\n') {
        if line.last() != Some(&b'\n') {
            // Partial trailing line: leave it for the next pass.
            break;
        }
        consumed += line.len();
        let text = line.strip_suffix(b"\n").unwrap_or(line);
        if text.is_empty() {
            continue;
        }
        match serde_json::from_slice::<Value>(text) {
            Ok(value) => records.push(value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping malformed output line");
            }
        }
    }

    Ok((records, offset + consumed as u64))
}

/// Read a whole output log, skipping malformed and partial lines.
///
/// With `skip_invalid_lines` false, an interior malformed line is an error;
/// a partial trailing line is tolerated either way.
pub fn read_all(path: &Path, skip_invalid_lines: bool) -> Result<Vec<Value>, StorageError> {
    if skip_invalid_lines {
        let (records, _) = parse_records_from(path, 0)?;
        return Ok(records);
    }

    let content = match std::fs::read(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(StorageError::io(path, source)),
    };

    let mut records = Vec::new();
    for (index, line) in content.split_inclusive(|b| *b == b'\n').enumerate() {
        if line.last() != Some(&b'\n') {
            break;
        }
        let text = line.strip_suffix(b"\n").unwrap_or(line);
        if text.is_empty() {
            continue;
        }
        let value = serde_json::from_slice::<Value>(text).map_err(|_| {
            StorageError::MalformedRecord {
                path: path.to_path_buf(),
                line: index + 1,
            }
        })?;
        records.push(value);
    }
    Ok(records)
}

/// Live tail of an output log.
///
/// New complete records arrive on `rx` as they land. The background task
/// exits when the receiver is dropped.
pub struct OutputWatch {
    pub rx: mpsc::Receiver<Value>,
}

/// How often the watch re-checks the file when notifications are quiet.
const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Start tailing `path` from `offset`.
///
/// Uses filesystem notifications when available and falls back to polling;
/// either way records are produced by re-parsing from the last complete
/// offset, so notification loss only adds latency, never corruption.
pub fn watch(path: PathBuf, offset: u64) -> OutputWatch {
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(8);
        let _watcher_guard = match create_file_watcher(&path, notify_tx) {
            Ok(w) => Some(w),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "file watcher unavailable, polling only");
                None
            }
        };

        let mut offset = offset;
        loop {
            let woke_by_event = tokio::select! {
                maybe = notify_rx.recv() => maybe.is_some(),
                _ = tokio::time::sleep(WATCH_POLL_INTERVAL) => false,
            };

            let (records, new_offset) = match parse_records_from(&path, offset) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "output watch read failed");
                    continue;
                }
            };
            offset = new_offset;

            for record in records {
                if tx.send(record).await.is_err() {
                    return; // receiver dropped, watch is over
                }
            }

            // Closed notification channel with no events means the watcher
            // died; polling continues regardless.
            let _ = woke_by_event;
            if tx.is_closed() {
                return;
            }
        }
    });

    OutputWatch { rx }
}

fn create_file_watcher(
    path: &Path,
    tx: mpsc::Sender<()>,
) -> Result<RecommendedWatcher, notify::Error> {
    let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
        if res.is_ok() {
            let _ = tx.try_send(());
        }
    })?;
    // Watch the parent so the log appearing after the watch starts is seen.
    let target = path.parent().unwrap_or(path);
    watcher.watch(target, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;

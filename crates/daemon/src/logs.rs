// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log streaming over jobs and fleet events.
//!
//! Streams are lazy and restartable: a fresh call replays whatever history
//! is asked for, then follows the live bus. The per-job stream additionally
//! tails the output file (robust to partial trailing lines) and ends when
//! the job reaches a terminal state.

use crate::error::FleetError;
use crate::manager::FleetManager;
use drover_core::{AgentName, Clock, DriverMessage, FleetEvent, JobId};
use drover_storage::JobFilter;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One streamed log entry.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp_ms: u64,
    pub level: LogLevel,
    /// Producing subsystem (`job`, `schedule`, `fleet`, bridge kind).
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Options for [`FleetManager::stream_logs`].
#[derive(Debug, Clone, Default)]
pub struct LogStreamOptions {
    pub agent: Option<AgentName>,
    pub job: Option<JobId>,
    pub min_level: Option<LogLevel>,
    /// Replay stored job output before following.
    pub include_history: bool,
    /// Cap on replayed jobs (most recent wins).
    pub history_limit: Option<usize>,
    /// Keep following the live bus after history.
    pub follow: bool,
}

impl LogStreamOptions {
    fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(agent) = &self.agent {
            if entry.agent.as_ref() != Some(agent) {
                return false;
            }
        }
        if let Some(job) = &self.job {
            if entry.job.as_ref() != Some(job) {
                return false;
            }
        }
        if let Some(min) = self.min_level {
            if entry.level < min {
                return false;
            }
        }
        true
    }
}

/// Map one stored output record to a log entry.
fn record_entry(job: &JobId, agent: &AgentName, record: &Value, timestamp_ms: u64) -> LogEntry {
    let (level, message) = match DriverMessage::from_value(record) {
        Ok(DriverMessage::Error { message }) => (LogLevel::Error, message),
        Ok(DriverMessage::Init { session_id }) => {
            (LogLevel::Debug, format!("session {session_id}"))
        }
        Ok(DriverMessage::Status { status }) => (LogLevel::Debug, status),
        Ok(message) => (
            LogLevel::Info,
            message
                .assistant_text()
                .unwrap_or_else(|| record_type(record)),
        ),
        Err(_) => (LogLevel::Warn, "unparseable output record".to_string()),
    };

    LogEntry {
        timestamp_ms,
        level,
        source: "job".to_string(),
        agent: Some(agent.clone()),
        job: Some(job.clone()),
        schedule: None,
        message,
        data: Some(record.clone()),
    }
}

fn record_type(record: &Value) -> String {
    record
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("record")
        .to_string()
}

/// Map a live bus event to a log entry, when it is log-worthy.
fn event_entry(event: &FleetEvent, timestamp_ms: u64) -> Option<LogEntry> {
    let (level, source, message, data) = match event {
        FleetEvent::JobOutput { job, agent, record } => {
            return Some(record_entry(job, agent, record, timestamp_ms));
        }
        FleetEvent::JobCreated { job, .. } => (
            LogLevel::Info,
            "job",
            format!("job {job} created"),
            None,
        ),
        FleetEvent::JobCompleted {
            job, duration_ms, ..
        } => (
            LogLevel::Info,
            "job",
            format!("job {job} completed in {duration_ms}ms"),
            None,
        ),
        FleetEvent::JobFailed { job, error, .. } => (
            LogLevel::Error,
            "job",
            format!("job {job} failed: {}", error.message),
            None,
        ),
        FleetEvent::JobCancelled { job, .. } => {
            (LogLevel::Warn, "job", format!("job {job} cancelled"), None)
        }
        FleetEvent::ScheduleTriggered { schedule, .. } => (
            LogLevel::Info,
            "schedule",
            format!("schedule {schedule} triggered"),
            None,
        ),
        FleetEvent::ScheduleSkipped {
            schedule, reason, ..
        } => (
            LogLevel::Debug,
            "schedule",
            format!("schedule {schedule} skipped ({reason:?})"),
            None,
        ),
        FleetEvent::Error { message } => {
            (LogLevel::Error, "fleet", message.clone(), None)
        }
        FleetEvent::ConfigReloaded { changes } => (
            LogLevel::Info,
            "fleet",
            format!("config reloaded ({} changes)", changes.len()),
            Some(serde_json::to_value(changes).unwrap_or(Value::Null)),
        ),
        FleetEvent::BridgeMessageError {
            bridge, message, ..
        } => (
            LogLevel::Error,
            "bridge",
            format!("{bridge}: {message}"),
            None,
        ),
        _ => return None,
    };

    Some(LogEntry {
        timestamp_ms,
        level,
        source: source.to_string(),
        agent: event.agent().cloned(),
        job: event.job_id().cloned(),
        schedule: match event {
            FleetEvent::ScheduleTriggered { schedule, .. }
            | FleetEvent::ScheduleSkipped { schedule, .. } => Some(schedule.clone()),
            _ => None,
        },
        message,
        data,
    })
}

impl<C: Clock> FleetManager<C> {
    /// Stream log entries: optional history replay, then the live bus.
    pub fn stream_logs(&self, options: LogStreamOptions) -> mpsc::Receiver<LogEntry> {
        let (tx, rx) = mpsc::channel(256);
        let manager = self.clone();
        // Subscribe before reading history so nothing falls in the gap.
        let mut events = self.inner.bus.subscribe();

        tokio::spawn(async move {
            if options.include_history {
                if let Err(e) = manager.replay_history(&options, &tx).await {
                    warn!(error = %e, "log history replay failed");
                }
            }

            if !options.follow {
                return;
            }

            while let Some(event) = events.recv().await {
                let timestamp_ms = manager.inner.clock.epoch_ms();
                if let Some(entry) = event_entry(&event, timestamp_ms) {
                    if options.matches(&entry) && tx.send(entry).await.is_err() {
                        return;
                    }
                }
            }
        });

        rx
    }

    /// Stream one agent's logs.
    pub fn stream_agent_logs(
        &self,
        agent: AgentName,
        options: LogStreamOptions,
    ) -> mpsc::Receiver<LogEntry> {
        self.stream_logs(LogStreamOptions {
            agent: Some(agent),
            ..options
        })
    }

    /// Stream one job's output, ending when the job goes terminal.
    ///
    /// History comes from the output file; the live tail watches the file so
    /// records land even when this process did not produce them.
    pub fn stream_job_output(
        &self,
        job_id: JobId,
        include_history: bool,
    ) -> mpsc::Receiver<LogEntry> {
        let (tx, rx) = mpsc::channel(256);
        let manager = self.clone();

        tokio::spawn(async move {
            let store = match manager.store() {
                Some(store) => store,
                None => return,
            };
            let meta = match store.get_job(&job_id) {
                Ok(Some(meta)) => meta,
                _ => return,
            };
            let agent = meta.agent.clone();

            let (history, offset) = match store.read_job_output_offset(&job_id) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(job = %job_id, error = %e, "failed to read job output");
                    return;
                }
            };
            if include_history {
                for record in &history {
                    let entry =
                        record_entry(&job_id, &agent, record, manager.inner.clock.epoch_ms());
                    if tx.send(entry).await.is_err() {
                        return;
                    }
                }
            }

            if meta.is_terminal() {
                return;
            }

            let mut watch = match store.watch_job_output(&job_id, offset) {
                Ok(watch) => watch,
                Err(e) => {
                    warn!(job = %job_id, error = %e, "failed to watch job output");
                    return;
                }
            };

            loop {
                let record = tokio::select! {
                    record = watch.rx.recv() => record,
                    () = tokio::time::sleep(Duration::from_millis(250)) => {
                        // Periodic terminal check while the file is quiet.
                        match store.get_job(&job_id) {
                            Ok(Some(meta)) if meta.is_terminal() => return,
                            _ => continue,
                        }
                    }
                };
                let Some(record) = record else { return };
                let entry = record_entry(&job_id, &agent, &record, manager.inner.clock.epoch_ms());
                if tx.send(entry).await.is_err() {
                    return;
                }
            }
        });

        rx
    }

    async fn replay_history(
        &self,
        options: &LogStreamOptions,
        tx: &mpsc::Sender<LogEntry>,
    ) -> Result<(), FleetError> {
        let store = self.require_store()?;
        let page = store.list_jobs(&JobFilter {
            agent: options.agent.clone(),
            ..Default::default()
        })?;

        let mut jobs = page.jobs;
        if let Some(job) = &options.job {
            jobs.retain(|j| j.id == *job);
        }
        if let Some(limit) = options.history_limit {
            if jobs.len() > limit {
                let skip = jobs.len() - limit;
                jobs.drain(..skip);
            }
        }

        for job in jobs {
            let records = store.read_job_output(&job.id, true)?;
            for record in &records {
                let timestamp_ms = job.started_at_ms.unwrap_or(job.created_at_ms);
                let entry = record_entry(&job.id, &job.agent, record, timestamp_ms);
                if options.matches(&entry) && tx.send(entry).await.is_err() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "logs_tests.rs"]
mod tests;

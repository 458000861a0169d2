// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule tick loop.
//!
//! One cooperative loop evaluates every `(agent, schedule)` pair each tick.
//! Due times: interval schedules fire `interval` after the last run (or
//! after the first evaluation when they have never run); cron schedules fire
//! at the next cron occurrence computed from `now` — occurrences missed
//! while the supervisor was down are skipped, not replayed. The trigger
//! callback is awaited only until the job is *accepted*, never to
//! completion.

use drover_config::{parse_cron, ResolvedAgent, ScheduleDef};
use drover_core::{
    parse_duration, AgentName, Clock, EventSink, FleetEvent, ScheduleStatus, ScheduleType,
    SkipReason,
};
use drover_storage::StateStore;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Raised when `stop` gives up waiting for running jobs.
#[derive(Debug, Error)]
#[error("scheduler shutdown timed out with {still_running} jobs still running")]
pub struct SchedulerShutdownError {
    pub still_running: u32,
}

/// Per-agent count of pending/running jobs, fed by bus events.
///
/// Only one task (the manager's bus listener) writes; the scheduler and the
/// manager read. Transient over/undercount at event boundaries is fine — the
/// cap is re-checked at trigger time.
#[derive(Clone, Default)]
pub struct RunningCounts {
    inner: Arc<Mutex<HashMap<AgentName, u32>>>,
}

impl RunningCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one bus event into the counts.
    pub fn apply(&self, event: &FleetEvent) {
        match event {
            FleetEvent::JobCreated { agent, .. } => {
                *self.inner.lock().entry(agent.clone()).or_insert(0) += 1;
            }
            FleetEvent::JobCompleted { agent, .. }
            | FleetEvent::JobFailed { agent, .. }
            | FleetEvent::JobCancelled { agent, .. } => {
                let mut counts = self.inner.lock();
                if let Some(count) = counts.get_mut(agent) {
                    *count = count.saturating_sub(1);
                }
            }
            _ => {}
        }
    }

    pub fn count(&self, agent: &AgentName) -> u32 {
        self.inner.lock().get(agent).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.inner.lock().values().sum()
    }
}

/// Acceptance-only trigger callback: resolves once the job exists.
pub type TriggerFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
pub type TriggerFn = Arc<dyn Fn(AgentName, String) -> TriggerFuture + Send + Sync>;

/// Scheduler construction parameters.
pub struct SchedulerConfig<C: Clock> {
    pub store: Arc<StateStore>,
    pub sink: Arc<dyn EventSink>,
    pub trigger: TriggerFn,
    pub counts: RunningCounts,
    pub check_interval: Duration,
    pub clock: C,
}

/// Options for [`Scheduler::stop`].
#[derive(Debug, Clone)]
pub struct SchedulerStopOptions {
    pub wait_for_jobs: bool,
    pub timeout: Duration,
}

impl Default for SchedulerStopOptions {
    fn default() -> Self {
        Self {
            wait_for_jobs: true,
            timeout: Duration::from_secs(30),
        }
    }
}

/// The tick loop and its state.
pub struct Scheduler<C: Clock> {
    inner: Arc<SchedulerInner<C>>,
}

impl<C: Clock> Clone for Scheduler<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// The shape a cached due time was computed under. A reload that changes
/// any of these re-anchors the schedule instead of keeping the stale time.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DueSpec {
    schedule_type: ScheduleType,
    interval_ms: Option<u64>,
    expression: Option<String>,
}

impl DueSpec {
    fn of(schedule: &ScheduleDef) -> Self {
        Self {
            schedule_type: schedule.schedule_type,
            interval_ms: schedule
                .interval
                .as_deref()
                .and_then(|s| parse_duration(s).ok())
                .map(|d| d.as_millis() as u64),
            expression: schedule.expression.clone(),
        }
    }
}

/// One cached due time plus the schedule shape it belongs to.
#[derive(Debug, Clone)]
struct DueEntry {
    at_ms: u64,
    spec: DueSpec,
}

struct SchedulerInner<C: Clock> {
    agents: RwLock<Vec<Arc<ResolvedAgent>>>,
    /// In-memory due times, keyed by `(agent, schedule)`. Created lazily on
    /// first evaluation.
    next_due: Mutex<HashMap<(AgentName, String), DueEntry>>,
    store: Arc<StateStore>,
    sink: Arc<dyn EventSink>,
    trigger: TriggerFn,
    counts: RunningCounts,
    check_interval: Duration,
    clock: C,
    cancel: CancellationToken,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(config: SchedulerConfig<C>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                agents: RwLock::new(Vec::new()),
                next_due: Mutex::new(HashMap::new()),
                store: config.store,
                sink: config.sink,
                trigger: config.trigger,
                counts: config.counts,
                check_interval: config.check_interval,
                clock: config.clock,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Replace the agent set (initial load and every successful reload).
    ///
    /// Cached due times survive only for schedules that still exist with an
    /// unchanged shape; a removed schedule is forgotten and a changed one
    /// re-anchors on its next evaluation under the new definition.
    pub fn set_agents(&self, agents: Vec<Arc<ResolvedAgent>>) {
        let mut next_due = self.inner.next_due.lock();
        next_due.retain(|(agent_name, schedule_name), entry| {
            agents.iter().any(|a| {
                a.name == *agent_name
                    && a.def
                        .schedules
                        .get(schedule_name.as_str())
                        .is_some_and(|def| DueSpec::of(def) == entry.spec)
            })
        });
        drop(next_due);
        *self.inner.agents.write() = agents;
    }

    pub fn counts(&self) -> RunningCounts {
        self.inner.counts.clone()
    }

    /// Spawn the tick loop. Returns immediately.
    pub fn spawn(&self) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = scheduler.inner.cancel.cancelled() => break,
                    () = tokio::time::sleep(scheduler.inner.check_interval) => {
                        scheduler.tick().await;
                    }
                }
            }
            debug!("scheduler tick loop stopped");
        })
    }

    /// One evaluation pass over every `(agent, schedule)`.
    pub async fn tick(&self) {
        let agents: Vec<Arc<ResolvedAgent>> = self.inner.agents.read().clone();
        let now_ms = self.inner.clock.epoch_ms();

        for agent in &agents {
            for (schedule_name, schedule) in &agent.def.schedules {
                if let Err(e) = self
                    .evaluate(agent, schedule_name, schedule, now_ms)
                    .await
                {
                    warn!(
                        agent = %agent.name,
                        schedule = schedule_name,
                        error = %e,
                        "schedule evaluation failed"
                    );
                }
            }
        }
    }

    async fn evaluate(
        &self,
        agent: &Arc<ResolvedAgent>,
        schedule_name: &str,
        schedule: &ScheduleDef,
        now_ms: u64,
    ) -> Result<(), String> {
        let state = self
            .inner
            .store
            .schedule_state(agent.name.as_str(), schedule_name)
            .map_err(|e| e.to_string())?;

        if state.status == ScheduleStatus::Disabled {
            self.inner.sink.emit(FleetEvent::ScheduleSkipped {
                agent: agent.name.clone(),
                schedule: schedule_name.to_string(),
                reason: SkipReason::Disabled,
            });
            return Ok(());
        }

        if !schedule.schedule_type.fires_on_tick() {
            return Ok(());
        }

        let key = (agent.name.clone(), schedule_name.to_string());
        let due_at = {
            let mut next_due = self.inner.next_due.lock();
            match next_due.get(&key) {
                Some(entry) => entry.at_ms,
                None => {
                    let at_ms = self.first_due(schedule, &state.last_run_at_ms, now_ms)?;
                    next_due.insert(
                        key.clone(),
                        DueEntry {
                            at_ms,
                            spec: DueSpec::of(schedule),
                        },
                    );
                    at_ms
                }
            }
        };

        if now_ms < due_at {
            return Ok(());
        }

        if self.inner.counts.count(&agent.name) >= agent.max_concurrent() {
            self.inner.sink.emit(FleetEvent::ScheduleSkipped {
                agent: agent.name.clone(),
                schedule: schedule_name.to_string(),
                reason: SkipReason::MaxConcurrent,
            });
            return Ok(());
        }

        // Fire: mark running, persist last run, advance the due time.
        let next = self.next_after_fire(schedule, now_ms)?;
        self.inner.next_due.lock().insert(
            key,
            DueEntry {
                at_ms: next,
                spec: DueSpec::of(schedule),
            },
        );
        self.inner
            .store
            .update_schedule_state(agent.name.as_str(), schedule_name, |s| {
                s.status = ScheduleStatus::Running;
                s.last_run_at_ms = Some(now_ms);
                s.next_run_at_ms = Some(next);
                s.last_error = None;
            })
            .map_err(|e| e.to_string())?;

        self.inner.sink.emit(FleetEvent::ScheduleTriggered {
            agent: agent.name.clone(),
            schedule: schedule_name.to_string(),
        });

        let accepted =
            (self.inner.trigger)(agent.name.clone(), schedule_name.to_string()).await;
        if let Err(message) = accepted {
            warn!(agent = %agent.name, schedule = schedule_name, error = %message, "trigger failed");
            self.inner
                .store
                .update_schedule_state(agent.name.as_str(), schedule_name, |s| {
                    s.status = ScheduleStatus::Idle;
                    s.last_error = Some(message.clone());
                })
                .map_err(|e| e.to_string())?;
        }

        Ok(())
    }

    /// Due time for a schedule that has not fired in this process yet.
    fn first_due(
        &self,
        schedule: &ScheduleDef,
        last_run_at_ms: &Option<u64>,
        now_ms: u64,
    ) -> Result<u64, String> {
        match schedule.schedule_type {
            ScheduleType::Interval => {
                let interval = interval_ms(schedule)?;
                Ok(match last_run_at_ms {
                    Some(last) => last.saturating_add(interval),
                    None => now_ms + interval,
                })
            }
            // Cron anchors at `now`: occurrences missed while the supervisor
            // was stopped are skipped by policy.
            ScheduleType::Cron => cron_next_ms(schedule, &self.inner.clock),
            _ => Err("schedule type does not fire on tick".to_string()),
        }
    }

    /// Due time right after a fire at `now`.
    fn next_after_fire(&self, schedule: &ScheduleDef, now_ms: u64) -> Result<u64, String> {
        match schedule.schedule_type {
            ScheduleType::Interval => Ok(now_ms + interval_ms(schedule)?),
            ScheduleType::Cron => cron_next_ms(schedule, &self.inner.clock),
            _ => Err("schedule type does not fire on tick".to_string()),
        }
    }

    /// Stop the tick loop; optionally wait for running jobs to drain.
    pub async fn stop(
        &self,
        options: SchedulerStopOptions,
    ) -> Result<(), SchedulerShutdownError> {
        self.inner.cancel.cancel();

        if !options.wait_for_jobs {
            return Ok(());
        }

        let deadline = tokio::time::Instant::now() + options.timeout;
        loop {
            let still_running = self.inner.counts.total();
            if still_running == 0 {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SchedulerShutdownError { still_running });
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

fn interval_ms(schedule: &ScheduleDef) -> Result<u64, String> {
    let text = schedule
        .interval
        .as_deref()
        .ok_or_else(|| "interval schedule without interval".to_string())?;
    Ok(parse_duration(text).map_err(|e| e.to_string())?.as_millis() as u64)
}

fn cron_next_ms(schedule: &ScheduleDef, clock: &impl Clock) -> Result<u64, String> {
    let expression = schedule
        .expression
        .as_deref()
        .ok_or_else(|| "cron schedule without expression".to_string())?;
    let parsed = parse_cron(expression)?;
    let next = parsed
        .after(&clock.now_utc())
        .next()
        .ok_or_else(|| "cron expression has no future occurrence".to_string())?;
    Ok(next.timestamp_millis() as u64)
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleet manager lifecycle.
//!
//! State machine: `uninitialized → initialized → starting → running →
//! stopping → stopped`, with `error` reachable from any active phase.
//! Everything the sub-modules need from the manager flows through narrow
//! interfaces (the event bus sink and the chat trigger target); nothing
//! holds a strong reference back to the manager.

use crate::error::FleetError;
use crate::event_bus::{EventBus, EventStream};
use drover_bridge::{ChatBridge, RouterContext, RouterHandle, SharedChannelRouter};
use drover_config::{diff_configs, load_config_from, ResolvedConfig};
use drover_core::{AgentName, AgentStatus, Clock, EventSink, FleetEvent, JobId, SystemClock};
use drover_engine::{
    QueryDriver, RunningCounts, Scheduler, SchedulerConfig, SchedulerStopOptions, TriggerFn,
};
use drover_storage::{JobFilter, StateStore};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Manager lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initialized,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Options for [`FleetManager::stop`].
#[derive(Debug, Clone)]
pub struct StopOptions {
    pub wait_for_jobs: bool,
    pub timeout: Duration,
    pub cancel_on_timeout: bool,
    pub cancel_timeout: Duration,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self {
            wait_for_jobs: true,
            timeout: Duration::from_secs(30),
            cancel_on_timeout: false,
            cancel_timeout: Duration::from_secs(10),
        }
    }
}

/// Construction parameters.
pub struct FleetManagerOptions<C: Clock = SystemClock> {
    /// Explicit fleet file; searched upward from the cwd when `None`.
    pub config_path: Option<PathBuf>,
    pub driver: Arc<dyn QueryDriver>,
    /// Shared chat connectors, routed by channel claims.
    pub bridges: Vec<Arc<dyn ChatBridge>>,
    pub clock: C,
}

pub(crate) struct ActiveJob {
    pub agent: AgentName,
    pub cancel: CancellationToken,
}

pub(crate) struct ManagerInner<C: Clock> {
    pub phase: Mutex<Phase>,
    pub config_path: Mutex<Option<PathBuf>>,
    pub config: RwLock<Option<Arc<ResolvedConfig>>>,
    pub store: RwLock<Option<Arc<StateStore>>>,
    pub bus: EventBus,
    pub driver: Arc<dyn QueryDriver>,
    pub bridges: Vec<Arc<dyn ChatBridge>>,
    pub scheduler: Mutex<Option<Scheduler<C>>>,
    pub scheduler_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    pub counts: RunningCounts,
    pub counts_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    pub router_handles: Mutex<Vec<RouterHandle>>,
    pub active: Mutex<HashMap<JobId, ActiveJob>>,
    pub clock: C,
}

/// The fleet supervisor.
///
/// Cheap to clone; all clones share one supervisor instance.
pub struct FleetManager<C: Clock = SystemClock> {
    pub(crate) inner: Arc<ManagerInner<C>>,
}

impl<C: Clock> Clone for FleetManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clock> FleetManager<C> {
    pub fn new(options: FleetManagerOptions<C>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                phase: Mutex::new(Phase::Uninitialized),
                config_path: Mutex::new(options.config_path),
                config: RwLock::new(None),
                store: RwLock::new(None),
                bus: EventBus::new(),
                driver: options.driver,
                bridges: options.bridges,
                scheduler: Mutex::new(None),
                scheduler_task: Mutex::new(None),
                counts: RunningCounts::new(),
                counts_task: Mutex::new(None),
                router_handles: Mutex::new(Vec::new()),
                active: Mutex::new(HashMap::new()),
                clock: options.clock,
            }),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.inner.phase.lock()
    }

    /// Subscribe to the fleet event bus.
    pub fn subscribe(&self) -> EventStream {
        self.inner.bus.subscribe()
    }

    pub fn config(&self) -> Option<Arc<ResolvedConfig>> {
        self.inner.config.read().clone()
    }

    pub(crate) fn require_config(&self) -> Result<Arc<ResolvedConfig>, FleetError> {
        self.config().ok_or(FleetError::InvalidState {
            operation: "config access",
            phase: self.phase().to_string(),
        })
    }

    pub fn store(&self) -> Option<Arc<StateStore>> {
        self.inner.store.read().clone()
    }

    pub(crate) fn require_store(&self) -> Result<Arc<StateStore>, FleetError> {
        self.store().ok_or(FleetError::InvalidState {
            operation: "store access",
            phase: self.phase().to_string(),
        })
    }

    fn transition(&self, from: &[Phase], to: Phase, operation: &'static str) -> Result<Phase, FleetError> {
        let mut phase = self.inner.phase.lock();
        if !from.contains(&phase) {
            return Err(FleetError::InvalidState {
                operation,
                phase: phase.to_string(),
            });
        }
        let previous = *phase;
        *phase = to;
        Ok(previous)
    }

    fn fail(&self, message: String) {
        *self.inner.phase.lock() = Phase::Error;
        error!("{message}");
        self.inner.bus.emit(FleetEvent::Error { message });
    }

    /// Load and validate config, open the state store, build the scheduler,
    /// and wire the counts listener.
    pub async fn initialize(&self) -> Result<(), FleetError> {
        self.transition(&[Phase::Uninitialized], Phase::Uninitialized, "initialize")?;

        let path = match self.resolve_config_path() {
            Ok(path) => path,
            Err(e) => {
                self.fail(format!("initialize failed: {e}"));
                return Err(e);
            }
        };
        let config = match load_config_from(&path) {
            Ok(config) => Arc::new(config),
            Err(e) => {
                let e = FleetError::Configuration(e);
                self.fail(format!("initialize failed: {e}"));
                return Err(e);
            }
        };

        let store = match StateStore::open(&config.state_dir) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                let e = FleetError::Storage(e);
                self.fail(format!("initialize failed: {e}"));
                return Err(e);
            }
        };

        // Single writer for the running-count map: this listener task.
        let counts = self.inner.counts.clone();
        let mut events = self.inner.bus.subscribe();
        let counts_task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                counts.apply(&event);
            }
        });

        let scheduler = Scheduler::new(SchedulerConfig {
            store: Arc::clone(&store),
            sink: Arc::new(self.inner.bus.clone()) as Arc<dyn EventSink>,
            trigger: self.schedule_trigger_fn(),
            counts: self.inner.counts.clone(),
            check_interval: config.settings.check_interval,
            clock: self.inner.clock.clone(),
        });
        scheduler.set_agents(config.agents.clone());

        *self.inner.config_path.lock() = Some(path);
        *self.inner.config.write() = Some(Arc::clone(&config));
        *self.inner.store.write() = Some(store);
        *self.inner.scheduler.lock() = Some(scheduler);
        *self.inner.counts_task.lock() = Some(counts_task);
        *self.inner.phase.lock() = Phase::Initialized;

        info!(agents = config.agents.len(), "fleet initialized");
        self.inner.bus.emit(FleetEvent::Initialized);
        Ok(())
    }

    fn resolve_config_path(&self) -> Result<PathBuf, FleetError> {
        if let Some(path) = self.inner.config_path.lock().clone() {
            return Ok(path);
        }
        let cwd = std::env::current_dir().map_err(|e| {
            FleetError::Configuration(drover_config::ConfigError::Io {
                path: PathBuf::from("."),
                source: e,
            })
        })?;
        drover_config::find_fleet_file(&cwd).ok_or(FleetError::Configuration(
            drover_config::ConfigError::NotFound { searched_from: cwd },
        ))
    }

    /// Acceptance-only trigger callback handed to the scheduler. Holds a
    /// weak reference so the scheduler never keeps the manager alive.
    fn schedule_trigger_fn(&self) -> TriggerFn {
        let weak: Weak<ManagerInner<C>> = Arc::downgrade(&self.inner);
        Arc::new(move |agent, schedule| {
            let weak = weak.clone();
            Box::pin(async move {
                let inner = weak.upgrade().ok_or_else(|| "manager gone".to_string())?;
                let manager = FleetManager { inner };
                manager.execute_scheduled(agent, schedule).await
            })
        })
    }

    /// Start the tick loop and connect the chat routers.
    pub async fn start(&self) -> Result<(), FleetError> {
        self.transition(&[Phase::Initialized], Phase::Starting, "start")?;
        let config = self.require_config()?;

        let scheduler_task = {
            let scheduler = self.inner.scheduler.lock();
            scheduler.as_ref().map(|s| s.spawn())
        };
        *self.inner.scheduler_task.lock() = scheduler_task;

        for agent in &config.agents {
            self.inner.bus.emit(FleetEvent::AgentStarted {
                agent: agent.name.clone(),
            });
        }

        if let Err(e) = self.connect_routers(&config).await {
            self.fail(format!("start failed: {e}"));
            return Err(e);
        }

        {
            let store = self.require_store()?;
            let mut state = store.read_fleet_state().unwrap_or_else(|e| {
                warn!(error = %e, "unreadable fleet snapshot, starting from a fresh one");
                Default::default()
            });
            state.started_at_ms = Some(self.inner.clock.epoch_ms());
            state.stopped_at_ms = None;
            if let Err(e) = store.write_fleet_state(&state) {
                warn!(error = %e, "failed to persist fleet state at start");
            }
        }

        *self.inner.phase.lock() = Phase::Running;
        info!("fleet started");
        self.inner.bus.emit(FleetEvent::Started);
        Ok(())
    }

    async fn connect_routers(&self, config: &ResolvedConfig) -> Result<(), FleetError> {
        let context = Arc::new(RouterContext {
            target: Arc::new(self.clone()) as Arc<dyn drover_bridge::ChatTarget>,
            store: self.require_store()?,
            sink: Arc::new(self.inner.bus.clone()) as Arc<dyn EventSink>,
            session_max_age: config.settings.session_max_age,
            reply_min_interval: config.settings.reply_min_interval,
            clock: self.inner.clock.clone(),
        });

        let mut handles = Vec::new();
        for bridge in &self.inner.bridges {
            let kind = bridge.kind().to_string();
            let bindings: Vec<_> = config
                .agents
                .iter()
                .filter_map(|agent| {
                    agent
                        .def
                        .chat
                        .get(&kind)
                        .map(|binding| (agent.name.clone(), binding.clone()))
                })
                .collect();
            if bindings.is_empty() {
                info!(bridge = kind, "no agents bound, bridge left disconnected");
                continue;
            }
            if bindings.iter().all(|(_, b)| b.channels.is_empty()) {
                warn!(bridge = kind, "bindings claim no channels, bridge left disconnected");
                continue;
            }

            let router = SharedChannelRouter::new(
                Arc::clone(bridge),
                &bindings,
                Arc::clone(&context),
            );
            match router.start().await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    self.inner.bus.emit(FleetEvent::BridgeError {
                        bridge: kind.clone(),
                        message: e.to_string(),
                    });
                    return Err(FleetError::InvalidState {
                        operation: "bridge connect",
                        phase: format!("bridge {kind} failed: {e}"),
                    });
                }
            }
        }
        *self.inner.router_handles.lock() = handles;
        Ok(())
    }

    /// Stop routers, drain the scheduler, optionally cancel stragglers,
    /// persist the final snapshot.
    pub async fn stop(&self, options: StopOptions) -> Result<(), FleetError> {
        // Stopping an already-stopped (or never-started) manager is a no-op.
        {
            let phase = *self.inner.phase.lock();
            if matches!(phase, Phase::Stopped | Phase::Uninitialized) {
                return Ok(());
            }
        }
        self.transition(
            &[Phase::Initialized, Phase::Running, Phase::Error],
            Phase::Stopping,
            "stop",
        )?;

        let handles = std::mem::take(&mut *self.inner.router_handles.lock());
        for handle in handles {
            handle.stop().await;
        }

        let scheduler = self.inner.scheduler.lock().clone();
        let mut timed_out_jobs = 0;
        if let Some(scheduler) = scheduler {
            let result = scheduler
                .stop(SchedulerStopOptions {
                    wait_for_jobs: options.wait_for_jobs,
                    timeout: options.timeout,
                })
                .await;
            if let Err(e) = result {
                timed_out_jobs = e.still_running;
                if options.cancel_on_timeout {
                    warn!(jobs = timed_out_jobs, "stop timed out, cancelling running jobs");
                    self.cancel_all_active(options.cancel_timeout).await;
                    timed_out_jobs = 0;
                }
            }
        }
        if let Some(task) = self.inner.scheduler_task.lock().take() {
            task.abort();
        }

        if let Err(e) = self.persist_fleet_state(true) {
            warn!(error = %e, "failed to persist fleet state at stop");
        }

        if let Some(task) = self.inner.counts_task.lock().take() {
            task.abort();
        }

        let config = self.config();
        if let Some(config) = config {
            for agent in &config.agents {
                self.inner.bus.emit(FleetEvent::AgentStopped {
                    agent: agent.name.clone(),
                });
            }
        }

        *self.inner.phase.lock() = Phase::Stopped;
        info!("fleet stopped");
        self.inner.bus.emit(FleetEvent::Stopped);

        if timed_out_jobs > 0 {
            return Err(FleetError::ShutdownTimedOut {
                still_running: timed_out_jobs,
            });
        }
        Ok(())
    }

    async fn cancel_all_active(&self, timeout: Duration) {
        let jobs: Vec<JobId> = self.inner.active.lock().keys().cloned().collect();
        let mut handles = Vec::with_capacity(jobs.len());
        for job_id in jobs {
            let manager = self.clone();
            handles.push(tokio::spawn(async move {
                if let Err(e) = manager.cancel_job(&job_id, Some(timeout)).await {
                    warn!(job = %job_id, error = %e, "cancel during shutdown failed");
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Reload the fleet file. A failed load keeps the old config untouched.
    pub async fn reload(&self) -> Result<Vec<drover_core::ConfigChange>, FleetError> {
        {
            let phase = *self.inner.phase.lock();
            if !matches!(phase, Phase::Initialized | Phase::Running) {
                return Err(FleetError::InvalidState {
                    operation: "reload",
                    phase: phase.to_string(),
                });
            }
        }

        let path = self.resolve_config_path()?;
        let old = self.require_config()?;
        let new = Arc::new(load_config_from(&path).map_err(FleetError::Configuration)?);

        let changes = diff_configs(&old, &new);

        // Swap the config and push the new agent set in one step.
        *self.inner.config.write() = Some(Arc::clone(&new));
        if let Some(scheduler) = self.inner.scheduler.lock().as_ref() {
            scheduler.set_agents(new.agents.clone());
        }

        for change in &changes {
            use drover_core::{ChangeCategory, ChangeKind};
            if change.category == ChangeCategory::Agent {
                let agent = AgentName::new(change.name.clone());
                match change.kind {
                    ChangeKind::Added => {
                        self.inner.bus.emit(FleetEvent::AgentStarted { agent });
                    }
                    ChangeKind::Removed => {
                        self.inner.bus.emit(FleetEvent::AgentStopped { agent });
                    }
                    ChangeKind::Modified => {}
                }
            }
        }

        info!(changes = changes.len(), "config reloaded");
        self.inner.bus.emit(FleetEvent::ConfigReloaded {
            changes: changes.clone(),
        });
        Ok(changes)
    }

    /// Persist the fleet snapshot from current store + runtime state.
    pub(crate) fn persist_fleet_state(&self, stopping: bool) -> Result<(), FleetError> {
        let store = self.require_store()?;
        let config = self.require_config()?;
        let mut state = store.read_fleet_state().unwrap_or_else(|e| {
            warn!(error = %e, "unreadable fleet snapshot, rebuilding it");
            Default::default()
        });

        if stopping {
            state.stopped_at_ms = Some(self.inner.clock.epoch_ms());
        }

        for agent in &config.agents {
            let current = {
                let active = self.inner.active.lock();
                active
                    .iter()
                    .find(|(_, job)| job.agent == agent.name)
                    .map(|(id, _)| id.clone())
            };
            let last_job_id = store
                .list_jobs(&JobFilter {
                    agent: Some(agent.name.clone()),
                    ..Default::default()
                })
                .ok()
                .and_then(|page| page.jobs.last().map(|j| j.id.clone()));

            let entry = state.agent_mut(agent.name.as_str());
            entry.status = if current.is_some() {
                AgentStatus::Running
            } else {
                AgentStatus::Idle
            };
            entry.current_job_id = current;
            entry.last_job_id = last_job_id;
            entry.schedules = store
                .schedule_states(agent.name.as_str())
                .unwrap_or_default();
        }

        store.write_fleet_state(&state)?;
        Ok(())
    }

    /// Enable a disabled schedule.
    pub fn enable_schedule(&self, agent: &str, schedule: &str) -> Result<(), FleetError> {
        self.set_schedule_disabled(agent, schedule, false)
    }

    /// Disable a schedule (sticky until re-enabled).
    pub fn disable_schedule(&self, agent: &str, schedule: &str) -> Result<(), FleetError> {
        self.set_schedule_disabled(agent, schedule, true)
    }

    fn set_schedule_disabled(
        &self,
        agent: &str,
        schedule: &str,
        disabled: bool,
    ) -> Result<(), FleetError> {
        let config = self.require_config()?;
        let resolved = config
            .agent(agent)
            .ok_or_else(|| FleetError::AgentNotFound(agent.to_string()))?;
        if resolved.schedule(schedule).is_none() {
            return Err(FleetError::ScheduleNotFound {
                agent: agent.to_string(),
                schedule: schedule.to_string(),
            });
        }

        let store = self.require_store()?;
        store.update_schedule_state(agent, schedule, |s| {
            s.status = if disabled {
                drover_core::ScheduleStatus::Disabled
            } else {
                drover_core::ScheduleStatus::Idle
            };
        })?;
        Ok(())
    }

    /// Read a job's final output: last assistant text, else the last tool
    /// result serialized, else the empty string.
    pub fn get_job_final_output(&self, job_id: &JobId) -> Result<String, FleetError> {
        let store = self.require_store()?;
        if store.get_job(job_id)?.is_none() {
            return Err(FleetError::JobNotFound(job_id.to_string()));
        }
        let records = store.read_job_output(job_id, true)?;
        Ok(drover_core::message::extract_final_output(&records))
    }

    /// List jobs through the manager, for the status surfaces.
    pub fn list_jobs(&self, filter: &JobFilter) -> Result<drover_storage::JobPage, FleetError> {
        Ok(self.require_store()?.list_jobs(filter)?)
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

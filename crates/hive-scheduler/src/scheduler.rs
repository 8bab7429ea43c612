//! The scheduling loop.
//!
//! One `Scheduler` is the single scheduling authority for the process: it
//! alone decides when a task is dispatched. Handler bodies run concurrently
//! with each other on the runtime, but a task is never dispatched while a
//! previous invocation of the same task is still in flight.

use anyhow::Result;
use chrono::{DateTime, Utc};
use hive_core::HivemindError;
use hive_state::{AgentStatus, StateStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::task::TaskSpec;

/// Cadences for the run loop, in seconds.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub tick_secs: u64,
    pub heartbeat_secs: u64,
    pub persist_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl From<&hive_config::ScheduleConfig> for LoopConfig {
    fn from(schedule: &hive_config::ScheduleConfig) -> Self {
        Self {
            tick_secs: schedule.tick_secs,
            heartbeat_secs: schedule.heartbeat_secs,
            persist_secs: schedule.persist_secs,
            shutdown_grace_secs: schedule.shutdown_grace_secs,
        }
    }
}

struct ScheduledTask {
    spec: TaskSpec,
    /// Dispatch guard. Set before spawning the handler, cleared by the
    /// spawned body after the outcome is recorded.
    in_flight: AtomicBool,
}

pub struct Scheduler {
    store: Arc<StateStore>,
    config: LoopConfig,
    tasks: Vec<Arc<ScheduledTask>>,
}

impl Scheduler {
    pub fn new(store: Arc<StateStore>, config: LoopConfig) -> Self {
        Self {
            store,
            config,
            tasks: Vec::new(),
        }
    }

    pub fn register(&mut self, spec: TaskSpec) {
        info!(
            task = %spec.id,
            interval_secs = spec.base_interval_secs,
            priority = spec.priority,
            enabled = spec.enabled,
            "registering task"
        );
        self.tasks.push(Arc::new(ScheduledTask {
            spec,
            in_flight: AtomicBool::new(false),
        }));
    }

    /// One scheduling pass: dispatch every enabled task that is due at
    /// `now` and not already in flight. A task with no recorded `next_due`
    /// (first run) is due immediately.
    ///
    /// Returns the dispatched task ids, in dispatch order.
    pub fn tick(&self, now: DateTime<Utc>, join_set: &mut JoinSet<()>) -> Vec<String> {
        let snapshot = self.store.snapshot();
        let mut due: Vec<&Arc<ScheduledTask>> = self
            .tasks
            .iter()
            .filter(|t| t.spec.enabled && !t.in_flight.load(Ordering::SeqCst))
            .filter(|t| {
                snapshot
                    .tasks
                    .get(&t.spec.id)
                    .and_then(|r| r.next_due)
                    .is_none_or(|due_at| due_at <= now)
            })
            .collect();
        due.sort_by(|a, b| {
            (a.spec.priority, &a.spec.id).cmp(&(b.spec.priority, &b.spec.id))
        });

        let mut dispatched = Vec::with_capacity(due.len());
        for task in due {
            if task.in_flight.swap(true, Ordering::SeqCst) {
                continue;
            }
            dispatched.push(task.spec.id.clone());
            self.dispatch(Arc::clone(task), join_set);
        }
        dispatched
    }

    fn dispatch(&self, task: Arc<ScheduledTask>, join_set: &mut JoinSet<()>) {
        debug!(task = %task.spec.id, "dispatching");
        let store = Arc::clone(&self.store);
        join_set.spawn(async move {
            let started = Instant::now();
            let result = task.spec.handler.run().await;
            let latency_ms = started.elapsed().as_millis() as u64;

            let outcome = match result {
                Ok(()) => {
                    debug!(task = %task.spec.id, latency_ms, "task succeeded");
                    hive_core::types::TaskOutcome::success(&task.spec.id, latency_ms)
                }
                Err(err) => {
                    warn!(task = %task.spec.id, latency_ms, error = %err, "task failed");
                    hive_core::types::TaskOutcome::failure(
                        &task.spec.id,
                        latency_ms,
                        format!("{err:#}"),
                    )
                }
            };

            // Both fields derive from the completion instant, so next_due
            // is always exactly one effective interval past last_run.
            let completed = Utc::now();
            store.mutate(|s| {
                s.record_outcome(&outcome);
                let interval =
                    s.strategy.interval_for(&task.spec.id, task.spec.base_interval_secs);
                let record = s.tasks.entry(task.spec.id.clone()).or_default();
                record.last_run = Some(completed);
                record.next_due = Some(completed + chrono::Duration::seconds(interval as i64));
            });
            task.in_flight.store(false, Ordering::SeqCst);
        });
    }

    /// Dispatch one task immediately, bypassing its due time, and wait for
    /// it to finish. A task already in flight is left alone.
    pub async fn trigger(&self, id: &str) -> Result<(), HivemindError> {
        let task = self
            .tasks
            .iter()
            .find(|t| t.spec.id == id)
            .ok_or_else(|| HivemindError::TaskNotFound(id.to_string()))?;
        if !task.spec.enabled {
            return Err(HivemindError::TaskDisabled(id.to_string()));
        }
        if task.in_flight.swap(true, Ordering::SeqCst) {
            debug!(task = %id, "trigger skipped, already in flight");
            return Ok(());
        }

        let mut join_set = JoinSet::new();
        self.dispatch(Arc::clone(task), &mut join_set);
        while join_set.join_next().await.is_some() {}
        Ok(())
    }

    /// Dispatch every enabled task once, bypassing due times, wait for all
    /// of them, and persist. Smoke-test mode.
    pub async fn run_once(&self) -> Result<()> {
        let mut join_set = JoinSet::new();

        let mut enabled: Vec<&Arc<ScheduledTask>> =
            self.tasks.iter().filter(|t| t.spec.enabled).collect();
        enabled.sort_by(|a, b| {
            (a.spec.priority, &a.spec.id).cmp(&(b.spec.priority, &b.spec.id))
        });
        for task in enabled {
            if task.in_flight.swap(true, Ordering::SeqCst) {
                continue;
            }
            self.dispatch(Arc::clone(task), &mut join_set);
        }

        while let Some(joined) = join_set.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "task aborted");
            }
        }
        self.store.persist()
    }

    /// Drive the loop until the shutdown channel flips, then drain in-flight
    /// tasks within the grace period and persist a final snapshot.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.store
            .mutate(|s| s.status = AgentStatus::Running);

        let mut join_set: JoinSet<()> = JoinSet::new();
        let mut tick = tokio::time::interval(Duration::from_secs(self.config.tick_secs.max(1)));
        let mut heartbeat =
            tokio::time::interval(Duration::from_secs(self.config.heartbeat_secs.max(1)));
        let mut persist =
            tokio::time::interval(Duration::from_secs(self.config.persist_secs.max(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        persist.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(tasks = self.tasks.len(), "scheduler started");
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let dispatched = self.tick(Utc::now(), &mut join_set);
                    if !dispatched.is_empty() {
                        debug!(count = dispatched.len(), "tick dispatched tasks");
                    }
                }
                _ = heartbeat.tick() => {
                    self.store.mutate(|s| s.heartbeat(Utc::now()));
                }
                _ = persist.tick() => {
                    if let Err(err) = self.store.persist() {
                        warn!(error = %err, "periodic persist failed");
                    }
                }
                Some(joined) = join_set.join_next(), if !join_set.is_empty() => {
                    if let Err(err) = joined {
                        warn!(error = %err, "task aborted");
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender counts as a shutdown request.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.drain(join_set).await;
        self.store.mutate(|s| s.status = AgentStatus::Stopped);
        self.store.persist()
    }

    /// Wait for in-flight tasks, aborting whatever outlives the grace
    /// period.
    async fn drain(&self, mut join_set: JoinSet<()>) {
        if join_set.is_empty() {
            info!("shutting down, no tasks in flight");
            return;
        }
        info!(in_flight = join_set.len(), "shutting down, draining tasks");

        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        let drained = tokio::time::timeout(grace, async {
            while join_set.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = join_set.len(),
                grace_secs = self.config.shutdown_grace_secs,
                "grace period expired, aborting in-flight tasks"
            );
            join_set.abort_all();
            while join_set.join_next().await.is_some() {}
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

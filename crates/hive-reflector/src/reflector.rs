use chrono::Utc;
use hive_config::ReflectionConfig;
use hive_state::{ReflectionRecord, StateStore, TaskMetrics, TaskRecord};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use ulid::Ulid;

use crate::plan::{TaskObservation, plan};

/// Periodic strategy reviewer. Reads recent outcomes from the store,
/// plans interval adjustments, and applies them in a single mutation.
pub struct Reflector {
    store: Arc<StateStore>,
    policy: ReflectionConfig,
    /// Configured base interval per task id. Tasks outside this map (the
    /// heartbeat, maintenance work) are never adjusted.
    base_intervals: BTreeMap<String, u64>,
}

/// Metrics over the most recent `window` samples of a task's history.
fn window_metrics(record: &TaskRecord, window: usize) -> TaskMetrics {
    let start = record.recent.len().saturating_sub(window);
    let samples = &record.recent[start..];
    if samples.is_empty() {
        return TaskMetrics {
            samples: 0,
            success_rate: 0.0,
            mean_latency_ms: 0,
        };
    }
    let successes = samples.iter().filter(|s| s.success).count();
    let total_latency: u64 = samples.iter().map(|s| s.latency_ms).sum();
    TaskMetrics {
        samples: samples.len(),
        success_rate: successes as f64 / samples.len() as f64,
        mean_latency_ms: total_latency / samples.len() as u64,
    }
}

impl Reflector {
    pub fn new(
        store: Arc<StateStore>,
        policy: ReflectionConfig,
        base_intervals: BTreeMap<String, u64>,
    ) -> Self {
        Self {
            store,
            policy,
            base_intervals,
        }
    }

    /// Run one reflection pass.
    ///
    /// Every pass appends a record to the snapshot's reflection history,
    /// a no-op pass included, so the history shows the reflector ran.
    pub fn pass(&self) -> ReflectionRecord {
        let snapshot = self.store.snapshot();

        let mut observations = BTreeMap::new();
        for (task_id, base_secs) in &self.base_intervals {
            let Some(record) = snapshot.tasks.get(task_id) else {
                continue;
            };
            observations.insert(
                task_id.clone(),
                TaskObservation {
                    base_interval_secs: *base_secs,
                    current_interval_secs: snapshot.strategy.interval_for(task_id, *base_secs),
                    metrics: window_metrics(record, self.policy.window),
                },
            );
        }

        let plan = plan(&observations, &self.policy);
        let record = ReflectionRecord {
            id: Ulid::new().to_string(),
            at: Utc::now(),
            status: plan.status,
            observed: plan.observed,
            deltas: plan.deltas,
            clamped: plan.clamped,
            summary: plan.summary,
        };

        if record.deltas.is_empty() {
            debug!(status = %record.status, "reflection pass made no changes");
        } else {
            for (task_id, delta) in &record.deltas {
                info!(
                    task = %task_id,
                    from_secs = delta.from_secs,
                    to_secs = delta.to_secs,
                    "adjusting task interval"
                );
            }
        }

        self.store.mutate(|s| {
            for (task_id, delta) in &record.deltas {
                s.strategy
                    .interval_secs
                    .insert(task_id.clone(), delta.to_secs);
            }
            s.strategy.max_slowdown = self.policy.max_slowdown;
            s.strategy.max_speedup = self.policy.max_speedup;
            s.push_reflection(record.clone());
        });
        record
    }
}

#[cfg(test)]
#[path = "reflector_tests.rs"]
mod tests;

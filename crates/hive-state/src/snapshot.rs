//! Snapshot types persisted to state.toml

use chrono::{DateTime, Utc};
use hive_core::types::{ProviderHealth, TaskOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current schema version for state.toml
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Reflection records kept in the snapshot (oldest evicted first).
pub const REFLECTION_HISTORY_CAP: usize = 100;

/// Recent outcome samples kept per task for the reflector's rolling window.
pub const OUTCOME_WINDOW_CAP: usize = 50;

/// Coarse process status, mirrored into the persisted snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Initialized,
    Running,
    Stopped,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Initialized => write!(f, "initialized"),
            AgentStatus::Running => write!(f, "running"),
            AgentStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// The complete durable record of scheduler state.
///
/// Always written as a whole (temp file + atomic rename), so any snapshot
/// read back from disk is self-consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub schema_version: u32,
    #[serde(default)]
    pub status: AgentStatus,
    pub boot_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Total heartbeat ticks across all runs.
    #[serde(default)]
    pub cycle_count: u64,
    /// Per-task timing and outcome history, keyed by task id.
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskRecord>,
    /// Last observed fallback-client health per provider id.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderHealthRecord>,
    #[serde(default)]
    pub strategy: StrategyParams,
    /// Bounded, append-only reflection history (most recent last).
    #[serde(default)]
    pub reflections: Vec<ReflectionRecord>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            status: AgentStatus::Initialized,
            boot_time: Utc::now(),
            last_heartbeat: None,
            cycle_count: 0,
            tasks: BTreeMap::new(),
            providers: BTreeMap::new(),
            strategy: StrategyParams::default(),
            reflections: Vec::new(),
        }
    }
}

impl StateSnapshot {
    /// Record a heartbeat tick.
    pub fn heartbeat(&mut self, now: DateTime<Utc>) {
        self.last_heartbeat = Some(now);
        self.cycle_count = self.cycle_count.saturating_add(1);
        self.status = AgentStatus::Running;
    }

    /// Record one task outcome: counters, last error, rolling window.
    pub fn record_outcome(&mut self, outcome: &TaskOutcome) {
        let record = self.tasks.entry(outcome.task_id.clone()).or_default();
        if outcome.success {
            record.success_count = record.success_count.saturating_add(1);
            record.last_error = None;
        } else {
            record.failure_count = record.failure_count.saturating_add(1);
            record.last_error = Some(LastError {
                message: outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
                at: outcome.at,
            });
        }
        record.recent.push(OutcomeSample {
            success: outcome.success,
            latency_ms: outcome.latency_ms,
            at: outcome.at,
        });
        if record.recent.len() > OUTCOME_WINDOW_CAP {
            let excess = record.recent.len() - OUTCOME_WINDOW_CAP;
            record.recent.drain(..excess);
        }
    }

    /// Record the fallback client's current view of one provider.
    pub fn record_provider_health(
        &mut self,
        id: &str,
        health: ProviderHealth,
        consecutive_failures: u32,
    ) {
        self.providers.insert(
            id.to_string(),
            ProviderHealthRecord {
                health,
                consecutive_failures,
            },
        );
    }

    /// Append a reflection record, evicting the oldest beyond the cap.
    pub fn push_reflection(&mut self, record: ReflectionRecord) {
        self.reflections.push(record);
        if self.reflections.len() > REFLECTION_HISTORY_CAP {
            let excess = self.reflections.len() - REFLECTION_HISTORY_CAP;
            self.reflections.drain(..excess);
        }
    }
}

/// Per-task timing and outcome history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failure_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LastError>,
    /// Most recent outcomes, oldest first, capped at `OUTCOME_WINDOW_CAP`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent: Vec<OutcomeSample>,
}

/// Provider health as last seen by a generation attempt. Cooldown windows
/// are process-lifetime state and are not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealthRecord {
    pub health: ProviderHealth,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastError {
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeSample {
    pub success: bool,
    pub latency_ms: u64,
    pub at: DateTime<Utc>,
}

/// Runtime-adjustable scheduling parameters, owned by the state store and
/// mutated only by the reflector (through `StateStore::mutate`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Bounds the intervals were clamped against when last written.
    #[serde(default = "default_max_slowdown")]
    pub max_slowdown: f64,
    #[serde(default = "default_max_speedup")]
    pub max_speedup: f64,
    /// Effective interval per task, in seconds. A task absent from this map
    /// runs at its configured base interval. Kept last so the TOML
    /// serializer emits the scalar bounds before the table.
    #[serde(default)]
    pub interval_secs: BTreeMap<String, u64>,
}

fn default_max_slowdown() -> f64 {
    4.0
}

fn default_max_speedup() -> f64 {
    1.0
}

impl StrategyParams {
    /// Effective interval for `task`, falling back to `base_secs`.
    pub fn interval_for(&self, task: &str, base_secs: u64) -> u64 {
        self.interval_secs.get(task).copied().unwrap_or(base_secs)
    }
}

/// Coarse health classification of a reflection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionStatus {
    /// Success rate >= 0.5 across observed tasks.
    Stable,
    /// Success rate >= 0.2.
    Alert,
    /// Below 0.2.
    Critical,
    /// Nothing to analyze yet.
    NoData,
}

impl std::fmt::Display for ReflectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReflectionStatus::Stable => write!(f, "STABLE"),
            ReflectionStatus::Alert => write!(f, "ALERT"),
            ReflectionStatus::Critical => write!(f, "CRITICAL"),
            ReflectionStatus::NoData => write!(f, "NO_DATA"),
        }
    }
}

/// Metrics observed for one task during a reflection pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetrics {
    pub samples: usize,
    pub success_rate: f64,
    pub mean_latency_ms: u64,
}

/// Interval change proposed (and applied) for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalDelta {
    pub from_secs: u64,
    pub to_secs: u64,
}

/// One output of a reflection pass. Appended every pass, no-op included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionRecord {
    /// ULID, assigned when the pass runs.
    pub id: String,
    pub at: DateTime<Utc>,
    pub status: ReflectionStatus,
    /// Whether any proposed interval hit the configured bounds.
    #[serde(default)]
    pub clamped: bool,
    pub summary: String,
    /// Input metrics the pass saw, keyed by task id.
    #[serde(default)]
    pub observed: BTreeMap<String, TaskMetrics>,
    /// Interval changes applied, keyed by task id. Empty for a no-op pass.
    #[serde(default)]
    pub deltas: BTreeMap<String, IntervalDelta>,
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;

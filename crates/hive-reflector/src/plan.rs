//! Pure planning for a reflection pass: metrics in, interval deltas out.
//! No clock, no I/O, no store access.

use hive_config::ReflectionConfig;
use hive_state::{IntervalDelta, ReflectionStatus, TaskMetrics};
use std::collections::BTreeMap;

/// Inputs for one task: its configured base interval, the effective
/// interval currently in force, and the metrics over the recent window.
#[derive(Debug, Clone)]
pub struct TaskObservation {
    pub base_interval_secs: u64,
    pub current_interval_secs: u64,
    pub metrics: TaskMetrics,
}

/// The outcome of a planning pass, ready to be recorded and applied.
#[derive(Debug, Clone)]
pub struct Plan {
    pub status: ReflectionStatus,
    pub observed: BTreeMap<String, TaskMetrics>,
    pub deltas: BTreeMap<String, IntervalDelta>,
    pub clamped: bool,
    pub summary: String,
}

/// Hard bounds for one task: `[base / max_speedup, base * max_slowdown]`.
fn bounds(base_secs: u64, policy: &ReflectionConfig) -> (u64, u64) {
    let floor = ((base_secs as f64) / policy.max_speedup.max(1.0)).round() as u64;
    let ceiling = ((base_secs as f64) * policy.max_slowdown.max(1.0)).round() as u64;
    (floor.max(1), ceiling.max(1))
}

/// Decide interval adjustments for every observed task.
///
/// A struggling task (success rate below `low_water`) has its interval
/// doubled; a task running clean (success rate at or above `high_water`
/// with acceptable latency) has its interval halved back toward base. All
/// results are clamped to the per-task bounds, and a task with no samples
/// is left alone.
pub fn plan(
    observations: &BTreeMap<String, TaskObservation>,
    policy: &ReflectionConfig,
) -> Plan {
    let mut observed = BTreeMap::new();
    let mut deltas = BTreeMap::new();
    let mut clamped = false;

    let mut total_samples = 0usize;
    let mut weighted_success = 0.0f64;

    for (task_id, obs) in observations {
        observed.insert(task_id.clone(), obs.metrics.clone());
        if obs.metrics.samples == 0 {
            continue;
        }
        total_samples += obs.metrics.samples;
        weighted_success += obs.metrics.success_rate * obs.metrics.samples as f64;

        let (floor, ceiling) = bounds(obs.base_interval_secs, policy);
        let current = obs.current_interval_secs;

        let proposed = if obs.metrics.success_rate < policy.low_water {
            Some(current.saturating_mul(2))
        } else if obs.metrics.success_rate >= policy.high_water
            && obs.metrics.mean_latency_ms <= policy.latency_ceiling_ms
            && current > floor
        {
            Some((current / 2).max(floor))
        } else {
            None
        };

        if let Some(proposed) = proposed {
            let target = proposed.clamp(floor, ceiling);
            if target != proposed {
                clamped = true;
            }
            if target != current {
                deltas.insert(
                    task_id.clone(),
                    IntervalDelta {
                        from_secs: current,
                        to_secs: target,
                    },
                );
            }
        }
    }

    let status = if total_samples == 0 {
        ReflectionStatus::NoData
    } else {
        let overall = weighted_success / total_samples as f64;
        if overall >= 0.5 {
            ReflectionStatus::Stable
        } else if overall >= 0.2 {
            ReflectionStatus::Alert
        } else {
            ReflectionStatus::Critical
        }
    };

    let summary = if total_samples == 0 {
        "no outcomes to analyze".to_string()
    } else {
        let overall = weighted_success / total_samples as f64;
        format!(
            "{} status, {} task(s) observed over {} outcome(s), overall success {:.0}%, {} interval(s) adjusted{}",
            status,
            observations.len(),
            total_samples,
            overall * 100.0,
            deltas.len(),
            if clamped { " (clamped)" } else { "" },
        )
    };

    Plan {
        status,
        observed,
        deltas,
        clamped,
        summary,
    }
}

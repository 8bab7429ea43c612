//! Plain-text rendering of the agent's current state, for `hivemind status`.

use hive_state::StateSnapshot;
use std::collections::BTreeMap;
use std::fmt::Write;

/// How many trailing reflection records the report shows.
const REPORT_REFLECTIONS: usize = 5;

/// Render a snapshot as a human-readable status report.
///
/// `base_intervals` supplies the configured base interval per task so the
/// report can show effective vs. base where the reflector has adjusted one.
pub fn status_report(snapshot: &StateSnapshot, base_intervals: &BTreeMap<String, u64>) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "agent status:   {}", snapshot.status);
    let _ = writeln!(
        out,
        "boot time:      {}",
        snapshot.boot_time.format("%Y-%m-%d %H:%M:%S UTC")
    );
    match &snapshot.last_heartbeat {
        Some(at) => {
            let _ = writeln!(out, "last heartbeat: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        None => {
            let _ = writeln!(out, "last heartbeat: never");
        }
    }
    let _ = writeln!(out, "cycle count:    {}", snapshot.cycle_count);

    if snapshot.tasks.is_empty() {
        let _ = writeln!(out, "\ntasks: none recorded yet");
    } else {
        let _ = writeln!(out, "\ntasks:");
        for (task_id, record) in &snapshot.tasks {
            let base = base_intervals.get(task_id).copied();
            let effective = base.map(|b| snapshot.strategy.interval_for(task_id, b));
            let interval = match (base, effective) {
                (Some(b), Some(e)) if e != b => format!("{e}s (base {b}s)"),
                (Some(b), _) => format!("{b}s"),
                _ => "-".to_string(),
            };
            let _ = writeln!(
                out,
                "  {:<24} ok {:<6} failed {:<6} interval {}",
                task_id, record.success_count, record.failure_count, interval
            );
            if let Some(err) = &record.last_error {
                let _ = writeln!(
                    out,
                    "  {:<24} last error at {}: {}",
                    "",
                    err.at.format("%Y-%m-%d %H:%M:%S UTC"),
                    err.message
                );
            }
        }
    }

    if !snapshot.providers.is_empty() {
        let _ = writeln!(out, "\nproviders:");
        for (id, record) in &snapshot.providers {
            let _ = writeln!(
                out,
                "  {:<24} {:<12} consecutive failures {}",
                id, record.health, record.consecutive_failures
            );
        }
    }

    if snapshot.reflections.is_empty() {
        let _ = writeln!(out, "\nreflections: none yet");
    } else {
        let _ = writeln!(out, "\nrecent reflections:");
        let start = snapshot.reflections.len().saturating_sub(REPORT_REFLECTIONS);
        for record in &snapshot.reflections[start..] {
            let _ = writeln!(
                out,
                "  {} [{}] {}",
                record.at.format("%Y-%m-%d %H:%M"),
                record.status,
                record.summary
            );
        }
    }

    out
}

use anyhow::{Context, Result};
use hive_config::HivemindConfig;
use hive_provider::build_client;
use hive_reflector::{Reflector, status_report};
use hive_scheduler::{LoopConfig, Scheduler, TaskSpec};
use hive_state::StateStore;
use hive_state::store::STATE_FILE_NAME;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::tasks::{GenerationTask, ReflectTask};

/// Dispatch order slot for the reflection task: always after the
/// configured generation tasks.
const REFLECT_PRIORITY: u32 = 1000;

/// `hivemind run` / `hivemind run-once`.
///
/// Validates the config (no providers is fatal before the loop starts),
/// takes the single-instance lock, recovers or defaults the snapshot, and
/// drives the scheduler.
pub async fn run(config_path: &Path, once: bool) -> Result<()> {
    let config = HivemindConfig::load(config_path)?;
    hive_config::validate_config(&config)
        .with_context(|| format!("Invalid configuration: {}", config_path.display()))?;

    let state_dir = config.state_dir()?;
    let _lock = hive_state::acquire_state_lock(&state_dir, &config.agent.name)?;
    let store = Arc::new(StateStore::open(&state_dir)?);

    let client = Arc::new(build_client(&config.providers, &config.fallback)?);
    info!(
        agent = %config.agent.name,
        providers = config.providers.len(),
        tasks = config.schedule.tasks.len(),
        state_dir = %state_dir.display(),
        "starting"
    );

    let mut scheduler = Scheduler::new(Arc::clone(&store), LoopConfig::from(&config.schedule));
    let mut base_intervals = BTreeMap::new();
    for (id, task) in &config.schedule.tasks {
        let prompt = task.prompt.clone().unwrap_or_else(|| {
            format!("Work on the '{id}' objective and report concrete progress.")
        });
        let mut spec = TaskSpec::new(
            id.clone(),
            task.interval_secs,
            task.priority,
            Arc::new(GenerationTask::new(
                id.clone(),
                prompt,
                Arc::clone(&client),
                Arc::clone(&store),
            )),
        );
        if !task.enabled {
            spec = spec.disabled();
        } else {
            base_intervals.insert(id.clone(), task.interval_secs);
        }
        scheduler.register(spec);
    }

    let reflector = Reflector::new(Arc::clone(&store), config.reflection.clone(), base_intervals);
    scheduler.register(TaskSpec::new(
        "reflect",
        config.reflection.interval_secs,
        REFLECT_PRIORITY,
        Arc::new(ReflectTask::new(reflector)),
    ));

    if once {
        scheduler.run_once().await
    } else {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                let _ = shutdown_tx.send(true);
            }
        });
        scheduler.run(shutdown_rx).await
    }
}

/// `hivemind status`: read-only view of the persisted snapshot.
pub fn status(config_path: &Path) -> Result<()> {
    let config = HivemindConfig::load(config_path)?;
    let state_dir = config.state_dir()?;
    let state_path = state_dir.join(STATE_FILE_NAME);

    if !state_path.exists() {
        println!("no state recorded yet ({})", state_path.display());
        return Ok(());
    }

    let snapshot = hive_state::load(&state_path)?;
    let base_intervals: BTreeMap<String, u64> = config
        .schedule
        .tasks
        .iter()
        .map(|(id, task)| (id.clone(), task.interval_secs))
        .collect();
    print!("{}", status_report(&snapshot, &base_intervals));
    Ok(())
}

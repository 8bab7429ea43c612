use super::*;
use crate::task::{TaskHandler, TaskSpec};
use async_trait::async_trait;
use hive_state::StateStore;
use std::sync::atomic::AtomicUsize;
use tempfile::tempdir;

struct Recorder {
    runs: AtomicUsize,
    hold: Duration,
    fail: bool,
}

impl Recorder {
    fn instant() -> Arc<Self> {
        Arc::new(Self {
            runs: AtomicUsize::new(0),
            hold: Duration::ZERO,
            fail: false,
        })
    }

    fn slow(hold: Duration) -> Arc<Self> {
        Arc::new(Self {
            runs: AtomicUsize::new(0),
            hold,
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            runs: AtomicUsize::new(0),
            hold: Duration::ZERO,
            fail: true,
        })
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for Recorder {
    async fn run(&self) -> anyhow::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if !self.hold.is_zero() {
            tokio::time::sleep(self.hold).await;
        }
        if self.fail {
            anyhow::bail!("provider exploded");
        }
        Ok(())
    }
}

fn open_store() -> (tempfile::TempDir, Arc<StateStore>) {
    let dir = tempdir().unwrap();
    let store = Arc::new(StateStore::open(dir.path()).unwrap());
    (dir, store)
}

fn loop_config() -> LoopConfig {
    LoopConfig {
        tick_secs: 1,
        heartbeat_secs: 1,
        persist_secs: 60,
        shutdown_grace_secs: 5,
    }
}

fn far_future() -> DateTime<Utc> {
    Utc::now() + chrono::Duration::hours(1)
}

#[tokio::test]
async fn test_first_tick_dispatches_in_priority_then_id_order() {
    let (_dir, store) = open_store();
    let mut scheduler = Scheduler::new(store, loop_config());
    scheduler.register(TaskSpec::new("engagement", 60, 1, Recorder::instant()));
    scheduler.register(TaskSpec::new("review", 60, 0, Recorder::instant()));
    scheduler.register(TaskSpec::new("publish-paper", 60, 0, Recorder::instant()));

    let mut join_set = JoinSet::new();
    let dispatched = scheduler.tick(Utc::now(), &mut join_set);
    assert_eq!(dispatched, vec!["publish-paper", "review", "engagement"]);

    while join_set.join_next().await.is_some() {}
}

#[tokio::test]
async fn test_disabled_task_never_dispatched() {
    let (_dir, store) = open_store();
    let handler = Recorder::instant();
    let mut scheduler = Scheduler::new(store, loop_config());
    scheduler.register(TaskSpec::new("paused-task", 60, 0, handler.clone()).disabled());

    let mut join_set = JoinSet::new();
    assert!(scheduler.tick(Utc::now(), &mut join_set).is_empty());
    assert_eq!(handler.runs(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_task_is_not_dispatched_again() {
    let (_dir, store) = open_store();
    let handler = Recorder::slow(Duration::from_secs(10));
    let mut scheduler = Scheduler::new(store, loop_config());
    scheduler.register(TaskSpec::new("slow-task", 1, 0, handler.clone()));

    let mut join_set = JoinSet::new();
    assert_eq!(scheduler.tick(Utc::now(), &mut join_set).len(), 1);

    // Let the handler start and park on its sleep.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(handler.runs(), 1);

    // Well past due, but the previous run is still in flight.
    assert!(scheduler.tick(far_future(), &mut join_set).is_empty());

    // After completion the task becomes eligible again.
    tokio::time::sleep(Duration::from_secs(11)).await;
    while join_set.join_next().await.is_some() {}
    assert_eq!(scheduler.tick(far_future(), &mut join_set).len(), 1);

    tokio::time::sleep(Duration::from_secs(11)).await;
    while join_set.join_next().await.is_some() {}
    assert_eq!(handler.runs(), 2);
}

#[tokio::test]
async fn test_success_outcome_recorded_and_rescheduled() {
    let (_dir, store) = open_store();
    let mut scheduler = Scheduler::new(Arc::clone(&store), loop_config());
    scheduler.register(TaskSpec::new("publish-paper", 3600, 0, Recorder::instant()));

    scheduler.run_once().await.unwrap();

    let snap = store.snapshot();
    let record = &snap.tasks["publish-paper"];
    assert_eq!(record.success_count, 1);
    assert_eq!(record.failure_count, 0);
    assert!(record.last_run.is_some());
    let next_due = record.next_due.unwrap();
    assert!(next_due > Utc::now() + chrono::Duration::seconds(3500));
    // run_once persists.
    assert!(store.state_path().exists());
}

#[tokio::test]
async fn test_failure_outcome_records_error() {
    let (_dir, store) = open_store();
    let mut scheduler = Scheduler::new(Arc::clone(&store), loop_config());
    scheduler.register(TaskSpec::new("publish-paper", 60, 0, Recorder::failing()));

    scheduler.run_once().await.unwrap();

    let snap = store.snapshot();
    let record = &snap.tasks["publish-paper"];
    assert_eq!(record.failure_count, 1);
    assert_eq!(record.success_count, 0);
    let last_error = record.last_error.as_ref().unwrap();
    assert!(last_error.message.contains("provider exploded"));
    // Rescheduled despite the failure.
    assert!(record.next_due.is_some());
}

#[tokio::test]
async fn test_reschedule_derives_from_completion_time() {
    let (_dir, store) = open_store();
    let mut scheduler = Scheduler::new(Arc::clone(&store), loop_config());
    scheduler.register(TaskSpec::new(
        "publish-paper",
        3600,
        0,
        Recorder::slow(Duration::from_millis(50)),
    ));

    scheduler.run_once().await.unwrap();

    // last_run and next_due share one reference instant: next_due is
    // exactly one interval past last_run even for a slow handler.
    let record = store.snapshot().tasks["publish-paper"].clone();
    let last_run = record.last_run.unwrap();
    assert_eq!(
        record.next_due.unwrap(),
        last_run + chrono::Duration::seconds(3600)
    );
}

#[tokio::test]
async fn test_next_due_honors_strategy_interval() {
    let (_dir, store) = open_store();
    store.mutate(|s| {
        s.strategy
            .interval_secs
            .insert("publish-paper".to_string(), 7200);
    });
    let mut scheduler = Scheduler::new(Arc::clone(&store), loop_config());
    scheduler.register(TaskSpec::new("publish-paper", 60, 0, Recorder::instant()));

    scheduler.run_once().await.unwrap();

    let next_due = store.snapshot().tasks["publish-paper"].next_due.unwrap();
    // Base is 60s; the strategy override of 7200s must win.
    assert!(next_due > Utc::now() + chrono::Duration::seconds(7000));
}

#[tokio::test]
async fn test_task_not_due_is_skipped() {
    let (_dir, store) = open_store();
    let handler = Recorder::instant();
    let mut scheduler = Scheduler::new(Arc::clone(&store), loop_config());
    scheduler.register(TaskSpec::new("publish-paper", 3600, 0, handler.clone()));

    scheduler.run_once().await.unwrap();
    assert_eq!(handler.runs(), 1);

    // Freshly rescheduled an hour out; a tick now dispatches nothing.
    let mut join_set = JoinSet::new();
    assert!(scheduler.tick(Utc::now(), &mut join_set).is_empty());
    assert_eq!(handler.runs(), 1);
}

#[tokio::test]
async fn test_trigger_bypasses_due_time() {
    let (_dir, store) = open_store();
    let handler = Recorder::instant();
    let mut scheduler = Scheduler::new(Arc::clone(&store), loop_config());
    scheduler.register(TaskSpec::new("publish-paper", 3600, 0, handler.clone()));

    scheduler.run_once().await.unwrap();
    scheduler.trigger("publish-paper").await.unwrap();
    assert_eq!(handler.runs(), 2);
    assert_eq!(store.snapshot().tasks["publish-paper"].success_count, 2);
}

#[tokio::test]
async fn test_trigger_unknown_task() {
    let (_dir, store) = open_store();
    let scheduler = Scheduler::new(store, loop_config());
    let err = scheduler.trigger("no-such-task").await.unwrap_err();
    assert!(matches!(err, HivemindError::TaskNotFound(_)));
}

#[tokio::test]
async fn test_trigger_disabled_task() {
    let (_dir, store) = open_store();
    let mut scheduler = Scheduler::new(store, loop_config());
    scheduler.register(TaskSpec::new("paused-task", 60, 0, Recorder::instant()).disabled());
    let err = scheduler.trigger("paused-task").await.unwrap_err();
    assert!(matches!(err, HivemindError::TaskDisabled(_)));
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_heartbeats_and_shuts_down_cleanly() {
    let (_dir, store) = open_store();
    let handler = Recorder::instant();
    let mut scheduler = Scheduler::new(Arc::clone(&store), loop_config());
    scheduler.register(TaskSpec::new("publish-paper", 3600, 0, handler.clone()));

    let (tx, rx) = watch::channel(false);
    let stopper = async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        tx.send(true).unwrap();
    };
    let (result, ()) = tokio::join!(scheduler.run(rx), stopper);
    result.unwrap();

    let snap = store.snapshot();
    assert_eq!(snap.status, AgentStatus::Stopped);
    assert!(snap.cycle_count >= 1, "heartbeat never fired");
    assert!(snap.last_heartbeat.is_some());
    assert_eq!(handler.runs(), 1);

    // Final snapshot reached disk.
    let persisted = hive_state::load(store.state_path()).unwrap();
    assert_eq!(persisted.status, AgentStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_tasks_past_grace_period() {
    let (_dir, store) = open_store();
    let handler = Recorder::slow(Duration::from_secs(600));
    let config = LoopConfig {
        shutdown_grace_secs: 2,
        ..loop_config()
    };
    let mut scheduler = Scheduler::new(Arc::clone(&store), config);
    scheduler.register(TaskSpec::new("stuck-task", 3600, 0, handler.clone()));

    let (tx, rx) = watch::channel(false);
    let stopper = async {
        // Let the first tick dispatch the slow task, then ask for shutdown.
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
    };
    let (result, ()) = tokio::join!(scheduler.run(rx), stopper);
    result.unwrap();

    let snap = store.snapshot();
    assert_eq!(snap.status, AgentStatus::Stopped);
    // The stuck run was aborted before recording an outcome.
    assert!(
        snap.tasks
            .get("stuck-task")
            .map(|r| r.success_count + r.failure_count)
            .unwrap_or(0)
            == 0
    );
}

use async_trait::async_trait;
use std::sync::Arc;

/// The body of a recurring task.
///
/// Handlers own their work end to end; the scheduler measures latency,
/// records the outcome, and never lets a handler error escape the loop.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self) -> anyhow::Result<()>;
}

/// A recurring task as registered at startup. Tasks are never destroyed at
/// runtime, only disabled.
#[derive(Clone)]
pub struct TaskSpec {
    pub id: String,
    /// Base interval between runs, in seconds. The effective interval may
    /// differ at runtime via the persisted strategy parameters.
    pub base_interval_secs: u64,
    /// Lower runs first when several tasks come due in the same tick; ties
    /// broken by task id.
    pub priority: u32,
    pub enabled: bool,
    pub handler: Arc<dyn TaskHandler>,
}

impl TaskSpec {
    pub fn new(
        id: impl Into<String>,
        base_interval_secs: u64,
        priority: u32,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        Self {
            id: id.into(),
            base_interval_secs,
            priority,
            enabled: true,
            handler,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

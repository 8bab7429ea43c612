//! Task handlers registered by the CLI: generation tasks that push a
//! configured prompt through the fallback client, and the periodic
//! reflection pass.

use async_trait::async_trait;
use hive_core::types::GenerationRequest;
use hive_provider::FallbackClient;
use hive_reflector::Reflector;
use hive_scheduler::TaskHandler;
use hive_state::StateStore;
use std::sync::Arc;
use tracing::info;

pub struct GenerationTask {
    id: String,
    prompt: String,
    client: Arc<FallbackClient>,
    store: Arc<StateStore>,
}

impl GenerationTask {
    pub fn new(
        id: impl Into<String>,
        prompt: impl Into<String>,
        client: Arc<FallbackClient>,
        store: Arc<StateStore>,
    ) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            client,
            store,
        }
    }

    /// Copy the client's current provider-health view into the snapshot.
    /// Health only changes inside `generate`, so refreshing here keeps the
    /// persisted view current.
    fn refresh_provider_health(&self) {
        let healths = self.client.health_snapshot();
        self.store.mutate(|s| {
            for p in &healths {
                s.record_provider_health(&p.id, p.health, p.consecutive_failures);
            }
        });
    }
}

#[async_trait]
impl TaskHandler for GenerationTask {
    async fn run(&self) -> anyhow::Result<()> {
        let request = GenerationRequest::new(self.prompt.as_str());
        let result = self.client.generate(&request).await;
        self.refresh_provider_health();
        let generation = result?;
        info!(
            task = %self.id,
            provider = %generation.provider,
            latency_ms = generation.latency_ms,
            chars = generation.text.len(),
            "generation complete"
        );
        Ok(())
    }
}

pub struct ReflectTask {
    reflector: Reflector,
}

impl ReflectTask {
    pub fn new(reflector: Reflector) -> Self {
        Self { reflector }
    }
}

#[async_trait]
impl TaskHandler for ReflectTask {
    async fn run(&self) -> anyhow::Result<()> {
        let record = self.reflector.pass();
        info!(
            status = %record.status,
            adjustments = record.deltas.len(),
            clamped = record.clamped,
            "reflection pass complete"
        );
        Ok(())
    }
}

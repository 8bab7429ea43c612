use async_trait::async_trait;
use hive_core::types::{GenerationRequest, ProviderFailure};

/// One interchangeable generation backend.
///
/// Implementations perform a single attempt with no retry or health logic of
/// their own; fallback, timeouts, and health tracking belong to
/// [`crate::FallbackClient`].
#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderFailure>;
}

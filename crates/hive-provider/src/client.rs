//! The fallback client: one `generate` call walks the provider list in
//! priority order and returns the first success.

use hive_config::FallbackConfig;
use hive_core::HivemindError;
use hive_core::types::{Generation, GenerationRequest, ProviderFailure};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::health::{HealthSlot, ProviderHealthSnapshot};
use crate::provider::Provider;

/// One provider handed to the client, in priority order (first = tried
/// first).
pub struct ClientProvider {
    pub provider: Arc<dyn Provider>,
    /// Per-attempt timeout for this provider.
    pub timeout: Duration,
    /// Env var that was expected to hold credentials, when they were absent
    /// at startup. Such a provider is registered permanently unavailable.
    pub missing_credentials: Option<String>,
}

struct Entry {
    provider: Arc<dyn Provider>,
    timeout: Duration,
    health: HealthSlot,
}

/// Routes generation requests through the best currently-viable provider.
///
/// Holds no cross-request ordering guarantee: concurrent callers may race
/// to use the same provider; health updates are serialized per slot.
pub struct FallbackClient {
    entries: Vec<Entry>,
}

impl std::fmt::Debug for FallbackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackClient")
            .field(
                "entries",
                &self.entries.iter().map(|e| e.provider.id()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl FallbackClient {
    /// Build a client from providers listed in priority order.
    ///
    /// Fails with `NoProvidersConfigured` on an empty list: a client that
    /// can never generate must be rejected at startup, not discovered at
    /// the first dispatch.
    pub fn new(
        providers: Vec<ClientProvider>,
        policy: &FallbackConfig,
    ) -> Result<Self, HivemindError> {
        if providers.is_empty() {
            return Err(HivemindError::NoProvidersConfigured);
        }

        let entries = providers
            .into_iter()
            .map(|cp| {
                let health = HealthSlot::new(cp.provider.id(), policy.clone());
                if let Some(env) = cp.missing_credentials {
                    warn!(
                        provider = cp.provider.id(),
                        env, "credentials absent, provider registered unavailable"
                    );
                    health.mark_unavailable(ProviderFailure::MissingCredentials(env));
                }
                Entry {
                    provider: cp.provider,
                    timeout: cp.timeout,
                    health,
                }
            })
            .collect();

        Ok(Self { entries })
    }

    /// Try providers in ascending priority order and return the first
    /// success. Skips UNAVAILABLE providers and those still in cooldown
    /// (expiry is re-checked here, lazily).
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Generation, HivemindError> {
        let mut attempts: Vec<(String, ProviderFailure)> = Vec::new();

        for entry in &self.entries {
            let id = entry.provider.id();

            if let Err(skip) = entry.health.check_eligible() {
                debug!(provider = id, reason = %skip, "skipping provider");
                attempts.push((id.to_string(), skip));
                continue;
            }

            let started = Instant::now();
            let outcome =
                tokio::time::timeout(entry.timeout, entry.provider.generate(request)).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            let failure = match outcome {
                Ok(Ok(text)) => {
                    entry.health.on_success();
                    debug!(provider = id, latency_ms, "generation succeeded");
                    return Ok(Generation {
                        text,
                        provider: id.to_string(),
                        latency_ms,
                    });
                }
                Ok(Err(failure)) => failure,
                Err(_) => ProviderFailure::Timeout {
                    secs: entry.timeout.as_secs(),
                },
            };

            // A provider that answers with a skip marker was not really
            // attempted; only real attempt failures advance its counter.
            if failure.is_attempt() {
                entry.health.on_failure();
            }
            warn!(
                provider = id,
                error = %failure,
                health = %entry.health.health(),
                "provider attempt failed, trying next"
            );
            attempts.push((id.to_string(), failure));
        }

        Err(HivemindError::ProvidersExhausted { attempts })
    }

    /// Current health of every provider, in priority order.
    pub fn health_snapshot(&self) -> Vec<ProviderHealthSnapshot> {
        self.entries.iter().map(|e| e.health.snapshot()).collect()
    }
}

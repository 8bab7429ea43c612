//! Domain types shared across the scheduler, provider client, and reflector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single generation request routed through the fallback client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// User prompt.
    pub prompt: String,

    /// System prompt prepended to every provider call.
    #[serde(default = "default_system_prompt")]
    pub system: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_system_prompt() -> String {
    "You are hivemind, an autonomous AI research agent.".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.7
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: default_system_prompt(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A successful generation, tagged with the provider that served it.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub provider: String,
    pub latency_ms: u64,
}

/// Typed failure from a single provider attempt.
///
/// `Timeout`, `RateLimit`, `Transport`, and `Api` are transient: the
/// fallback client advances to the next provider. `Auth` and
/// `MissingCredentials` indicate configuration problems that will not heal
/// without a restart.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("credentials not configured (env var '{0}' unset)")]
    MissingCredentials(String),

    #[error("skipped: in cooldown for {remaining_secs}s more")]
    InCooldown { remaining_secs: u64 },

    #[error("skipped: marked unavailable")]
    Unavailable,
}

impl ProviderFailure {
    /// Whether this failure should count against provider health.
    ///
    /// Skip markers (`InCooldown`, `Unavailable`) describe why a provider
    /// was not attempted; they must not advance its failure counter.
    pub fn is_attempt(&self) -> bool {
        !matches!(
            self,
            ProviderFailure::InCooldown { .. } | ProviderFailure::Unavailable
        )
    }
}

/// Provider health as tracked by the fallback client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderHealth {
    #[default]
    Healthy,
    /// Crossed the failure threshold; skipped until cooldown expires.
    Degraded,
    /// Out of rotation for the remainder of the process lifetime.
    Unavailable,
}

impl std::fmt::Display for ProviderHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderHealth::Healthy => write!(f, "healthy"),
            ProviderHealth::Degraded => write!(f, "degraded"),
            ProviderHealth::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Result of one task dispatch, recorded into the state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub success: bool,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl TaskOutcome {
    pub fn success(task_id: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            task_id: task_id.into(),
            success: true,
            latency_ms,
            error: None,
            at: Utc::now(),
        }
    }

    pub fn failure(task_id: impl Into<String>, latency_ms: u64, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            latency_ms,
            error: Some(error.into()),
            at: Utc::now(),
        }
    }
}

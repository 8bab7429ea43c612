use crate::types::ProviderFailure;

#[derive(thiserror::Error, Debug)]
pub enum HivemindError {
    #[error("No generation providers configured")]
    NoProvidersConfigured,

    #[error("All {} providers exhausted", attempts.len())]
    ProvidersExhausted {
        /// (provider id, last failure) for every provider actually attempted
        /// or skipped as UNAVAILABLE/in-cooldown during this call.
        attempts: Vec<(String, ProviderFailure)>,
    },

    #[error("State file corrupted at '{path}': {reason}")]
    StateCorrupted { path: String, reason: String },

    #[error("State schema version mismatch: found {found}, expected {expected}")]
    SchemaMismatch { found: u32, expected: u32 },

    #[error("No task registered with id '{0}'")]
    TaskNotFound(String),

    #[error("Task '{0}' is disabled")]
    TaskDisabled(String),

    #[error("State directory locked by PID {0}")]
    StateLocked(u32),
}

impl HivemindError {
    /// Last failure seen for `provider` inside a `ProvidersExhausted` error.
    pub fn failure_for(&self, provider: &str) -> Option<&ProviderFailure> {
        match self {
            HivemindError::ProvidersExhausted { attempts } => attempts
                .iter()
                .find(|(id, _)| id == provider)
                .map(|(_, f)| f),
            _ => None,
        }
    }
}

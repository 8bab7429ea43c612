//! Shared error and domain types for the hivemind orchestration core.

pub mod error;
pub mod types;

pub use error::HivemindError;
pub use types::{
    Generation, GenerationRequest, ProviderFailure, ProviderHealth, TaskOutcome,
};

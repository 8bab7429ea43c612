//! Provider fallback client: tries backends in priority order, tracking
//! per-provider health (failure counts, cooldowns) along the way.

pub mod client;
pub mod health;
pub mod http;
pub mod provider;

pub use client::{ClientProvider, FallbackClient};
pub use health::{HealthSlot, ProviderHealthSnapshot};
pub use http::{GeminiProvider, OpenAiCompatProvider, build_client};
pub use provider::Provider;

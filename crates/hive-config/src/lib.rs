//! Configuration loading and validation (hivemind.toml).

pub mod config;
pub mod validate;

pub use config::{
    CURRENT_SCHEMA_VERSION, AgentMeta, FallbackConfig, HivemindConfig, ProviderConfig,
    ProviderKind, ReflectionConfig, ScheduleConfig, TaskConfig,
};
pub use validate::validate_config;

//! Durable scheduler state: snapshot types, the crash-safe store, and the
//! single-instance state-directory lock.

pub mod lock;
pub mod snapshot;
pub mod store;

pub use lock::{StateLock, acquire_state_lock};
pub use snapshot::{
    AgentStatus, CURRENT_SCHEMA_VERSION, IntervalDelta, LastError, OUTCOME_WINDOW_CAP,
    OutcomeSample, ProviderHealthRecord, REFLECTION_HISTORY_CAP, ReflectionRecord,
    ReflectionStatus, StateSnapshot, StrategyParams, TaskMetrics, TaskRecord,
};
pub use store::{StateStore, load};

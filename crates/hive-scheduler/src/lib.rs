//! Tick-driven task scheduler: dispatches recurring tasks in priority
//! order, enforces one in-flight invocation per task, and drives heartbeat
//! and persistence cadences.

pub mod scheduler;
pub mod task;

pub use scheduler::{LoopConfig, Scheduler};
pub use task::{TaskHandler, TaskSpec};

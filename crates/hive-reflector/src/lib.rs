//! Strategy reflector: periodically reviews recent task outcomes and
//! adjusts effective task intervals within configured bounds. Planning is
//! pure; only the application step touches the state store.

pub mod plan;
pub mod reflector;
pub mod report;

pub use plan::{Plan, TaskObservation, plan};
pub use reflector::Reflector;
pub use report::status_report;

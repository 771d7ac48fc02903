//! Core domain types for pakflow

mod package;
mod task;

pub use package::PackageRef;
pub use task::{FinishedPayload, LinePayload, TaskId, TaskKind, TaskOutcome};

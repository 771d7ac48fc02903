//! Backend boundary: the process-execution service driving the external
//! package-manager binary.
//!
//! The backend multiplexes every task of one kind onto a single pair of
//! push-event streams, so consumers filter by task id. Acceptance of a start
//! call means the backend will eventually emit line and finished events for
//! that id, or never emit anything if the external process crashes; no
//! compensation for the latter exists at this boundary.

mod process;

pub use process::ProcessBackend;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::{FinishedPayload, LinePayload, TaskKind};

/// Errors crossing the backend boundary
#[derive(Debug, Error)]
pub enum BackendError {
    /// The RPC call itself failed; no task was started
    #[error("backend transport error: {0}")]
    Transport(String),

    /// The external binary could not be spawned
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Request/response and push-event interface of the execution backend
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Start a task of `kind` for the package `id` with fully-built flags.
    ///
    /// Acknowledgement only; completion arrives as a finished event.
    async fn start(&self, kind: TaskKind, id: &str, flags: &[String]) -> Result<(), BackendError>;

    /// Best-effort stop of the task running for `id`.
    ///
    /// Does not guarantee cessation timing; the task still reports its own
    /// finished event. Unknown ids are ignored.
    async fn stop(&self, kind: TaskKind, id: &str) -> Result<(), BackendError>;

    /// Subscribe to raw output chunks for all tasks of `kind`
    fn watch_lines(&self, kind: TaskKind) -> Result<broadcast::Receiver<LinePayload>, BackendError>;

    /// Subscribe to completion notices for all tasks of `kind`
    fn watch_finished(
        &self,
        kind: TaskKind,
    ) -> Result<broadcast::Receiver<FinishedPayload>, BackendError>;
}

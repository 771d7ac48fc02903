use serde::{Deserialize, Serialize};

/// Opaque identifier correlating a start request to its line/finished events.
///
/// For winget-style backends this is the package id the task was started for.
pub type TaskId = String;

/// The kind of backend task a session executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Install,
    Uninstall,
    Upgrade,
    Download,
}

impl TaskKind {
    /// Subcommand passed to the package-manager binary
    pub fn verb(&self) -> &'static str {
        match self {
            TaskKind::Install => "install",
            TaskKind::Uninstall => "uninstall",
            TaskKind::Upgrade => "upgrade",
            TaskKind::Download => "download",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.verb())
    }
}

/// A chunk of raw output from a running task.
///
/// `line` is a transport framing unit, not a rendered line: it may hold a
/// partial escape sequence, several newlines, or nothing at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinePayload {
    /// Task id the chunk belongs to
    pub id: TaskId,
    /// Source stream ("stdout" or "stderr")
    pub stream: String,
    /// Raw text chunk, control bytes included
    pub line: String,
}

/// Completion notice for a task, delivered exactly once per accepted start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishedPayload {
    /// Task id the notice belongs to
    pub id: TaskId,
    /// Whether the backend process exited successfully
    pub success: bool,
    /// Process exit code when one was available
    pub code: Option<i32>,
}

/// Terminal outcome of one executed task, as reported to the user.
///
/// `Stopped` is derived locally: the backend only reports success or failure,
/// so a non-successful finish after the user requested a stop is classified
/// as stopped rather than failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed,
    Stopped,
}

impl std::fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOutcome::Succeeded => write!(f, "succeeded"),
            TaskOutcome::Failed => write!(f, "failed"),
            TaskOutcome::Stopped => write!(f, "stopped"),
        }
    }
}

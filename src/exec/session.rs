//! Per-task-kind execution session.
//!
//! A session owns one log buffer and at most one live event channel. Its
//! state machine is `Idle -> Running -> {Finished | Stopped} -> Idle`; the
//! transition out of `Running` is driven solely by the backend's finished
//! event for the session's own task id.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use super::channel::{ChannelEvent, ChannelGuard, EventChannel};
use crate::backend::TaskBackend;
use crate::terminal::TerminalBuffer;
use crate::{PackageRef, TaskId, TaskKind, TaskOutcome};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No task associated; ready to start
    Idle,
    /// Start RPC accepted, finished event not yet received
    Running,
    /// Task reported completion
    Finished { success: bool },
    /// Task finished unsuccessfully after the user requested a stop
    Stopped,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Finished { .. } | SessionState::Stopped)
    }

    /// Outcome classification for terminal states
    pub fn outcome(&self) -> Option<TaskOutcome> {
        match self {
            SessionState::Finished { success: true } => Some(TaskOutcome::Succeeded),
            SessionState::Finished { success: false } => Some(TaskOutcome::Failed),
            SessionState::Stopped => Some(TaskOutcome::Stopped),
            _ => None,
        }
    }
}

struct SessionInner {
    task_id: Option<TaskId>,
    state: SessionState,
    stop_requested: bool,
    buffer: TerminalBuffer,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            task_id: None,
            state: SessionState::Idle,
            stop_requested: false,
            buffer: TerminalBuffer::new(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Cloneable read/control surface of a session, safe to hand to a UI layer
/// or a batch canceller while the session itself is being awaited.
#[derive(Clone)]
pub struct SessionHandle {
    backend: Arc<dyn TaskBackend>,
    kind: TaskKind,
    inner: Arc<Mutex<SessionInner>>,
}

impl SessionHandle {
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.lock().state == SessionState::Running
    }

    /// Full rendered log text, terminal-processed
    pub fn rendered_log(&self) -> String {
        self.lock().buffer.rendered()
    }

    /// Snapshot of the completed (newline-terminated) log lines
    pub fn completed_lines(&self) -> Vec<String> {
        self.lock().buffer.completed_lines().to_vec()
    }

    /// Append front-end text (banners, separators) through the same
    /// terminal pipeline the backend output flows through
    pub fn append_log(&self, text: &str) {
        self.lock().buffer.append(text);
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.lock().started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.lock().finished_at
    }

    /// Request a stop of the running task, if one is running.
    ///
    /// Records the stop request locally before issuing the best-effort stop
    /// RPC; the session stays `Running` until the backend reports the
    /// finished event. Returns whether a stop was actually requested.
    pub async fn stop_if_running(&self) -> Result<bool> {
        let task_id = {
            let mut inner = self.lock();
            if inner.state != SessionState::Running {
                return Ok(false);
            }
            inner.stop_requested = true;
            inner.task_id.clone()
        };
        let Some(task_id) = task_id else {
            return Ok(false);
        };

        self.backend
            .stop(self.kind, &task_id)
            .await
            .with_context(|| format!("failed to stop {} task for {task_id}", self.kind))?;
        Ok(true)
    }

    /// Request a stop; errors when no task is running
    pub async fn stop(&self) -> Result<()> {
        if !self.stop_if_running().await? {
            bail!("no running {} task to stop", self.kind);
        }
        Ok(())
    }
}

/// One execution context for a task kind, reusable across targets
pub struct ExecutionSession {
    handle: SessionHandle,
    guard: Option<ChannelGuard>,
    done: Option<oneshot::Receiver<TaskOutcome>>,
}

impl ExecutionSession {
    pub fn new(backend: Arc<dyn TaskBackend>, kind: TaskKind) -> Self {
        Self {
            handle: SessionHandle {
                backend,
                kind,
                inner: Arc::new(Mutex::new(SessionInner::new())),
            },
            guard: None,
            done: None,
        }
    }

    /// Cloneable surface for UI polling and cancellation
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn kind(&self) -> TaskKind {
        self.handle.kind
    }

    pub fn state(&self) -> SessionState {
        self.handle.state()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    pub fn rendered_log(&self) -> String {
        self.handle.rendered_log()
    }

    pub fn append_log(&self, text: &str) {
        self.handle.append_log(text);
    }

    /// Start a task for `target`.
    ///
    /// A terminal session rearms to `Idle` first, keeping the accumulated
    /// log (a batch log is one chronological stream). On a rejected start
    /// the session is left `Idle` with no live subscription.
    pub async fn start(&mut self, target: &PackageRef, flags: &[String]) -> Result<()> {
        let kind = self.handle.kind;
        {
            let mut inner = self.handle.lock();
            if inner.state == SessionState::Running {
                bail!("a {kind} task is already running");
            }
            inner.state = SessionState::Idle;
            inner.stop_requested = false;
            inner.task_id = Some(target.id.clone());
            inner.finished_at = None;
        }
        self.guard.take();
        self.done = None;

        // Subscribe before the start RPC so no event can fall between the
        // acknowledgement and the subscription; rolled back on rejection.
        let channel = match EventChannel::open(&*self.handle.backend, kind, target.id.clone()) {
            Ok(channel) => channel,
            Err(e) => {
                self.handle.lock().task_id = None;
                return Err(e).with_context(|| format!("failed to subscribe to {kind} events"));
            }
        };

        if let Err(e) = self.handle.backend.start(kind, &target.id, flags).await {
            drop(channel);
            self.handle.lock().task_id = None;
            return Err(e).with_context(|| format!("failed to start {kind} for {target}"));
        }

        // Mark Running before the pump exists: events may already sit in the
        // subscription, and a pump that wins the lock only ever moves
        // Running to a terminal state. The reverse order would let start()
        // stomp an already-performed terminal transition.
        {
            let mut inner = self.handle.lock();
            inner.state = SessionState::Running;
            inner.started_at = Some(Utc::now());
        }

        let (done_tx, done_rx) = oneshot::channel();
        let inner = self.handle.inner.clone();
        let pump = tokio::spawn(pump_events(channel, inner, done_tx));
        self.guard = Some(ChannelGuard::new(pump));
        self.done = Some(done_rx);
        Ok(())
    }

    /// Request a stop of the running task
    pub async fn stop(&self) -> Result<()> {
        self.handle.stop().await
    }

    /// Await the terminal state of the task started last.
    ///
    /// Errors if no task was started or if the backend dropped its event
    /// streams without ever reporting completion.
    pub async fn wait(&mut self) -> Result<TaskOutcome> {
        let done = self
            .done
            .take()
            .context("no task has been started on this session")?;
        let outcome = match done.await {
            Ok(outcome) => outcome,
            Err(_) => {
                // Pump ended without a finished event: backend went away
                if let Some(mut guard) = self.guard.take() {
                    guard.release();
                }
                bail!(
                    "backend closed its {} event streams before reporting completion",
                    self.handle.kind
                );
            }
        };
        // Pump has already torn the channel down; releasing again is a no-op
        if let Some(mut guard) = self.guard.take() {
            guard.release();
        }
        Ok(outcome)
    }

    /// Clear the log and return to `Idle`, as when a dialog is reopened
    /// for a new target. Not permitted while a task is running.
    pub fn reset(&mut self) -> Result<()> {
        {
            let mut inner = self.handle.lock();
            if inner.state == SessionState::Running {
                bail!("cannot reset a session with a running {} task", self.handle.kind);
            }
            inner.state = SessionState::Idle;
            inner.stop_requested = false;
            inner.task_id = None;
            inner.buffer.clear();
            inner.started_at = None;
            inner.finished_at = None;
        }
        if let Some(mut guard) = self.guard.take() {
            guard.release();
        }
        self.done = None;
        Ok(())
    }
}

/// Fold channel events into the session state until the task finishes.
///
/// A matching finished event performs the terminal transition exactly once;
/// the channel (and with it both subscriptions) is dropped when this
/// returns. If the streams close without a finished event the session is
/// left `Running` — the backend process lifetime is authoritative and no
/// local timeout masks its absence.
async fn pump_events(
    mut channel: EventChannel,
    inner: Arc<Mutex<SessionInner>>,
    done: oneshot::Sender<TaskOutcome>,
) {
    while let Some(event) = channel.recv().await {
        match event {
            ChannelEvent::Line(payload) => {
                let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
                inner.buffer.append(&payload.line);
            }
            ChannelEvent::Finished(payload) => {
                let outcome = {
                    let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
                    let state = if inner.stop_requested && !payload.success {
                        SessionState::Stopped
                    } else {
                        SessionState::Finished {
                            success: payload.success,
                        }
                    };
                    inner.state = state;
                    inner.finished_at = Some(Utc::now());
                    state.outcome()
                };
                if let Some(outcome) = outcome {
                    let _ = done.send(outcome);
                }
                return;
            }
        }
    }
    tracing::warn!(
        task = %channel.task_id(),
        "event streams closed before a finished event; session stays running"
    );
}

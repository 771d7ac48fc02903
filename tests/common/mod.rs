//! Shared test utilities: a scripted in-memory backend

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use pakflow::backend::{BackendError, TaskBackend};
use pakflow::{FinishedPayload, LinePayload, TaskKind};

/// Scripted behavior for one package id
#[derive(Debug, Clone)]
pub enum Script {
    /// Emit the chunks, then finish with `success`
    Finish {
        chunks: Vec<&'static str>,
        success: bool,
    },
    /// Emit the chunks, then finish unsuccessfully only once `stop` is called
    FinishOnStop { chunks: Vec<&'static str> },
    /// Reject the start RPC with a transport error
    RejectStart,
}

/// In-memory backend multiplexing all tasks onto one stream pair,
/// mirroring the real backend's per-kind event channels
pub struct FakeBackend {
    lines: broadcast::Sender<LinePayload>,
    finished: broadcast::Sender<FinishedPayload>,
    start_events: broadcast::Sender<String>,
    scripts: Mutex<HashMap<String, Script>>,
    started: Mutex<Vec<String>>,
    pending_stop: Mutex<HashSet<String>>,
    fail_finished_subscribe: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            lines: broadcast::channel(256).0,
            finished: broadcast::channel(256).0,
            start_events: broadcast::channel(256).0,
            scripts: Mutex::new(HashMap::new()),
            started: Mutex::new(Vec::new()),
            pending_stop: Mutex::new(HashSet::new()),
            fail_finished_subscribe: AtomicBool::new(false),
        })
    }

    pub fn script(&self, id: &str, script: Script) {
        self.scripts.lock().unwrap().insert(id.to_string(), script);
    }

    /// Ids for which a start RPC was issued, in call order
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    /// Stream of start RPC calls, for tests that react to one
    pub fn start_calls(&self) -> broadcast::Receiver<String> {
        self.start_events.subscribe()
    }

    pub fn emit_line(&self, id: &str, text: &str) {
        let _ = self.lines.send(LinePayload {
            id: id.to_string(),
            stream: "stdout".to_string(),
            line: text.to_string(),
        });
    }

    pub fn emit_finished(&self, id: &str, success: bool) {
        let _ = self.finished.send(FinishedPayload {
            id: id.to_string(),
            success,
            code: if success { Some(0) } else { Some(1) },
        });
    }

    pub fn line_subscribers(&self) -> usize {
        self.lines.receiver_count()
    }

    pub fn finished_subscribers(&self) -> usize {
        self.finished.receiver_count()
    }

    /// Make finished-stream subscriptions fail, to exercise
    /// partial-subscription rollback
    pub fn fail_finished_subscribe(&self, fail: bool) {
        self.fail_finished_subscribe.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskBackend for FakeBackend {
    async fn start(&self, _kind: TaskKind, id: &str, _flags: &[String]) -> Result<(), BackendError> {
        self.started.lock().unwrap().push(id.to_string());
        let _ = self.start_events.send(id.to_string());

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_else(|| panic!("no script for {id}"));

        match script {
            Script::RejectStart => Err(BackendError::Transport(format!(
                "start rejected for {id}"
            ))),
            Script::Finish { chunks, success } => {
                for chunk in chunks {
                    self.emit_line(id, chunk);
                }
                self.emit_finished(id, success);
                Ok(())
            }
            Script::FinishOnStop { chunks } => {
                for chunk in chunks {
                    self.emit_line(id, chunk);
                }
                self.pending_stop.lock().unwrap().insert(id.to_string());
                Ok(())
            }
        }
    }

    async fn stop(&self, _kind: TaskKind, id: &str) -> Result<(), BackendError> {
        let was_pending = self.pending_stop.lock().unwrap().remove(id);
        if was_pending {
            self.emit_finished(id, false);
        }
        Ok(())
    }

    fn watch_lines(
        &self,
        _kind: TaskKind,
    ) -> Result<broadcast::Receiver<LinePayload>, BackendError> {
        Ok(self.lines.subscribe())
    }

    fn watch_finished(
        &self,
        _kind: TaskKind,
    ) -> Result<broadcast::Receiver<FinishedPayload>, BackendError> {
        if self.fail_finished_subscribe.load(Ordering::SeqCst) {
            return Err(BackendError::Transport(
                "finished stream unavailable".to_string(),
            ));
        }
        Ok(self.finished.subscribe())
    }
}

//! Process-spawning backend over the external package-manager binary.
//!
//! Each started task runs the configured binary with a subcommand and fully
//! built flags, pipes stdout/stderr, and forwards raw read chunks as line
//! events. Chunks are deliberately not re-framed into lines: progress output
//! uses bare carriage returns and the terminal buffer on the consuming side
//! handles arbitrary chunk boundaries.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{broadcast, Notify};

use super::{BackendError, TaskBackend};
use crate::{FinishedPayload, LinePayload, TaskKind};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 4096;

const ALL_KINDS: [TaskKind; 4] = [
    TaskKind::Install,
    TaskKind::Uninstall,
    TaskKind::Upgrade,
    TaskKind::Download,
];

struct KindChannels {
    lines: broadcast::Sender<LinePayload>,
    finished: broadcast::Sender<FinishedPayload>,
}

/// Backend that runs tasks as child processes of a package-manager binary
pub struct ProcessBackend {
    program: String,
    channels: HashMap<TaskKind, KindChannels>,
    /// Stop signals for running tasks, keyed by (kind, package id)
    running: Arc<Mutex<HashMap<(TaskKind, String), Arc<Notify>>>>,
}

impl ProcessBackend {
    /// Create a backend driving `program` (e.g. `winget`)
    pub fn new(program: impl Into<String>) -> Self {
        let channels = ALL_KINDS
            .into_iter()
            .map(|kind| {
                (
                    kind,
                    KindChannels {
                        lines: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
                        finished: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
                    },
                )
            })
            .collect();

        Self {
            program: program.into(),
            channels,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn kind_channels(&self, kind: TaskKind) -> &KindChannels {
        // Populated for every kind in new()
        &self.channels[&kind]
    }

    /// Number of tasks currently running
    pub fn running_count(&self) -> usize {
        self.running.lock().map(|m| m.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TaskBackend for ProcessBackend {
    async fn start(&self, kind: TaskKind, id: &str, flags: &[String]) -> Result<(), BackendError> {
        let mut args: Vec<String> = vec![kind.verb().to_string(), "--id".to_string(), id.to_string()];
        args.extend(flags.iter().cloned());

        let display_cmd = format!("{} {}", self.program, args.join(" "));
        tracing::info!(task = %id, "starting: {display_cmd}");

        let stop = Arc::new(Notify::new());
        {
            let mut running = self
                .running
                .lock()
                .map_err(|_| BackendError::Transport("backend state lock poisoned".into()))?;
            if running.contains_key(&(kind, id.to_string())) {
                return Err(BackendError::Transport(format!(
                    "a {kind} task for {id} is already running"
                )));
            }
            running.insert((kind, id.to_string()), stop.clone());
        }

        let spawned = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                if let Ok(mut running) = self.running.lock() {
                    running.remove(&(kind, id.to_string()));
                }
                return Err(BackendError::Spawn {
                    command: display_cmd,
                    source,
                });
            }
        };

        let lines_tx = self.kind_channels(kind).lines.clone();
        let finished_tx = self.kind_channels(kind).finished.clone();
        let running = self.running.clone();
        let id = id.to_string();

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_pipe(stdout, lines_tx.clone(), id.clone(), "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_pipe(stderr, lines_tx, id.clone(), "stderr"));
        }

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = stop.notified() => {
                    tracing::info!(task = %id, "stop requested, killing child process");
                    let _ = child.start_kill();
                    child.wait().await
                }
            };

            if let Ok(mut running) = running.lock() {
                running.remove(&(kind, id.clone()));
            }

            let (success, code) = match status {
                Ok(es) => (es.success(), es.code()),
                Err(e) => {
                    tracing::warn!(task = %id, "failed to wait for child: {e}");
                    (false, None)
                }
            };

            tracing::info!(task = %id, success, ?code, "{kind} task finished");
            let _ = finished_tx.send(FinishedPayload { id, success, code });
        });

        Ok(())
    }

    async fn stop(&self, kind: TaskKind, id: &str) -> Result<(), BackendError> {
        let stop = {
            let running = self
                .running
                .lock()
                .map_err(|_| BackendError::Transport("backend state lock poisoned".into()))?;
            running.get(&(kind, id.to_string())).cloned()
        };

        match stop {
            Some(notify) => notify.notify_one(),
            None => tracing::debug!(task = %id, "stop for {kind} task that is not running"),
        }
        Ok(())
    }

    fn watch_lines(&self, kind: TaskKind) -> Result<broadcast::Receiver<LinePayload>, BackendError> {
        Ok(self.kind_channels(kind).lines.subscribe())
    }

    fn watch_finished(
        &self,
        kind: TaskKind,
    ) -> Result<broadcast::Receiver<FinishedPayload>, BackendError> {
        Ok(self.kind_channels(kind).finished.subscribe())
    }
}

/// Forward raw chunks from a child pipe as line events until EOF
async fn pump_pipe<R>(
    mut reader: R,
    tx: broadcast::Sender<LinePayload>,
    id: String,
    stream: &'static str,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]).to_string();
                let _ = tx.send(LinePayload {
                    id: id.clone(),
                    stream: stream.to_string(),
                    line: chunk,
                });
            }
            Err(e) => {
                tracing::debug!(task = %id, "pipe read ended: {e}");
                break;
            }
        }
    }
}

//! Per-task event channel over the backend's multiplexed streams.
//!
//! The backend publishes line and finished events for every task of a kind
//! on one shared pair of streams. An `EventChannel` binds both streams to a
//! single task id and drops everything addressed to other tasks.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::backend::{BackendError, TaskBackend};
use crate::{FinishedPayload, LinePayload, TaskId, TaskKind};

/// An event addressed to the channel's task id
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Line(LinePayload),
    Finished(FinishedPayload),
}

/// Subscription pair (line + finished) filtered to one task id
pub struct EventChannel {
    id: TaskId,
    lines: broadcast::Receiver<LinePayload>,
    finished: broadcast::Receiver<FinishedPayload>,
    lines_open: bool,
    finished_open: bool,
}

impl EventChannel {
    /// Subscribe to both event streams for `kind`, bound to `id`.
    ///
    /// Both-or-none: if the finished stream cannot be subscribed, the line
    /// subscription is released before the error surfaces.
    pub fn open(
        backend: &dyn TaskBackend,
        kind: TaskKind,
        id: impl Into<TaskId>,
    ) -> Result<Self, BackendError> {
        let lines = backend.watch_lines(kind)?;
        let finished = match backend.watch_finished(kind) {
            Ok(rx) => rx,
            Err(e) => {
                drop(lines);
                return Err(e);
            }
        };
        Ok(Self::from_parts(id.into(), lines, finished))
    }

    pub(crate) fn from_parts(
        id: TaskId,
        lines: broadcast::Receiver<LinePayload>,
        finished: broadcast::Receiver<FinishedPayload>,
    ) -> Self {
        Self {
            id,
            lines,
            finished,
            lines_open: true,
            finished_open: true,
        }
    }

    /// Task id this channel is bound to
    pub fn task_id(&self) -> &str {
        &self.id
    }

    /// Next event for this channel's task id.
    ///
    /// Events for foreign ids are skipped silently. Returns `None` once both
    /// backend streams have closed without a matching finished event.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        use broadcast::error::RecvError;

        loop {
            // Biased so queued output chunks drain before a finished event
            // that arrived after them
            tokio::select! {
                biased;

                line = self.lines.recv(), if self.lines_open => match line {
                    Ok(p) if p.id == self.id => return Some(ChannelEvent::Line(p)),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(task = %self.id, "line stream lagged, {skipped} chunks lost");
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        self.lines_open = false;
                        continue;
                    }
                },
                fin = self.finished.recv(), if self.finished_open => match fin {
                    Ok(p) if p.id == self.id => return Some(ChannelEvent::Finished(p)),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(task = %self.id, "finished stream lagged, {skipped} events lost");
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        self.finished_open = false;
                        continue;
                    }
                },
                else => return None,
            }
        }
    }
}

/// Owner of the background task pumping an [`EventChannel`].
///
/// Releasing twice (or dropping after an explicit release) is a no-op:
/// completion and user cancellation can race to tear the channel down.
pub struct ChannelGuard {
    pump: Option<JoinHandle<()>>,
}

impl ChannelGuard {
    pub fn new(pump: JoinHandle<()>) -> Self {
        Self { pump: Some(pump) }
    }

    /// Stop the pump and drop its subscriptions. Idempotent.
    pub fn release(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_pair() -> (
        broadcast::Sender<LinePayload>,
        broadcast::Sender<FinishedPayload>,
        EventChannel,
    ) {
        let (line_tx, line_rx) = broadcast::channel(64);
        let (fin_tx, fin_rx) = broadcast::channel(64);
        let chan = EventChannel::from_parts("pkg.a".to_string(), line_rx, fin_rx);
        (line_tx, fin_tx, chan)
    }

    fn line(id: &str, text: &str) -> LinePayload {
        LinePayload {
            id: id.to_string(),
            stream: "stdout".to_string(),
            line: text.to_string(),
        }
    }

    #[tokio::test]
    async fn delivers_matching_events_in_order() {
        let (line_tx, fin_tx, mut chan) = channel_pair();
        line_tx.send(line("pkg.a", "one")).unwrap();
        line_tx.send(line("pkg.a", "two")).unwrap();
        fin_tx
            .send(FinishedPayload {
                id: "pkg.a".to_string(),
                success: true,
                code: Some(0),
            })
            .unwrap();

        match chan.recv().await {
            Some(ChannelEvent::Line(p)) => assert_eq!(p.line, "one"),
            other => panic!("unexpected event: {other:?}"),
        }
        match chan.recv().await {
            Some(ChannelEvent::Line(p)) => assert_eq!(p.line, "two"),
            other => panic!("unexpected event: {other:?}"),
        }
        match chan.recv().await {
            Some(ChannelEvent::Finished(p)) => assert!(p.success),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn skips_foreign_task_ids() {
        let (line_tx, fin_tx, mut chan) = channel_pair();
        line_tx.send(line("pkg.b", "noise")).unwrap();
        fin_tx
            .send(FinishedPayload {
                id: "pkg.b".to_string(),
                success: false,
                code: Some(1),
            })
            .unwrap();
        line_tx.send(line("pkg.a", "mine")).unwrap();

        match chan.recv().await {
            Some(ChannelEvent::Line(p)) => assert_eq!(p.line, "mine"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn returns_none_when_both_streams_close() {
        let (line_tx, fin_tx, mut chan) = channel_pair();
        drop(line_tx);
        drop(fin_tx);
        assert!(chan.recv().await.is_none());
    }

    #[tokio::test]
    async fn survives_one_closed_stream() {
        let (line_tx, fin_tx, mut chan) = channel_pair();
        drop(line_tx);
        fin_tx
            .send(FinishedPayload {
                id: "pkg.a".to_string(),
                success: true,
                code: Some(0),
            })
            .unwrap();
        match chan.recv().await {
            Some(ChannelEvent::Finished(p)) => assert!(p.success),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn guard_release_is_idempotent() {
        let pump = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        let mut guard = ChannelGuard::new(pump);
        guard.release();
        guard.release();
        drop(guard);
    }
}

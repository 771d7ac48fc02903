//! Sequential batch execution over one shared session.
//!
//! Targets run strictly in list order, one at a time; the next target only
//! starts after the previous one reached a terminal state, so the shared
//! log stays chronological across the whole batch. Cancellation is
//! cooperative: it stops the in-flight task best-effort and prevents
//! further targets from starting, but a terminal event already attributed
//! to the in-flight target is still honored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

use super::session::{ExecutionSession, SessionHandle};
use crate::{PackageRef, TaskOutcome};

/// Aggregate outcome counters of one batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub stopped: usize,
}

impl BatchReport {
    /// Number of targets that were actually attempted
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed + self.stopped
    }
}

type SuccessHook = Box<dyn FnMut(&PackageRef) + Send>;

/// Drives an ordered list of targets through one [`ExecutionSession`]
pub struct BatchRunner {
    session: ExecutionSession,
    cancelled: Arc<AtomicBool>,
    on_success: Option<SuccessHook>,
}

impl BatchRunner {
    pub fn new(session: ExecutionSession) -> Self {
        Self {
            session,
            cancelled: Arc::new(AtomicBool::new(false)),
            on_success: None,
        }
    }

    /// Hook invoked for each target that succeeds, e.g. to drop it from a
    /// front end's pending-selection set
    pub fn with_success_hook(mut self, hook: impl FnMut(&PackageRef) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(hook));
        self
    }

    /// Cancellation surface usable while `run_all` is in flight
    pub fn canceller(&self) -> BatchCanceller {
        BatchCanceller {
            cancelled: self.cancelled.clone(),
            session: self.session.handle(),
        }
    }

    /// Live log/state surface of the shared session
    pub fn session_handle(&self) -> SessionHandle {
        self.session.handle()
    }

    pub fn into_session(self) -> ExecutionSession {
        self.session
    }

    /// Execute every target in order, aggregating outcomes.
    ///
    /// A failed target never aborts the batch; only cancellation does, and
    /// targets after the cancellation point are left untouched (no start
    /// issued, not counted as failed).
    pub async fn run_all(&mut self, targets: &[PackageRef], flags: &[String]) -> BatchReport {
        let kind = self.session.kind();
        let total = targets.len();
        let mut report = BatchReport::default();

        for (idx, target) in targets.iter().enumerate() {
            if self.cancelled.load(Ordering::SeqCst) {
                break;
            }
            let n = idx + 1;

            self.session
                .append_log(&format!("\n>>> [{n}/{total}] {kind} {target}...\n"));

            if let Err(e) = self.session.start(target, flags).await {
                if self.cancelled.load(Ordering::SeqCst) {
                    report.stopped += 1;
                    self.session
                        .append_log(&format!("\n<<< [{n}/{total}] {target}: stopped\n"));
                    break;
                }
                tracing::error!("failed to start {kind} for {target}: {e:#}");
                report.failed += 1;
                self.session
                    .append_log(&format!("\n<<< [{n}/{total}] {target}: {e:#}\n"));
                continue;
            }

            let outcome = match self.session.wait().await {
                Ok(outcome) => outcome,
                Err(e) => {
                    if self.cancelled.load(Ordering::SeqCst) {
                        report.stopped += 1;
                        self.session
                            .append_log(&format!("\n<<< [{n}/{total}] {target}: stopped\n"));
                        break;
                    }
                    tracing::error!("{kind} for {target} ended abnormally: {e:#}");
                    report.failed += 1;
                    self.session
                        .append_log(&format!("\n<<< [{n}/{total}] {target}: {e:#}\n"));
                    continue;
                }
            };

            self.session
                .append_log(&format!("\n<<< [{n}/{total}] {target}: {outcome}\n"));

            match outcome {
                TaskOutcome::Succeeded => {
                    report.succeeded += 1;
                    if let Some(hook) = &mut self.on_success {
                        hook(target);
                    }
                }
                TaskOutcome::Stopped => {
                    report.stopped += 1;
                    break;
                }
                TaskOutcome::Failed => {
                    // Cancellation may have landed without reaching the
                    // running task's stop flag in time
                    if self.cancelled.load(Ordering::SeqCst) {
                        report.stopped += 1;
                        break;
                    }
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "{kind} batch done: {} succeeded, {} failed, {} stopped, {} of {total} attempted",
            report.succeeded,
            report.failed,
            report.stopped,
            report.attempted(),
        );
        report
    }
}

/// Cloneable cancellation handle for a running batch
#[derive(Clone)]
pub struct BatchCanceller {
    cancelled: Arc<AtomicBool>,
    session: SessionHandle,
}

impl BatchCanceller {
    /// Prevent further targets from starting and request a best-effort stop
    /// of the task currently in flight, if any.
    ///
    /// The in-flight task's own finished event still decides its outcome; a
    /// task that completes successfully before the stop takes effect is
    /// recorded as succeeded.
    pub async fn cancel(&self) -> Result<()> {
        self.cancelled.store(true, Ordering::SeqCst);
        self.session.stop_if_running().await?;
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

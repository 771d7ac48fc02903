//! Task execution command implementation

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};

use pakflow::backend::ProcessBackend;
use pakflow::config::Settings;
use pakflow::exec::{BatchRunner, ExecutionSession, SessionHandle};
use pakflow::flags::{build_flags, ExecOptions};
use pakflow::{PackageRef, TaskKind};

/// Per-run option switches that override config.toml values
#[derive(Debug, Default, Clone)]
pub struct CliOptions {
    pub silent: bool,
    pub interactive: bool,
    pub force: bool,
    pub purge: bool,
    pub include_unknown: bool,
    pub ignore_hash: bool,
    pub proxy: Option<String>,
    pub extra_flags: Option<String>,
    /// Download directory override (download tasks only)
    pub dir: Option<std::path::PathBuf>,
}

impl CliOptions {
    fn merge_into(&self, mut options: ExecOptions) -> ExecOptions {
        options.silent |= self.silent;
        options.interactive |= self.interactive;
        options.force |= self.force;
        options.purge |= self.purge;
        options.include_unknown |= self.include_unknown;
        options.ignore_hash |= self.ignore_hash;
        if self.proxy.is_some() {
            options.proxy_url = self.proxy.clone();
        }
        if self.extra_flags.is_some() {
            options.custom_flags = self.extra_flags.clone();
        }
        options
    }
}

/// Run one batch of tasks of `kind` over `ids`, streaming log output to
/// stdout and cancelling on Ctrl-C.
pub async fn run_command(
    kind: TaskKind,
    ids: Vec<String>,
    cli_options: CliOptions,
    settings: Settings,
) -> Result<()> {
    if ids.is_empty() {
        bail!("no package ids given");
    }
    let targets: Vec<PackageRef> = ids.into_iter().map(PackageRef::from_id).collect();

    let options = cli_options.merge_into(settings.exec_options());
    let mut flags = build_flags(kind, &options);
    if kind == TaskKind::Download {
        let dir = cli_options.dir.clone().unwrap_or_else(|| settings.download_dir());
        flags.push("--download-directory".to_string());
        flags.push(dir.display().to_string());
    }

    let backend = Arc::new(ProcessBackend::new(settings.program.clone()));
    let session = ExecutionSession::new(backend, kind);
    let mut batch = BatchRunner::new(session);

    // Ctrl-C cancels after the in-flight task
    let canceller = batch.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling after the current task");
            let _ = canceller.cancel().await;
        }
    });

    let printer = spawn_log_printer(batch.session_handle());
    let report = batch.run_all(&targets, &flags).await;
    printer.finish().await;

    println!(
        "\n{kind}: {} succeeded, {} failed, {} stopped ({} of {} attempted)",
        report.succeeded,
        report.failed,
        report.stopped,
        report.attempted(),
        targets.len(),
    );

    if report.failed > 0 {
        bail!("{} {kind} task(s) failed", report.failed);
    }
    Ok(())
}

struct LogPrinter {
    handle: SessionHandle,
    printed: Arc<std::sync::atomic::AtomicUsize>,
    task: tokio::task::JoinHandle<()>,
}

impl LogPrinter {
    /// Print lines the poller had not yet seen, then the unterminated tail
    async fn finish(self) {
        use std::sync::atomic::Ordering;

        self.task.abort();
        let _ = self.task.await;

        let printed = self.printed.load(Ordering::SeqCst);
        let lines = self.handle.completed_lines();
        for line in lines.iter().skip(printed) {
            println!("{line}");
        }

        let rendered = self.handle.rendered_log();
        let tail = match rendered.rsplit_once('\n') {
            Some((_, tail)) => tail,
            None => rendered.as_str(),
        };
        if !tail.is_empty() {
            println!("{tail}");
        }
    }
}

/// Periodically flush newly completed log lines to stdout
fn spawn_log_printer(handle: SessionHandle) -> LogPrinter {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let printed = Arc::new(AtomicUsize::new(0));
    let poll_handle = handle.clone();
    let poll_printed = printed.clone();
    let task = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let lines = poll_handle.completed_lines();
            let seen = poll_printed.load(Ordering::SeqCst);
            for line in lines.iter().skip(seen) {
                println!("{line}");
            }
            poll_printed.store(lines.len(), Ordering::SeqCst);
        }
    });
    LogPrinter {
        handle,
        printed,
        task,
    }
}

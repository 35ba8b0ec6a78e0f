//! Binding a launched child to the lifetime of its owner.
//!
//! [`run_scoped`] launches a child and relays its output until one of two
//! things happens. Either the child finishes on its own, or the
//! [`ShutdownTrigger`] fires (Ctrl-C, SIGTERM or a programmatic trigger). In
//! the second case the child gets exactly one termination request. Leaving
//! the scope early (an error or a panic) drops the [`ChildGuard`], which
//! issues the same request.
//!
//! [`ChildGuard`]: crate::launcher::ChildGuard

use crate::launcher::Launcher;
use procrelay_core::{ExitState, LaunchSpec, ProcrelayError, RelayStdErr, RelayStdOut, relay};
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Why the owner asked the child to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl-C
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl ShutdownReason {
    /// Conventional shell exit code, 128 + signal number
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Interrupt => 130,
            ShutdownReason::Terminate => 143,
        }
    }
}

/// Installed SIGINT / SIGTERM handlers.
///
/// Handlers are registered on [`ShutdownSignals::install`], not on first poll,
/// so a signal arriving right after install is not lost.
pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    pub fn install() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Resolves on the next interrupt or termination signal
    pub async fn recv(&mut self) -> std::io::Result<ShutdownReason> {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => Ok(ShutdownReason::Interrupt),
                _ = self.terminate.recv() => Ok(ShutdownReason::Terminate),
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await?;
            Ok(ShutdownReason::Interrupt)
        }
    }
}

/// Resolves on the first interrupt or termination signal
pub async fn shutdown_signal() -> std::io::Result<ShutdownReason> {
    ShutdownSignals::install()?.recv().await
}

/// One-shot shutdown request shared between signal listeners and the scope.
///
/// The first trigger wins; later triggers are ignored.
#[derive(Clone, Default)]
pub struct ShutdownTrigger {
    token: CancellationToken,
    reason: Arc<OnceLock<ShutdownReason>>,
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when a shutdown had already been triggered
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        if first {
            info!("Shutdown requested: {:?}", reason);
        }
        self.token.cancel();
        first
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn triggered(&self) {
        self.token.cancelled().await
    }

    /// Spawn a task that fires this trigger on SIGINT or SIGTERM.
    ///
    /// The handlers are in place when this returns. Must be called inside a tokio runtime.
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let trigger = self.clone();
        let signals = ShutdownSignals::install();

        tokio::spawn(async move {
            let mut signals = match signals {
                Ok(signals) => signals,
                Err(e) => {
                    warn!("Failed to install signal handlers: {e}");
                    return;
                }
            };

            tokio::select! {
                res = signals.recv() => match res {
                    Ok(reason) => {
                        trigger.trigger(reason);
                    }
                    Err(e) => warn!("Failed to wait for signals: {e}"),
                },
                _ = trigger.triggered() => {}
            }
        })
    }
}

/// How a scoped run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Child's final status; `None` if it did not exit within the drain window
    pub exit: Option<ExitState>,
    /// Set when the run ended because of a shutdown request
    pub shutdown: Option<ShutdownReason>,
}

impl RunOutcome {
    /// Exit code the owning process should report
    pub fn exit_code(&self) -> i32 {
        if let Some(reason) = self.shutdown {
            return reason.exit_code();
        }

        match self.exit {
            Some(ExitState::Exited(Some(code))) => code,
            Some(ExitState::Exited(None)) | None => 1,
            Some(ExitState::Signalled(signal)) => 128 + signal,
            Some(ExitState::NeverStarted) => 127,
        }
    }
}

enum Step<T> {
    Drained(T),
    Shutdown,
}

/// Launch `spec`, relay its output into `out` / `err` and keep the child bound to `shutdown`
pub async fn run_scoped(
    launcher: &Launcher,
    spec: &LaunchSpec,
    out: RelayStdOut,
    err: RelayStdErr,
    shutdown: &ShutdownTrigger,
) -> Result<RunOutcome, ProcrelayError> {
    let grace = launcher.relay_config().drain_timeout();
    let (mut guard, output) = launcher.launch(spec);

    let relay_fut = relay(output, out, err);
    tokio::pin!(relay_fut);

    let step = tokio::select! {
        res = &mut relay_fut => Step::Drained(res?),
        _ = shutdown.triggered() => Step::Shutdown,
    };

    match step {
        Step::Drained(summary) => {
            info!(
                "Output of {} closed ({} stdout, {} stderr chunks)",
                spec.command, summary.stdout_chunks, summary.stderr_chunks
            );

            let waited = tokio::select! {
                exit = guard.wait() => Step::Drained(exit?),
                _ = shutdown.triggered() => Step::Shutdown,
            };

            match waited {
                Step::Drained(exit) => Ok(RunOutcome {
                    exit: Some(exit),
                    shutdown: None,
                }),
                Step::Shutdown => {
                    guard.terminate();
                    Ok(RunOutcome {
                        exit: guard.wait_timeout(grace).await?,
                        shutdown: shutdown.reason(),
                    })
                }
            }
        }
        Step::Shutdown => {
            guard.terminate();

            match tokio::time::timeout(grace, &mut relay_fut).await {
                Ok(res) => {
                    res?;
                }
                Err(_) => warn!(
                    "Output of {} still open {:?} after termination request",
                    spec.command, grace
                ),
            }

            Ok(RunOutcome {
                exit: guard.wait_timeout(grace).await?,
                shutdown: shutdown.reason(),
            })
        }
    }
}

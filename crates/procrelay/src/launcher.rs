use crate::factory::{PlatformTerminatorFactory, prepare_command};
use procrelay_core::{
    ExitState, LaunchSpec, OutputChunk, ProcessId, ProcessState, ProcessTermination,
    ProcrelayError, RelayConfig, TerminationResult, TerminationScope, pump,
};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

/// Starts external commands and hands back a guard plus their output stream
#[derive(Clone)]
pub struct Launcher {
    terminator: Arc<dyn ProcessTermination>,
    relay_config: RelayConfig,
}

impl Default for Launcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Launcher {
    /// Launcher with the platform termination strategy and default relay settings
    pub fn new() -> Self {
        info!(
            "Created Launcher with platform: {}",
            PlatformTerminatorFactory::platform_name()
        );
        Self::with_terminator(PlatformTerminatorFactory::create())
    }

    pub fn with_terminator(terminator: Arc<dyn ProcessTermination>) -> Self {
        Self {
            terminator,
            relay_config: RelayConfig::default(),
        }
    }

    pub fn with_relay_config(mut self, relay_config: RelayConfig) -> Result<Self, ProcrelayError> {
        relay_config
            .validate()
            .map_err(|e| ProcrelayError::configuration_error(format!("Invalid relay config: {e}")))?;
        self.relay_config = relay_config;
        Ok(self)
    }

    pub fn relay_config(&self) -> &RelayConfig {
        &self.relay_config
    }

    /// Spawn `spec` and start reading its pipes in the background.
    ///
    /// Returns immediately. Must be called inside a tokio runtime. A spawn
    /// failure is not returned as an error: the guard comes back already
    /// terminated and the output carries a single [`OutputChunk::Error`].
    pub fn launch(&self, spec: &LaunchSpec) -> (ChildGuard, ChildOutput) {
        let (tx, rx) = mpsc::channel(self.relay_config.relay_buffer.max(1));
        let output = ChildOutput {
            inner: ReceiverStream::new(rx),
        };

        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &spec.working_directory {
            cmd.current_dir(dir);
        }

        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        prepare_command(&mut cmd, spec.termination_scope);

        match cmd.spawn() {
            Ok(mut child) => {
                info!(
                    "Spawned process: {} (PID: {:?}) with args: {:?}",
                    spec.command,
                    child.id(),
                    spec.args
                );

                let capacity = self.relay_config.chunk_capacity;
                if let Some(stdout) = child.stdout.take() {
                    tokio::spawn(pump(stdout, capacity, OutputChunk::Stdout, tx.clone()));
                }
                if let Some(stderr) = child.stderr.take() {
                    tokio::spawn(pump(stderr, capacity, OutputChunk::Stderr, tx.clone()));
                }

                (
                    ChildGuard::running(child, spec, self.terminator.clone()),
                    output,
                )
            }
            Err(source) => {
                let err = ProcrelayError::SpawnFailed {
                    command: spec.command.clone(),
                    source,
                };
                error!("{err}");
                // fresh channel with capacity >= 1, cannot be full
                let _ = tx.try_send(OutputChunk::Error(err.to_string()));

                (
                    ChildGuard::never_started(spec, self.terminator.clone()),
                    output,
                )
            }
        }
    }

    /// Run `spec` to completion, collecting its output instead of relaying it
    pub async fn run_captured(&self, spec: &LaunchSpec) -> Result<CapturedRun, ProcrelayError> {
        let (mut guard, mut output) = self.launch(spec);

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut errors = Vec::new();

        while let Some(chunk) = output.next_chunk().await {
            match chunk {
                OutputChunk::Stdout(text) => stdout.push_str(&text),
                OutputChunk::Stderr(text) => stderr.push_str(&text),
                OutputChunk::Error(text) => errors.push(text),
            }
        }

        let exit = guard.wait().await?;
        if exit == ExitState::NeverStarted {
            return Err(ProcrelayError::process_error(errors.join("; ")));
        }

        debug!(
            "`{}` finished with {:?}\nstdout: {}\nstderr: {}",
            spec.display_line(),
            exit,
            stdout.trim_end(),
            stderr.trim_end()
        );

        Ok(CapturedRun {
            exit,
            stdout,
            stderr,
        })
    }
}

/// Output and exit state of a finished [`Launcher::run_captured`] call
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedRun {
    pub exit: ExitState,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedRun {
    pub fn success(&self) -> bool {
        self.exit.success()
    }

    pub fn code(&self) -> Option<i32> {
        match self.exit {
            ExitState::Exited(code) => code,
            _ => None,
        }
    }
}

/// Ordered output of one child. Ends once both pipes are closed.
pub struct ChildOutput {
    inner: ReceiverStream<OutputChunk>,
}

impl ChildOutput {
    pub async fn next_chunk(&mut self) -> Option<OutputChunk> {
        tokio_stream::StreamExt::next(&mut self.inner).await
    }

    /// Drain everything that is left
    pub async fn collect_all(mut self) -> Vec<OutputChunk> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.next_chunk().await {
            chunks.push(chunk);
        }
        chunks
    }

    /// Stop accepting chunks; readers finish on their next send
    pub fn close(&mut self) {
        self.inner.close();
    }
}

impl Stream for ChildOutput {
    type Item = OutputChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Exclusive owner of one launched child.
///
/// Moves from `Running` to `Terminated` exactly once, on natural exit or on
/// the first termination request. Dropping a running guard requests
/// termination, so the child never outlives the scope that launched it.
pub struct ChildGuard {
    child: Option<Child>,
    state: ProcessState,
    exit: Option<ExitState>,
    pid: Option<ProcessId>,
    command: String,
    args: Vec<String>,
    scope: TerminationScope,
    terminator: Arc<dyn ProcessTermination>,
}

impl ChildGuard {
    fn running(child: Child, spec: &LaunchSpec, terminator: Arc<dyn ProcessTermination>) -> Self {
        Self {
            pid: child.id(),
            child: Some(child),
            state: ProcessState::Running,
            exit: None,
            command: spec.command.clone(),
            args: spec.args.clone(),
            scope: spec.termination_scope,
            terminator,
        }
    }

    fn never_started(spec: &LaunchSpec, terminator: Arc<dyn ProcessTermination>) -> Self {
        Self {
            child: None,
            state: ProcessState::Terminated,
            exit: Some(ExitState::NeverStarted),
            pid: None,
            command: spec.command.clone(),
            args: spec.args.clone(),
            scope: spec.termination_scope,
            terminator,
        }
    }

    /// PID the child had when spawned
    pub fn pid(&self) -> Option<ProcessId> {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running
    }

    /// Final status, if it has been observed
    pub fn exit_state(&self) -> Option<ExitState> {
        self.exit
    }

    /// Check for natural exit without blocking
    pub fn try_reap(&mut self) -> Result<Option<ExitState>, ProcrelayError> {
        if let Some(exit) = self.exit {
            return Ok(Some(exit));
        }

        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };

        match child.try_wait()? {
            Some(status) => {
                let exit = ExitState::from_status(status);
                self.record_exit(exit);
                Ok(Some(exit))
            }
            None => Ok(None),
        }
    }

    /// Wait for the child to exit
    pub async fn wait(&mut self) -> Result<ExitState, ProcrelayError> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }

        let Some(child) = self.child.as_mut() else {
            return Ok(ExitState::NeverStarted);
        };

        let status = child.wait().await?;
        let exit = ExitState::from_status(status);
        self.record_exit(exit);
        Ok(exit)
    }

    /// Wait for the child to exit, giving up after `limit`
    pub async fn wait_timeout(&mut self, limit: Duration) -> Result<Option<ExitState>, ProcrelayError> {
        match tokio::time::timeout(limit, self.wait()).await {
            Ok(exit) => exit.map(Some),
            Err(_) => {
                warn!(
                    "Process {} (PID: {:?}) still running after {:?}",
                    self.command, self.pid, limit
                );
                Ok(None)
            }
        }
    }

    /// Request termination of the child.
    ///
    /// The request goes out at most once over the guard's lifetime; later
    /// calls, and calls after a natural exit, return
    /// [`TerminationResult::AlreadyTerminated`]. The child is not awaited.
    pub fn terminate(&mut self) -> TerminationResult {
        if self.state == ProcessState::Terminated {
            return TerminationResult::AlreadyTerminated;
        }

        match self.try_reap() {
            Ok(Some(exit)) => {
                debug!("Process {} already exited with {:?}", self.command, exit);
                return TerminationResult::AlreadyTerminated;
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to poll process {}: {}", self.command, e),
        }

        self.state = ProcessState::Terminated;

        let Some(child) = self.child.as_mut() else {
            return TerminationResult::AlreadyTerminated;
        };

        let result = self.terminator.request_termination(child, self.scope);
        match &result {
            TerminationResult::Requested | TerminationResult::ProcessNotFound => {
                info!(
                    "Termination requested for {} (PID: {:?}) via {}",
                    self.command,
                    self.pid,
                    self.terminator.platform_name()
                );
            }
            other => {
                warn!(
                    "Failed to terminate {} (PID: {:?}): {:?}",
                    self.command, self.pid, other
                );
            }
        }
        result
    }

    fn record_exit(&mut self, exit: ExitState) {
        self.exit = Some(exit);
        self.state = ProcessState::Terminated;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if self.state == ProcessState::Running {
            debug!(
                "Guard for {} (PID: {:?}) dropped while running",
                self.command, self.pid
            );
            self.terminate();
        }
    }
}

impl std::fmt::Debug for ChildGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildGuard")
            .field("pid", &self.pid)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("state", &self.state)
            .field("exit", &self.exit)
            .field("scope", &self.scope)
            .finish()
    }
}

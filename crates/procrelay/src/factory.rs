use procrelay_core::{ProcessTermination, TerminationScope};
use std::sync::Arc;
use tokio::process::Command;

/// Platform-independent factory that selects the termination strategy at compile time
pub struct PlatformTerminatorFactory;

impl PlatformTerminatorFactory {
    pub fn create() -> Arc<dyn ProcessTermination> {
        #[cfg(unix)]
        return Arc::new(procrelay_unix::UnixTerminatorFactory::create_terminator());

        #[cfg(not(unix))]
        return Arc::new(StartKillTerminator);
    }

    pub fn platform_name() -> &'static str {
        #[cfg(unix)]
        return procrelay_unix::UnixTerminatorFactory::platform_name();

        #[cfg(not(unix))]
        return "portable";
    }
}

/// Apply platform spawn options needed by `scope`
pub(crate) fn prepare_command(cmd: &mut Command, scope: TerminationScope) {
    #[cfg(unix)]
    procrelay_unix::UnixTerminator::new().prepare_command(cmd, scope);

    #[cfg(not(unix))]
    let _ = (cmd, scope);
}

/// Fallback for platforms without signals: asks tokio to kill the child
#[cfg(not(unix))]
pub struct StartKillTerminator;

#[cfg(not(unix))]
impl ProcessTermination for StartKillTerminator {
    fn request_termination(
        &self,
        child: &mut tokio::process::Child,
        _scope: TerminationScope,
    ) -> procrelay_core::TerminationResult {
        use procrelay_core::TerminationResult;

        match child.start_kill() {
            Ok(()) => TerminationResult::Requested,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {
                TerminationResult::ProcessNotFound
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                TerminationResult::PermissionDenied
            }
            Err(e) => TerminationResult::Failed(format!("kill failed: {e}")),
        }
    }

    fn platform_name(&self) -> &'static str {
        "portable"
    }
}

use crate::config::TerminationScope;
use tokio::process::Child;

/// Unique identifier for a process
pub type ProcessId = u32;

/// Lifecycle state of a launched child. The only transition is `Running -> Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Terminated,
}

/// Final status of a child, once known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// Process exited on its own; `None` when the platform reports no code
    Exited(Option<i32>),
    /// Process was stopped by the given signal number (Unix only)
    Signalled(i32),
    /// Spawning failed, there never was a process
    NeverStarted,
}

impl ExitState {
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitState::Signalled(signal);
            }
        }
        ExitState::Exited(status.code())
    }

    pub fn success(&self) -> bool {
        matches!(self, ExitState::Exited(Some(0)))
    }
}

/// Result of a termination request
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationResult {
    /// The request was delivered to the process
    Requested,
    /// The guard had already left the `Running` state, nothing was sent
    AlreadyTerminated,
    /// Process was not found (already exited)
    ProcessNotFound,
    /// Permission denied (insufficient privileges)
    PermissionDenied,
    /// Operation failed with specific error message
    Failed(String),
}

impl TerminationResult {
    /// True when the child is known not to outlive the request
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            TerminationResult::Requested
                | TerminationResult::AlreadyTerminated
                | TerminationResult::ProcessNotFound
        )
    }
}

/// Platform strategy for asking a child to stop.
///
/// Synchronous on purpose: guards call it from `Drop`. Implementations send a
/// single request and never wait for the child to exit.
pub trait ProcessTermination: Send + Sync {
    /// Send one termination request to `child`
    fn request_termination(&self, child: &mut Child, scope: TerminationScope)
    -> TerminationResult;

    /// Get the platform name for logging and debugging
    fn platform_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_results() {
        assert!(TerminationResult::Requested.is_settled());
        assert!(TerminationResult::AlreadyTerminated.is_settled());
        assert!(TerminationResult::ProcessNotFound.is_settled());
        assert!(!TerminationResult::PermissionDenied.is_settled());
        assert!(!TerminationResult::Failed("boom".into()).is_settled());
    }

    #[test]
    fn test_exit_state_success() {
        assert!(ExitState::Exited(Some(0)).success());
        assert!(!ExitState::Exited(Some(1)).success());
        assert!(!ExitState::Exited(None).success());
        assert!(!ExitState::Signalled(15).success());
        assert!(!ExitState::NeverStarted.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_state_from_status() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(
            ExitState::from_status(std::process::ExitStatus::from_raw(0)),
            ExitState::Exited(Some(0))
        );
        // raw wait status: exit code lives in the high byte
        assert_eq!(
            ExitState::from_status(std::process::ExitStatus::from_raw(3 << 8)),
            ExitState::Exited(Some(3))
        );
        assert_eq!(
            ExitState::from_status(std::process::ExitStatus::from_raw(15)),
            ExitState::Signalled(15)
        );
    }
}

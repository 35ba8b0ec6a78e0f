use procrelay_core::{ProcessTermination, TerminationResult, TerminationScope};
use tokio::process::{Child, Command};

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;
    use tracing::{info, warn};

    /// Unix termination: one SIGTERM, to the child or to its process group
    #[derive(Debug, Default, Clone, Copy)]
    pub struct UnixTerminator;

    impl UnixTerminator {
        pub fn new() -> Self {
            Self
        }

        /// Place the child in its own process group when the whole group is to be signalled
        pub fn prepare_command(&self, cmd: &mut Command, scope: TerminationScope) {
            if scope == TerminationScope::ProcessGroup {
                cmd.process_group(0);
            }
        }

        fn send_sigterm(&self, pid: u32, scope: TerminationScope) -> TerminationResult {
            let nix_pid = NixPid::from_raw(pid as i32);

            let (sent, target) = match scope {
                TerminationScope::Process => (signal::kill(nix_pid, Signal::SIGTERM), "process"),
                TerminationScope::ProcessGroup => {
                    (signal::killpg(nix_pid, Signal::SIGTERM), "process group")
                }
            };

            match sent {
                Ok(()) => {
                    info!("Sent SIGTERM to {} {}", target, pid);
                    TerminationResult::Requested
                }
                Err(nix::errno::Errno::ESRCH) => {
                    info!("{} {} not found (already terminated)", target, pid);
                    TerminationResult::ProcessNotFound
                }
                Err(nix::errno::Errno::EPERM) => {
                    warn!("Permission denied to terminate {} {}", target, pid);
                    TerminationResult::PermissionDenied
                }
                Err(e) => {
                    warn!("Failed to send SIGTERM to {} {}: {}", target, pid, e);
                    TerminationResult::Failed(format!("SIGTERM failed: {e}"))
                }
            }
        }
    }

    impl ProcessTermination for UnixTerminator {
        fn request_termination(
            &self,
            child: &mut Child,
            scope: TerminationScope,
        ) -> TerminationResult {
            match child.id() {
                Some(pid) => self.send_sigterm(pid, scope),
                None => {
                    info!("Child already reaped, nothing to terminate");
                    TerminationResult::ProcessNotFound
                }
            }
        }

        fn platform_name(&self) -> &'static str {
            "unix"
        }
    }
}

// Re-export the Unix implementation when on Unix systems
#[cfg(unix)]
pub use unix_impl::UnixTerminator;

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use procrelay_core::ExitState;
    use std::process::Stdio;

    fn group_sleeper(scope: TerminationScope) -> Child {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 30 & wait"])
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        UnixTerminator::new().prepare_command(&mut cmd, scope);
        cmd.spawn().unwrap()
    }

    #[tokio::test]
    async fn test_sigterm_single_process() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let result = UnixTerminator::new().request_termination(&mut child, TerminationScope::Process);
        assert_eq!(result, TerminationResult::Requested);

        let status = child.wait().await.unwrap();
        assert_eq!(ExitState::from_status(status), ExitState::Signalled(15));
    }

    #[tokio::test]
    async fn test_sigterm_process_group() {
        let mut child = group_sleeper(TerminationScope::ProcessGroup);
        let result =
            UnixTerminator::new().request_termination(&mut child, TerminationScope::ProcessGroup);
        assert_eq!(result, TerminationResult::Requested);

        let status = child.wait().await.unwrap();
        assert_eq!(ExitState::from_status(status), ExitState::Signalled(15));
    }

    #[tokio::test]
    async fn test_reaped_child_is_not_found() {
        let mut child = Command::new("true").spawn().unwrap();
        child.wait().await.unwrap();

        let result = UnixTerminator::new().request_termination(&mut child, TerminationScope::Process);
        assert_eq!(result, TerminationResult::ProcessNotFound);
    }

    #[test]
    fn test_platform_name() {
        assert_eq!(UnixTerminator::new().platform_name(), "unix");
    }
}

//! Termination analysis for the worker process.
//!
//! Used to log how a worker ended when it was torn down.

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;

/// Reason why a worker process terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Normal exit with status code (e.g. the interpreter saw its stdin close).
    Exited(i32),
    /// Ended by the SIGHUP we send on kill.
    HungUp,
    /// Did not honour SIGHUP in time and was SIGKILLed.
    ForceKilled,
    /// Killed by some other signal.
    Signaled(Signal),
    /// Unknown termination reason.
    Unknown,
}

impl TerminationReason {
    /// Whether the worker went away the way we asked it to.
    pub fn is_orderly(&self) -> bool {
        matches!(self, Self::Exited(0) | Self::HungUp)
    }

    /// Get a human-readable description.
    pub fn description(&self) -> String {
        match self {
            Self::Exited(code) => format!("exited with code {}", code),
            Self::HungUp => "hung up".to_string(),
            Self::ForceKilled => "force killed after ignoring SIGHUP".to_string(),
            Self::Signaled(sig) => format!("killed by signal {:?}", sig),
            Self::Unknown => "unknown reason".to_string(),
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Analyze a `WaitStatus` to determine the termination reason.
pub fn analyze_wait_status(status: WaitStatus) -> TerminationReason {
    match status {
        WaitStatus::Exited(_, code) => TerminationReason::Exited(code),
        WaitStatus::Signaled(_, Signal::SIGHUP, _) => TerminationReason::HungUp,
        WaitStatus::Signaled(_, Signal::SIGKILL, _) => TerminationReason::ForceKilled,
        WaitStatus::Signaled(_, signal, _) => TerminationReason::Signaled(signal),
        _ => TerminationReason::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::Pid;

    #[test]
    fn test_analyze_wait_status() {
        let pid = Pid::from_raw(1);
        assert_eq!(
            analyze_wait_status(WaitStatus::Exited(pid, 0)),
            TerminationReason::Exited(0)
        );
        assert_eq!(
            analyze_wait_status(WaitStatus::Signaled(pid, Signal::SIGHUP, false)),
            TerminationReason::HungUp
        );
        assert_eq!(
            analyze_wait_status(WaitStatus::Signaled(pid, Signal::SIGKILL, false)),
            TerminationReason::ForceKilled
        );
        assert_eq!(
            analyze_wait_status(WaitStatus::StillAlive),
            TerminationReason::Unknown
        );
    }

    #[test]
    fn test_orderly_termination() {
        assert!(TerminationReason::Exited(0).is_orderly());
        assert!(TerminationReason::HungUp.is_orderly());
        assert!(!TerminationReason::Exited(1).is_orderly());
        assert!(!TerminationReason::ForceKilled.is_orderly());
        assert!(!TerminationReason::Signaled(Signal::SIGSEGV).is_orderly());
    }

    #[test]
    fn test_description() {
        assert_eq!(TerminationReason::Exited(3).to_string(), "exited with code 3");
        assert!(TerminationReason::ForceKilled.to_string().contains("SIGHUP"));
    }
}

//! Process handle for the interpreter worker.
//!
//! Wraps a child process with its command and result channels.

use super::ipc::{CommandWriter, PipeFd, ReadOutcome, ResultReader};
use super::signals::{TerminationReason, analyze_wait_status};
use crate::error::{Result, SsrError};
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::io;
use std::os::unix::io::OwnedFd;
use std::time::{Duration, Instant};

/// How long a hung-up worker gets to exit before SIGKILL.
const KILL_GRACE: Duration = Duration::from_millis(200);

/// Handle to a worker subprocess with its two pipes.
pub struct Proc {
    pid: Pid,
    /// Command channel; `None` once closed.
    writer: Option<CommandWriter>,
    /// Result channel; `None` once closed.
    reader: Option<ResultReader>,
    reaped: bool,
}

impl std::fmt::Debug for Proc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proc")
            .field("pid", &self.pid)
            .field("open", &self.writer.is_some())
            .field("reaped", &self.reaped)
            .finish()
    }
}

impl Proc {
    /// Create from a spawned `std::process::Child`.
    ///
    /// Takes ownership of the child's stdin and stdout.
    pub fn from_child(mut child: std::process::Child) -> Result<Self> {
        let pid = Pid::from_raw(child.id() as i32);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SsrError::Worker("Child stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SsrError::Worker("Child stdout not captured".into()))?;

        Ok(Self {
            pid,
            writer: Some(CommandWriter::new(PipeFd::new(OwnedFd::from(stdin)))),
            reader: Some(ResultReader::new(PipeFd::new(OwnedFd::from(stdout)))),
            reaped: false,
        })
    }

    /// Get the process ID.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Send one line on the command channel.
    pub fn send_line(&mut self, line: &str) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.write_line(line),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "command channel is closed",
            )),
        }
    }

    /// One bounded read from the result channel.
    pub fn read_once(&mut self, limit: usize, timeout: Option<Duration>) -> io::Result<ReadOutcome> {
        match self.reader.as_mut() {
            Some(reader) => reader.read_once(limit, timeout),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "result channel is closed",
            )),
        }
    }

    /// Check if the process is still running (non-blocking).
    pub fn is_running(&mut self) -> bool {
        if self.reaped {
            return false;
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => true,
            _ => {
                self.reaped = true;
                false
            }
        }
    }

    /// Try to wait for the process (non-blocking).
    ///
    /// Returns `None` if the process is still running.
    fn try_wait(&mut self) -> Option<WaitStatus> {
        if self.reaped {
            return None;
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => None,
            Ok(status) => {
                self.reaped = true;
                Some(status)
            }
            Err(_) => {
                self.reaped = true;
                None
            }
        }
    }

    /// Close both channels, hang up on the process and reap it.
    ///
    /// Never fails: a process that is already gone is fine. Returns how the
    /// process ended when that could be observed.
    pub fn kill(&mut self) -> Option<TerminationReason> {
        self.writer = None;
        self.reader = None;

        if self.reaped {
            return None;
        }

        if signal::kill(self.pid, Signal::SIGHUP).is_err() {
            // Already exited; just collect it.
            return self.try_wait().map(analyze_wait_status);
        }

        let start = Instant::now();
        while start.elapsed() < KILL_GRACE {
            if let Some(status) = self.try_wait() {
                return Some(analyze_wait_status(status));
            }
            if self.reaped {
                return None;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        let _ = signal::kill(self.pid, Signal::SIGKILL);
        let status = waitpid(self.pid, None).ok();
        self.reaped = true;
        status.map(analyze_wait_status)
    }
}

impl Drop for Proc {
    fn drop(&mut self) {
        if !self.reaped {
            self.kill();
        }
    }
}

//! Raw pipe primitives for talking to the worker process.
//!
//! The command channel is line-oriented. The result channel is unframed:
//! callers get one bounded read of whatever the worker has written so far.

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::io::{self, BufWriter, Read, Write};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::time::{Duration, Instant};

/// Longest single `poll(2)` wait; longer timeouts are served in slices.
const POLL_SLICE_MS: u16 = 30_000;

/// A file descriptor wrapper that implements Read/Write with EINTR handling.
pub struct PipeFd {
    fd: OwnedFd,
}

impl PipeFd {
    /// Create from an owned file descriptor.
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }
}

impl AsFd for PipeFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for PipeFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Read for PipeFd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::read(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }
}

impl Write for PipeFd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::write(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Line writer for the command channel.
pub struct CommandWriter {
    writer: BufWriter<PipeFd>,
}

impl CommandWriter {
    pub fn new(fd: PipeFd) -> Self {
        Self {
            writer: BufWriter::new(fd),
        }
    }

    /// Write a line (appends newline if not present) and flush.
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        if !line.ends_with('\n') {
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()
    }
}

/// Reader for the unframed result channel.
pub struct ResultReader {
    fd: PipeFd,
}

/// What a single bounded read produced.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes that had arrived by the time the read ran.
    Data(Vec<u8>),
    /// The write end was closed.
    Eof,
    /// Nothing arrived before the deadline.
    TimedOut,
}

impl ResultReader {
    pub fn new(fd: PipeFd) -> Self {
        Self { fd }
    }

    /// Wait until the channel is readable, then perform exactly one `read(2)`
    /// of at most `limit` bytes. `None` waits forever.
    pub fn read_once(&mut self, limit: usize, timeout: Option<Duration>) -> io::Result<ReadOutcome> {
        if !self.wait_readable(timeout)? {
            return Ok(ReadOutcome::TimedOut);
        }

        let mut buf = vec![0u8; limit];
        let n = self.fd.read(&mut buf)?;
        if n == 0 {
            return Ok(ReadOutcome::Eof);
        }
        buf.truncate(n);
        Ok(ReadOutcome::Data(buf))
    }

    /// Returns `false` if the deadline passed with nothing to read.
    fn wait_readable(&self, timeout: Option<Duration>) -> io::Result<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let slice_ms = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(false);
                    }
                    remaining
                        .as_millis()
                        .clamp(1, u128::from(POLL_SLICE_MS)) as u16
                }
                None => POLL_SLICE_MS,
            };

            let mut fds = [PollFd::new(self.fd.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::from(slice_ms)) {
                // POLLHUP/POLLERR also count: the read will report EOF or the error.
                Ok(n) if n > 0 => return Ok(true),
                Ok(_) => continue,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }
}

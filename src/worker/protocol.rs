//! Request/response contract with the worker.
//!
//! A request is a file of code; the worker is told its path on one line of the
//! command channel. The response is whatever a single bounded read of the
//! result channel returns. There is no framing: a response longer than
//! [`TRUNCATION_THRESHOLD_CHARS`] may be only a prefix of what the worker
//! wrote, and the rest would leak into the next exchange, so such a worker is
//! discarded after use. The byte limit is twice the character threshold
//! because one character can take several bytes.

use super::ipc::ReadOutcome;
use super::proc::Proc;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Upper bound of the single read from the result channel, in bytes.
pub const READ_LIMIT_BYTES: usize = 10_000;

/// Responses longer than this (in characters) retire the worker.
pub const TRUNCATION_THRESHOLD_CHARS: usize = 5_000;

/// One snippet to run.
#[derive(Debug, Clone)]
pub struct EvalRequest {
    pub code: String,
    /// Staleness key, usually the path of the artifact the code loads.
    pub key: String,
    pub timestamp: SystemTime,
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

/// Result of one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Text read from the worker. Success and script errors look alike here;
    /// telling them apart is the caller's protocol.
    Response(String),
    /// Nothing arrived in time.
    TimedOut(Duration),
    /// The exchange machinery itself failed.
    Anomaly(String),
}

impl ExchangeOutcome {
    /// Whether the worker must be discarded after this exchange.
    pub fn retires_worker(&self) -> bool {
        match self {
            Self::Response(text) => is_possibly_truncated(text),
            Self::TimedOut(_) | Self::Anomaly(_) => true,
        }
    }
}

/// Strictly longer than the threshold; exactly at it is fine.
pub fn is_possibly_truncated(text: &str) -> bool {
    text.chars().count() > TRUNCATION_THRESHOLD_CHARS
}

/// Run one request on `proc`.
///
/// Writes the code to a temp file under `tmp_dir`, sends its path, and does one
/// bounded read. The temp file is removed on every path. Never fails: errors
/// become [`ExchangeOutcome::Anomaly`]. Killing the worker afterwards is up to
/// the caller (see [`ExchangeOutcome::retires_worker`]).
pub fn exchange(proc: &mut Proc, request: &EvalRequest, tmp_dir: &Path, suffix: &str) -> ExchangeOutcome {
    let input = match write_input(&request.code, tmp_dir, suffix) {
        Ok(file) => file,
        Err(e) => return ExchangeOutcome::Anomaly(format!("failed to write input file: {}", e)),
    };

    if let Err(e) = proc.send_line(&input.path().to_string_lossy()) {
        return ExchangeOutcome::Anomaly(format!("failed to send to worker: {}", e));
    }

    let outcome = match proc.read_once(READ_LIMIT_BYTES, request.timeout) {
        Ok(ReadOutcome::Data(bytes)) => {
            ExchangeOutcome::Response(String::from_utf8_lossy(&bytes).into_owned())
        }
        Ok(ReadOutcome::TimedOut) => {
            ExchangeOutcome::TimedOut(request.timeout.unwrap_or_default())
        }
        Ok(ReadOutcome::Eof) => {
            ExchangeOutcome::Anomaly("worker closed its output before responding".to_string())
        }
        Err(e) => ExchangeOutcome::Anomaly(format!("failed to read from worker: {}", e)),
    };

    drop(input);
    outcome
}

fn write_input(code: &str, tmp_dir: &Path, suffix: &str) -> std::io::Result<tempfile::NamedTempFile> {
    std::fs::create_dir_all(tmp_dir)?;
    let mut file = tempfile::Builder::new()
        .prefix("ssrd_input")
        .suffix(suffix)
        .tempfile_in(tmp_dir)?;
    file.write_all(code.as_bytes())?;
    file.flush()?;
    Ok(file)
}

//! Worker subprocess spawning.

use super::interpreter::Interpreter;
use super::proc::Proc;
use crate::error::{Result, SsrError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempPath;

/// The bootstrap loop written out to the temp dir. Removed when dropped.
#[derive(Debug)]
pub struct BootstrapScript {
    path: TempPath,
}

impl BootstrapScript {
    /// Write `interpreter`'s bootstrap source to a fresh file under `tmp_dir`,
    /// creating the directory if needed.
    pub fn write(interpreter: &dyn Interpreter, tmp_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(tmp_dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("ssrd_worker")
            .suffix(interpreter.script_suffix())
            .tempfile_in(tmp_dir)?;
        file.write_all(interpreter.bootstrap_source().as_bytes())?;
        file.flush()?;
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Where and how to start a worker.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    /// Working directory of the interpreter (where its packages live).
    pub cwd: PathBuf,
}

/// Spawn a worker running the bootstrap loop.
///
/// stdin becomes the command channel and stdout the result channel; stderr is
/// inherited so interpreter crashes show up in our own output.
pub fn spawn_worker(
    interpreter: &dyn Interpreter,
    bootstrap: &BootstrapScript,
    spec: &SpawnSpec,
) -> Result<Proc> {
    let mut cmd = interpreter.command(bootstrap.path());
    cmd.current_dir(&spec.cwd);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::inherit());

    let child = cmd.spawn().map_err(|e| {
        SsrError::Worker(format!(
            "Failed to spawn {} worker in {}: {}",
            interpreter.name(),
            spec.cwd.display(),
            e
        ))
    })?;

    Proc::from_child(child)
}

//! Blocking external build steps.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Instant;

use tracing::{debug, info};

use crate::error::{Result, SsrError};

/// One external command, kept as data so it can be logged and reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl StepCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arguments(&self) -> impl Iterator<Item = String> + '_ {
        self.args.iter().map(|a| a.to_string_lossy().into_owned())
    }

    /// Space-joined command line for logs and errors.
    pub fn display(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.arguments())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self, cwd: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(cwd).stdin(Stdio::null());
        cmd
    }

    /// Run to completion in `cwd`, capturing output.
    ///
    /// A non-zero exit becomes [`SsrError::BuildStepFailure`] carrying stderr.
    pub fn run(&self, cwd: &Path) -> Result<()> {
        let shown = self.display();
        debug!(command = %shown, "Running");
        let start = Instant::now();

        let output = self.command(cwd).output().map_err(|e| {
            SsrError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to run '{}': {}", shown, e),
            ))
        })?;

        if !output.status.success() {
            return Err(SsrError::BuildStepFailure {
                command: shown,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        info!(
            command = %shown,
            elapsed_ms = start.elapsed().as_millis(),
            "Completed"
        );
        Ok(())
    }

    /// Start in the background. Output goes to our stderr so it never mixes
    /// with results printed on stdout.
    pub fn spawn(&self, cwd: &Path) -> Result<Child> {
        let shown = self.display();
        debug!(command = %shown, "Spawning");
        let mut cmd = self.command(cwd);
        cmd.stdout(Stdio::from(std::io::stderr()));
        cmd.spawn().map_err(|e| {
            SsrError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to start '{}': {}", shown, e),
            ))
        })
    }
}

//! Whole-project compiler watch for development builds.
//!
//! Started at most once per pipeline, under its own lock so a slow first
//! compile never blocks evaluation. When watching is disabled a single full
//! build runs instead and sources are not watched afterwards.

use std::path::Path;
use std::process::Child;
use std::sync::Mutex;
use std::time::Duration;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{info, warn};

use super::toolchain::Toolchain;
use crate::error::{Result, SsrError};

/// Name of the file the watch touches after each build.
pub const FLAG_FILE: &str = ".spagodone";

/// Default interval between checks for the flag file.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

enum WatchState {
    NotStarted,
    /// Watching disabled; the one-off build has run.
    NotUsed,
    Running(Child),
}

pub struct ProjectWatch {
    state: Mutex<WatchState>,
    poll_interval: Duration,
}

impl Default for ProjectWatch {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl ProjectWatch {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            state: Mutex::new(WatchState::NotStarted),
            poll_interval,
        }
    }

    /// Whether `ensure_started` has completed.
    pub fn is_started(&self) -> bool {
        !matches!(*self.lock(), WatchState::NotStarted)
    }

    /// Pid of the watch process, if one is running.
    pub fn pid(&self) -> Option<u32> {
        match &*self.lock() {
            WatchState::Running(child) => Some(child.id()),
            _ => None,
        }
    }

    /// Start the watch (or run the one-off build) if not done yet, and wait
    /// for the first build to finish.
    pub fn ensure_started(
        &self,
        toolchain: &Toolchain,
        root: &Path,
        temp_dir: &Path,
        watch: bool,
    ) -> Result<()> {
        let mut state = self.lock();
        if !matches!(*state, WatchState::NotStarted) {
            return Ok(());
        }

        if !watch {
            toolchain.spago_build().run(root)?;
            info!("");
            info!("-----------------------------------------------------------");
            info!("NOTE: NOT WATCHING SOURCE CODE");
            info!("Make sure your IDE integration is recompiling the modules");
            info!("-----------------------------------------------------------");
            info!("");
            *state = WatchState::NotUsed;
            return Ok(());
        }

        std::fs::create_dir_all(temp_dir)?;
        let flag_file = temp_dir.join(FLAG_FILE);
        match std::fs::remove_file(&flag_file) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        let mut child = toolchain.spago_watch(&flag_file).spawn(root)?;
        info!(pid = child.id(), "Started project watch, waiting for it to finish...");

        if self.wait_file_or_process(&flag_file, &mut child)? {
            info!(
                "Initial build done. If it failed, that's all right, \
                 the watch keeps rebuilding on changes."
            );
            *state = WatchState::Running(child);
            Ok(())
        } else {
            hang_up(&mut child);
            Err(SsrError::WatchStopped)
        }
    }

    /// Stop the watch process, if running.
    pub fn stop(&self) {
        let mut state = self.lock();
        if let WatchState::Running(child) = &mut *state {
            info!(pid = child.id(), "Stopping project watch");
            hang_up(child);
        }
        *state = WatchState::NotStarted;
    }

    /// True once `flag` exists; false if the process exits first.
    fn wait_file_or_process(&self, flag: &Path, child: &mut Child) -> Result<bool> {
        loop {
            if flag.exists() {
                return Ok(true);
            }
            if let Some(status) = child.try_wait()? {
                // The watch may have written the flag just before exiting.
                if flag.exists() {
                    return Ok(true);
                }
                warn!(%status, "Project watch exited");
                return Ok(false);
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WatchState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ProjectWatch {
    fn drop(&mut self) {
        self.stop();
    }
}

/// SIGHUP and reap. Errors are ignored; the process may be gone already.
fn hang_up(child: &mut Child) {
    if let Ok(raw) = i32::try_from(child.id()) {
        let _ = kill(Pid::from_raw(raw), Signal::SIGHUP);
    }
    let _ = child.wait();
}

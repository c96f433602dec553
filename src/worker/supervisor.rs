//! Owner of the single interpreter worker.
//!
//! Reusing one process instead of starting an interpreter per request takes
//! evaluation latency from hundreds of milliseconds down to a few. The price is
//! that the process caches whatever modules it loaded, so it has to be replaced
//! when one of them changes on disk; see [`super::staleness`].
//!
//! Spawn, kill, the staleness check and the exchange all happen under one
//! mutex. Callers queue and are served one at a time: the result channel
//! cannot be demultiplexed between concurrent requests.

use super::interpreter::Interpreter;
use super::proc::Proc;
use super::protocol::{EvalRequest, ExchangeOutcome, exchange};
use super::spawn::{BootstrapScript, SpawnSpec, spawn_worker};
use super::staleness::{Staleness, StalenessTable};
use crate::error::Result;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Instant, SystemTime};
use tracing::{debug, info, trace, warn};

/// Configuration for the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Working directory for the interpreter.
    pub cwd: PathBuf,
    /// Where bootstrap and snippet files go. Created on demand.
    pub tmp_dir: PathBuf,
}

/// A running worker and what it has loaded.
struct Worker {
    proc: Proc,
    keys: StalenessTable,
    generation: u64,
}

#[derive(Default)]
struct State {
    worker: Option<Worker>,
    bootstrap: Option<BootstrapScript>,
    spawns: u64,
    kills: u64,
    exchanges: u64,
}

/// Supervises at most one interpreter process.
pub struct WorkerSupervisor {
    interpreter: Arc<dyn Interpreter>,
    config: SupervisorConfig,
    state: Mutex<State>,
}

/// Counters for observing the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorStats {
    /// Generation of the running worker, `None` if absent. Each spawn gets a
    /// new generation, so a change means the process was replaced.
    pub generation: Option<u64>,
    pub spawns: u64,
    pub kills: u64,
    pub exchanges: u64,
    /// Keys tracked by the running worker.
    pub tracked_keys: usize,
}

impl WorkerSupervisor {
    pub fn new(interpreter: Arc<dyn Interpreter>, config: SupervisorConfig) -> Self {
        Self {
            interpreter,
            config,
            state: Mutex::new(State::default()),
        }
    }

    pub fn interpreter(&self) -> &dyn Interpreter {
        self.interpreter.as_ref()
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.config.tmp_dir
    }

    /// Make sure a worker that is current for `key` at `timestamp` is running.
    pub fn ensure_worker(&self, key: &str, timestamp: SystemTime) -> Result<()> {
        let mut state = self.lock();
        self.ensure_locked(&mut state, key, timestamp)
    }

    /// Run one request: ensure a current worker, exchange, and retire the
    /// worker if the outcome calls for it.
    ///
    /// Errors only come from spawning; everything that goes wrong during the
    /// exchange is reported in the outcome.
    pub fn evaluate(&self, request: &EvalRequest) -> Result<ExchangeOutcome> {
        let mut state = self.lock();
        self.ensure_locked(&mut state, &request.key, request.timestamp)?;

        let start = Instant::now();
        let outcome = match state.worker.as_mut() {
            Some(worker) => exchange(
                &mut worker.proc,
                request,
                &self.config.tmp_dir,
                self.interpreter.script_suffix(),
            ),
            None => ExchangeOutcome::Anomaly("no worker after spawn".to_string()),
        };
        state.exchanges += 1;

        trace!(
            key = %request.key,
            elapsed_ms = start.elapsed().as_millis(),
            "Worker exchange completed"
        );

        match &outcome {
            ExchangeOutcome::Response(text) if outcome.retires_worker() => {
                debug!(
                    chars = text.chars().count(),
                    "Response may be truncated, retiring worker"
                );
            }
            ExchangeOutcome::TimedOut(after) => {
                warn!(key = %request.key, timeout_ms = after.as_millis(), "Worker timed out");
            }
            ExchangeOutcome::Anomaly(reason) => {
                warn!(key = %request.key, reason = %reason, "Worker exchange failed");
            }
            ExchangeOutcome::Response(_) => {}
        }

        if outcome.retires_worker() {
            Self::kill_locked(&mut state);
        }

        Ok(outcome)
    }

    /// Kill the current worker, if any. Never fails.
    pub fn kill(&self) {
        let mut state = self.lock();
        Self::kill_locked(&mut state);
    }

    /// Kill the worker and remove the bootstrap script.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        Self::kill_locked(&mut state);
        state.bootstrap = None;
    }

    pub fn stats(&self) -> SupervisorStats {
        let state = self.lock();
        SupervisorStats {
            generation: state.worker.as_ref().map(|w| w.generation),
            spawns: state.spawns,
            kills: state.kills,
            exchanges: state.exchanges,
            tracked_keys: state.worker.as_ref().map_or(0, |w| w.keys.len()),
        }
    }

    /// Timestamp recorded for `key` by the running worker.
    pub fn tracked_timestamp(&self, key: &str) -> Option<SystemTime> {
        self.lock().worker.as_ref().and_then(|w| w.keys.get(key))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic mid-exchange leaves the worker in an unknown state; the
        // next staleness check or kill deals with it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_locked(&self, state: &mut State, key: &str, timestamp: SystemTime) -> Result<()> {
        if let Some(worker) = state.worker.as_mut() {
            match worker.keys.observe(key, timestamp) {
                Staleness::Fresh => return Ok(()),
                Staleness::Register => {
                    debug!(key, generation = worker.generation, "Worker now tracking key");
                    return Ok(());
                }
                Staleness::Restart => {
                    info!(key, "Restarting worker because '{}' has changed since last restart", key);
                    Self::kill_locked(state);
                }
            }
        } else {
            info!(key, interpreter = self.interpreter.name(), "Starting worker to handle '{}'", key);
        }

        self.spawn_locked(state, key, timestamp)
    }

    fn spawn_locked(&self, state: &mut State, key: &str, timestamp: SystemTime) -> Result<()> {
        let bootstrap = match state.bootstrap.take() {
            Some(script) => script,
            None => BootstrapScript::write(self.interpreter.as_ref(), &self.config.tmp_dir)?,
        };

        let spec = SpawnSpec {
            cwd: self.config.cwd.clone(),
        };
        let spawned = spawn_worker(self.interpreter.as_ref(), &bootstrap, &spec);
        state.bootstrap = Some(bootstrap);
        let proc = spawned?;

        state.spawns += 1;
        let generation = state.spawns;
        debug!(pid = %proc.pid(), generation, "Worker spawned");

        state.worker = Some(Worker {
            proc,
            keys: StalenessTable::seeded(key, timestamp),
            generation,
        });
        Ok(())
    }

    fn kill_locked(state: &mut State) {
        if let Some(mut worker) = state.worker.take() {
            let pid = worker.proc.pid();
            let reason = worker.proc.kill();
            state.kills += 1;
            match reason {
                Some(reason) if !reason.is_orderly() => {
                    warn!(%pid, generation = worker.generation, reason = %reason, "Worker killed");
                }
                _ => debug!(%pid, generation = worker.generation, "Worker killed"),
            }
        }
    }
}

impl Drop for WorkerSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

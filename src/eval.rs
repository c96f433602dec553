//! Server-side evaluation of built modules.
//!
//! A caller names a module and supplies a template: interpreter code that is
//! handed a loader for the module and returns a string. The template runs in
//! the shared worker; its return value travels back through a side-channel
//! file so it isn't subject to the worker's read limit.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::build::{ModuleDescriptor, ModuleResolver};
use crate::error::{Result, SsrError};
use crate::worker::{
    EvalRequest, ExchangeOutcome, Interpreter, SupervisorConfig, SupervisorStats, WorkerSupervisor,
};

/// What the wrapper yields when the template succeeded.
const SUCCESS_MARKER: &str = "OK";

pub struct Evaluator {
    resolver: ModuleResolver,
    supervisor: WorkerSupervisor,
    default_timeout: Option<Duration>,
}

impl Evaluator {
    pub fn new(
        resolver: ModuleResolver,
        interpreter: Arc<dyn Interpreter>,
        config: SupervisorConfig,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            resolver,
            supervisor: WorkerSupervisor::new(interpreter, config),
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// Evaluate `template` against the module at `source_path` using the
    /// default timeout.
    pub fn server_side_eval(&self, source_path: &str, template: &str) -> Result<String> {
        self.server_side_eval_with_timeout(source_path, template, self.default_timeout)
    }

    /// Evaluate `template` against the module at `source_path`.
    ///
    /// The module must be built; nothing is sent to the worker otherwise.
    pub fn server_side_eval_with_timeout(
        &self,
        source_path: &str,
        template: &str,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let module = self.resolver.resolve(source_path)?;
        let Some(built_at) = self.resolver.is_built(&module) else {
            return Err(SsrError::BuildMissing {
                module: module.name,
                path: module.server_artifact,
            });
        };

        let side = side_channel_file(self.supervisor.tmp_dir())?;
        let code = self
            .supervisor
            .interpreter()
            .wrap_module_call(&module.server_artifact, template, side.path());

        let request = EvalRequest {
            code,
            key: module.server_artifact.to_string_lossy().into_owned(),
            timestamp: built_at,
            timeout,
        };

        info!(module = %module.name, "Executing server-side code");
        let start = Instant::now();
        let outcome = self.supervisor.evaluate(&request)?;
        info!(
            module = %module.name,
            elapsed_ms = start.elapsed().as_millis(),
            "Completed"
        );

        decode(&module, outcome, side.path())
    }

    pub fn stats(&self) -> SupervisorStats {
        self.supervisor.stats()
    }

    pub fn supervisor(&self) -> &WorkerSupervisor {
        &self.supervisor
    }

    pub fn shutdown(&self) {
        self.supervisor.shutdown();
    }
}

fn side_channel_file(tmp_dir: &Path) -> io::Result<tempfile::NamedTempFile> {
    std::fs::create_dir_all(tmp_dir)?;
    tempfile::Builder::new()
        .prefix("ssrd_eval")
        .suffix(".output")
        .tempfile_in(tmp_dir)
}

fn decode(module: &ModuleDescriptor, outcome: ExchangeOutcome, side: &Path) -> Result<String> {
    match outcome {
        ExchangeOutcome::Response(text) if text.trim() == SUCCESS_MARKER => {
            Ok(std::fs::read_to_string(side)?)
        }
        ExchangeOutcome::Response(text) => {
            debug!(module = %module.name, "Template failed");
            Err(SsrError::ExecutionFailure {
                module: module.name.clone(),
                detail: text,
            })
        }
        ExchangeOutcome::TimedOut(after) => Err(SsrError::ExecutionTimeout(after)),
        ExchangeOutcome::Anomaly(reason) => Err(SsrError::TransportAnomaly(reason)),
    }
}

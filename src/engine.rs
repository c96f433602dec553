//! Process-wide entry point tying the build pipeline, the evaluator and the
//! render cache together.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::info;

use crate::build::{BuildOutput, BuildPipeline, ModuleDescriptor, ProjectWatch};
use crate::cache::{CacheNamespace, CacheProvider, RenderCache};
use crate::config::SsrConfig;
use crate::error::Result;
use crate::eval::Evaluator;
use crate::worker::{Interpreter, SupervisorConfig, SupervisorStats};

pub struct Engine {
    pipeline: BuildPipeline,
    evaluator: Evaluator,
    cache: RenderCache,
}

impl Engine {
    /// Validate `config` and set up an engine using its interpreter.
    ///
    /// Nothing is spawned until first use.
    pub fn new(config: SsrConfig) -> Result<Self> {
        let interpreter = config.interpreter.instantiate();
        Self::with_interpreter(config, interpreter)
    }

    /// Like [`Engine::new`] with an explicit interpreter.
    pub fn with_interpreter(config: SsrConfig, interpreter: Arc<dyn Interpreter>) -> Result<Self> {
        Self::with_parts(config, interpreter, ProjectWatch::default())
    }

    /// Fully explicit constructor; tests use it to poll the project watch
    /// faster.
    pub fn with_parts(
        config: SsrConfig,
        interpreter: Arc<dyn Interpreter>,
        watch: ProjectWatch,
    ) -> Result<Self> {
        let config = config.validate()?;
        let supervisor = SupervisorConfig {
            cwd: config.root.clone(),
            tmp_dir: config.absolute_temp_dir(),
        };
        let default_timeout = config.timeout;
        let pipeline = BuildPipeline::with_watch(config, watch);
        let evaluator = Evaluator::new(
            pipeline.resolver().clone(),
            interpreter,
            supervisor,
            default_timeout,
        );
        Ok(Self {
            pipeline,
            evaluator,
            cache: RenderCache::default(),
        })
    }

    /// Use `provider` for [`Engine::render`].
    pub fn with_cache_provider(mut self, provider: Arc<dyn CacheProvider>) -> Self {
        self.cache = RenderCache::new(provider);
        self
    }

    pub fn config(&self) -> &SsrConfig {
        self.pipeline.config()
    }

    pub fn pipeline(&self) -> &BuildPipeline {
        &self.pipeline
    }

    /// Fail unless `root` is the configured project root. Hosts that carry
    /// their own notion of the root call this before loading modules.
    pub fn ensure_root(&self, root: &Path) -> Result<()> {
        self.pipeline.resolver().ensure_root(root)
    }

    pub fn resolve(&self, source_path: &str) -> Result<ModuleDescriptor> {
        self.pipeline.resolver().resolve(source_path)
    }

    pub fn build(&self, source_path: &str) -> Result<BuildOutput> {
        self.pipeline.build(source_path)
    }

    pub fn ensure_environment(&self, only_when_clean: bool) -> Result<bool> {
        self.pipeline.ensure_environment(only_when_clean)
    }

    pub fn ensure_module_built(&self, source_path: &str) -> Result<()> {
        self.pipeline.ensure_module_built(source_path)
    }

    /// Build time of the module's server artifact, if built.
    pub fn module_timestamp(&self, source_path: &str) -> Result<Option<SystemTime>> {
        self.pipeline.resolver().module_timestamp(source_path)
    }

    pub fn server_side_eval(&self, source_path: &str, template: &str) -> Result<String> {
        self.evaluator.server_side_eval(source_path, template)
    }

    pub fn server_side_eval_with_timeout(
        &self,
        source_path: &str,
        template: &str,
        timeout: Option<Duration>,
    ) -> Result<String> {
        self.evaluator
            .server_side_eval_with_timeout(source_path, template, timeout)
    }

    /// Evaluate through the render cache. Without a namespace this is the
    /// same as [`Engine::server_side_eval`].
    pub fn render(
        &self,
        namespace: Option<&CacheNamespace>,
        source_path: &str,
        template: &str,
    ) -> Result<String> {
        self.cache
            .fetch_or_compute(self.pipeline.resolver(), namespace, source_path, || {
                self.evaluator.server_side_eval(source_path, template)
            })
    }

    pub fn worker_stats(&self) -> SupervisorStats {
        self.evaluator.stats()
    }

    /// Kill the worker and stop the project watch. Safe to call repeatedly.
    pub fn shutdown(&self) {
        info!("Cleaning up...");
        self.evaluator.shutdown();
        self.pipeline.shutdown();
        info!("Closed");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! Module build pipeline.
//!
//! Turns a source path into a browser bundle and a server bundle, reporting
//! the files the result depends on so callers can invalidate it.
//!
//! # Modes
//!
//! - **Production**: bundle the module from scratch, minified; everything under
//!   the root is a dependency
//! - **Development**: bundle from the output of a long-running project watch;
//!   dependencies come from the bundler's metafile

pub mod command;
pub mod development;
pub mod production;
pub mod resolver;
pub mod toolchain;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use tracing::{debug, info, instrument};

use crate::config::{BuildMode, SsrConfig};
use crate::error::Result;

pub use resolver::{ModuleDescriptor, ModuleResolver, Target};
pub use toolchain::{BundleOptions, Toolchain};
pub use watch::ProjectWatch;

/// Result of building one module.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub module: ModuleDescriptor,
    /// Contents of the browser bundle.
    pub browser_bundle: String,
    /// Files whose change should trigger a rebuild.
    pub dependencies: Vec<PathBuf>,
}

pub struct BuildPipeline {
    config: SsrConfig,
    resolver: ModuleResolver,
    watch: ProjectWatch,
    /// Guards environment initialization; true once it has run.
    environment: Mutex<bool>,
}

impl BuildPipeline {
    pub fn new(config: SsrConfig) -> Self {
        Self::with_watch(config, ProjectWatch::default())
    }

    pub fn with_watch(config: SsrConfig, watch: ProjectWatch) -> Self {
        Self {
            resolver: ModuleResolver::new(&config),
            config,
            watch,
            environment: Mutex::new(false),
        }
    }

    pub fn config(&self) -> &SsrConfig {
        &self.config
    }

    pub fn resolver(&self) -> &ModuleResolver {
        &self.resolver
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.config.toolchain
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn mode(&self) -> BuildMode {
        self.config.mode
    }

    /// Build the module at `source_path` in the configured mode.
    #[instrument(skip(self), fields(mode = %self.config.mode))]
    pub fn build(&self, source_path: &str) -> Result<BuildOutput> {
        self.ensure_environment(false)?;

        let module = self.resolver.resolve(source_path)?;
        info!(module = %module.name, "Building module");
        let start = Instant::now();

        let dependencies = match self.config.mode {
            BuildMode::Development => development::build(self, &module)?,
            BuildMode::Production => production::build(self, &module)?,
        };
        let browser_bundle = std::fs::read_to_string(&module.browser_artifact)?;

        info!(
            module = %module.name,
            dependencies = dependencies.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Module built"
        );
        Ok(BuildOutput {
            module,
            browser_bundle,
            dependencies,
        })
    }

    /// Re-bundle a module from current compiler output. Only does anything
    /// in development; production artifacts are built ahead of time.
    pub fn ensure_module_built(&self, source_path: &str) -> Result<()> {
        if !self.config.mode.is_development() {
            return Ok(());
        }
        let module = self.resolver.resolve(source_path)?;
        development::bundle(self, &module)
    }

    /// Install packages and create the output directories.
    ///
    /// With `only_when_clean`, skipped when `node_modules` already exists.
    /// Otherwise it runs once per pipeline. Returns whether it ran.
    pub fn ensure_environment(&self, only_when_clean: bool) -> Result<bool> {
        let node_modules_exists = self.root().join("node_modules").is_dir();
        if node_modules_exists && only_when_clean {
            info!(
                root = %self.root().display(),
                "Skipping environment initialization, node_modules exists"
            );
            return Ok(false);
        }

        let mut initialized = self
            .environment
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *initialized {
            return Ok(false);
        }

        info!(root = %self.root().display(), "Initializing environment");
        if !node_modules_exists {
            info!("node_modules was missing in {}", self.root().display());
        }
        std::fs::create_dir_all(self.config.absolute_temp_dir().join(".out"))?;
        self.toolchain().npm_install().run(self.root())?;

        *initialized = true;
        Ok(true)
    }

    /// Start the project watch if it isn't running.
    pub fn ensure_watch(&self) -> Result<()> {
        self.watch.ensure_started(
            self.toolchain(),
            self.root(),
            &self.config.absolute_temp_dir(),
            self.config.watch,
        )
    }

    /// Run the bundler for both targets.
    pub fn bundle(&self, module: &ModuleDescriptor, entry_point: &Path, mode: BuildMode) -> Result<()> {
        let options = BundleOptions {
            entry_point,
            mode,
            node_target: &self.config.node_target,
        };
        for (target, out) in module.artifacts() {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            debug!(module = %module.name, target = target.platform(), "Bundling");
            self.toolchain()
                .esbuild(module, target, out, &options)
                .run(self.root())?;
        }
        Ok(())
    }

    pub fn watch(&self) -> &ProjectWatch {
        &self.watch
    }

    /// Stop the project watch.
    pub fn shutdown(&self) {
        self.watch.stop();
    }
}

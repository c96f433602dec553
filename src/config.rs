//! Engine configuration.
//!
//! # Environment Variables
//!
//! - `SSRD_ROOT` - Project root (where `spago.dhall`/`package.json` live)
//! - `SSRD_SRC_DIR` - Source directory, relative to the root
//! - `SSRD_TEMP_DIR` - Scratch directory, relative to the root
//! - `SSRD_SERVER_OUTPUT` - Directory for server-target artifacts
//! - `SSRD_MODE` - Build mode: development, production
//! - `SSRD_WATCH` - Run the compiler in watch mode in development (true/false)
//! - `SSRD_INTERPRETER` - Worker interpreter: node, sh
//! - `SSRD_TIMEOUT_SECS` - Default evaluation timeout (0 = none)
//! - `SSRD_NPX` / `SSRD_NPM` - Programs used to run the build toolchain

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::build::Toolchain;
use crate::error::{Result, SsrError};
use crate::paths;
use crate::worker::InterpreterKind;

/// Default evaluation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bundler target for the server artifact.
pub const DEFAULT_NODE_TARGET: &str = "node10";

/// How modules are built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BuildMode {
    /// Rely on the project watch and bundle from compiler output; track exact
    /// dependencies.
    Development,
    /// Bundle each module from scratch, minified; every file under the root is
    /// a dependency.
    #[default]
    Production,
}

impl BuildMode {
    pub fn is_development(self) -> bool {
        self == Self::Development
    }

    /// Value for the bundler's `process.env.NODE_ENV` define.
    pub fn node_env(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(format!(
                "Unknown build mode: '{}'. Valid options: development, production",
                s
            )),
        }
    }
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.node_env())
    }
}

/// Configuration for an [`Engine`](crate::engine::Engine).
///
/// Relative directories are resolved against `root` by the accessor methods,
/// so the struct can be built before the root is known.
#[derive(Debug, Clone)]
pub struct SsrConfig {
    /// Project root.
    pub root: PathBuf,
    /// Source directory prefix that module paths must start with.
    pub src_dir: String,
    /// Scratch directory for bundles, snippets and flag files.
    pub temp_dir: PathBuf,
    /// Directory for server-target artifacts.
    pub server_output: PathBuf,
    pub mode: BuildMode,
    /// Start the compiler in watch mode in development. When off, a single
    /// full build runs instead.
    pub watch: bool,
    pub interpreter: InterpreterKind,
    /// Default evaluation timeout; `None` waits forever.
    pub timeout: Option<Duration>,
    /// Bundler `--target` value.
    pub node_target: String,
    pub toolchain: Toolchain,
}

impl Default for SsrConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(paths::DEFAULT_ROOT),
            src_dir: paths::DEFAULT_SRC_DIR.to_string(),
            temp_dir: PathBuf::from(paths::DEFAULT_TEMP_DIR),
            server_output: PathBuf::from(paths::DEFAULT_SERVER_OUTPUT),
            mode: BuildMode::default(),
            watch: true,
            interpreter: InterpreterKind::default(),
            timeout: Some(DEFAULT_TIMEOUT),
            node_target: DEFAULT_NODE_TARGET.to_string(),
            toolchain: Toolchain::default(),
        }
    }
}

impl SsrConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_src_dir(mut self, src_dir: impl Into<String>) -> Self {
        self.src_dir = src_dir.into();
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn with_server_output(mut self, dir: impl Into<PathBuf>) -> Self {
        self.server_output = dir.into();
        self
    }

    pub fn with_mode(mut self, mode: BuildMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    pub fn with_interpreter(mut self, interpreter: InterpreterKind) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_node_target(mut self, target: impl Into<String>) -> Self {
        self.node_target = target.into();
        self
    }

    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = toolchain;
        self
    }

    /// Apply `SSRD_*` environment variable overrides.
    ///
    /// Unparseable values are ignored with a warning, keeping the current
    /// setting.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(root) = std::env::var("SSRD_ROOT") {
            self.root = PathBuf::from(root);
        }
        if let Ok(src_dir) = std::env::var("SSRD_SRC_DIR") {
            self.src_dir = src_dir;
        }
        if let Ok(temp_dir) = std::env::var("SSRD_TEMP_DIR") {
            self.temp_dir = PathBuf::from(temp_dir);
        }
        if let Ok(dir) = std::env::var("SSRD_SERVER_OUTPUT") {
            self.server_output = PathBuf::from(dir);
        }
        if let Ok(mode) = std::env::var("SSRD_MODE") {
            match mode.parse() {
                Ok(m) => self.mode = m,
                Err(e) => tracing::warn!("Ignoring SSRD_MODE: {}", e),
            }
        }
        if let Ok(watch) = std::env::var("SSRD_WATCH") {
            match parse_bool(&watch) {
                Some(w) => self.watch = w,
                None => tracing::warn!("Ignoring SSRD_WATCH: '{}' is not a boolean", watch),
            }
        }
        if let Ok(interpreter) = std::env::var("SSRD_INTERPRETER") {
            match interpreter.parse() {
                Ok(i) => self.interpreter = i,
                Err(e) => tracing::warn!("Ignoring SSRD_INTERPRETER: {}", e),
            }
        }
        if let Ok(secs) = std::env::var("SSRD_TIMEOUT_SECS") {
            match secs.parse::<f64>() {
                Ok(s) => self.timeout = timeout_from_secs(s),
                Err(_) => tracing::warn!("Ignoring SSRD_TIMEOUT_SECS: '{}' is not a number", secs),
            }
        }
        if let Ok(npx) = std::env::var("SSRD_NPX") {
            self.toolchain.npx = PathBuf::from(npx);
        }
        if let Ok(npm) = std::env::var("SSRD_NPM") {
            self.toolchain.npm = PathBuf::from(npm);
        }
        self
    }

    /// Check that the configuration is usable and make the root absolute.
    pub fn validate(mut self) -> Result<Self> {
        if self.src_dir.trim_matches('/').is_empty() {
            return Err(SsrError::Configuration(
                "source directory must not be empty".to_string(),
            ));
        }
        if self.node_target.is_empty() {
            return Err(SsrError::Configuration(
                "bundler target must not be empty".to_string(),
            ));
        }
        self.root = paths::absolutize(&self.root)?;
        Ok(self)
    }

    /// Source directory with exactly one trailing slash.
    pub fn src_prefix(&self) -> String {
        format!("{}/", self.src_dir.trim_end_matches('/'))
    }

    pub fn absolute_temp_dir(&self) -> PathBuf {
        paths::resolve_against(&self.root, &self.temp_dir)
    }

    pub fn absolute_server_output(&self) -> PathBuf {
        paths::resolve_against(&self.root, &self.server_output)
    }

    /// Directories skipped when collecting production dependencies. Build
    /// outputs are included so artifacts never count as their own inputs.
    pub fn ignored_dirs(&self) -> Vec<PathBuf> {
        paths::IGNORED_DIRS
            .iter()
            .map(|d| self.root.join(d))
            .chain([self.absolute_temp_dir(), self.absolute_server_output()])
            .collect()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Zero or negative means no timeout.
pub fn timeout_from_secs(secs: f64) -> Option<Duration> {
    if secs > 0.0 && secs.is_finite() {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

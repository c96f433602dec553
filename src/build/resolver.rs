//! Mapping from source paths to module names and build artifacts.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::SsrConfig;
use crate::error::{Result, SsrError};
use crate::paths;

/// Source file extension stripped from module paths.
const SOURCE_EXTENSION: &str = ".purs";

/// A module and where its artifacts live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    /// Dotted module name, e.g. `EntryPoints.Home`.
    pub name: String,
    /// Bundle loaded by browsers.
    pub browser_artifact: PathBuf,
    /// Bundle loaded by the worker.
    pub server_artifact: PathBuf,
}

impl ModuleDescriptor {
    /// Both artifacts, browser first.
    pub fn artifacts(&self) -> [(Target, &Path); 2] {
        [
            (Target::Browser, self.browser_artifact.as_path()),
            (Target::Node, self.server_artifact.as_path()),
        ]
    }

    /// Name used for the bundle's global, `Purs_` plus the module name with
    /// dots replaced.
    pub fn global_name(&self) -> String {
        format!("Purs_{}", self.name.replace('.', "_"))
    }
}

/// Bundler platform of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Browser,
    Node,
}

impl Target {
    pub fn platform(self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::Node => "node",
        }
    }
}

/// Resolves module paths under a project root.
#[derive(Debug, Clone)]
pub struct ModuleResolver {
    root: PathBuf,
    src_prefix: String,
    browser_out: PathBuf,
    server_out: PathBuf,
}

impl ModuleResolver {
    pub fn new(config: &SsrConfig) -> Self {
        Self {
            root: config.root.clone(),
            src_prefix: config.src_prefix(),
            browser_out: config.absolute_temp_dir().join(".out"),
            server_out: config.absolute_server_output(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Dotted module name for a path like `src/Foo/Bar.purs`.
    ///
    /// The path must start with the source directory.
    pub fn module_name(&self, source_path: &str) -> Result<String> {
        let Some(rest) = source_path.strip_prefix(&self.src_prefix) else {
            return Err(SsrError::Configuration(format!(
                "Module file {} was expected to be under {}",
                source_path, self.src_prefix
            )));
        };
        let rest = rest.strip_suffix(SOURCE_EXTENSION).unwrap_or(rest);
        if rest.is_empty() || rest.split('/').any(str::is_empty) {
            return Err(SsrError::Configuration(format!(
                "'{}' does not name a module",
                source_path
            )));
        }
        Ok(rest.replace('/', "."))
    }

    pub fn resolve(&self, source_path: &str) -> Result<ModuleDescriptor> {
        let name = self.module_name(source_path)?;
        Ok(self.descriptor(name))
    }

    /// Descriptor for an already-dotted module name.
    pub fn descriptor(&self, name: String) -> ModuleDescriptor {
        let file = format!("{}.js", name);
        ModuleDescriptor {
            browser_artifact: self.browser_out.join(&file),
            server_artifact: self.server_out.join(&file),
            name,
        }
    }

    /// Modification time of the server artifact, or `None` if it hasn't been
    /// built.
    pub fn is_built(&self, module: &ModuleDescriptor) -> Option<SystemTime> {
        std::fs::metadata(&module.server_artifact)
            .ok()
            .filter(|m| m.is_file())
            .and_then(|m| m.modified().ok())
    }

    /// Build timestamp of the module at `source_path`.
    pub fn module_timestamp(&self, source_path: &str) -> Result<Option<SystemTime>> {
        let module = self.resolve(source_path)?;
        Ok(self.is_built(&module))
    }

    /// Reject loads from a root other than the configured one.
    pub fn ensure_root(&self, root: &Path) -> Result<()> {
        let attempted = paths::absolutize(root)?;
        if attempted == self.root {
            return Ok(());
        }
        Err(SsrError::Configuration(format!(
            "Attempt to load a module from a root directory other than the configured one.\n\
             The configured directory is '{}'\n\
             The attempted directory is '{}'\n\
             Set --root or SSRD_ROOT to change it.",
            self.root.display(),
            attempted.display()
        )))
    }
}

//! Command lines for the package manager, compiler and bundler.

use std::path::{Path, PathBuf};

use super::command::StepCommand;
use super::resolver::{ModuleDescriptor, Target};
use crate::config::BuildMode;

/// Programs used to drive the build. Everything compiler- and bundler-related
/// goes through `npx`, so pointing it elsewhere swaps the whole toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub npx: PathBuf,
    pub npm: PathBuf,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            npx: PathBuf::from("npx"),
            npm: PathBuf::from("npm"),
        }
    }
}

/// Options for one bundler invocation.
#[derive(Debug, Clone)]
pub struct BundleOptions<'a> {
    pub entry_point: &'a Path,
    pub mode: BuildMode,
    /// Bundler `--target`.
    pub node_target: &'a str,
}

impl Toolchain {
    pub fn npm_install(&self) -> StepCommand {
        StepCommand::new(&self.npm).args(["install", "--silent", "--no-progress", "--no-audit"])
    }

    pub fn spago_build(&self) -> StepCommand {
        StepCommand::new(&self.npx).args(["spago", "build", "--no-psa"])
    }

    /// Watch build that touches `flag_file` after every build, successful or not.
    pub fn spago_watch(&self, flag_file: &Path) -> StepCommand {
        let touch = format!("echo . > {}", flag_file.display());
        StepCommand::new(&self.npx)
            .args(["spago", "build", "--watch", "--then"])
            .arg(&touch)
            .arg("--else")
            .arg(&touch)
            .arg("--no-psa")
    }

    pub fn spago_bundle_module(&self, module: &str, to: &Path) -> StepCommand {
        StepCommand::new(&self.npx)
            .args(["spago", "bundle-module", "--main", module, "--to"])
            .arg(to)
            .arg("--no-psa")
    }

    /// Bundle `module` for one target, writing `{out}.dependencies` as metafile.
    pub fn esbuild(
        &self,
        module: &ModuleDescriptor,
        target: Target,
        out: &Path,
        options: &BundleOptions<'_>,
    ) -> StepCommand {
        let mut cmd = StepCommand::new(&self.npx)
            .arg("esbuild")
            .arg(options.entry_point)
            .arg("--bundle")
            .arg(format!("--outfile={}", out.display()))
            .arg(format!("--global-name={}", module.global_name()))
            .arg(format!("--platform={}", target.platform()))
            .arg(format!(
                "--define:process.env.NODE_ENV=\"{}\"",
                options.mode.node_env()
            ))
            .arg("--loader:.css=text")
            .arg(format!("--metafile={}", metafile_path(out).display()));
        if options.mode == BuildMode::Production {
            cmd = cmd.arg("--minify");
        }
        cmd.arg(format!("--target={}", options.node_target))
    }
}

/// Where the bundler writes the metafile for `out`.
pub fn metafile_path(out: &Path) -> PathBuf {
    let mut name = out.as_os_str().to_owned();
    name.push(".dependencies");
    PathBuf::from(name)
}

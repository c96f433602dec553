//! Command-line interface definitions using clap.

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing::Level;

use ssrd::config::{BuildMode, SsrConfig};
use ssrd::logging::LogFormat;
use ssrd::worker::InterpreterKind;

/// Build modules and evaluate them server-side in a persistent worker.
#[derive(Parser, Debug)]
#[command(name = "ssrd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Enable verbose output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    pub quiet: bool,

    /// Log format.
    #[arg(long, env = "SSRD_LOG_FORMAT", global = true)]
    pub log_format: Option<LogFormat>,

    /// Disable colored output.
    #[arg(
        long,
        env = "NO_COLOR",
        global = true,
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Project layout and toolchain options shared by all commands.
#[derive(Args, Debug, Default)]
pub struct ProjectArgs {
    /// Project root.
    #[arg(long, env = "SSRD_ROOT", global = true)]
    pub root: Option<PathBuf>,

    /// Source directory, relative to the root.
    #[arg(long, env = "SSRD_SRC_DIR", global = true)]
    pub src_dir: Option<String>,

    /// Scratch directory, relative to the root.
    #[arg(long, env = "SSRD_TEMP_DIR", global = true)]
    pub temp_dir: Option<PathBuf>,

    /// Directory for server-side bundles.
    #[arg(long, env = "SSRD_SERVER_OUTPUT", global = true)]
    pub server_output: Option<PathBuf>,

    /// Build mode (development, production).
    #[arg(long, env = "SSRD_MODE", global = true)]
    pub mode: Option<BuildMode>,

    /// In development, run one full build instead of a watch.
    #[arg(long, global = true)]
    pub no_watch: bool,

    /// Worker interpreter (node, sh).
    #[arg(long, env = "SSRD_INTERPRETER", global = true)]
    pub interpreter: Option<InterpreterKind>,

    /// Bundler target.
    #[arg(long, global = true)]
    pub node_target: Option<String>,

    /// Program used to run the compiler and bundler.
    #[arg(long, env = "SSRD_NPX", global = true, hide = true)]
    pub npx: Option<PathBuf>,

    /// Package manager.
    #[arg(long, env = "SSRD_NPM", global = true, hide = true)]
    pub npm: Option<PathBuf>,
}

impl ProjectArgs {
    /// Environment-derived configuration with command-line values on top.
    pub fn to_config(&self) -> SsrConfig {
        let mut config = SsrConfig::default().with_env_overrides();
        if let Some(root) = &self.root {
            config.root = ssrd::paths::expand_tilde(root);
        }
        if let Some(src_dir) = &self.src_dir {
            config.src_dir = src_dir.clone();
        }
        if let Some(temp_dir) = &self.temp_dir {
            config.temp_dir = temp_dir.clone();
        }
        if let Some(dir) = &self.server_output {
            config.server_output = ssrd::paths::expand_tilde(dir);
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if self.no_watch {
            config.watch = false;
        }
        if let Some(interpreter) = self.interpreter {
            config.interpreter = interpreter;
        }
        if let Some(target) = &self.node_target {
            config.node_target = target.clone();
        }
        if let Some(npx) = &self.npx {
            config.toolchain.npx = npx.clone();
        }
        if let Some(npm) = &self.npm {
            config.toolchain.npm = npm.clone();
        }
        config
    }
}

impl Cli {
    /// Log level implied by -v/-q, if either was given.
    pub fn log_level(&self) -> Option<Level> {
        if self.quiet {
            return Some(Level::ERROR);
        }
        match self.verbose {
            0 => None,
            1 => Some(Level::INFO),
            2 => Some(Level::DEBUG),
            _ => Some(Level::TRACE),
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate a template against a built module and print the result.
    Eval(EvalArgs),

    /// Build a module and list the files it depends on.
    Build(BuildArgs),

    /// Show where a module's artifacts live and whether it is built.
    Resolve(ResolveArgs),

    /// Install packages and create output directories.
    Init(InitArgs),

    /// Generate shell completions.
    Completions(CompletionsArgs),
}

/// Arguments for the eval command.
#[derive(Parser, Debug)]
pub struct EvalArgs {
    /// Module source path, e.g. src/EntryPoints/Home.purs.
    pub module: String,

    /// Template code receiving a module loader; `-` reads it from stdin.
    pub template: String,

    /// Timeout in seconds (0 waits forever).
    #[arg(short, long, env = "SSRD_TIMEOUT_SECS")]
    pub timeout: Option<f64>,

    /// In development, re-bundle the module before evaluating.
    #[arg(long)]
    pub rebuild: bool,
}

/// Arguments for the build command.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Module source path.
    pub module: String,

    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the resolve command.
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Module source path.
    pub module: String,

    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the init command.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Skip when node_modules already exists.
    #[arg(long)]
    pub only_when_clean: bool,
}

/// Arguments for shell completions.
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate and print completions to stdout.
    pub fn generate(&self) {
        clap_complete::generate(
            self.shell,
            &mut Cli::command(),
            "ssrd",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_eval() {
        let cli = Cli::try_parse_from([
            "ssrd",
            "--root",
            "/srv/site",
            "eval",
            "src/Foo",
            "load => load().x",
            "--timeout",
            "2.5",
        ])
        .unwrap();
        assert_eq!(cli.project.root, Some(PathBuf::from("/srv/site")));
        match cli.command {
            Commands::Eval(args) => {
                assert_eq!(args.module, "src/Foo");
                assert_eq!(args.template, "load => load().x");
                assert_eq!(args.timeout, Some(2.5));
            }
            other => panic!("Expected eval, got {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ssrd", "build", "src/Foo", "--mode", "development", "--no-watch", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.project.mode, Some(BuildMode::Development));
        assert!(cli.project.no_watch);
        assert_eq!(cli.log_level(), Some(Level::DEBUG));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["ssrd", "-q", "-v", "init"]).is_err());
        let cli = Cli::try_parse_from(["ssrd", "-q", "init"]).unwrap();
        assert_eq!(cli.log_level(), Some(Level::ERROR));
    }

    #[test]
    fn test_no_color_flag() {
        let cli = Cli::try_parse_from(["ssrd", "--no-color", "init"]).unwrap();
        assert!(cli.no_color);
    }

    #[test]
    fn test_invalid_interpreter_rejected() {
        assert!(Cli::try_parse_from(["ssrd", "--interpreter", "python", "init"]).is_err());
    }

    #[test]
    fn test_cli_values_override_config() {
        let args = ProjectArgs {
            root: Some(PathBuf::from("/srv/site")),
            mode: Some(BuildMode::Development),
            no_watch: true,
            interpreter: Some(InterpreterKind::Shell),
            ..Default::default()
        };
        let config = args.to_config();
        assert_eq!(config.root, PathBuf::from("/srv/site"));
        assert_eq!(config.mode, BuildMode::Development);
        assert!(!config.watch);
        assert_eq!(config.interpreter, InterpreterKind::Shell);
    }
}

//! ssrd - server-side rendering daemon tooling

mod cli;

use std::io::Read;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::{OwoColorize, Stream::Stderr};
use serde::Serialize;

use cli::{BuildArgs, Cli, Commands, EvalArgs, InitArgs, ResolveArgs};
use ssrd::config::{SsrConfig, timeout_from_secs};
use ssrd::engine::Engine;
use ssrd::logging::{self, LogConfig};

fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        owo_colors::set_override(false);
    }
    init_logging(&cli);

    let result = match &cli.command {
        Commands::Eval(args) => cmd_eval(&cli, args),
        Commands::Build(args) => cmd_build(&cli, args),
        Commands::Resolve(args) => cmd_resolve(&cli, args),
        Commands::Init(args) => cmd_init(&cli, args),
        Commands::Completions(args) => {
            args.generate();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!(
            "{}: {}",
            "error"
                .if_supports_color(Stderr, |text| text.red())
                .if_supports_color(Stderr, |text| text.bold()),
            e
        );
        for cause in e.chain().skip(1) {
            eprintln!(
                "  {}: {}",
                "caused by".if_supports_color(Stderr, |text| text.yellow()),
                cause
            );
        }
        std::process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
    let mut config = LogConfig::default();
    if let Some(level) = cli.log_level() {
        // Scope to our own crate so -v doesn't drown in dependency noise.
        config = config
            .with_level(level)
            .with_filter(format!("ssrd={}", level.to_string().to_lowercase()));
    }
    let mut config = config.with_env_overrides();
    if let Some(format) = cli.log_format {
        config = config.with_format(format);
    }
    logging::init(config);
}

fn engine(cli: &Cli) -> Result<Engine> {
    let config: SsrConfig = cli.project.to_config();
    Engine::new(config).context("Invalid configuration")
}

fn cmd_eval(cli: &Cli, args: &EvalArgs) -> Result<()> {
    let template = if args.template == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read template from stdin")?;
        buf
    } else {
        args.template.clone()
    };

    let engine = engine(cli)?;
    if args.rebuild {
        engine.ensure_module_built(&args.module)?;
    }

    let timeout = match args.timeout {
        Some(secs) => timeout_from_secs(secs),
        None => engine.config().timeout,
    };
    let output = engine.server_side_eval_with_timeout(&args.module, &template, timeout)?;
    print!("{}", output);
    Ok(())
}

#[derive(Serialize)]
struct BuildReport<'a> {
    module: &'a str,
    browser_artifact: String,
    server_artifact: String,
    bundle_bytes: usize,
    dependencies: Vec<String>,
}

fn cmd_build(cli: &Cli, args: &BuildArgs) -> Result<()> {
    let engine = engine(cli)?;
    let output = engine
        .build(&args.module)
        .with_context(|| format!("Failed to build {}", args.module))?;

    if args.json {
        let report = BuildReport {
            module: &output.module.name,
            browser_artifact: output.module.browser_artifact.display().to_string(),
            server_artifact: output.module.server_artifact.display().to_string(),
            bundle_bytes: output.browser_bundle.len(),
            dependencies: output
                .dependencies
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for dep in &output.dependencies {
            println!("{}", dep.display());
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ResolveReport<'a> {
    module: &'a str,
    browser_artifact: String,
    server_artifact: String,
    /// Unix seconds of the server artifact, null when not built.
    built_at: Option<u64>,
}

fn cmd_resolve(cli: &Cli, args: &ResolveArgs) -> Result<()> {
    let engine = engine(cli)?;
    let module = engine.resolve(&args.module)?;
    let built_at = engine
        .pipeline()
        .resolver()
        .is_built(&module)
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs());

    let report = ResolveReport {
        module: &module.name,
        browser_artifact: module.browser_artifact.display().to_string(),
        server_artifact: module.server_artifact.display().to_string(),
        built_at,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("module:  {}", report.module);
        println!("browser: {}", report.browser_artifact);
        println!("server:  {}", report.server_artifact);
        match report.built_at {
            Some(secs) => println!("built:   {}", secs),
            None => println!("built:   {}", "no".if_supports_color(owo_colors::Stream::Stdout, |t| t.yellow())),
        }
    }
    Ok(())
}

fn cmd_init(cli: &Cli, args: &InitArgs) -> Result<()> {
    let engine = engine(cli)?;
    let ran = engine.ensure_environment(args.only_when_clean)?;
    if !ran {
        eprintln!("Environment already initialized, skipping");
    }
    Ok(())
}

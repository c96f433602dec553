//! End-to-end tests for the build pipeline and server-side evaluation.
//!
//! These run against a fake toolchain and the POSIX shell interpreter, so they
//! need neither npm nor Node.js. Node-backed tests skip when `node` is absent.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeProject, bump_mtime, node_available};
use ssrd::build::ProjectWatch;
use ssrd::cache::{CacheNamespace, MemoryCache};
use ssrd::config::BuildMode;
use ssrd::engine::Engine;
use ssrd::error::SsrError;
use ssrd::worker::{NodeInterpreter, ShellInterpreter};

const HOME: &str = "src/EntryPoints/Home.purs";

#[test]
fn test_production_build_then_eval() {
    let project = FakeProject::new();
    let engine = Engine::new(project.config(BuildMode::Production)).unwrap();

    let output = engine.build(HOME).unwrap();
    assert_eq!(output.module.name, "EntryPoints.Home");
    assert!(output.browser_bundle.starts_with("# bundled from "));
    assert!(output.browser_bundle.contains("render()"));

    // Every source file, nothing from tool or output directories.
    let mut deps: Vec<_> = output
        .dependencies
        .iter()
        .map(|p| p.strip_prefix(&project.root).unwrap().to_string_lossy().into_owned())
        .collect();
    deps.sort();
    assert_eq!(deps, vec!["src/EntryPoints/Home.purs", "src/Shared.js"]);

    let calls = project.calls();
    assert_eq!(calls[0], "npm install --silent --no-progress --no-audit");
    assert!(calls[1].starts_with("npx spago bundle-module --main EntryPoints.Home --to "));
    assert!(calls[1].ends_with("/.temp/bundles/EntryPoints.Home.js --no-psa"));
    assert_eq!(project.calls_starting_with("npx esbuild"), 2);
    assert!(calls.iter().filter(|c| c.starts_with("npx esbuild")).all(|c| c.contains("--minify")));

    let html = engine
        .server_side_eval(HOME, "load_module; render world")
        .unwrap();
    assert_eq!(html, "<div>Hello, world</div>");
}

#[test]
fn test_development_build_reports_metafile_dependencies() {
    let project = FakeProject::new();
    let engine = Engine::new(project.config(BuildMode::Development)).unwrap();

    let output = engine.build(HOME).unwrap();
    assert_eq!(
        output.dependencies,
        vec![
            project.root.join("output/EntryPoints.Home/index.js"),
            project.root.join("src/Shared.js"),
        ]
    );
    assert!(
        project
            .calls()
            .iter()
            .filter(|c| c.starts_with("npx esbuild"))
            .all(|c| !c.contains("--minify") && c.contains("NODE_ENV=\"development\""))
    );

    // The one-off compile happens once per engine.
    engine.build(HOME).unwrap();
    assert_eq!(project.calls_starting_with("npx spago build --no-psa"), 1);
    assert_eq!(project.calls_starting_with("npx esbuild"), 4);
}

#[test]
fn test_development_watch_lifecycle() {
    let project = FakeProject::new();
    let engine = Engine::with_parts(
        project.config(BuildMode::Development).with_watch(true),
        Arc::new(ShellInterpreter::default()),
        ProjectWatch::new(Duration::from_millis(20)),
    )
    .unwrap();

    engine.build(HOME).unwrap();
    assert!(engine.pipeline().watch().pid().is_some());
    assert_eq!(project.calls_starting_with("npx spago build --watch"), 1);

    engine.build(HOME).unwrap();
    assert_eq!(project.calls_starting_with("npx spago build --watch"), 1);

    engine.shutdown();
    assert!(engine.pipeline().watch().pid().is_none());
}

#[test]
fn test_development_missing_entry_point() {
    let project = FakeProject::new();
    let engine = Engine::new(project.config(BuildMode::Development)).unwrap();

    let err = engine.build("src/Nope.purs").unwrap_err();
    match err {
        SsrError::EntryPointMissing { module, path } => {
            assert_eq!(module, "Nope");
            assert_eq!(path, std::path::PathBuf::from("output/Nope/index.js"));
        }
        other => panic!("Expected EntryPointMissing, got {:?}", other),
    }
}

#[test]
fn test_bundler_failure_is_build_step_failure() {
    let project = FakeProject::new();
    project.write_source("src/Broken.purs", "BROKEN\n");
    let engine = Engine::new(project.config(BuildMode::Production)).unwrap();

    let err = engine.build("src/Broken.purs").unwrap_err();
    match err {
        SsrError::BuildStepFailure {
            command,
            status,
            stderr,
        } => {
            assert!(command.contains(" esbuild "));
            assert!(!status.success());
            assert!(stderr.contains("syntax error"));
        }
        other => panic!("Expected BuildStepFailure, got {:?}", other),
    }
}

#[test]
fn test_eval_before_build_is_build_missing() {
    let project = FakeProject::new();
    let engine = Engine::new(project.config(BuildMode::Production)).unwrap();

    let err = engine.server_side_eval(HOME, "load_module").unwrap_err();
    assert!(matches!(err, SsrError::BuildMissing { .. }));
    assert_eq!(engine.worker_stats().spawns, 0);
    assert!(project.calls().is_empty());
}

#[test]
fn test_rebuild_restarts_worker() {
    let project = FakeProject::new();
    let engine = Engine::new(project.config(BuildMode::Production)).unwrap();

    engine.build(HOME).unwrap();
    assert_eq!(
        engine.server_side_eval(HOME, "load_module; render a").unwrap(),
        "<div>Hello, a</div>"
    );
    assert_eq!(engine.worker_stats().generation, Some(1));

    project.write_source(
        "src/EntryPoints/Home.purs",
        "render() { printf '<p>Bye, %s</p>' \"$1\"; }\n",
    );
    let output = engine.build(HOME).unwrap();
    bump_mtime(&output.module.server_artifact, Duration::from_secs(2));

    assert_eq!(
        engine.server_side_eval(HOME, "load_module; render b").unwrap(),
        "<p>Bye, b</p>"
    );
    assert_eq!(engine.worker_stats().generation, Some(2));
}

#[test]
fn test_ensure_module_built_in_development() {
    let project = FakeProject::new();
    let engine = Engine::new(project.config(BuildMode::Development)).unwrap();

    // Compiler output exists once the project has been built.
    engine.build(HOME).unwrap();
    let esbuild_runs = project.calls_starting_with("npx esbuild");

    engine.ensure_module_built(HOME).unwrap();
    assert_eq!(project.calls_starting_with("npx esbuild"), esbuild_runs + 2);
}

#[test]
fn test_ensure_module_built_is_noop_in_production() {
    let project = FakeProject::new();
    let engine = Engine::new(project.config(BuildMode::Production)).unwrap();

    engine.ensure_module_built(HOME).unwrap();
    assert!(project.calls().is_empty());
}

#[test]
fn test_ensure_environment_only_when_clean() {
    let project = FakeProject::new();
    let engine = Engine::new(project.config(BuildMode::Production)).unwrap();

    assert!(engine.ensure_environment(true).unwrap());
    assert!(project.root.join("node_modules").is_dir());
    assert!(project.root.join(".temp/.out").is_dir());

    assert!(!engine.ensure_environment(true).unwrap());
    assert!(!engine.ensure_environment(false).unwrap());
    assert_eq!(project.calls_starting_with("npm install"), 1);
}

#[test]
fn test_loading_from_another_root_is_rejected() {
    let project = FakeProject::new();
    let engine = Engine::new(project.config(BuildMode::Production)).unwrap();

    engine.ensure_root(&project.root).unwrap();
    let err = engine.ensure_root(&project.root.join("elsewhere")).unwrap_err();
    assert!(matches!(err, SsrError::Configuration(_)));
}

#[test]
fn test_render_cache_serves_repeat_requests() {
    let project = FakeProject::new();
    let cache = Arc::new(MemoryCache::new());
    let engine = Engine::new(project.config(BuildMode::Production))
        .unwrap()
        .with_cache_provider(cache.clone());
    engine.build(HOME).unwrap();

    let ns = CacheNamespace::new("home").expires_in(Duration::from_secs(60));
    let first = engine.render(Some(&ns), HOME, "load_module; render x").unwrap();
    let second = engine.render(Some(&ns), HOME, "load_module; render x").unwrap();
    assert_eq!(first, second);
    assert_eq!(engine.worker_stats().exchanges, 1);
    assert_eq!(cache.len(), 1);

    // No namespace, no cache.
    engine.render(None, HOME, "load_module; render x").unwrap();
    assert_eq!(engine.worker_stats().exchanges, 2);
}

#[test]
fn test_node_eval_round_trip() {
    if !node_available() {
        eprintln!("node not found, skipping");
        return;
    }
    let project = FakeProject::new();
    let engine = Engine::with_interpreter(
        project.config(BuildMode::Production),
        Arc::new(NodeInterpreter::default()),
    )
    .unwrap();

    let module = engine.resolve(HOME).unwrap();
    std::fs::create_dir_all(module.server_artifact.parent().unwrap()).unwrap();
    std::fs::write(
        &module.server_artifact,
        "module.exports = { greet: name => '<b>' + name + '</b>' }\n",
    )
    .unwrap();

    let out = engine
        .server_side_eval(HOME, "loadModule => loadModule().greet('node')")
        .unwrap();
    assert_eq!(out, "<b>node</b>");

    let err = engine
        .server_side_eval(HOME, "loadModule => { throw new Error('boom') }")
        .unwrap_err();
    assert!(err.is_execution_failure());
    assert!(err.to_string().contains("boom"));

    // Non-Error throws are stringified.
    let err = engine
        .server_side_eval(HOME, "loadModule => { throw 42 }")
        .unwrap_err();
    assert!(err.to_string().contains("42"));

    // console.log inside templates must not corrupt the response.
    let out = engine
        .server_side_eval(HOME, "loadModule => { console.log('noise'); return 'quiet' }")
        .unwrap();
    assert_eq!(out, "quiet");
    assert_eq!(engine.worker_stats().spawns, 1);
}

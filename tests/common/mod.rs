//! Shared fixtures: a throwaway project with a fake `npx`/`npm`.
//!
//! The fake compiler "compiles" `src/A/B.purs` by copying it to
//! `output/A.B/index.js`; the fake bundler prepends a comment line and writes
//! a metafile listing the entry point and `src/Shared.js`. Sources are shell
//! snippets so the POSIX shell interpreter can load the bundles.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use ssrd::build::Toolchain;
use ssrd::config::{BuildMode, SsrConfig};
use ssrd::worker::InterpreterKind;
use tempfile::TempDir;

const FAKE_NPX: &str = r##"#!/bin/sh
echo "npx $*" >> "__LOG__"

compile_all() {
  find src -name '*.purs' | while IFS= read -r f; do
    m=${f#src/}
    m=$(echo "${m%.purs}" | tr / .)
    mkdir -p "output/$m"
    cp "$f" "output/$m/index.js"
  done
}

case "$1" in
  esbuild)
    entry="$2"
    out=
    meta=
    for a in "$@"; do
      case "$a" in
        --outfile=*) out="${a#--outfile=}" ;;
        --metafile=*) meta="${a#--metafile=}" ;;
      esac
    done
    if grep -q BROKEN "$entry"; then
      echo "esbuild: syntax error in $entry" >&2
      exit 1
    fi
    mkdir -p "$(dirname "$out")"
    { echo "# bundled from $entry"; cat "$entry"; } > "$out"
    printf '{"inputs":{},"outputs":{"%s":{"inputs":{"%s":{},"src/Shared.js":{}}}}}' "$out" "$entry" > "$meta"
    ;;
  spago)
    case "$2" in
      bundle-module)
        main=
        to=
        while [ $# -gt 0 ]; do
          case "$1" in
            --main) main="$2" ;;
            --to) to="$2" ;;
          esac
          shift
        done
        src="src/$(echo "$main" | tr . /).purs"
        [ -f "$src" ] || { echo "Module $main not found" >&2; exit 1; }
        mkdir -p "$(dirname "$to")"
        cp "$src" "$to"
        ;;
      build)
        compile_all
        if [ "$3" = "--watch" ]; then
          sh -c "$5"
          exec sleep 60
        fi
        ;;
    esac
    ;;
esac
"##;

const FAKE_NPM: &str = r#"#!/bin/sh
echo "npm $*" >> "__LOG__"
mkdir -p node_modules
"#;

pub struct FakeProject {
    _dir: TempDir,
    pub root: PathBuf,
    pub toolchain: Toolchain,
    log: PathBuf,
}

impl FakeProject {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("site");
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&bin).unwrap();
        let log = dir.path().join("calls.log");

        let npx = write_script(&bin.join("npx"), FAKE_NPX, &log);
        let npm = write_script(&bin.join("npm"), FAKE_NPM, &log);

        let project = Self {
            _dir: dir,
            root,
            toolchain: Toolchain { npx, npm },
            log,
        };
        project.write_source(
            "src/EntryPoints/Home.purs",
            "render() { printf '<div>Hello, %s</div>' \"$1\"; }\n",
        );
        project.write_source("src/Shared.js", "");
        project
    }

    pub fn config(&self, mode: BuildMode) -> SsrConfig {
        SsrConfig::new()
            .with_root(&self.root)
            .with_mode(mode)
            .with_watch(false)
            .with_interpreter(InterpreterKind::Shell)
            .with_toolchain(self.toolchain.clone())
    }

    pub fn write_source(&self, rel: &str, body: &str) {
        let path = self.root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    /// Commands the fake toolchain has run, in order.
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

fn write_script(path: &Path, template: &str, log: &Path) -> PathBuf {
    let body = template.replace("__LOG__", &log.display().to_string());
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

/// Whether a working `node` is on PATH.
pub fn node_available() -> bool {
    std::process::Command::new("node")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Push an artifact's mtime forward so staleness checks see a rebuild.
pub fn bump_mtime(path: &Path, by: std::time::Duration) {
    let current = std::fs::metadata(path).unwrap().modified().unwrap();
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(current + by)
        .unwrap();
}

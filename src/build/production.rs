//! Production builds: compile the module into a single bundle, then run the
//! bundler on it for both targets with minification.
//!
//! Production has no watcher telling us what a module actually depends on, so
//! every file under the root counts as a dependency.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::BuildPipeline;
use super::resolver::ModuleDescriptor;
use crate::config::BuildMode;
use crate::error::Result;

pub(super) fn build(pipeline: &BuildPipeline, module: &ModuleDescriptor) -> Result<Vec<PathBuf>> {
    let bundle = pipeline
        .config()
        .absolute_temp_dir()
        .join("bundles")
        .join(format!("{}.js", module.name));
    if let Some(parent) = bundle.parent() {
        std::fs::create_dir_all(parent)?;
    }

    pipeline
        .toolchain()
        .spago_bundle_module(&module.name, &bundle)
        .run(pipeline.root())?;
    pipeline.bundle(module, &bundle, BuildMode::Production)?;

    collect_dependencies(pipeline.root(), &pipeline.config().ignored_dirs())
}

/// Every file under `root`, skipping the `ignored` directories entirely.
pub fn collect_dependencies(root: &Path, ignored: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut deps = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !ignored.iter().any(|d| d == e.path()));

    for entry in walker {
        let entry = entry
            .map_err(|e| std::io::Error::other(format!("walking {}: {}", root.display(), e)))?;
        if !entry.file_type().is_dir() {
            deps.push(entry.into_path());
        }
    }
    Ok(deps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    #[test]
    fn test_collect_dependencies_skips_ignored_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("spago.dhall"));
        touch(&root.join("src/Main.purs"));
        touch(&root.join("src/Foo/Bar.purs"));
        touch(&root.join("node_modules/react/index.js"));
        touch(&root.join("output/Main/index.js"));
        touch(&root.join(".temp/.out/Main.js"));

        let ignored = vec![
            root.join("node_modules"),
            root.join("output"),
            root.join(".temp"),
        ];
        let deps = collect_dependencies(root, &ignored).unwrap();
        let rel: Vec<_> = deps
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(rel, vec!["spago.dhall", "src/Foo/Bar.purs", "src/Main.purs"]);
    }

    #[test]
    fn test_collect_dependencies_only_ignores_exact_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("src/output/Page.purs"));

        let deps = collect_dependencies(root, &[root.join("output")]).unwrap();
        assert_eq!(deps, vec![root.join("src/output/Page.purs")]);
    }
}

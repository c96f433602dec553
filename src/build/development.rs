//! Development builds: the project watch keeps compiler output current, and
//! the bundler runs on that output every time. Dependencies are exactly the
//! inputs the bundler reports in its metafile.

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::BuildPipeline;
use super::resolver::ModuleDescriptor;
use super::toolchain::metafile_path;
use crate::config::BuildMode;
use crate::error::{Result, SsrError};
use crate::paths;

/// Compiler output entry point for `module`, relative to the root.
pub fn entry_point(module: &ModuleDescriptor) -> PathBuf {
    Path::new("output").join(&module.name).join("index.js")
}

pub(super) fn build(pipeline: &BuildPipeline, module: &ModuleDescriptor) -> Result<Vec<PathBuf>> {
    pipeline.ensure_watch()?;
    bundle(pipeline, module)?;

    let mut deps: Vec<PathBuf> = Vec::new();
    for (_, artifact) in module.artifacts() {
        for input in metafile_inputs(&metafile_path(artifact))? {
            let path = paths::resolve_against(pipeline.root(), input.trim());
            if !deps.contains(&path) {
                deps.push(path);
            }
        }
    }
    Ok(deps)
}

/// Bundle from compiler output. Fails if the compiler hasn't produced the
/// module yet.
pub(super) fn bundle(pipeline: &BuildPipeline, module: &ModuleDescriptor) -> Result<()> {
    let entry = entry_point(module);
    if !pipeline.root().join(&entry).is_file() {
        return Err(SsrError::EntryPointMissing {
            module: module.name.clone(),
            path: entry,
        });
    }
    pipeline.bundle(module, &entry, BuildMode::Development)
}

/// Input paths of the first output in a bundler metafile.
pub fn metafile_inputs(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(|e| SsrError::Metafile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_metafile(&text).ok_or_else(|| SsrError::Metafile {
        path: path.to_path_buf(),
        reason: "expected outputs.<first>.inputs to be an object".to_string(),
    })
}

fn parse_metafile(text: &str) -> Option<Vec<String>> {
    let json: Value = serde_json::from_str(text).ok()?;
    let (_, first) = json.get("outputs")?.as_object()?.iter().next()?;
    let inputs = first.get("inputs")?.as_object()?;
    Some(inputs.keys().cloned().collect())
}

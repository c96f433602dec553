//! Path utilities for the project layout.

use std::path::{Component, Path, PathBuf};

/// Default project root, relative to the current directory.
pub const DEFAULT_ROOT: &str = "app/assets/purs";

/// Default source directory, relative to the root.
pub const DEFAULT_SRC_DIR: &str = "src";

/// Default scratch directory, relative to the root.
pub const DEFAULT_TEMP_DIR: &str = ".temp";

/// Default location of server-target artifacts, relative to the root.
pub const DEFAULT_SERVER_OUTPUT: &str = "public/assets/purs_ssr";

/// Directories never treated as build inputs.
pub const IGNORED_DIRS: &[&str] = &["node_modules", ".spago", "output", ".cache"];

/// Expands a leading `~` in a path to the user's home directory.
///
/// This handles the common case where shell tilde expansion doesn't occur,
/// such as when using `--root=~/path` syntax instead of `--root ~/path`.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use ssrd::paths::expand_tilde;
///
/// let expanded = expand_tilde(PathBuf::from("~/site"));
/// assert!(!expanded.to_str().unwrap().starts_with("~"));
///
/// let path = PathBuf::from("/tmp/foo");
/// assert_eq!(expand_tilde(&path), path);
/// ```
pub fn expand_tilde<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    if let Ok(stripped) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    path.to_path_buf()
}

/// Resolve `path` against `base` unless it is already absolute.
///
/// The result is lexically normalized (`.` dropped, `..` folded) but symlinks
/// are left alone, so it works for paths that don't exist yet.
///
/// ```
/// use std::path::{Path, PathBuf};
/// use ssrd::paths::resolve_against;
///
/// assert_eq!(
///     resolve_against(Path::new("/srv/site"), "./output/../.temp"),
///     PathBuf::from("/srv/site/.temp")
/// );
/// assert_eq!(resolve_against(Path::new("/srv/site"), "/abs"), PathBuf::from("/abs"));
/// ```
pub fn resolve_against<P: AsRef<Path>>(base: &Path, path: P) -> PathBuf {
    let path = expand_tilde(path);
    let joined = if path.is_absolute() {
        path
    } else {
        base.join(path)
    };
    normalize(&joined)
}

/// Make `path` absolute using the current directory.
pub fn absolutize<P: AsRef<Path>>(path: P) -> std::io::Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    Ok(resolve_against(&cwd, path))
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

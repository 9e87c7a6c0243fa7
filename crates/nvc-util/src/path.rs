//! Path utilities.
//!
//! This module provides utilities for working with file paths.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Get the nvc configuration directory.
///
/// This follows XDG conventions on Linux/macOS:
/// - `$XDG_CONFIG_HOME/nvc` if set
/// - `~/.config/nvc` otherwise
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("nvc"))
}

/// Normalize a path by removing `.` and `..` components.
///
/// Unlike `canonicalize`, this doesn't require the path to exist.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            _ => {
                result.push(component);
            }
        }
    }

    result
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve_in(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base.join(path))
    }
}

/// Check that `name` is exactly one normal path component.
///
/// Directory exclusion during traversal matches entry names, so anything
/// containing a separator, `.` or `..` can never match.
///
/// The name must also be written exactly as that component: `target/`
/// parses to `target` but would never equal an entry name.
pub fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(component)), None) => component == OsStr::new(name),
        _ => false,
    }
}

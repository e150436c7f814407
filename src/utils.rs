//! Shared path helpers
//!
//! Paths are compared after lexical normalization everywhere in the crate,
//! so every component that accepts a user path goes through `normalize_path`.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Make a path absolute and lexically normalized.
///
/// `.` components are dropped and `..` pops the previous component. Symlinks
/// are not resolved, so two spellings of the same directory that differ only
/// by a link are treated as different roots.
pub fn normalize_path(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // Popping past the root is a no-op, same as the OS does
                normalized.pop();
            }
            Component::Normal(name) => normalized.push(name),
        }
    }
    Ok(normalized)
}

/// Check if a file or directory name carries the hidden-file marker.
pub fn is_hidden_name(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Normalize a path for display (strip Windows long-path prefixes).
pub fn display_path(path: &Path) -> String {
    let path_str = path.to_string_lossy().to_string();
    #[cfg(windows)]
    {
        if let Some(stripped) = path_str.strip_prefix(r"\\?\UNC\") {
            return format!(r"\\{}", stripped);
        }
        if let Some(stripped) = path_str.strip_prefix(r"\\?\") {
            return stripped.to_string();
        }
    }
    path_str
}

/// Render `path` relative to `base` with `/` separators.
///
/// Returns "." when the two are equal, and the full display path when `path`
/// does not live under `base`.
pub fn to_relative_path(path: &Path, base: &Path) -> String {
    match path.strip_prefix(base) {
        Ok(relative) => {
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            if parts.is_empty() {
                ".".to_string()
            } else {
                parts.join("/")
            }
        }
        Err(_) => display_path(path),
    }
}

//! Directory scanning and file-list fingerprints
//!
//! A scan produces a deterministic, ordered list of matching files. Within a
//! directory, files come before subdirectories and both are sorted by name,
//! so a recursive listing groups files per directory in pre-order traversal:
//!
//! ```text
//! root/a.png, root/z.png, root/sub1/b.png, root/sub1/deep/c.png, root/sub2/d.png
//! ```
//!
//! The fingerprint is a blake3 digest over that ordered list, used to detect
//! additions, removals and reorderings without comparing whole lists.

use crate::error::{IteratorError, Result};
use crate::utils::{is_hidden_name, normalize_path};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Ordered, deduplicated list of absolute file paths.
pub type FileList = Vec<PathBuf>;

/// Produces the file list for a directory.
///
/// The facade only talks to this trait so callers can observe or replace
/// filesystem access.
pub trait FileScanner: Send + Sync {
    fn scan(&self, root: &Path, recursive: bool, extensions: &BTreeSet<String>) -> Result<FileList>;
}

impl<T: FileScanner + ?Sized> FileScanner for std::sync::Arc<T> {
    fn scan(&self, root: &Path, recursive: bool, extensions: &BTreeSet<String>) -> Result<FileList> {
        (**self).scan(root, recursive, extensions)
    }
}

/// Scanner backed by the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsScanner;

impl FileScanner for FsScanner {
    fn scan(&self, root: &Path, recursive: bool, extensions: &BTreeSet<String>) -> Result<FileList> {
        let root = normalize_path(root).map_err(|_| IteratorError::Path(root.to_path_buf()))?;
        if !root.is_dir() {
            return Err(IteratorError::Path(root));
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(&root)
            .follow_links(false)
            .max_depth(max_depth)
            .sort_by(|a, b| {
                a.file_type()
                    .is_dir()
                    .cmp(&b.file_type().is_dir())
                    .then_with(|| a.file_name().cmp(b.file_name()))
            })
            .into_iter()
            // Pruning here also drops everything below a hidden directory
            .filter_entry(|e| e.depth() == 0 || !is_hidden_name(e.file_name()));

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            if entry.depth() == 0 || !is_regular_file(&entry) {
                continue;
            }
            if has_extension(entry.path(), extensions) {
                files.push(entry.into_path());
            }
        }

        debug!(
            "Scanned {} ({}): {} matching files",
            root.display(),
            if recursive { "recursive" } else { "flat" },
            files.len()
        );
        Ok(files)
    }
}

/// Regular files, plus symlinks that resolve to a regular file.
fn is_regular_file(entry: &DirEntry) -> bool {
    entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())
}

pub(crate) fn has_extension(path: &Path, extensions: &BTreeSet<String>) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .is_some_and(|e| extensions.contains(&e))
}

/// Digest of an ordered file list, stored as lowercase hex.
///
/// The empty string is the "no fingerprint" value of a fresh or legacy
/// record; it never equals the digest of any list, including an empty one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of an ordered list. Pure, no I/O.
    pub fn of(files: &[PathBuf]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(files.len() as u64).to_le_bytes());
        for path in files {
            let bytes = path.as_os_str().as_encoded_bytes();
            // Length prefix keeps ["ab", "c"] and ["a", "bc"] apart
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short form is enough to tell lists apart in logs
        f.write_str(self.0.get(..12).unwrap_or(&self.0))
    }
}

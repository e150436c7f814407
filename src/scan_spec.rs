//! Scan parameters
//!
//! A `ScanSpec` is the full set of parameters that decides which files a scan
//! matches and how they are served. Two specs are equal iff every field
//! matches, with the root compared after normalization.

use crate::error::{IteratorError, Result};
use crate::fingerprint::has_extension;
use crate::utils::normalize_path;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Extensions used when the caller passes nothing.
pub const DEFAULT_EXTENSIONS: &str = "jpg,png,jpeg,webp";

/// Immutable per-invocation scan parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSpec {
    /// Absolute, normalized root directory
    #[serde(alias = "path")]
    pub root: PathBuf,
    pub recursive: bool,
    /// Lowercase extensions without the leading dot
    pub extensions: BTreeSet<String>,
    #[serde(alias = "allow_rgba")]
    pub allow_transparency: bool,
    pub auto_refresh: bool,
}

impl ScanSpec {
    /// Build a spec from raw caller input.
    ///
    /// The root is normalized but not checked for existence; see
    /// [`ScanSpec::ensure_root_dir`].
    pub fn new(
        root: &Path,
        recursive: bool,
        extensions: &str,
        allow_transparency: bool,
        auto_refresh: bool,
    ) -> Result<Self> {
        let root = normalize_path(root).map_err(|_| IteratorError::Path(root.to_path_buf()))?;
        Ok(Self {
            root,
            recursive,
            extensions: parse_extensions(extensions),
            allow_transparency,
            auto_refresh,
        })
    }

    /// Fail with `IteratorError::Path` unless the root is an existing directory.
    pub fn ensure_root_dir(&self) -> Result<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(IteratorError::Path(self.root.clone()))
        }
    }

    /// Check whether a file name's extension is in the set.
    pub fn matches_extension(&self, path: &Path) -> bool {
        has_extension(path, &self.extensions)
    }
}

/// One call of the invocation contract, exactly as a host hands it over.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub root_path: String,
    pub recursive: bool,
    /// Comma-separated extension list, e.g. `"jpg,png"`
    pub extensions: String,
    pub allow_transparency: bool,
    pub auto_refresh: bool,
}

impl Invocation {
    pub fn to_scan_spec(&self) -> Result<ScanSpec> {
        ScanSpec::new(
            Path::new(&self.root_path),
            self.recursive,
            &self.extensions,
            self.allow_transparency,
            self.auto_refresh,
        )
    }
}

impl Default for Invocation {
    fn default() -> Self {
        Self {
            root_path: "./input".to_string(),
            recursive: true,
            extensions: DEFAULT_EXTENSIONS.to_string(),
            allow_transparency: true,
            auto_refresh: false,
        }
    }
}

/// Parse a comma-separated extension list into a normalized set.
///
/// Entries are trimmed, lowercased and stripped of a leading dot; empty
/// entries are dropped.
pub fn parse_extensions(list: &str) -> BTreeSet<String> {
    list.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

//! Change detection between invocations
//!
//! Decides whether the stored file list can be served again or must be
//! regenerated. Policy, in order:
//!
//! 1. Any scan parameter differs from the stored record: rescan.
//! 2. Auto-refresh is off: reuse the stored list without touching the disk.
//! 3. Auto-refresh is on: rescan, and reuse only if the fingerprint of the
//!    fresh list matches the stored one.

use crate::cursor_store::CursorState;
use crate::error::{IteratorError, Result};
use crate::fingerprint::{FileList, FileScanner, Fingerprint};
use crate::scan_spec::ScanSpec;
use tracing::{debug, info};

/// Outcome of comparing a request against the stored record.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Keep serving the stored list at the stored index.
    Reuse,
    /// Scan parameters changed; the caller must scan with the new spec.
    Rescan { changed: &'static str },
    /// Auto-refresh found a different file set; serve this list instead.
    Replace(FileList),
}

impl Decision {
    pub fn reuse(&self) -> bool {
        matches!(self, Decision::Reuse)
    }
}

pub struct ChangeDetector<'a> {
    scanner: &'a dyn FileScanner,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(scanner: &'a dyn FileScanner) -> Self {
        Self { scanner }
    }

    pub fn decide(&self, stored: &CursorState, requested: &ScanSpec) -> Result<Decision> {
        if let Some(changed) = spec_difference(&stored.scan_spec, requested) {
            info!("Scan parameters changed ({}), rescanning {}", changed, requested.root.display());
            return Ok(Decision::Rescan { changed });
        }

        if requested.auto_refresh {
            let fresh = self
                .scanner
                .scan(&requested.root, requested.recursive, &requested.extensions)?;
            let fingerprint = Fingerprint::of(&fresh);
            if fingerprint != stored.fingerprint {
                info!(
                    "File set changed under {} ({} -> {}), replacing list",
                    requested.root.display(),
                    stored.fingerprint,
                    fingerprint
                );
                return Ok(Decision::Replace(fresh));
            }
            debug!("Fingerprint {} unchanged, reusing list", fingerprint);
        } else {
            debug!("Reusing stored list of {} files", stored.file_list.len());
        }

        if stored.file_list.is_empty() {
            return Err(IteratorError::EmptyCollection(requested.root.clone()));
        }
        Ok(Decision::Reuse)
    }
}

/// Name of the first scan parameter that differs, if any.
fn spec_difference(stored: &ScanSpec, requested: &ScanSpec) -> Option<&'static str> {
    if stored.root != requested.root {
        Some("path")
    } else if stored.recursive != requested.recursive {
        Some("recursive")
    } else if stored.extensions != requested.extensions {
        Some("extensions")
    } else if stored.allow_transparency != requested.allow_transparency {
        Some("allow_transparency")
    } else if stored.auto_refresh != requested.auto_refresh {
        Some("auto_refresh")
    } else {
        None
    }
}

//! Persisted cursor state
//!
//! The cursor record is a small JSON document holding the scan parameters,
//! the file list they produced, its fingerprint and the index of the next
//! file to serve. Loading is total: a missing, corrupt or legacy record
//! yields a usable state instead of an error.

use crate::error::{IteratorError, Result};
use crate::fingerprint::{FileList, Fingerprint};
use crate::scan_spec::ScanSpec;
use crate::utils::normalize_path;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, warn};

const STATE_FILE_NAME: &str = "cursor_state.json";

/// Persisted cursor record.
///
/// Scan parameters are stored flat next to the list so records written by
/// earlier versions (`path`, `recursive`, `file_list`, `index`) still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorState {
    #[serde(flatten)]
    pub scan_spec: ScanSpec,
    pub file_list: FileList,
    pub fingerprint: Fingerprint,
    /// Index of the next file to serve, in `[0, file_list.len())` or 0
    pub index: usize,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl CursorState {
    /// State for a freshly scanned list, positioned at its first file.
    pub fn fresh(scan_spec: ScanSpec, file_list: FileList) -> Self {
        let fingerprint = Fingerprint::of(&file_list);
        Self {
            scan_spec,
            file_list,
            fingerprint,
            index: 0,
            saved_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.file_list.is_empty()
    }

    pub fn len(&self) -> usize {
        self.file_list.len()
    }

    /// File the cursor currently points at.
    pub fn current_file(&self) -> Option<&Path> {
        self.file_list.get(self.index).map(PathBuf::as_path)
    }

    /// Move the cursor one step forward, wrapping at the end of the list.
    pub fn advance(&mut self) {
        self.index = if self.file_list.is_empty() {
            0
        } else {
            (self.index + 1) % self.file_list.len()
        };
    }

    /// Repair a record read from disk so every invariant holds.
    fn sanitize(mut self) -> Self {
        if !self.scan_spec.root.as_os_str().is_empty() {
            if let Ok(root) = normalize_path(&self.scan_spec.root) {
                self.scan_spec.root = root;
            }
        }
        if self.fingerprint.is_empty() && !self.file_list.is_empty() {
            debug!("Cursor record has no fingerprint, recomputing from stored list");
            self.fingerprint = Fingerprint::of(&self.file_list);
        }
        if self.index >= self.file_list.len() {
            self.index = 0;
        }
        self
    }
}

/// Storage for the cursor record.
///
/// A store is owned by exactly one iterator. Two processes pointing at the
/// same location is unsupported: the last writer wins.
pub trait CursorStore: Send {
    /// Read the record. Never fails; problems degrade to an empty state.
    fn load(&self) -> CursorState;

    /// Replace the stored record.
    fn save(&self, state: &CursorState) -> Result<()>;

    /// Forget the stored record.
    fn clear(&self) -> Result<()>;

    /// Human-readable location, for logs and status output.
    fn location(&self) -> String;
}

impl<T: CursorStore + Sync + ?Sized> CursorStore for std::sync::Arc<T> {
    fn load(&self) -> CursorState {
        (**self).load()
    }

    fn save(&self, state: &CursorState) -> Result<()> {
        (**self).save(state)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }

    fn location(&self) -> String {
        (**self).location()
    }
}

/// Cursor record stored as a JSON file.
#[derive(Debug, Clone)]
pub struct JsonCursorStore {
    path: PathBuf,
}

impl JsonCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the per-installation default location.
    pub fn at_default_location() -> Self {
        Self::new(default_state_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persistence_error(&self, source: std::io::Error) -> IteratorError {
        IteratorError::Persistence {
            path: self.path.clone(),
            source,
        }
    }
}

impl CursorStore for JsonCursorStore {
    fn load(&self) -> CursorState {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cursor record at {}, starting fresh", self.path.display());
                return CursorState::default();
            }
            Err(e) => {
                warn!("Failed to read cursor record {}: {}", self.path.display(), e);
                return CursorState::default();
            }
        };

        match serde_json::from_str::<CursorState>(&content) {
            Ok(state) => state.sanitize(),
            Err(e) => {
                warn!(
                    "Ignoring unreadable cursor record {}: {}",
                    self.path.display(),
                    e
                );
                CursorState::default()
            }
        }
    }

    fn save(&self, state: &CursorState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| self.persistence_error(e))?;
            }
        }

        let mut record = state.clone();
        record.saved_at = Some(Utc::now());
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| self.persistence_error(std::io::Error::other(e)))?;

        // Write next to the target and rename so a crash never leaves half a record
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|e| self.persistence_error(e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            self.persistence_error(e)
        })?;

        debug!(
            "Saved cursor index {}/{} to {}",
            state.index,
            state.file_list.len(),
            self.path.display()
        );
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.persistence_error(e)),
        }
    }

    fn location(&self) -> String {
        crate::utils::display_path(&self.path)
    }
}

/// In-process cursor store.
///
/// Useful for hosts that keep their own persistence, and for exercising
/// write failures.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    state: Mutex<CursorState>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every following `save` fail (or succeed again).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> CursorState {
        self.state.lock().clone()
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self) -> CursorState {
        self.state.lock().clone()
    }

    fn save(&self, state: &CursorState) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(IteratorError::Persistence {
                path: PathBuf::from(self.location()),
                source: std::io::Error::other("writes disabled"),
            });
        }
        *self.state.lock() = state.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.state.lock() = CursorState::default();
        Ok(())
    }

    fn location(&self) -> String {
        "<memory>".to_string()
    }
}

/// Default record location
///
/// Location: %LOCALAPPDATA%\batch-flow\data\cursor_state.json (Windows)
///           ~/.local/share/batch-flow/cursor_state.json (Linux)
pub fn default_state_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "batch-flow")
        .map(|dirs| dirs.data_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".batch-flow"))
        .join(STATE_FILE_NAME)
}

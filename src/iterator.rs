//! Sequential image iterator
//!
//! Each call to [`ImageIterator::next`] is one full invocation: validate the
//! root, decide whether the stored list is still good, serve the file under
//! the cursor (from the prefetch cache or by decoding it inline), advance the
//! cursor, schedule prefetch for what comes next and persist the record.
//!
//! Nothing but the cursor store and the prefetch cache carries over from one
//! invocation to the next.

use crate::change_detector::{ChangeDetector, Decision};
use crate::cursor_store::{CursorState, CursorStore, JsonCursorStore};
use crate::decode::{DecodedImage, Decoder, ImageFileDecoder};
use crate::error::{IteratorError, Result};
use crate::fingerprint::{FileScanner, Fingerprint, FsScanner};
use crate::prefetch::{PrefetchCache, DEFAULT_WINDOW};
use crate::scan_spec::{Invocation, ScanSpec};
use crate::utils::to_relative_path;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one invocation.
#[derive(Debug, Clone)]
pub struct Served {
    pub image: DecodedImage,
    /// Path relative to the scan root, `/`-separated
    pub relative_path: String,
    pub absolute_path: PathBuf,
    /// Index the file was served from
    pub index: usize,
    pub total_count: usize,
    /// Whether the payload came from the prefetch cache
    pub from_cache: bool,
}

/// Stateful iterator over the files of a directory.
pub struct ImageIterator {
    store: Box<dyn CursorStore>,
    scanner: Box<dyn FileScanner>,
    decoder: Arc<dyn Decoder>,
    cache: PrefetchCache,
    /// Last state produced by this instance
    state: Option<CursorState>,
    /// Set when the last save failed; the in-memory state is then authoritative
    unsaved: bool,
    /// List and transparency policy the cache is bound to
    bound: Option<(Fingerprint, bool)>,
}

impl ImageIterator {
    pub fn builder() -> ImageIteratorBuilder {
        ImageIteratorBuilder::new()
    }

    /// Iterator with the default scanner, decoder and window over `store`.
    pub fn new(store: impl CursorStore + 'static) -> Result<Self> {
        Self::builder().store(store).build()
    }

    /// Run one invocation from raw host input.
    pub fn next_invocation(&mut self, invocation: &Invocation) -> Result<Served> {
        let spec = invocation.to_scan_spec()?;
        self.next(&spec)
    }

    /// Serve the file under the cursor and advance.
    ///
    /// A file that fails to decode still moves the cursor past it, so a bad
    /// file is reported once per cycle instead of blocking the sequence.
    pub fn next(&mut self, spec: &ScanSpec) -> Result<Served> {
        spec.ensure_root_dir()?;

        let stored = self.current_state();
        let decision = ChangeDetector::new(self.scanner.as_ref()).decide(&stored, spec)?;
        let regenerated = !decision.reuse();
        let mut state = match decision {
            Decision::Reuse => stored,
            Decision::Rescan { .. } => {
                let files = self
                    .scanner
                    .scan(&spec.root, spec.recursive, &spec.extensions)?;
                CursorState::fresh(spec.clone(), files)
            }
            Decision::Replace(files) => CursorState::fresh(spec.clone(), files),
        };

        if state.is_empty() {
            return Err(IteratorError::EmptyCollection(spec.root.clone()));
        }
        if regenerated {
            info!(
                "Serving {} files from {} (fingerprint {})",
                state.len(),
                spec.root.display(),
                state.fingerprint
            );
        }
        self.bind_cache(&state, regenerated);

        let index = state.index;
        let path = state.file_list[index].clone();
        let served = match self.cache.get(index) {
            Some(image) => {
                debug!("Serving index {} from prefetch cache", index);
                Ok((image, true))
            }
            None => {
                debug!("Decoding index {} inline: {}", index, path.display());
                self.decoder
                    .decode(&path, spec.allow_transparency)
                    .map(|image| (image, false))
            }
        };

        state.advance();
        self.cache.prefetch_window(state.index);
        self.persist(state);

        let (image, from_cache) = served?;
        Ok(Served {
            image,
            relative_path: to_relative_path(&path, &spec.root),
            absolute_path: path,
            index,
            total_count: self.state.as_ref().map_or(0, CursorState::len),
            from_cache,
        })
    }

    /// Forget the persisted cursor so the next call starts with a fresh scan.
    pub fn reset(&mut self) -> Result<()> {
        self.store.clear()?;
        self.cache.invalidate();
        self.state = None;
        self.unsaved = false;
        self.bound = None;
        info!("Cursor reset ({})", self.store.location());
        Ok(())
    }

    /// Last known cursor state.
    pub fn state(&self) -> CursorState {
        self.current_state()
    }

    pub fn cache(&self) -> &PrefetchCache {
        &self.cache
    }

    pub fn store_location(&self) -> String {
        self.store.location()
    }

    fn current_state(&self) -> CursorState {
        match (&self.state, self.unsaved) {
            (Some(state), true) => state.clone(),
            _ => self.store.load(),
        }
    }

    /// Point the cache at `state`'s list unless it already serves it.
    fn bind_cache(&mut self, state: &CursorState, regenerated: bool) {
        let target = (state.fingerprint.clone(), state.scan_spec.allow_transparency);
        if regenerated || self.bound.as_ref() != Some(&target) {
            self.cache
                .bind(state.file_list.clone().into(), state.scan_spec.allow_transparency);
            self.bound = Some(target);
        }
    }

    fn persist(&mut self, state: CursorState) {
        match self.store.save(&state) {
            Ok(()) => self.unsaved = false,
            Err(e) => {
                warn!("Cursor not persisted, continuing in memory: {}", e);
                self.unsaved = true;
            }
        }
        self.state = Some(state);
    }
}

/// Builder for [`ImageIterator`].
pub struct ImageIteratorBuilder {
    store: Option<Box<dyn CursorStore>>,
    scanner: Option<Box<dyn FileScanner>>,
    decoder: Option<Arc<dyn Decoder>>,
    window: usize,
}

impl ImageIteratorBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            scanner: None,
            decoder: None,
            window: DEFAULT_WINDOW,
        }
    }

    pub fn store(mut self, store: impl CursorStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn scanner(mut self, scanner: impl FileScanner + 'static) -> Self {
        self.scanner = Some(Box::new(scanner));
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Number of files decoded ahead of the cursor.
    pub fn prefetch_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn build(self) -> Result<ImageIterator> {
        let decoder = self
            .decoder
            .unwrap_or_else(|| Arc::new(ImageFileDecoder));
        let cache = PrefetchCache::new(Arc::clone(&decoder), self.window)?;
        Ok(ImageIterator {
            store: self
                .store
                .unwrap_or_else(|| Box::new(JsonCursorStore::at_default_location())),
            scanner: self.scanner.unwrap_or_else(|| Box::new(FsScanner)),
            decoder,
            cache,
            state: None,
            unsaved: false,
            bound: None,
        })
    }
}

impl Default for ImageIteratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

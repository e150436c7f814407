//! Background prefetch cache
//!
//! Decodes the files just ahead of the cursor on a small worker pool so the
//! next invocation can be served without touching the disk.
//!
//! # Versioning
//!
//! Every file list bound to the cache gets a new list version. Slots are
//! keyed by `(version, index)`, and a worker remembers the version it was
//! started under. When it finishes after the list has been replaced, its
//! result is dropped instead of landing in a slot that now belongs to a
//! different list.
//!
//! # Hand-off
//!
//! `get` removes the entry it returns, so a decoded payload is served at most
//! once. Entries outside the current prefetch window are evicted, which caps
//! the cache at `window` payloads.

use crate::decode::{DecodedImage, Decoder};
use crate::error::{IteratorError, Result};
use parking_lot::{Condvar, Mutex};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Default number of files decoded ahead of the cursor.
pub const DEFAULT_WINDOW: usize = 2;

/// Upper bound for a configured window.
pub const MAX_WINDOW: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SlotKey {
    version: u64,
    index: usize,
}

/// File list the cache currently serves.
struct Binding {
    version: u64,
    files: Arc<[PathBuf]>,
    allow_transparency: bool,
}

#[derive(Default)]
struct Slots {
    binding: Option<Binding>,
    ready: HashMap<SlotKey, DecodedImage>,
    in_flight: HashSet<SlotKey>,
    /// `(start, count)` of the most recent window, if one was requested
    window: Option<(usize, usize)>,
    /// Spawned jobs not yet finished, stale ones included
    pending: usize,
}

struct Shared {
    version: AtomicU64,
    slots: Mutex<Slots>,
    idle: Condvar,
}

/// Bounded, versioned cache of decoded files ahead of the cursor.
pub struct PrefetchCache {
    decoder: Arc<dyn Decoder>,
    pool: ThreadPool,
    window: usize,
    shared: Arc<Shared>,
}

impl PrefetchCache {
    /// Create a cache with `window` worker threads and slots.
    ///
    /// The window is clamped to `1..=MAX_WINDOW`.
    pub fn new(decoder: Arc<dyn Decoder>, window: usize) -> Result<Self> {
        let window = window.clamp(1, MAX_WINDOW);
        let pool = ThreadPoolBuilder::new()
            .num_threads(window)
            .thread_name(|i| format!("prefetch-{}", i))
            .build()
            .map_err(|e| IteratorError::Worker(e.to_string()))?;

        Ok(Self {
            decoder,
            pool,
            window,
            shared: Arc::new(Shared {
                version: AtomicU64::new(0),
                slots: Mutex::new(Slots::default()),
                idle: Condvar::new(),
            }),
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Current list version.
    pub fn version(&self) -> u64 {
        self.shared.version.load(Ordering::SeqCst)
    }

    /// Drop every entry and abandon in-flight work.
    ///
    /// Workers still running finish their decode, see the version changed
    /// and discard the result.
    pub fn invalidate(&self) {
        let mut slots = self.shared.slots.lock();
        let version = self.shared.version.fetch_add(1, Ordering::SeqCst) + 1;
        let dropped = slots.ready.len();
        slots.binding = None;
        slots.ready.clear();
        slots.in_flight.clear();
        slots.window = None;
        debug!("Prefetch cache invalidated (version {}, dropped {})", version, dropped);
    }

    /// Invalidate and start serving a new file list.
    pub fn bind(&self, files: Arc<[PathBuf]>, allow_transparency: bool) -> u64 {
        self.invalidate();
        let mut slots = self.shared.slots.lock();
        let version = self.shared.version.load(Ordering::SeqCst);
        slots.binding = Some(Binding {
            version,
            files,
            allow_transparency,
        });
        version
    }

    /// Take the decoded payload for `index`, if it is ready. Never blocks on
    /// in-flight work.
    pub fn get(&self, index: usize) -> Option<DecodedImage> {
        let mut slots = self.shared.slots.lock();
        let key = slots.binding.as_ref().map(|b| SlotKey {
            version: b.version,
            index,
        })?;
        let hit = slots.ready.remove(&key);
        trace!("Prefetch {} for index {}", if hit.is_some() { "hit" } else { "miss" }, index);
        hit
    }

    /// Whether a payload for `index` is ready.
    pub fn contains(&self, index: usize) -> bool {
        let slots = self.shared.slots.lock();
        slots.binding.as_ref().is_some_and(|b| {
            slots.ready.contains_key(&SlotKey {
                version: b.version,
                index,
            })
        })
    }

    /// Number of ready payloads.
    pub fn len(&self) -> usize {
        self.shared.slots.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Schedule a background decode of `index` unless it is already ready or
    /// being decoded.
    pub fn fill_async(&self, index: usize) {
        let mut slots = self.shared.slots.lock();
        let Some(binding) = slots.binding.as_ref() else {
            return;
        };
        let Some(path) = binding.files.get(index).cloned() else {
            return;
        };
        let allow_transparency = binding.allow_transparency;
        let key = SlotKey {
            version: binding.version,
            index,
        };
        if slots.ready.contains_key(&key) || slots.in_flight.contains(&key) {
            return;
        }
        slots.in_flight.insert(key);
        slots.pending += 1;
        drop(slots);

        let decoder = Arc::clone(&self.decoder);
        let shared = Arc::clone(&self.shared);
        self.pool.spawn(move || {
            let result = decoder.decode(&path, allow_transparency);
            shared.complete(key, result);
        });
    }

    /// Schedule fills for the `window` indices starting at `start`, wrapping
    /// at the end of the list, and evict anything outside that range.
    pub fn prefetch_window(&self, start: usize) {
        let targets = {
            let mut slots = self.shared.slots.lock();
            let Some(len) = slots.binding.as_ref().map(|b| b.files.len()) else {
                return;
            };
            if len == 0 {
                return;
            }
            let start = start % len;
            let count = self.window.min(len);
            slots.window = Some((start, count));
            slots
                .ready
                .retain(|key, _| in_window(key.index, start, count, len));
            (0..count).map(|offset| (start + offset) % len).collect::<Vec<_>>()
        };

        for index in targets {
            self.fill_async(index);
        }
    }

    /// Block until no background job is running, or the timeout elapses.
    ///
    /// Returns true if the workers went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slots = self.shared.slots.lock();
        while slots.pending > 0 {
            if self.shared.idle.wait_until(&mut slots, deadline).timed_out() {
                return slots.pending == 0;
            }
        }
        true
    }
}

impl Shared {
    fn complete(&self, key: SlotKey, result: Result<DecodedImage>) {
        let mut slots = self.slots.lock();
        slots.pending -= 1;
        slots.in_flight.remove(&key);

        let current = self.version.load(Ordering::SeqCst);
        if key.version != current {
            debug!(
                "Discarding stale prefetch for index {} (version {} != {})",
                key.index, key.version, current
            );
        } else {
            match result {
                Ok(image) => {
                    let len = slots.binding.as_ref().map_or(0, |b| b.files.len());
                    let wanted = slots
                        .window
                        .map_or(true, |(start, count)| in_window(key.index, start, count, len));
                    if wanted {
                        // Last writer wins; the payload is identical either way
                        slots.ready.insert(key, image);
                    } else {
                        trace!("Dropping prefetch for index {} outside the window", key.index);
                    }
                }
                Err(e) => warn!("Background decode failed: {}", e),
            }
        }

        if slots.pending == 0 {
            self.idle.notify_all();
        }
    }
}

/// Whether `index` falls in the `count` indices starting at `start`, modulo `len`.
fn in_window(index: usize, start: usize, count: usize, len: usize) -> bool {
    len > 0 && (index + len - start % len) % len < count
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    /// Decoder that encodes the path length into the payload and counts calls.
    struct FakeDecoder {
        calls: AtomicUsize,
        delay: Duration,
        fail_on: Option<&'static str>,
    }

    impl FakeDecoder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail_on: None,
            }
        }
    }

    impl Decoder for FakeDecoder {
        fn decode(&self, path: &Path, allow_transparency: bool) -> Result<DecodedImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if self.fail_on.is_some_and(|name| path.ends_with(name)) {
                return Err(IteratorError::decode(
                    path,
                    std::io::Error::new(std::io::ErrorKind::InvalidData, "bad"),
                ));
            }
            Ok(DecodedImage {
                width: path.as_os_str().len() as u32,
                height: 1,
                channels: if allow_transparency { 4 } else { 3 },
                samples: Vec::new(),
            })
        }
    }

    fn files(names: &[&str]) -> Arc<[PathBuf]> {
        names.iter().map(|n| PathBuf::from(format!("/d/{}", n))).collect()
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_in_window() {
        assert!(in_window(0, 0, 2, 5));
        assert!(in_window(1, 0, 2, 5));
        assert!(!in_window(2, 0, 2, 5));
        // Wraps past the end
        assert!(in_window(4, 4, 2, 5));
        assert!(in_window(0, 4, 2, 5));
        assert!(!in_window(1, 4, 2, 5));
        assert!(!in_window(0, 0, 2, 0));
    }

    #[test]
    fn test_prefetch_window_fills_and_get_consumes_once() {
        let decoder = Arc::new(FakeDecoder::new());
        let cache = PrefetchCache::new(decoder.clone(), 2).unwrap();
        cache.bind(files(&["a.png", "bb.png", "ccc.png"]), true);

        cache.prefetch_window(1);
        assert!(cache.wait_idle(WAIT));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(1));
        assert!(cache.contains(2));
        assert!(!cache.contains(0));

        let hit = cache.get(1).unwrap();
        assert_eq!(hit.width, "/d/bb.png".len() as u32);
        assert!(cache.get(1).is_none());
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_prefetch_window_wraps_around() {
        let cache = PrefetchCache::new(Arc::new(FakeDecoder::new()), 2).unwrap();
        cache.bind(files(&["a.png", "b.png", "c.png"]), true);

        cache.prefetch_window(2);
        assert!(cache.wait_idle(WAIT));
        assert!(cache.contains(2));
        assert!(cache.contains(0));
    }

    #[test]
    fn test_window_larger_than_list() {
        let decoder = Arc::new(FakeDecoder::new());
        let cache = PrefetchCache::new(decoder.clone(), 4).unwrap();
        cache.bind(files(&["only.png"]), true);

        cache.prefetch_window(0);
        assert!(cache.wait_idle(WAIT));
        assert_eq!(cache.len(), 1);
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fill_async_skips_cached_and_in_flight() {
        let decoder = Arc::new(FakeDecoder {
            delay: Duration::from_millis(50),
            ..FakeDecoder::new()
        });
        let cache = PrefetchCache::new(decoder.clone(), 2).unwrap();
        cache.bind(files(&["a.png", "b.png"]), true);

        cache.fill_async(0);
        cache.fill_async(0);
        assert!(cache.wait_idle(WAIT));
        cache.fill_async(0);
        assert!(cache.wait_idle(WAIT));

        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains(0));
    }

    #[test]
    fn test_moving_window_evicts_old_entries() {
        let cache = PrefetchCache::new(Arc::new(FakeDecoder::new()), 2).unwrap();
        cache.bind(files(&["a.png", "b.png", "c.png", "d.png"]), true);

        cache.prefetch_window(0);
        assert!(cache.wait_idle(WAIT));
        cache.prefetch_window(2);
        assert!(cache.wait_idle(WAIT));

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(0));
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        assert!(cache.contains(3));
    }

    #[test]
    fn test_invalidate_discards_stale_results() {
        let decoder = Arc::new(FakeDecoder {
            delay: Duration::from_millis(100),
            ..FakeDecoder::new()
        });
        let cache = PrefetchCache::new(decoder.clone(), 2).unwrap();
        let old_version = cache.bind(files(&["old.png"]), true);

        cache.fill_async(0);
        let new_version = cache.bind(files(&["new-and-longer.png"]), true);
        assert!(new_version > old_version);
        assert!(cache.wait_idle(WAIT));

        // The old worker finished after the rebind and must not populate slot 0
        assert!(cache.get(0).is_none());

        cache.fill_async(0);
        assert!(cache.wait_idle(WAIT));
        assert_eq!(cache.get(0).unwrap().width, "/d/new-and-longer.png".len() as u32);
    }

    #[test]
    fn test_failed_decode_leaves_slot_empty() {
        let decoder = Arc::new(FakeDecoder {
            fail_on: Some("bad.png"),
            ..FakeDecoder::new()
        });
        let cache = PrefetchCache::new(decoder, 2).unwrap();
        cache.bind(files(&["bad.png", "good.png"]), true);

        cache.prefetch_window(0);
        assert!(cache.wait_idle(WAIT));
        assert!(!cache.contains(0));
        assert!(cache.contains(1));
    }

    #[test]
    fn test_unbound_cache_is_inert() {
        let decoder = Arc::new(FakeDecoder::new());
        let cache = PrefetchCache::new(decoder.clone(), 2).unwrap();

        cache.prefetch_window(0);
        cache.fill_async(0);
        assert!(cache.wait_idle(WAIT));
        assert!(cache.get(0).is_none());
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_transparency_policy_follows_binding() {
        let cache = PrefetchCache::new(Arc::new(FakeDecoder::new()), 1).unwrap();
        cache.bind(files(&["a.png"]), false);
        cache.fill_async(0);
        assert!(cache.wait_idle(WAIT));
        assert_eq!(cache.get(0).unwrap().channels, 3);
    }

    #[test]
    fn test_window_is_clamped() {
        let decoder: Arc<dyn Decoder> = Arc::new(FakeDecoder::new());
        assert_eq!(PrefetchCache::new(decoder.clone(), 0).unwrap().window(), 1);
        assert_eq!(PrefetchCache::new(decoder, 1000).unwrap().window(), MAX_WINDOW);
    }
}

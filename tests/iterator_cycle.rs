//! End-to-end behaviour of the iterator against a real directory and a real
//! cursor file.

use batch_flow::{
    Decoder, FileScanner, FsScanner, ImageFileDecoder, ImageIterator, IteratorError,
    JsonCursorStore, ScanSpec,
};
use batch_flow::fingerprint::FileList;
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Filesystem scanner that counts how often it is asked to scan.
#[derive(Default)]
struct CountingScanner {
    calls: AtomicUsize,
}

impl CountingScanner {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FileScanner for CountingScanner {
    fn scan(&self, root: &Path, recursive: bool, extensions: &BTreeSet<String>) -> batch_flow::Result<FileList> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        FsScanner.scan(root, recursive, extensions)
    }
}

struct Fixture {
    _temp: TempDir,
    images: PathBuf,
    state_file: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let images = temp.path().join("images");
        fs::create_dir(&images).unwrap();
        let state_file = temp.path().join("state").join("cursor.json");
        Self {
            _temp: temp,
            images,
            state_file,
        }
    }

    fn png(&self, name: &str, shade: u8) -> PathBuf {
        let path = self.images.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        RgbImage::from_pixel(3, 2, Rgb([shade, 255 - shade, 7]))
            .save(&path)
            .unwrap();
        path
    }

    fn store(&self) -> JsonCursorStore {
        JsonCursorStore::new(&self.state_file)
    }

    fn iterator(&self, scanner: &Arc<CountingScanner>) -> ImageIterator {
        ImageIterator::builder()
            .store(self.store())
            .scanner(Arc::clone(scanner))
            .build()
            .unwrap()
    }

    fn persisted_index(&self) -> usize {
        use batch_flow::CursorStore;
        self.store().load().index
    }
}

fn flat(root: &Path, extensions: &str) -> ScanSpec {
    ScanSpec::new(root, false, extensions, true, false).unwrap()
}

#[test]
fn two_matching_files_alternate_and_wrap() {
    let fx = Fixture::new();
    fx.png("a.png", 10);
    RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]))
        .save(fx.images.join("b.jpg"))
        .unwrap();
    fs::write(fx.images.join("c.txt"), "not an image").unwrap();
    let scanner = Arc::new(CountingScanner::default());
    let mut iter = fx.iterator(&scanner);
    let spec = flat(&fx.images, "png,jpg");

    let first = iter.next(&spec).unwrap();
    assert_eq!(first.relative_path, "a.png");
    assert_eq!(first.index, 0);
    assert_eq!(first.total_count, 2);
    assert_eq!(fx.persisted_index(), 1);

    let second = iter.next(&spec).unwrap();
    assert_eq!(second.relative_path, "b.jpg");
    assert_eq!(fx.persisted_index(), 0);

    let third = iter.next(&spec).unwrap();
    assert_eq!(third.relative_path, "a.png");
}

#[test]
fn unchanged_directory_is_scanned_once() {
    let fx = Fixture::new();
    for (i, name) in ["a.png", "b.png", "c.png"].iter().enumerate() {
        fx.png(name, i as u8 * 40);
    }
    let scanner = Arc::new(CountingScanner::default());
    let mut iter = fx.iterator(&scanner);
    let spec = flat(&fx.images, "png");

    let mut indices = Vec::new();
    for _ in 0..7 {
        indices.push(iter.next(&spec).unwrap().index);
    }

    assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 0]);
    assert_eq!(scanner.calls(), 1);
}

#[test]
fn separate_instances_resume_from_the_cursor_file() {
    let fx = Fixture::new();
    fx.png("a.png", 1);
    fx.png("b.png", 2);
    fx.png("c.png", 3);
    let spec = flat(&fx.images, "png");
    let scanner = Arc::new(CountingScanner::default());

    let first = fx.iterator(&scanner).next(&spec).unwrap();
    let second = fx.iterator(&scanner).next(&spec).unwrap();
    let third = fx.iterator(&scanner).next(&spec).unwrap();

    assert_eq!(
        [first.relative_path, second.relative_path, third.relative_path],
        ["a.png", "b.png", "c.png"]
    );
    assert_eq!(scanner.calls(), 1);
}

#[test]
fn full_cycle_visits_every_file_once_then_repeats() {
    let fx = Fixture::new();
    fx.png("a.png", 1);
    fx.png("z.png", 2);
    fx.png("sub1/b.png", 3);
    fx.png("sub1/deep/c.png", 4);
    fx.png("sub2/d.png", 5);
    let scanner = Arc::new(CountingScanner::default());
    let mut iter = fx.iterator(&scanner);
    let spec = ScanSpec::new(&fx.images, true, "png", true, false).unwrap();

    let first_pass: Vec<String> = (0..5)
        .map(|_| iter.next(&spec).unwrap().relative_path)
        .collect();
    assert_eq!(
        first_pass,
        vec!["a.png", "z.png", "sub1/b.png", "sub1/deep/c.png", "sub2/d.png"]
    );
    assert_eq!(first_pass.iter().collect::<HashSet<_>>().len(), 5);

    let second_pass: Vec<String> = (0..5)
        .map(|_| iter.next(&spec).unwrap().relative_path)
        .collect();
    assert_eq!(second_pass, first_pass);
}

#[test]
fn changing_any_parameter_restarts_from_a_fresh_scan() {
    let fx = Fixture::new();
    fx.png("a.png", 1);
    fx.png("b.png", 2);
    fx.png("c.png", 3);
    fx.png("nested/d.png", 4);
    let other = fx.images.join("nested");
    let scanner = Arc::new(CountingScanner::default());
    let mut iter = fx.iterator(&scanner);

    let base = flat(&fx.images, "png");
    let variants = [
        ScanSpec::new(&fx.images, true, "png", true, false).unwrap(),
        ScanSpec::new(&fx.images, false, "png,jpg", true, false).unwrap(),
        ScanSpec::new(&fx.images, false, "png", false, false).unwrap(),
        ScanSpec::new(&fx.images, false, "png", true, true).unwrap(),
        flat(&other, "png"),
    ];

    for variant in &variants {
        // Move the cursor off zero under the base parameters
        iter.next(&base).unwrap();
        iter.next(&base).unwrap();
        assert_ne!(fx.persisted_index(), 0);

        let before = scanner.calls();
        let served = iter.next(variant).unwrap();
        assert_eq!(served.index, 0, "{:?}", variant);
        assert!(scanner.calls() > before, "{:?}", variant);
    }
}

#[test]
fn auto_refresh_restarts_when_a_file_appears() {
    let fx = Fixture::new();
    fx.png("b.png", 1);
    fx.png("c.png", 2);
    let scanner = Arc::new(CountingScanner::default());
    let mut iter = fx.iterator(&scanner);
    let spec = ScanSpec::new(&fx.images, false, "png", true, true).unwrap();

    assert_eq!(iter.next(&spec).unwrap().relative_path, "b.png");
    fx.png("a.png", 3);

    let served = iter.next(&spec).unwrap();
    assert_eq!(served.relative_path, "a.png");
    assert_eq!(served.index, 0);
    assert_eq!(served.total_count, 3);
}

#[test]
fn auto_refresh_keeps_position_when_nothing_changed() {
    let fx = Fixture::new();
    fx.png("a.png", 1);
    fx.png("b.png", 2);
    fx.png("c.png", 3);
    let scanner = Arc::new(CountingScanner::default());
    let mut iter = fx.iterator(&scanner);
    let spec = ScanSpec::new(&fx.images, false, "png", true, true).unwrap();

    let served: Vec<usize> = (0..3).map(|_| iter.next(&spec).unwrap().index).collect();
    assert_eq!(served, vec![0, 1, 2]);
    // Every call verifies the directory
    assert_eq!(scanner.calls(), 3);
}

#[test]
fn corrupt_cursor_file_behaves_like_first_run() {
    let fx = Fixture::new();
    fx.png("a.png", 1);
    fx.png("b.png", 2);
    let spec = flat(&fx.images, "png");
    let scanner = Arc::new(CountingScanner::default());
    fx.iterator(&scanner).next(&spec).unwrap();
    assert_eq!(fx.persisted_index(), 1);

    fs::write(&fx.state_file, "{ \"index\": \"one\", truncated").unwrap();

    let served = fx.iterator(&scanner).next(&spec).unwrap();
    assert_eq!(served.relative_path, "a.png");
    assert_eq!(fx.persisted_index(), 1);
}

#[test]
fn deleted_cursor_file_behaves_like_first_run() {
    let fx = Fixture::new();
    fx.png("a.png", 1);
    fx.png("b.png", 2);
    let spec = flat(&fx.images, "png");
    let scanner = Arc::new(CountingScanner::default());
    fx.iterator(&scanner).next(&spec).unwrap();

    fs::remove_file(&fx.state_file).unwrap();

    let served = fx.iterator(&scanner).next(&spec).unwrap();
    assert_eq!(served.relative_path, "a.png");
    assert_eq!(scanner.calls(), 2);
}

#[test]
fn prefetched_payload_matches_a_direct_decode() {
    let fx = Fixture::new();
    fx.png("a.png", 10);
    let b = fx.images.join("b.png");
    RgbaImage::from_fn(4, 3, |x, y| Rgba([x as u8 * 60, y as u8 * 80, 200, 128]))
        .save(&b)
        .unwrap();
    fx.png("c.png", 30);
    let scanner = Arc::new(CountingScanner::default());
    let mut iter = fx.iterator(&scanner);
    let spec = flat(&fx.images, "png");

    iter.next(&spec).unwrap();
    assert!(iter.cache().wait_idle(Duration::from_secs(10)));

    let served = iter.next(&spec).unwrap();
    assert!(served.from_cache);
    assert_eq!(served.absolute_path, b);

    let direct = ImageFileDecoder.decode(&b, true).unwrap();
    assert_eq!(served.image, direct);
    assert_eq!(served.image.channels, 4);
}

#[test]
fn missing_root_is_reported_without_touching_the_cursor() {
    let fx = Fixture::new();
    fx.png("a.png", 1);
    let scanner = Arc::new(CountingScanner::default());
    let mut iter = fx.iterator(&scanner);

    let result = iter.next(&flat(&fx.images.join("gone"), "png"));
    assert!(matches!(result, Err(IteratorError::Path(_))));
    assert!(!fx.state_file.exists());
}

#[test]
fn unreadable_file_is_skipped_on_the_next_call() {
    let fx = Fixture::new();
    fx.png("a.png", 1);
    fs::write(fx.images.join("b.png"), b"\x89PNG not really").unwrap();
    fx.png("c.png", 3);
    let scanner = Arc::new(CountingScanner::default());
    let mut iter = fx.iterator(&scanner);
    let spec = flat(&fx.images, "png");

    assert_eq!(iter.next(&spec).unwrap().relative_path, "a.png");
    match iter.next(&spec) {
        Err(IteratorError::Decode { path, .. }) => assert!(path.ends_with("b.png")),
        other => panic!("expected decode error, got {:?}", other.map(|s| s.relative_path)),
    }
    assert_eq!(fx.persisted_index(), 2);
    assert_eq!(iter.next(&spec).unwrap().relative_path, "c.png");
}

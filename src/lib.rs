//! batch-flow library crate
//!
//! A persistent cursor over the image files of a directory. Each call to
//! [`ImageIterator::next`] serves one decoded image and remembers where it
//! stopped, so separate runs walk the collection in a stable order and wrap
//! around at the end. Upcoming files are decoded ahead of time on a small
//! worker pool.

pub mod change_detector;
pub mod cli;
pub mod config;
pub mod cursor_store;
pub mod decode;
pub mod error;
pub mod fingerprint;
pub mod iterator;
pub mod logging;
pub mod output;
pub mod prefetch;
pub mod scan_spec;
pub mod theme;
pub mod utils;

pub use cursor_store::{CursorState, CursorStore, JsonCursorStore, MemoryCursorStore};
pub use decode::{DecodedImage, Decoder, ImageFileDecoder};
pub use error::{DecodeFailure, IteratorError, Result};
pub use fingerprint::{FileScanner, Fingerprint, FsScanner};
pub use iterator::{ImageIterator, ImageIteratorBuilder, Served};
pub use prefetch::PrefetchCache;
pub use scan_spec::{Invocation, ScanSpec};

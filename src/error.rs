//! Error types for the image iterator.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by a single iterator invocation.
///
/// Any of these aborts only the invocation that produced it. Background
/// prefetch failures never reach the caller.
#[derive(Debug, Error)]
pub enum IteratorError {
    /// Root path is missing or is not a directory.
    #[error("Path does not exist or is not a directory: {}", .0.display())]
    Path(PathBuf),

    /// Scan (or a reused list) has no matching files.
    #[error("No matching files in {}", .0.display())]
    EmptyCollection(PathBuf),

    /// A specific file could not be decoded.
    #[error("Failed to decode image {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeFailure,
    },

    /// The state record could not be written.
    #[error("Failed to persist cursor state to {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The prefetch worker pool could not be started.
    #[error("Failed to start prefetch workers: {0}")]
    Worker(String),
}

/// Underlying cause of a decode failure.
#[derive(Debug, Error)]
pub enum DecodeFailure {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl IteratorError {
    pub(crate) fn decode(path: &std::path::Path, source: impl Into<DecodeFailure>) -> Self {
        Self::Decode {
            path: path.to_path_buf(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IteratorError>;

//! Error types for the image pipeline.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::dimension::Dimensions;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while processing files.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Source image could not be decoded.
    #[error("failed to decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Output image could not be encoded.
    #[error("failed to encode {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// A resize or border would allocate more than the decoder limit allows.
    #[error("{dimensions} canvas exceeds the {limit} byte allocation limit")]
    TooLarge { dimensions: Dimensions, limit: u64 },

    /// Source extension has no encoder.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// IO error on a specific path.
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory watcher error.
    #[error("watcher error: {0}")]
    Watcher(#[from] borderly_directory_watcher::WatcherError),

    /// A blocking task panicked or was aborted.
    #[error("task error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// Attach a path to an IO error.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

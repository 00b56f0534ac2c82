//! Watcher errors.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatcherError>;

#[derive(Error, Debug)]
pub enum WatcherError {
    /// The input directory does not exist.
    #[error("input directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// The input path exists but is a file.
    #[error("input path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("scan error: {0}")]
    Walk(#[from] walkdir::Error),

    /// The consumer dropped its end of the event channel.
    #[error("event receiver closed")]
    ChannelClosed,
}

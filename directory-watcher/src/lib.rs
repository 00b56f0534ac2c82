//! # Directory Watcher
//!
//! This crate discovers candidate image files in the Borderly input directory.
//! Three producers feed one channel of [`PathEvent`]s:
//!
//! - **Startup Scan**: every matching file present when watching begins
//! - **Live Events**: creation notifications from the platform watcher
//! - **Periodic Re-scan**: every matching file still present, on an interval
//!
//! The watcher never deduplicates. The re-scan re-emits the same paths on
//! every pass; suppressing repeats is the consumer's job.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Directory Watcher                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  startup scan ──┐                                               │
//! │  notify events ─┼──► mpsc channel ──► WatchHandle::recv()       │
//! │  re-scan timer ─┘                                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod scan;
pub mod watcher;

pub use config::{DEFAULT_EXTENSIONS, WatchConfig};
pub use error::{Result, WatcherError};
pub use event::{DiscoverySource, PathEvent};
pub use scan::scan_directory;
pub use watcher::{DirectoryWatcher, WatchHandle};

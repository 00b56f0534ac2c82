//! Path events produced by the watcher.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A candidate file reported by one of the discovery sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEvent {
    /// Which producer reported the path.
    pub source: DiscoverySource,

    /// Path to the candidate file.
    pub path: PathBuf,

    /// When the path was reported.
    pub timestamp: DateTime<Utc>,
}

impl PathEvent {
    /// Create a new path event.
    pub fn new(source: DiscoverySource, path: impl Into<PathBuf>) -> Self {
        Self {
            source,
            path: path.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Where a path event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    /// One-time enumeration when watching starts.
    StartupScan,

    /// Live notification from the platform watcher.
    Notify,

    /// Periodic full re-scan.
    Rescan,
}

/// Whether a notify event announces a file arriving in the directory.
///
/// Creation and the destination side of a rename both count; a file moved
/// into the input directory reports as a rename on most platforms.
pub(crate) fn is_arrival(kind: &notify::EventKind) -> bool {
    use notify::event::{ModifyKind, RenameMode};

    matches!(
        kind,
        notify::EventKind::Create(_)
            | notify::EventKind::Modify(ModifyKind::Name(RenameMode::To))
    )
}

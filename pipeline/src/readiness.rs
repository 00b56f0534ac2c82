//! Write-completion detection.
//!
//! A file is ready once it can be opened for exclusive access (its writer
//! has closed or unlocked it) and its size and modification time are the
//! same on two consecutive probes. The second condition catches writers
//! that never take a lock. The probe never reads content.

use std::fs::{File, Metadata, OpenOptions};
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use fs2::FileExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Delay between probes.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Cumulative wait after which a file is declared not ready.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of waiting for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Exclusive access succeeded and the file stopped changing.
    Ready,

    /// The file no longer exists.
    Missing,

    /// Still locked or still growing when the timeout ran out.
    TimedOut,

    /// Shutdown was requested while waiting.
    Cancelled,
}

/// Size and modification time of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl FileStamp {
    /// Stamp of the file at `path`, or `None` if it cannot be read.
    pub fn read(path: &Path) -> Option<Self> {
        std::fs::metadata(path).ok().map(|metadata| Self::of(&metadata))
    }

    fn of(metadata: &Metadata) -> Self {
        Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }
}

/// Polls a file until it is unlocked and stable, or the timeout expires.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessProbe {
    interval: Duration,
    timeout: Duration,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_INTERVAL, DEFAULT_PROBE_TIMEOUT)
    }
}

impl ReadinessProbe {
    /// Create a probe. A zero interval is raised to one millisecond.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            timeout,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait until `path` is ready.
    ///
    /// Probes immediately, then once per interval. A final probe runs when
    /// the cumulative wait reaches the timeout.
    pub async fn wait_until_ready(&self, path: &Path, cancel: &CancellationToken) -> Readiness {
        let mut waited = Duration::ZERO;
        let mut previous = None;

        loop {
            match probe_exclusive(path) {
                Ok(stamp) if previous == Some(stamp) => return Readiness::Ready,
                Ok(stamp) => {
                    trace!("{} unlocked at {} bytes", path.display(), stamp.len);
                    previous = Some(stamp);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("{} disappeared before it was ready", path.display());
                    return Readiness::Missing;
                }
                Err(e) => {
                    debug!("{} not ready yet: {e}", path.display());
                    previous = None;
                }
            }

            if waited >= self.timeout {
                warn!(
                    "{} still busy after {:?}; leaving it for a later pass",
                    path.display(),
                    waited
                );
                return Readiness::TimedOut;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Readiness::Cancelled,
                _ = tokio::time::sleep(self.interval) => {}
            }
            waited += self.interval;
        }
    }
}

/// Try once to open `path` for exclusive access and stamp it while locked.
///
/// The handle and its lock are released before this returns.
pub fn probe_exclusive(path: &Path) -> io::Result<FileStamp> {
    let file = open_unshared(path)?;
    // fs2's method, not the inherent `File::try_lock_exclusive`.
    FileExt::try_lock_exclusive(&file)?;
    let stamp = file.metadata().map(|metadata| FileStamp::of(&metadata));
    FileExt::unlock(&file)?;
    stamp
}

#[cfg(windows)]
fn open_unshared(path: &Path) -> io::Result<File> {
    use std::os::windows::fs::OpenOptionsExt;

    OpenOptions::new().read(true).share_mode(0).open(path)
}

#[cfg(not(windows))]
fn open_unshared(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).open(path)
}

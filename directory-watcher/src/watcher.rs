//! Directory watcher implementation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use crate::config::WatchConfig;
use crate::error::{Result, WatcherError};
use crate::event::{DiscoverySource, PathEvent, is_arrival};
use crate::scan::scan_directory;

/// Directory watcher that merges the startup scan, live notifications and
/// the periodic re-scan into a single stream of [`PathEvent`]s.
pub struct DirectoryWatcher {
    config: WatchConfig,
}

impl DirectoryWatcher {
    /// Create a new directory watcher.
    pub fn new(config: WatchConfig) -> Self {
        Self { config }
    }

    /// Get the watch configuration.
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Start watching. Must be called from within a Tokio runtime.
    ///
    /// The returned handle owns every watch resource. Dropping it, or
    /// cancelling `shutdown`, stops all three producers.
    pub fn start(self, shutdown: &CancellationToken) -> Result<WatchHandle> {
        let mut config = self.config;
        validate_directory(&config.path)?;
        // notify reports absolute paths; the scans must agree with it.
        config.path = std::fs::canonicalize(&config.path)?;

        let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);
        let producers = shutdown.child_token();

        // Live events are registered before the startup scan so that a file
        // landing between the two is reported by at least one of them.
        let mut watcher = live_watcher(&config, event_tx.clone())?;
        watcher.watch(&config.path, RecursiveMode::NonRecursive)?;
        debug!("Started watching: {}", config.path.display());

        tokio::spawn(startup_scan(
            config.clone(),
            event_tx.clone(),
            producers.clone(),
        ));

        if let Some(interval) = config.rescan_interval {
            tokio::spawn(periodic_rescan(
                config.clone(),
                interval,
                event_tx,
                producers.clone(),
            ));
        }

        info!("Directory watcher started: {}", config.path.display());

        Ok(WatchHandle {
            events: event_rx,
            watcher,
            path: config.path,
            _producers: producers.drop_guard(),
        })
    }
}

/// Handle to a running watcher.
///
/// The receiver is closed before the platform watcher drops, so a notify
/// thread blocked on a full channel wakes up before the watcher joins it.
pub struct WatchHandle {
    /// Merged event stream.
    events: mpsc::Receiver<PathEvent>,

    /// Platform watcher; dropping it removes the OS watch.
    watcher: RecommendedWatcher,

    /// Watched directory.
    path: PathBuf,

    /// Cancels the scan tasks when the handle goes away.
    _producers: DropGuard,
}

impl WatchHandle {
    /// Receive the next candidate path.
    ///
    /// Returns `None` once every producer has stopped.
    pub async fn recv(&mut self) -> Option<PathEvent> {
        self.events.recv().await
    }

    /// The watched directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop watching. Equivalent to dropping the handle.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.events.close();
        if let Err(e) = self.watcher.unwatch(&self.path) {
            debug!("Unwatch {} failed: {e}", self.path.display());
        }
        info!("Directory watcher stopped: {}", self.path.display());
    }
}

fn validate_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(WatcherError::DirectoryNotFound(path.to_path_buf()));
    }

    if !path.is_dir() {
        return Err(WatcherError::NotADirectory(path.to_path_buf()));
    }

    Ok(())
}

fn live_watcher(
    config: &WatchConfig,
    event_tx: mpsc::Sender<PathEvent>,
) -> Result<RecommendedWatcher> {
    let filter = config.clone();

    let watcher = notify::recommended_watcher(
        move |res: std::result::Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if !is_arrival(&event.kind) {
                    return;
                }

                for path in event.paths {
                    if !filter.matches(&path) || !path.is_file() {
                        continue;
                    }

                    if event_tx
                        .blocking_send(PathEvent::new(DiscoverySource::Notify, path))
                        .is_err()
                    {
                        debug!("Event receiver closed; dropping notify event");
                        return;
                    }
                }
            }
            Err(e) => {
                error!("Watch error: {e}");
            }
        },
    )?;

    Ok(watcher)
}

async fn startup_scan(
    config: WatchConfig,
    event_tx: mpsc::Sender<PathEvent>,
    cancel: CancellationToken,
) {
    let paths = match scan_blocking(config.clone()).await {
        Ok(paths) => paths,
        Err(e) => {
            warn!("Startup scan of {} failed: {e}", config.path.display());
            return;
        }
    };

    info!(
        "Startup scan of {} found {} files",
        config.path.display(),
        paths.len()
    );

    if let Err(e) = emit_all(paths, DiscoverySource::StartupScan, &event_tx, &cancel).await {
        debug!("Startup scan stopped early: {e}");
    }
}

async fn periodic_rescan(
    config: WatchConfig,
    interval: Duration,
    event_tx: mpsc::Sender<PathEvent>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately and the startup scan covers it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let paths = match scan_blocking(config.clone()).await {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Re-scan of {} failed: {e}", config.path.display());
                continue;
            }
        };

        if let Err(e) = emit_all(paths, DiscoverySource::Rescan, &event_tx, &cancel).await {
            debug!("Re-scan stopped: {e}");
            break;
        }
    }

    debug!("Re-scan task for {} exited", config.path.display());
}

async fn scan_blocking(config: WatchConfig) -> Result<Vec<PathBuf>> {
    tokio::task::spawn_blocking(move || scan_directory(&config))
        .await
        .map_err(|e| WatcherError::Io(std::io::Error::other(e)))?
}

async fn emit_all(
    paths: Vec<PathBuf>,
    source: DiscoverySource,
    event_tx: &mpsc::Sender<PathEvent>,
    cancel: &CancellationToken,
) -> Result<()> {
    for path in paths {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            sent = event_tx.send(PathEvent::new(source, path)) => {
                sent.map_err(|_| WatcherError::ChannelClosed)?;
            }
        }
    }
    Ok(())
}

//! The file lifecycle: discovery through disposition.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use borderly_directory_watcher::{DirectoryWatcher, WatchConfig};
use dashmap::DashMap;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::codec::{ImageCodec, RasterCodec};
use crate::disposition::{Disposition, DispositionHandler};
use crate::error::{PipelineError, Result};
use crate::fanout::{FanOut, FanOutReport};
use crate::gate::{Admission, IntakeGate};
use crate::readiness::{FileStamp, Readiness, ReadinessProbe};
use crate::settings::{Config, ProcessedFileOption, Settings};

/// How often settled entries whose file has left the input directory are
/// forgotten.
const SETTLED_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// How one discovered path ended.
#[derive(Debug)]
pub enum FileOutcome {
    /// Already in flight, or settled earlier and unchanged since.
    Skipped,

    /// Shutdown arrived before processing started.
    Cancelled,

    /// The file vanished before it became ready.
    Missing,

    /// Still locked when the readiness timeout ran out.
    NotReady,

    /// The file could not be processed at all; the source is untouched and
    /// is not retried until it changes.
    Failed(PipelineError),

    /// Profiles were attempted.
    Processed(ProcessedFile),
}

/// Result of a file that reached the fan-out.
#[derive(Debug)]
pub struct ProcessedFile {
    /// Source path.
    pub source: PathBuf,

    /// Per-profile results.
    pub report: FanOutReport,

    /// What happened to the source; `None` if disposition failed.
    pub disposition: Option<Disposition>,
}

/// Watches the input directory and runs every discovered file through the
/// pipeline. Cloning yields another handle to the same worker.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

struct WorkerInner {
    settings: Settings,
    gate: IntakeGate,
    probe: ReadinessProbe,
    fanout: Arc<FanOut>,
    disposition: DispositionHandler,
    /// Sources that finished but are still in the input directory (kept by
    /// `none`, failed, or failed to move). The re-scan skips them until
    /// they change.
    settled: DashMap<PathBuf, FileStamp>,
}

impl Worker {
    /// Create a worker using the `image` crate codec.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_codec(config, Arc::new(RasterCodec))
    }

    /// Create a worker with a custom codec.
    pub fn with_codec(config: Config, codec: Arc<dyn ImageCodec>) -> Result<Self> {
        config.validate()?;
        let Config { settings, profiles } = config;

        let probe = ReadinessProbe::new(settings.readiness_interval(), settings.readiness_timeout());
        let fanout = FanOut::new(codec, settings.output_directory.clone(), profiles);

        Ok(Self {
            inner: Arc::new(WorkerInner {
                gate: IntakeGate::new(settings.max_concurrency),
                probe,
                fanout: Arc::new(fanout),
                disposition: DispositionHandler::from_settings(&settings),
                settled: DashMap::new(),
                settings,
            }),
        })
    }

    /// Settings in effect.
    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// The intake gate shared by every file task.
    pub fn gate(&self) -> &IntakeGate {
        &self.inner.gate
    }

    /// Number of settled sources currently remembered.
    pub fn settled(&self) -> usize {
        self.inner.settled.len()
    }

    /// Forget settled sources that are no longer in the input directory.
    /// Returns how many entries were dropped.
    pub fn prune_settled(&self) -> usize {
        let before = self.inner.settled.len();
        self.inner.settled.retain(|path, _| path.exists());
        let pruned = before.saturating_sub(self.inner.settled.len());
        if pruned > 0 {
            debug!("Forgot {pruned} settled sources");
        }
        pruned
    }

    /// Watcher configuration derived from the settings.
    pub fn watch_config(&self) -> WatchConfig {
        let config = WatchConfig::new(&self.inner.settings.input_directory);
        match self.inner.settings.rescan_interval() {
            Some(interval) => config.with_rescan_interval(interval),
            None => config.without_rescan(),
        }
    }

    /// Create the input, output and (for `move`) processed directories.
    pub async fn prepare(&self) -> Result<()> {
        let settings = &self.inner.settings;
        let mut directories = vec![&settings.input_directory, &settings.output_directory];
        if settings.processed_file_option == ProcessedFileOption::Move {
            directories.extend(settings.processed_directory.as_ref());
        }

        for directory in directories {
            tokio::fs::create_dir_all(directory)
                .await
                .map_err(|e| PipelineError::io(directory, e))?;
            debug!("Ensured directory {}", directory.display());
        }

        Ok(())
    }

    /// Run until `shutdown` is cancelled, then drain in-flight files.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        self.prepare().await?;

        let mut events = DirectoryWatcher::new(self.watch_config()).start(&shutdown)?;
        let mut tasks = JoinSet::new();
        let mut prune = tokio::time::interval(SETTLED_PRUNE_INTERVAL);
        prune.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Processing {} with {} profiles (max {} concurrent)",
            self.inner.settings.input_directory.display(),
            self.inner.fanout.profiles().len(),
            self.inner.gate.capacity()
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = prune.tick() => {
                    self.prune_settled();
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("File task panicked: {e}");
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        warn!("Watcher stream ended");
                        break;
                    };

                    if self.is_settled(&event.path) {
                        trace!("Unchanged since settled: {}", event.path.display());
                        continue;
                    }

                    let Some(admission) = self.inner.gate.admit(event.path) else {
                        continue;
                    };
                    debug!("Admitted {} ({:?})", admission.path().display(), event.source);

                    let worker = self.clone();
                    let cancel = shutdown.clone();
                    tasks.spawn(async move { worker.process(admission, &cancel).await });
                }
            }
        }

        events.stop();
        self.inner.gate.close();

        info!("Draining {} file tasks", tasks.len());
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("File task panicked: {e}");
            }
        }
        info!("Pipeline stopped");

        Ok(())
    }

    /// Run one path through the full lifecycle.
    pub async fn handle_file(
        &self,
        path: impl Into<PathBuf>,
        cancel: &CancellationToken,
    ) -> FileOutcome {
        let path = path.into();
        if self.is_settled(&path) {
            return FileOutcome::Skipped;
        }

        match self.inner.gate.admit(path) {
            Some(admission) => self.process(admission, cancel).await,
            None => FileOutcome::Skipped,
        }
    }

    /// Wait for a slot, then process. The slot and the path claim are held
    /// until this returns.
    async fn process(&self, admission: Admission, cancel: &CancellationToken) -> FileOutcome {
        let path = admission.path().to_path_buf();

        let running = tokio::select! {
            _ = cancel.cancelled() => return FileOutcome::Cancelled,
            slot = admission.acquire() => match slot {
                Some(running) => running,
                None => return FileOutcome::Cancelled,
            },
        };

        let outcome = self.process_ready(&path, cancel).await;
        match &outcome {
            FileOutcome::Processed(file) => info!(
                "Processed {}: {} written, {} failed, disposition {:?}",
                path.display(),
                file.report.outputs.len(),
                file.report.failures.len(),
                file.disposition
            ),
            FileOutcome::Failed(e) => warn!("Failed {}: {e}", path.display()),
            other => debug!("{}: {other:?}", path.display()),
        }

        if stays_in_input(&outcome) {
            if let Some(stamp) = FileStamp::read(&path) {
                self.inner.settled.insert(path, stamp);
            }
        }

        running.release();
        outcome
    }

    async fn process_ready(&self, path: &Path, cancel: &CancellationToken) -> FileOutcome {
        match self.inner.probe.wait_until_ready(path, cancel).await {
            Readiness::Ready => {}
            Readiness::Missing => return FileOutcome::Missing,
            Readiness::TimedOut => return FileOutcome::NotReady,
            Readiness::Cancelled => return FileOutcome::Cancelled,
        }

        let fanout = self.inner.fanout.clone();
        let source = path.to_path_buf();
        let report = match tokio::task::spawn_blocking(move || fanout.run(&source)).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => return FileOutcome::Failed(e),
            Err(e) => return FileOutcome::Failed(e.into()),
        };

        if report.outputs.is_empty() {
            warn!("Every profile failed for {}", path.display());
        }

        let disposition = match self.inner.disposition.apply(path).await {
            Ok(disposition) => Some(disposition),
            Err(e) => {
                error!("Disposition of {} failed: {e}", path.display());
                None
            }
        };

        FileOutcome::Processed(ProcessedFile {
            source: path.to_path_buf(),
            report,
            disposition,
        })
    }

    fn is_settled(&self, path: &Path) -> bool {
        let Some(seen) = self.inner.settled.get(path).map(|stamp| *stamp) else {
            return false;
        };

        if FileStamp::read(path) == Some(seen) {
            true
        } else {
            self.inner.settled.remove(path);
            false
        }
    }
}

/// Whether the source is expected to remain in the input directory.
fn stays_in_input(outcome: &FileOutcome) -> bool {
    match outcome {
        FileOutcome::Failed(_) => true,
        FileOutcome::Processed(file) => {
            matches!(file.disposition, None | Some(Disposition::Left))
        }
        FileOutcome::Skipped
        | FileOutcome::Cancelled
        | FileOutcome::Missing
        | FileOutcome::NotReady => false,
    }
}

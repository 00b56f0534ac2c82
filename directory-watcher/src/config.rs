//! Configuration types for directory watching.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Image extensions picked up by default, compared case-insensitively.
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff"];

/// Configuration for the watched input directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Path to the directory.
    pub path: PathBuf,

    /// Accepted file extensions, lower-case and without the leading dot.
    pub extensions: Vec<String>,

    /// Interval between full re-scans (None = live events only).
    pub rescan_interval: Option<Duration>,

    /// Capacity of the event channel.
    pub channel_capacity: usize,
}

impl WatchConfig {
    /// Create a new watch config with the default image extensions and a
    /// one second re-scan.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            rescan_interval: Some(Duration::from_secs(1)),
            channel_capacity: 1000,
        }
    }

    /// Set the re-scan interval.
    pub fn with_rescan_interval(mut self, interval: Duration) -> Self {
        self.rescan_interval = Some(interval);
        self
    }

    /// Disable the periodic re-scan.
    pub fn without_rescan(mut self) -> Self {
        self.rescan_interval = None;
        self
    }

    /// Replace the accepted extensions.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// Set the event channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Check if a path carries one of the accepted extensions.
    pub fn matches(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };

        self.extensions
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_watch_config_creation() {
        let config = WatchConfig::new("/srv/incoming")
            .with_rescan_interval(Duration::from_millis(250))
            .with_channel_capacity(0);

        assert_eq!(config.path, Path::new("/srv/incoming"));
        assert_eq!(config.rescan_interval, Some(Duration::from_millis(250)));
        assert_eq!(config.channel_capacity, 1);
    }

    #[test]
    fn test_extension_filter() {
        let config = WatchConfig::new("/in");

        assert!(config.matches(Path::new("/in/photo.jpg")));
        assert!(config.matches(Path::new("/in/photo.JPEG")));
        assert!(config.matches(Path::new("/in/scan.TiF")));
        assert!(config.matches(Path::new("/in/icon.png")));
        assert!(!config.matches(Path::new("/in/notes.txt")));
        assert!(!config.matches(Path::new("/in/photo.jpg.part")));
        assert!(!config.matches(Path::new("/in/README")));
    }

    #[test]
    fn test_custom_extensions() {
        let config = WatchConfig::new("/in").with_extensions([".PNG"]);

        assert_eq!(config.extensions, vec!["png".to_string()]);
        assert!(config.matches(Path::new("/in/a.png")));
        assert!(!config.matches(Path::new("/in/a.jpg")));
    }
}

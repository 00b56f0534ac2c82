//! One-shot enumeration of the input directory.

use std::path::PathBuf;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::WatchConfig;
use crate::error::{Result, WatcherError};

/// List every matching file directly inside the watched directory.
///
/// Only the top level is enumerated. Entries that vanish mid-walk are
/// skipped rather than failing the scan.
pub fn scan_directory(config: &WatchConfig) -> Result<Vec<PathBuf>> {
    if !config.path.exists() {
        return Err(WatcherError::DirectoryNotFound(config.path.clone()));
    }

    let walker = WalkDir::new(&config.path)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    let mut found = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {e}", config.path.display());
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();
        if config.matches(&path) {
            found.push(path);
        }
    }

    debug!(
        "Scanned {}: {} candidate files",
        config.path.display(),
        found.len()
    );
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::{self, File};
    use tempfile::TempDir;

    #[test]
    fn test_scan_filters_extensions() {
        let temp_dir = TempDir::new().unwrap();

        File::create(temp_dir.path().join("a.jpg")).unwrap();
        File::create(temp_dir.path().join("b.PNG")).unwrap();
        File::create(temp_dir.path().join("c.txt")).unwrap();
        fs::create_dir(temp_dir.path().join("nested.jpg")).unwrap();

        let config = WatchConfig::new(temp_dir.path());
        let found = scan_directory(&config).unwrap();

        assert_eq!(
            found,
            vec![temp_dir.path().join("a.jpg"), temp_dir.path().join("b.PNG")]
        );
    }

    #[test]
    fn test_scan_is_not_recursive() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("sub");
        fs::create_dir(&nested).unwrap();
        File::create(nested.join("deep.jpg")).unwrap();

        let config = WatchConfig::new(temp_dir.path());
        assert!(scan_directory(&config).unwrap().is_empty());
    }

    #[test]
    fn test_scan_missing_directory() {
        let config = WatchConfig::new("/nonexistent/path/12345");
        let result = scan_directory(&config);
        assert!(matches!(result, Err(WatcherError::DirectoryNotFound(_))));
    }
}

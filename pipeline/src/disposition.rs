//! What happens to a source file after fan-out.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::settings::{ProcessedFileOption, Settings};

/// Terminal state of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Left in the input directory.
    Left,

    /// Deleted.
    Deleted,

    /// Deletion requested but the file was already gone.
    AlreadyGone,

    /// Moved to the contained path.
    Moved(PathBuf),
}

/// Applies the configured [`ProcessedFileOption`].
#[derive(Debug, Clone)]
pub struct DispositionHandler {
    option: ProcessedFileOption,
    processed_directory: Option<PathBuf>,
}

impl DispositionHandler {
    pub fn new(option: ProcessedFileOption, processed_directory: Option<PathBuf>) -> Self {
        Self {
            option,
            processed_directory,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.processed_file_option,
            settings.processed_directory.clone(),
        )
    }

    pub fn option(&self) -> ProcessedFileOption {
        self.option
    }

    /// Dispose of `source`.
    pub async fn apply(&self, source: &Path) -> Result<Disposition> {
        match self.option {
            ProcessedFileOption::None => Ok(Disposition::Left),
            ProcessedFileOption::Delete => delete(source).await,
            ProcessedFileOption::Move => {
                let directory = self.processed_directory.as_deref().ok_or_else(|| {
                    PipelineError::Config("move requires a processed directory".to_string())
                })?;
                move_into(source, directory).await
            }
        }
    }
}

async fn delete(source: &Path) -> Result<Disposition> {
    match fs::remove_file(source).await {
        Ok(()) => {
            info!("Deleted {}", source.display());
            Ok(Disposition::Deleted)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} already gone", source.display());
            Ok(Disposition::AlreadyGone)
        }
        Err(e) => Err(PipelineError::io(source, e)),
    }
}

/// Move `source` into `directory` under the same name, replacing any
/// existing file there.
async fn move_into(source: &Path, directory: &Path) -> Result<Disposition> {
    let file_name = source.file_name().ok_or_else(|| {
        PipelineError::Config(format!("source has no file name: {}", source.display()))
    })?;
    let destination = directory.join(file_name);

    match fs::rename(source, &destination).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(source, &destination)
                .await
                .map_err(|e| PipelineError::io(&destination, e))?;
            fs::remove_file(source)
                .await
                .map_err(|e| PipelineError::io(source, e))?;
        }
        Err(e) => return Err(PipelineError::io(source, e)),
    }

    info!("Moved {} to {}", source.display(), destination.display());
    Ok(Disposition::Moved(destination))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn source_in(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_none_leaves_source() {
        let input = TempDir::new().unwrap();
        let source = source_in(&input, "a.jpg", "a");

        let handler = DispositionHandler::new(ProcessedFileOption::None, None);
        assert_eq!(handler.apply(&source).await.unwrap(), Disposition::Left);
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_delete_removes_source() {
        let input = TempDir::new().unwrap();
        let source = source_in(&input, "a.jpg", "a");

        let handler = DispositionHandler::new(ProcessedFileOption::Delete, None);
        assert_eq!(handler.apply(&source).await.unwrap(), Disposition::Deleted);
        assert!(!source.exists());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_an_error() {
        let input = TempDir::new().unwrap();
        let handler = DispositionHandler::new(ProcessedFileOption::Delete, None);

        let result = handler.apply(&input.path().join("never.jpg")).await.unwrap();
        assert_eq!(result, Disposition::AlreadyGone);
    }

    #[tokio::test]
    async fn test_move_overwrites_existing() {
        let input = TempDir::new().unwrap();
        let processed = TempDir::new().unwrap();
        let source = source_in(&input, "a.jpg", "new");
        std::fs::write(processed.path().join("a.jpg"), "old").unwrap();

        let handler = DispositionHandler::new(
            ProcessedFileOption::Move,
            Some(processed.path().to_path_buf()),
        );
        let result = handler.apply(&source).await.unwrap();

        let destination = processed.path().join("a.jpg");
        assert_eq!(result, Disposition::Moved(destination.clone()));
        assert!(!source.exists());
        assert_eq!(std::fs::read_to_string(destination).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_move_missing_source_fails() {
        let input = TempDir::new().unwrap();
        let processed = TempDir::new().unwrap();
        let handler = DispositionHandler::new(
            ProcessedFileOption::Move,
            Some(processed.path().to_path_buf()),
        );

        let result = handler.apply(&input.path().join("never.jpg")).await;
        assert!(matches!(result, Err(PipelineError::Io { .. })));
    }
}

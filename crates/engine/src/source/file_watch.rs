#![forbid(unsafe_code)]

use super::{PayloadPath, UpdateCheck, UpdateSource};
use crate::error::Error;
use crate::resource::{Origin, VersionInfo};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::trace;

/// Watches a local data file for modification. A touched or replaced file
/// reports as available on the next check; the payload is the watched path
/// itself.
#[derive(Debug, Clone)]
pub struct FileWatchSource {
    path: PathBuf,
}

impl FileWatchSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl UpdateSource for FileWatchSource {
    async fn check(&self, current: &VersionInfo) -> Result<UpdateCheck, Error> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|err| Error::FetchFailed(format!("{}: {err}", self.path.display())))?;
        let modified = metadata
            .modified()
            .map_err(|err| Error::FetchFailed(format!("{}: {err}", self.path.display())))?;

        match current.modified {
            Some(previous) if modified <= previous => {
                trace!(path = %self.path.display(), "data file unchanged");
                Ok(UpdateCheck::not_available())
            }
            _ => Ok(UpdateCheck::available(PayloadPath::Persistent(
                self.path.clone(),
            ))),
        }
    }

    fn origin(&self) -> Origin {
        Origin::File(self.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn version(path: &std::path::Path, modified: Option<SystemTime>) -> VersionInfo {
        VersionInfo {
            origin: Origin::File(path.to_path_buf()),
            checksum: "c".into(),
            modified,
            etag: None,
        }
    }

    #[tokio::test]
    async fn first_check_reports_available() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, "content").unwrap();

        let source = FileWatchSource::new(path.clone());
        let check = source
            .check(&VersionInfo::placeholder(source.origin()))
            .await
            .unwrap();
        assert!(check.available);
    }

    #[tokio::test]
    async fn unchanged_mtime_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, "content").unwrap();
        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();

        let source = FileWatchSource::new(path.clone());
        let check = source.check(&version(&path, Some(modified))).await.unwrap();
        assert!(!check.available);
    }

    #[tokio::test]
    async fn newer_mtime_reports_available() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, "content").unwrap();
        let old = SystemTime::now() - Duration::from_secs(3600);

        let source = FileWatchSource::new(path.clone());
        let check = source.check(&version(&path, Some(old))).await.unwrap();
        assert!(check.available);
        assert_eq!(check.payload.unwrap().as_path(), path.as_path());
    }

    #[tokio::test]
    async fn missing_file_is_fetch_failure() {
        let source = FileWatchSource::new(PathBuf::from("/nonexistent/data.txt"));
        let err = source
            .check(&VersionInfo::placeholder(source.origin()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FetchFailed(_)));
    }
}

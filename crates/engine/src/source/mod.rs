#![forbid(unsafe_code)]

mod file_watch;
mod remote;

pub use file_watch::FileWatchSource;
pub use remote::RemoteSource;

use crate::error::Error;
use crate::resource::{Origin, VersionInfo};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Where a fetched payload lives until it is loaded. Temporary payloads
/// (remote downloads) are deleted when the check result is dropped, i.e.
/// at the end of the polling tick that consumed them.
pub enum PayloadPath {
    Persistent(PathBuf),
    Temporary(tempfile::TempPath),
}

impl PayloadPath {
    pub fn as_path(&self) -> &Path {
        match self {
            PayloadPath::Persistent(path) => path,
            PayloadPath::Temporary(temp) => temp,
        }
    }
}

impl std::fmt::Debug for PayloadPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PayloadPath").field(&self.as_path()).finish()
    }
}

/// Outcome of one update check.
#[derive(Debug)]
pub struct UpdateCheck {
    pub available: bool,
    pub payload: Option<PayloadPath>,
    /// Entity tag of the fetched payload, recorded into the next version
    /// so later checks can be conditional.
    pub etag: Option<String>,
}

impl UpdateCheck {
    pub fn not_available() -> Self {
        Self {
            available: false,
            payload: None,
            etag: None,
        }
    }

    pub fn available(payload: PayloadPath) -> Self {
        Self {
            available: true,
            payload: Some(payload),
            etag: None,
        }
    }
}

/// Abstraction over "where a newer data file comes from". Implementations
/// must be safe to call repeatedly and concurrently with detection
/// traffic: a check only reads version metadata, never the loaded data.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Compare against `current` and report whether a newer payload is
    /// available, fetching it if so.
    async fn check(&self, current: &VersionInfo) -> Result<UpdateCheck, Error>;

    /// Origin recorded on resources loaded from this source.
    fn origin(&self) -> Origin;
}

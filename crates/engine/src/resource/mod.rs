#![forbid(unsafe_code)]

mod manager;

pub use manager::{ResourceHandle, ResourceManager, SwapOutcome};

use crate::dataset::{self, DataSet};
use crate::error::Error;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::TempDir;
use tracing::debug;

/// Where a resource generation came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    File(PathBuf),
    Url(String),
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::File(path) => write!(f, "{}", path.display()),
            Origin::Url(url) => write!(f, "{url}"),
        }
    }
}

/// Identity of one loaded data file version: enough for an update source to
/// decide whether anything newer exists without touching the loaded data.
#[derive(Debug, Clone)]
pub struct VersionInfo {
    pub origin: Origin,
    /// Hex blake3 digest of the raw payload. Empty before any load.
    pub checksum: String,
    /// Modification time of the source file, when it came from disk.
    pub modified: Option<SystemTime>,
    /// Entity tag reported by the remote server, when it came from a URL.
    pub etag: Option<String>,
}

impl VersionInfo {
    /// Placeholder used before an initial resource exists, so an update
    /// source always sees an "older than anything" version.
    pub fn placeholder(origin: Origin) -> Self {
        Self {
            origin,
            checksum: String::new(),
            modified: None,
            etag: None,
        }
    }
}

/// A validated candidate resource that has not been installed yet. Produced
/// by [`ResourceLoader`]; consumed by [`ResourceManager::install`].
#[derive(Debug)]
pub struct LoadedResource {
    pub(crate) dataset: DataSet,
    pub(crate) version: VersionInfo,
    pub(crate) temp: Option<TempDir>,
}

impl LoadedResource {
    pub fn version(&self) -> &VersionInfo {
        &self.version
    }

    pub fn set_etag(&mut self, etag: Option<String>) {
        self.version.etag = etag;
    }
}

/// One immutable generation of the detection data set. Shared through an
/// `Arc`: the underlying data (and any temp copy backing it) is released
/// when the last holder drops, never while a detection still reads it.
pub struct VersionedResource {
    generation: u64,
    dataset: DataSet,
    version: VersionInfo,
    loaded_at: SystemTime,
    _temp: Option<TempDir>,
}

impl VersionedResource {
    pub(crate) fn new(generation: u64, loaded: LoadedResource) -> Self {
        Self {
            generation,
            dataset: loaded.dataset,
            version: loaded.version,
            loaded_at: SystemTime::now(),
            _temp: loaded.temp,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn dataset(&self) -> &DataSet {
        &self.dataset
    }

    pub fn version(&self) -> &VersionInfo {
        &self.version
    }

    pub fn loaded_at(&self) -> SystemTime {
        self.loaded_at
    }
}

impl std::fmt::Debug for VersionedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedResource")
            .field("generation", &self.generation)
            .field("origin", &self.version.origin)
            .field("checksum", &self.version.checksum)
            .finish()
    }
}

/// Loads and validates data file payloads into candidate resources.
#[derive(Debug, Clone)]
pub struct ResourceLoader {
    temp_copy: bool,
    temp_dir: Option<PathBuf>,
    properties: Vec<String>,
}

impl ResourceLoader {
    pub fn new(data: &config::Data) -> Self {
        Self {
            temp_copy: data.temp_copy,
            temp_dir: data.temp_dir.clone(),
            properties: data.properties.clone(),
        }
    }

    /// Read, checksum, and parse the payload at `path`. Validation failures
    /// surface as [`Error::InvalidPayload`] and the candidate is never
    /// constructed, so a bad payload cannot reach the manager.
    pub fn load_file(&self, path: &Path, origin: Origin) -> Result<LoadedResource, Error> {
        let modified = std::fs::metadata(path)?.modified().ok();

        let (read_path, temp) = if self.temp_copy {
            let temp = match &self.temp_dir {
                Some(dir) => {
                    std::fs::create_dir_all(dir)?;
                    TempDir::new_in(dir)?
                }
                None => TempDir::new()?,
            };
            let copy = temp.path().join("uascope-data");
            std::fs::copy(path, &copy)?;
            debug!(from = %path.display(), to = %copy.display(), "data file copied to temp dir");
            (copy, Some(temp))
        } else {
            (path.to_path_buf(), None)
        };

        let raw = std::fs::read(&read_path)?;
        if raw.is_empty() {
            return Err(Error::InvalidPayload(format!(
                "data file {} is empty",
                path.display()
            )));
        }

        let dataset = DataSet::parse(&raw, &self.properties)?;
        let version = VersionInfo {
            origin,
            checksum: dataset::checksum(&raw),
            modified,
            etag: None,
        };

        debug!(
            origin = %version.origin,
            checksum = %version.checksum,
            rules = dataset.rule_count(),
            "data payload loaded"
        );

        Ok(LoadedResource {
            dataset,
            version,
            temp,
        })
    }
}

#![forbid(unsafe_code)]

use super::{LoadedResource, VersionInfo, VersionedResource};
use crate::error::Error;
use parking_lot::RwLock;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

/// Result of [`ResourceManager::install`].
pub enum SwapOutcome {
    /// The candidate became current. The superseded resource is returned;
    /// it stays alive until every in-flight handle to it drops.
    Installed {
        generation: u64,
        previous: Arc<VersionedResource>,
    },
    /// The candidate carried the same checksum as the current resource.
    /// Nothing was swapped and the generation counter did not move.
    Unchanged,
}

/// Owns the current resource generation and hands out snapshot handles.
///
/// The current pointer is the only state mutated concurrently with
/// detection traffic: readers clone the `Arc` under a read lock, the
/// (infrequent) writer replaces it under a write lock. A handle taken
/// before a swap keeps its generation alive and fully intact for as long
/// as it is held.
pub struct ResourceManager {
    current: RwLock<Arc<VersionedResource>>,
    generation: AtomicU64,
    outstanding: Arc<AtomicUsize>,
}

impl ResourceManager {
    /// Install the initial resource as generation 1.
    pub fn new(initial: LoadedResource) -> Self {
        let resource = Arc::new(VersionedResource::new(1, initial));
        info!(
            generation = 1u64,
            origin = %resource.version().origin,
            "initial resource installed"
        );
        Self {
            current: RwLock::new(resource),
            generation: AtomicU64::new(1),
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Snapshot handle to the current resource. Never blocks beyond the
    /// brief pointer read; never fails while the manager is alive.
    pub fn acquire(&self) -> ResourceHandle {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        let resource = Arc::clone(&self.current.read());
        ResourceHandle {
            resource,
            outstanding: Arc::clone(&self.outstanding),
        }
    }

    /// Atomically replace the current resource with `candidate`. The caller
    /// is responsible for having validated the candidate; the manager only
    /// guards against reinstalling identical data.
    pub fn install(&self, candidate: LoadedResource) -> SwapOutcome {
        let mut current = self.current.write();
        if candidate.version.checksum == current.version().checksum {
            debug!(
                checksum = %candidate.version.checksum,
                "candidate identical to current resource, swap skipped"
            );
            return SwapOutcome::Unchanged;
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let fresh = Arc::new(VersionedResource::new(generation, candidate));
        let previous = std::mem::replace(&mut *current, fresh);
        info!(
            generation,
            superseded = previous.generation(),
            origin = %current.version().origin,
            "resource swapped"
        );
        SwapOutcome::Installed {
            generation,
            previous,
        }
    }

    pub fn current_generation(&self) -> u64 {
        self.current.read().generation()
    }

    pub fn current_version(&self) -> VersionInfo {
        self.current.read().version().clone()
    }

    /// Number of handles currently held across all generations.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Wait for every outstanding handle to drop. Bounded by `grace`: a
    /// handle held past the deadline is treated as leaked and reported
    /// rather than hanging shutdown forever.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), Error> {
        let deadline = Instant::now() + grace;
        loop {
            let outstanding = self.outstanding();
            if outstanding == 0 {
                debug!("all data handles released");
                return Ok(());
            }
            if Instant::now() >= deadline {
                error!(outstanding, ?grace, "data handles still held at shutdown");
                return Err(Error::ShutdownTimeout { outstanding, grace });
            }
            tokio::time::sleep(SHUTDOWN_POLL).await;
        }
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("generation", &self.current_generation())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

/// Scoped access to one resource generation. Releases its reference when
/// dropped, on every exit path; the data it points at cannot be freed
/// while the handle lives.
pub struct ResourceHandle {
    resource: Arc<VersionedResource>,
    outstanding: Arc<AtomicUsize>,
}

impl Deref for ResourceHandle {
    type Target = VersionedResource;

    fn deref(&self) -> &Self::Target {
        &self.resource
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

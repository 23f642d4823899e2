#![forbid(unsafe_code)]

use super::DeviceMatch;
use crate::evidence::Evidence;
use std::hash::{Hash, Hasher};

/// Cache key for one (data generation, evidence) pair. Including the
/// generation means entries produced by a superseded resource can never be
/// served after a swap; they simply age out.
pub fn fingerprint(generation: u64, evidence: &[Evidence]) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    generation.hash(&mut hasher);
    for item in evidence {
        item.hash(&mut hasher);
    }
    hasher.finish()
}

/// Bounded in-process detection result cache.
pub struct ResultCache {
    inner: moka::sync::Cache<u64, DeviceMatch>,
}

impl ResultCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: moka::sync::Cache::new(capacity),
        }
    }

    pub fn get(&self, key: u64) -> Option<DeviceMatch> {
        self.inner.get(&key)
    }

    pub fn insert(&self, key: u64, value: DeviceMatch) {
        self.inner.insert(key, value);
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Detection {
    /// Maximum number of detection results kept in the in-process cache.
    /// Zero disables caching. Cached entries are keyed by evidence and data
    /// generation, so a data file update never serves stale results.
    pub cache_size: u64,
}

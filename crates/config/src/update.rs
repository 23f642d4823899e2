use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Update {
    /// URL a newer data file can be fetched from. The payload may be served
    /// raw or transport-compressed. When unset, a distributor URL is derived
    /// from `license_key` and `product` if both are present.
    pub url: Option<String>,

    /// License key used when deriving the hosted distributor URL.
    pub license_key: Option<String>,

    /// Product name used when deriving the hosted distributor URL.
    pub product: Option<String>,

    /// Whether the engine polls for data file updates in the background.
    pub auto_update: bool,

    /// Whether to check for an update once at engine startup, before the
    /// first timer-driven poll. Also used to obtain an initial data file
    /// when none exists locally.
    pub update_on_start: bool,

    /// How often the engine checks for updates. A recommended polling
    /// interval in a production environment is around 30 minutes.
    /// **Measured in seconds**.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub polling_interval: Duration,

    /// Upper bound of the random delay added to each polling interval.
    /// Useful in datacenter applications where multiple instances would
    /// otherwise poll at the exact same time. **Measured in seconds**.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub randomization: Duration,

    /// Watch the local data file for modification instead of (or in
    /// addition to) fetching from a URL. A touched or replaced file is
    /// picked up on the next poll.
    pub file_watch: bool,
}

impl Default for Update {
    fn default() -> Self {
        Self {
            url: None,
            license_key: None,
            product: None,
            auto_update: true,
            update_on_start: false,
            polling_interval: Duration::from_secs(30 * 60),
            randomization: Duration::from_secs(600),
            file_watch: false,
        }
    }
}

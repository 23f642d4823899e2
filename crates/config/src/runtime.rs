use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Runtime {
    /// How long shutdown waits for in-flight detections to release their
    /// data handles before giving up. **Measured in seconds**.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub shutdown_grace: Duration,

    /// Number of worker tasks used for batch processing. Batch concurrency
    /// is capped at this count rather than spawning one task per record.
    pub workers: usize,

    /// Depth of the bounded queue feeding the batch workers. Submission
    /// blocks once the queue is full, which keeps back-pressure explicit.
    pub queue_depth: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            shutdown_grace: Duration::from_secs(5),
            workers: 8,
            queue_depth: 256,
        }
    }
}

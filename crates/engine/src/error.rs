use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No usable detection data available: {0}")]
    NoInitialResource(String),

    #[error("Invalid data payload: {0}")]
    InvalidPayload(String),

    #[error("Failed to fetch update: {0}")]
    FetchFailed(String),

    #[error("{outstanding} data handle(s) still held after {grace:?}")]
    ShutdownTimeout { outstanding: usize, grace: Duration },

    #[error("Detection failed: {0}")]
    DetectionFailed(String),

    #[error("No update source is configured")]
    NoUpdateSource,

    #[error("Failed to load config: {0}")]
    Config(#[from] config::Error),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

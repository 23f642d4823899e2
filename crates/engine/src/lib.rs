#![forbid(unsafe_code)]

pub mod batch;
pub mod clock;
pub mod dataset;
pub mod detection;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod resource;
pub mod scheduler;
pub mod source;

pub use batch::{BatchOptions, BatchReport, RecordOutcome};
pub use clock::{Clock, SystemClock};
pub use dataset::{DATA_MAGIC, DataSet, Rule};
pub use detection::{Detector, DeviceMatch, ResultCache, SubstringDetector};
pub use engine::{DetectionEngine, Services};
pub use error::Error;
pub use evidence::{Evidence, EvidenceField, record_from_map, records_from_yaml};
pub use resource::{
    LoadedResource, Origin, ResourceHandle, ResourceLoader, ResourceManager, SwapOutcome,
    VersionInfo, VersionedResource,
};
pub use scheduler::{SchedulerState, UpdateCheckResult};
pub use source::{FileWatchSource, PayloadPath, RemoteSource, UpdateCheck, UpdateSource};

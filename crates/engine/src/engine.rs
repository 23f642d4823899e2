#![forbid(unsafe_code)]

use crate::clock::{Clock, SystemClock};
use crate::detection::{Detector, DeviceMatch, ResultCache, SubstringDetector, fingerprint};
use crate::error::Error;
use crate::evidence::Evidence;
use crate::resource::{
    LoadedResource, Origin, ResourceLoader, ResourceManager, VersionInfo,
};
use crate::scheduler::{
    PollingScheduler, SchedulerHandle, SchedulerState, Ticker, UpdateCheckResult,
};
use crate::source::{FileWatchSource, RemoteSource, UpdateSource};
use config::Config;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Pluggable collaborators of the engine. [`Services::from_config`] wires
/// the defaults; tests and embedders swap in their own.
pub struct Services {
    pub detector: Box<dyn Detector>,
    pub source: Option<Box<dyn UpdateSource>>,
    pub clock: Box<dyn Clock>,
}

impl Services {
    /// Default services for a configuration: the built-in detector, the
    /// update source the config shape implies (explicit URL, then hosted
    /// distributor, then local file watch), and the system clock.
    pub fn from_config(config: &Config) -> Self {
        let source: Option<Box<dyn UpdateSource>> = if let Some(url) = &config.update.url {
            Some(Box::new(RemoteSource::new(url.clone())))
        } else if let (Some(key), Some(product)) =
            (&config.update.license_key, &config.update.product)
        {
            Some(Box::new(RemoteSource::for_license(key, product)))
        } else if config.update.file_watch {
            Some(Box::new(FileWatchSource::new(config.data.file.clone())))
        } else {
            None
        };

        Self {
            detector: Box::new(SubstringDetector),
            source,
            clock: Box::new(SystemClock),
        }
    }
}

/// Public entry point: owns the resource manager and, when auto-update is
/// enabled, the polling scheduler. Detection traffic and background
/// updates share nothing but the current-resource pointer.
pub struct DetectionEngine {
    manager: Arc<ResourceManager>,
    detector: Box<dyn Detector>,
    cache: Option<ResultCache>,
    ticker: Option<Arc<Ticker>>,
    scheduler: Mutex<Option<SchedulerHandle>>,
    updates_rx: watch::Receiver<UpdateCheckResult>,
    shutdown_grace: Duration,
}

impl DetectionEngine {
    /// Build an engine with default services.
    pub async fn from_config(config: Config) -> Result<Self, Error> {
        let services = Services::from_config(&config);
        Self::new(config, services).await
    }

    /// Load the initial resource and start the polling scheduler if
    /// auto-update is enabled. Fails with [`Error::NoInitialResource`]
    /// when neither a usable local file nor a successful initial fetch is
    /// available.
    pub async fn new(config: Config, services: Services) -> Result<Self, Error> {
        config.validate()?;
        let Services {
            detector,
            source,
            clock,
        } = services;
        let clock: Arc<dyn Clock> = Arc::from(clock);
        let loader = ResourceLoader::new(&config.data);

        let initial = Self::initial_resource(&config, &loader, source.as_deref()).await?;
        let manager = Arc::new(ResourceManager::new(initial));

        let cache = match config.detection.cache_size {
            0 => None,
            capacity => Some(ResultCache::new(capacity)),
        };

        let (outcome_tx, updates_rx) = watch::channel(UpdateCheckResult::NoUpdate);
        let ticker = source.map(|source| {
            Arc::new(Ticker::new(
                Arc::clone(&manager),
                source,
                loader.clone(),
                outcome_tx,
            ))
        });

        let scheduler = match &ticker {
            Some(ticker) if config.update.auto_update => {
                Some(SchedulerHandle::spawn(PollingScheduler {
                    ticker: Arc::clone(ticker),
                    clock,
                    interval: config.update.polling_interval,
                    randomization: config.update.randomization,
                    immediate_first: config.update.update_on_start,
                }))
            }
            _ => None,
        };

        Ok(Self {
            manager,
            detector,
            cache,
            ticker,
            scheduler: Mutex::new(scheduler),
            updates_rx,
            shutdown_grace: config.runtime.shutdown_grace,
        })
    }

    async fn initial_resource(
        config: &Config,
        loader: &ResourceLoader,
        source: Option<&dyn UpdateSource>,
    ) -> Result<LoadedResource, Error> {
        let data_path = &config.data.file;
        let mut last_error: Option<Error> = None;

        if data_path.exists() {
            match loader.load_file(data_path, Origin::File(data_path.clone())) {
                Ok(resource) => return Ok(resource),
                Err(err) => {
                    warn!(path = %data_path.display(), %err, "local data file unusable");
                    last_error = Some(err);
                }
            }
        }

        if config.update.update_on_start
            && let Some(source) = source
        {
            info!("no usable local data file, attempting initial fetch");
            match source.check(&VersionInfo::placeholder(source.origin())).await {
                Ok(check) if check.available => {
                    if let Some(payload) = check.payload {
                        match loader.load_file(payload.as_path(), source.origin()) {
                            Ok(mut resource) => {
                                resource.set_etag(check.etag);
                                return Ok(resource);
                            }
                            Err(err) => last_error = Some(err),
                        }
                    }
                }
                Ok(_) => {}
                Err(err) => last_error = Some(err),
            }
        }

        Err(Error::NoInitialResource(match last_error {
            Some(err) => err.to_string(),
            None => format!(
                "no data file at {} and no update source able to provide one",
                data_path.display()
            ),
        }))
    }

    /// Run detection against the current resource generation. The handle
    /// taken here is released on every exit path; the returned match owns
    /// its values and never references the resource.
    pub fn process(&self, evidence: &[Evidence]) -> Result<DeviceMatch, Error> {
        let handle = self.manager.acquire();
        let generation = handle.generation();

        if let Some(cache) = &self.cache {
            let key = fingerprint(generation, evidence);
            if let Some(hit) = cache.get(key) {
                return Ok(hit);
            }
            let values = self.detector.detect(handle.dataset(), evidence)?;
            let result = DeviceMatch::new(generation, values);
            cache.insert(key, result.clone());
            return Ok(result);
        }

        let values = self.detector.detect(handle.dataset(), evidence)?;
        Ok(DeviceMatch::new(generation, values))
    }

    /// Generation of the currently installed resource.
    pub fn current_generation(&self) -> u64 {
        self.manager.current_generation()
    }

    /// Version metadata of the currently installed resource.
    pub fn current_version(&self) -> VersionInfo {
        self.manager.current_version()
    }

    /// Handles currently held by in-flight detections.
    pub fn outstanding_handles(&self) -> usize {
        self.manager.outstanding()
    }

    /// Receiver observing the outcome of every update check.
    pub fn updates(&self) -> watch::Receiver<UpdateCheckResult> {
        self.updates_rx.clone()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        match &*self.scheduler.lock() {
            Some(handle) => handle.state(),
            None => SchedulerState::Stopped,
        }
    }

    /// Run one update check now, outside the polling schedule. Serialized
    /// with scheduler ticks; never overlaps one.
    pub async fn poll_now(&self) -> Result<UpdateCheckResult, Error> {
        let ticker = self.ticker.as_ref().ok_or(Error::NoUpdateSource)?;
        Ok(ticker.tick().await)
    }

    /// Stop the polling scheduler (if running), then wait for in-flight
    /// detections to release their handles. Idempotent; safe to call when
    /// auto-update was never enabled.
    pub async fn stop(&self) -> Result<(), Error> {
        let handle = self.scheduler.lock().take();
        if let Some(handle) = handle {
            handle.stop(self.shutdown_grace).await;
        }
        self.manager.shutdown(self.shutdown_grace).await
    }
}

impl std::fmt::Debug for DetectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionEngine")
            .field("generation", &self.current_generation())
            .field("outstanding", &self.outstanding_handles())
            .field("scheduler", &self.scheduler_state())
            .finish()
    }
}

#![forbid(unsafe_code)]

use crate::clock::Clock;
use crate::resource::{ResourceLoader, ResourceManager, SwapOutcome};
use crate::source::UpdateSource;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

/// Outcome of one polling tick, published for observability after every
/// check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheckResult {
    NoUpdate,
    Applied { generation: u64 },
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
    Stopping,
}

/// One "check for update" execution: check the source, load and validate
/// the payload, install it. Shared between the timer-driven scheduler and
/// manual polls; the internal lock keeps ticks strictly serialized either
/// way.
pub(crate) struct Ticker {
    manager: Arc<ResourceManager>,
    source: Box<dyn UpdateSource>,
    loader: ResourceLoader,
    tick_lock: tokio::sync::Mutex<()>,
    outcome_tx: watch::Sender<UpdateCheckResult>,
}

impl Ticker {
    pub(crate) fn new(
        manager: Arc<ResourceManager>,
        source: Box<dyn UpdateSource>,
        loader: ResourceLoader,
        outcome_tx: watch::Sender<UpdateCheckResult>,
    ) -> Self {
        Self {
            manager,
            source,
            loader,
            tick_lock: tokio::sync::Mutex::new(()),
            outcome_tx,
        }
    }

    pub(crate) async fn tick(&self) -> UpdateCheckResult {
        let _serial = self.tick_lock.lock().await;
        let outcome = self.tick_inner().await;
        match &outcome {
            UpdateCheckResult::NoUpdate => trace!("no update available"),
            UpdateCheckResult::Applied { generation } => {
                info!(generation, "data file update applied");
            }
            UpdateCheckResult::Failed { reason } => {
                warn!(%reason, "update check failed, keeping current resource");
            }
        }
        let _ = self.outcome_tx.send(outcome.clone());
        outcome
    }

    async fn tick_inner(&self) -> UpdateCheckResult {
        let current = self.manager.current_version();
        let check = match self.source.check(&current).await {
            Ok(check) => check,
            Err(err) => {
                return UpdateCheckResult::Failed {
                    reason: err.to_string(),
                };
            }
        };
        if !check.available {
            return UpdateCheckResult::NoUpdate;
        }
        let Some(payload) = check.payload else {
            return UpdateCheckResult::Failed {
                reason: "update source reported available without a payload".into(),
            };
        };

        let mut candidate = match self
            .loader
            .load_file(payload.as_path(), self.source.origin())
        {
            Ok(candidate) => candidate,
            Err(err) => {
                return UpdateCheckResult::Failed {
                    reason: err.to_string(),
                };
            }
        };
        candidate.set_etag(check.etag);

        match self.manager.install(candidate) {
            SwapOutcome::Installed { generation, .. } => UpdateCheckResult::Applied { generation },
            SwapOutcome::Unchanged => UpdateCheckResult::NoUpdate,
        }
    }
}

/// Timer loop around [`Ticker`]: sleep interval-plus-jitter, run one tick,
/// repeat until cancelled. Ticks never overlap; a tick that overruns the
/// interval delays the next check instead of stacking a second one.
pub(crate) struct PollingScheduler {
    pub(crate) ticker: Arc<Ticker>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) interval: Duration,
    pub(crate) randomization: Duration,
    pub(crate) immediate_first: bool,
}

impl PollingScheduler {
    async fn run(self, cancel: CancellationToken) {
        info!(
            interval = ?self.interval,
            randomization = ?self.randomization,
            "polling scheduler started"
        );
        if self.immediate_first && !cancel.is_cancelled() {
            self.ticker.tick().await;
        }
        loop {
            let delay = self.interval + jitter(self.randomization);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.clock.sleep(delay) => {}
            }
            let started = self.clock.now();
            self.ticker.tick().await;
            trace!(elapsed = ?self.clock.now().duration_since(started), "tick finished");
        }
        info!("polling scheduler stopped");
    }
}

/// Running scheduler task plus its cooperative-stop plumbing.
pub(crate) struct SchedulerHandle {
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
    state: Arc<Mutex<SchedulerState>>,
}

impl SchedulerHandle {
    pub(crate) fn spawn(scheduler: PollingScheduler) -> Self {
        let cancel = CancellationToken::new();
        let state = Arc::new(Mutex::new(SchedulerState::Running));
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { scheduler.run(cancel).await }
        });
        Self {
            cancel,
            task,
            state,
        }
    }

    pub(crate) fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    /// Signal the loop to exit after its current step and wait for it,
    /// bounded by `grace`.
    pub(crate) async fn stop(mut self, grace: Duration) {
        *self.state.lock() = SchedulerState::Stopping;
        self.cancel.cancel();
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(%err, "polling scheduler task failed"),
            Err(_) => {
                warn!(?grace, "polling scheduler did not exit in time, aborting");
                self.task.abort();
            }
        }
        *self.state.lock() = SchedulerState::Stopped;
    }
}

fn jitter(bound: Duration) -> Duration {
    if bound.is_zero() {
        return Duration::ZERO;
    }
    let millis = rand::rng().random_range(0..=bound.as_millis() as u64);
    Duration::from_millis(millis)
}

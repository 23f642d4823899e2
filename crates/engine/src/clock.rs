#![forbid(unsafe_code)]

use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Time source used by the polling scheduler. Swappable so tests can run
/// the scheduler without real waits.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

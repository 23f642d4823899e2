#![forbid(unsafe_code)]

use crate::detection::DeviceMatch;
use crate::engine::DetectionEngine;
use crate::error::Error;
use crate::evidence::Evidence;
use parking_lot::Mutex;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, warn};

/// Sizing of the batch worker pool.
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Concurrent workers; concurrency is capped here rather than spawning
    /// one task per record.
    pub workers: usize,
    /// Bounded queue depth between the feeder and the workers. Submission
    /// waits when the queue is full.
    pub queue_depth: usize,
}

impl BatchOptions {
    pub fn from_config(runtime: &config::Runtime) -> Self {
        Self {
            workers: runtime.workers.max(1),
            queue_depth: runtime.queue_depth.max(1),
        }
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_config(&config::Runtime::default())
    }
}

/// Detection outcome of one record, tagged with its input position.
#[derive(Debug)]
pub struct RecordOutcome {
    pub index: usize,
    pub result: Result<DeviceMatch, Error>,
}

/// Aggregated outcome of one batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchReport {
    pub processed: u64,
    pub failed: u64,
    /// XOR-combined fingerprint of every reported property value. Equal
    /// inputs against identical data must produce equal hash codes, which
    /// makes the report a cheap determinism check across runs and reloads.
    pub hash_code: u32,
}

fn value_hash(value: &str) -> u32 {
    let mut hasher = rustc_hash::FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish() as u32
}

/// Process evidence records through the engine with a fixed worker pool
/// and a bounded queue, returning per-record outcomes in input order.
/// Per-record detection failures are counted and logged, never fatal to
/// the batch.
pub async fn collect(
    engine: Arc<DetectionEngine>,
    records: impl IntoIterator<Item = Vec<Evidence>>,
    options: BatchOptions,
) -> (BatchReport, Vec<RecordOutcome>) {
    let outcomes: Arc<Mutex<Vec<RecordOutcome>>> = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = flume::bounded::<(usize, Vec<Evidence>)>(options.queue_depth);

    let workers: Vec<_> = (0..options.workers)
        .map(|_| {
            let rx = rx.clone();
            let engine = Arc::clone(&engine);
            let outcomes = Arc::clone(&outcomes);
            tokio::spawn(async move {
                while let Ok((index, record)) = rx.recv_async().await {
                    let result = engine.process(&record);
                    if let Err(err) = &result {
                        warn!(index, %err, "record failed detection");
                    }
                    outcomes.lock().push(RecordOutcome { index, result });
                }
            })
        })
        .collect();

    for (index, record) in records.into_iter().enumerate() {
        if tx.send_async((index, record)).await.is_err() {
            break;
        }
    }
    drop(tx);
    futures::future::join_all(workers).await;

    let mut outcomes = match Arc::try_unwrap(outcomes) {
        Ok(mutex) => mutex.into_inner(),
        Err(shared) => std::mem::take(&mut *shared.lock()),
    };
    outcomes.sort_unstable_by_key(|outcome| outcome.index);

    let mut report = BatchReport::default();
    for outcome in &outcomes {
        match &outcome.result {
            Ok(result) => {
                for property in result.properties() {
                    if let Some(value) = result.value(property) {
                        report.hash_code ^= value_hash(value);
                    }
                }
                report.processed += 1;
            }
            Err(_) => report.failed += 1,
        }
    }

    debug!(
        processed = report.processed,
        failed = report.failed,
        hash_code = report.hash_code,
        "batch complete"
    );
    (report, outcomes)
}

/// [`collect`] without keeping the per-record outcomes.
pub async fn run(
    engine: Arc<DetectionEngine>,
    records: impl IntoIterator<Item = Vec<Evidence>>,
    options: BatchOptions,
) -> BatchReport {
    let (report, _) = collect(engine, records, options).await;
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_order_independent_via_xor() {
        let combined_a = value_hash("one") ^ value_hash("two");
        let combined_b = value_hash("two") ^ value_hash("one");
        assert_eq!(combined_a, combined_b);
    }

    #[test]
    fn options_never_collapse_to_zero() {
        let runtime = config::Runtime {
            workers: 0,
            queue_depth: 0,
            ..config::Runtime::default()
        };
        let options = BatchOptions::from_config(&runtime);
        assert_eq!(options.workers, 1);
        assert_eq!(options.queue_depth, 1);
    }
}

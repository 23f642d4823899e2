#![forbid(unsafe_code)]

use engine::{BatchOptions, DetectionEngine, Evidence, batch, records_from_yaml};
use std::sync::Arc;
use tempfile::TempDir;

const VALID: &str = "uascope-data/1\n\
iPhone\tIsMobile=True;DeviceType=SmartPhone\n\
Windows NT\tIsMobile=False;DeviceType=Desktop\n\
*\tIsMobile=Unknown;DeviceType=Unknown\n";

async fn local_engine(dir: &TempDir) -> Arc<DetectionEngine> {
    let path = dir.path().join("data.txt");
    std::fs::write(&path, VALID).unwrap();
    let mut config = config::Config::default();
    config.data.file = path;
    config.update.auto_update = false;
    Arc::new(DetectionEngine::from_config(config).await.unwrap())
}

fn evidence_yaml(records: usize) -> String {
    let mut text = String::new();
    for i in 0..records {
        if i > 0 {
            text.push_str("---\n");
        }
        let agent = match i % 3 {
            0 => "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)",
            1 => "Mozilla/5.0 (Windows NT 10.0; Win64; x64)",
            _ => "curl/8.0",
        };
        text.push_str(&format!("header.user-agent: {agent}\n"));
    }
    text
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_processes_every_record() {
    let dir = tempfile::tempdir().unwrap();
    let engine = local_engine(&dir).await;

    let records = records_from_yaml(&evidence_yaml(60)).unwrap();
    assert_eq!(records.len(), 60);

    let options = BatchOptions {
        workers: 4,
        queue_depth: 8,
    };
    let report = batch::run(Arc::clone(&engine), records, options).await;

    assert_eq!(report.processed, 60);
    assert_eq!(report.failed, 0);
    assert_ne!(report.hash_code, 0);
    engine.stop().await.unwrap();
}

/// Identical inputs against identical data produce identical hash codes,
/// independent of worker count and scheduling order.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_reports_are_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let engine = local_engine(&dir).await;
    let yaml = evidence_yaml(45);

    let first = batch::run(
        Arc::clone(&engine),
        records_from_yaml(&yaml).unwrap(),
        BatchOptions {
            workers: 1,
            queue_depth: 4,
        },
    )
    .await;
    let second = batch::run(
        Arc::clone(&engine),
        records_from_yaml(&yaml).unwrap(),
        BatchOptions {
            workers: 8,
            queue_depth: 64,
        },
    )
    .await;

    assert_eq!(first.processed, second.processed);
    assert_eq!(first.hash_code, second.hash_code);
    engine.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn collect_preserves_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let engine = local_engine(&dir).await;

    let records = records_from_yaml(&evidence_yaml(30)).unwrap();
    let (report, outcomes) = engine::batch::collect(
        Arc::clone(&engine),
        records,
        BatchOptions {
            workers: 8,
            queue_depth: 4,
        },
    )
    .await;

    assert_eq!(report.processed, 30);
    assert_eq!(outcomes.len(), 30);
    for (position, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.index, position);
    }
    // Record 0 is the iPhone agent.
    let first = outcomes[0].result.as_ref().unwrap();
    assert_eq!(first.value("IsMobile"), Some("True"));
    engine.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_records_are_counted_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let engine = local_engine(&dir).await;

    let mut records = records_from_yaml(&evidence_yaml(10)).unwrap();
    // An empty record is a detection failure, not a batch failure.
    records.insert(5, Vec::<Evidence>::new());

    let report = batch::run(Arc::clone(&engine), records, BatchOptions::default()).await;
    assert_eq!(report.processed, 10);
    assert_eq!(report.failed, 1);
    engine.stop().await.unwrap();
}

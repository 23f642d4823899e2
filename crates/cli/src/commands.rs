use crate::cli::{BatchArgs, BenchArgs, DetectArgs, WatchArgs};
use anyhow::Context;
use config::Config;
use engine::{BatchOptions, DetectionEngine, Evidence, UpdateCheckResult, batch};
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// One-shot detection without background updates.
pub async fn detect(mut config: Config, args: DetectArgs) -> anyhow::Result<()> {
    config.update.auto_update = false;
    if !args.properties.is_empty() {
        config.data.properties = args.properties.clone();
    }

    let mut evidence = Vec::new();
    if let Some(ua) = &args.ua {
        evidence.push(Evidence::header("user-agent", ua));
    }
    evidence.extend(args.evidence.iter().cloned());
    anyhow::ensure!(
        !evidence.is_empty(),
        "no evidence given; pass --ua or --evidence"
    );

    let engine = DetectionEngine::from_config(config).await?;
    let result = engine.process(&evidence)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for property in result.properties() {
        if let Some(value) = result.value(property) {
            writeln!(out, "{property}: {value}")?;
        }
    }
    writeln!(out, "generation: {}", result.generation())?;

    engine.stop().await?;
    Ok(())
}

/// Offline processing: evidence records in, CSV out, bounded worker pool.
pub async fn batch(mut config: Config, args: BatchArgs) -> anyhow::Result<()> {
    config.update.auto_update = false;
    if let Some(workers) = args.workers {
        config.runtime.workers = workers;
    }
    let options = BatchOptions::from_config(&config.runtime);

    let text = std::fs::read_to_string(&args.evidence_file)
        .with_context(|| format!("reading {}", args.evidence_file.display()))?;
    let records = engine::records_from_yaml(&text)?;
    anyhow::ensure!(!records.is_empty(), "no evidence records found");

    let engine = Arc::new(DetectionEngine::from_config(config).await?);
    let (report, outcomes) = batch::collect(Arc::clone(&engine), records, options).await;

    // Column set: every property any record reported, in stable order.
    let mut columns: Vec<String> = Vec::new();
    for outcome in &outcomes {
        if let Ok(result) = &outcome.result {
            for property in result.properties() {
                if !columns.iter().any(|c| c == property) {
                    columns.push(property.to_string());
                }
            }
        }
    }
    columns.sort_unstable();

    let mut csv = String::new();
    csv.push_str("record,");
    csv.push_str(&columns.join(","));
    csv.push('\n');
    for outcome in &outcomes {
        csv.push_str(&outcome.index.to_string());
        match &outcome.result {
            Ok(result) => {
                for column in &columns {
                    csv.push(',');
                    csv.push_str(result.value(column).unwrap_or(""));
                }
            }
            Err(err) => {
                csv.push_str(&format!(",error: {err}"));
            }
        }
        csv.push('\n');
    }

    match &args.output {
        Some(path) => {
            std::fs::write(path, csv).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "results written");
        }
        None => {
            let stdout = std::io::stdout();
            stdout.lock().write_all(csv.as_bytes())?;
        }
    }

    info!(
        processed = report.processed,
        failed = report.failed,
        hash_code = report.hash_code,
        "batch finished"
    );
    engine.stop().await?;
    Ok(())
}

/// Repeated passes over an evidence file: throughput plus a determinism
/// check across iterations.
pub async fn bench(mut config: Config, args: BenchArgs) -> anyhow::Result<()> {
    config.update.auto_update = false;
    if let Some(workers) = args.workers {
        config.runtime.workers = workers;
    }
    let options = BatchOptions::from_config(&config.runtime);

    let text = std::fs::read_to_string(&args.evidence_file)
        .with_context(|| format!("reading {}", args.evidence_file.display()))?;
    let records = engine::records_from_yaml(&text)?;
    anyhow::ensure!(!records.is_empty(), "no evidence records found");

    let engine = Arc::new(DetectionEngine::from_config(config).await?);
    let started = Instant::now();
    let mut total = 0u64;
    let mut hash_codes = Vec::with_capacity(args.iterations as usize);

    for iteration in 0..args.iterations {
        let report = batch::run(Arc::clone(&engine), records.iter().cloned(), options).await;
        info!(
            iteration,
            processed = report.processed,
            hash_code = report.hash_code,
            "iteration finished"
        );
        total += report.processed + report.failed;
        hash_codes.push(report.hash_code);
    }

    // Every pass over identical records and identical data must hash the
    // same; anything else means records were lost or mixed.
    if let Some(first) = hash_codes.first()
        && hash_codes.iter().any(|code| code != first)
    {
        error!(?hash_codes, "hash codes differ between iterations");
        anyhow::bail!("iterations produced inconsistent results");
    }

    let elapsed = started.elapsed();
    let per_second = total as f64 / elapsed.as_secs_f64();
    info!(
        total,
        elapsed_ms = elapsed.as_millis() as u64,
        per_second = per_second as u64,
        "benchmark complete"
    );

    let stdout = std::io::stdout();
    writeln!(
        stdout.lock(),
        "{total} detections in {:.2}s ({per_second:.0}/s)",
        elapsed.as_secs_f64()
    )?;

    engine.stop().await?;
    Ok(())
}

/// Run with automatic updates until interrupted, reporting every check.
pub async fn watch(mut config: Config, args: WatchArgs) -> anyhow::Result<()> {
    config.update.auto_update = true;
    if args.update_on_start {
        config.update.update_on_start = true;
    }
    anyhow::ensure!(
        config.has_update_source(),
        "watch needs an update source: set update.url, a license, or update.file_watch"
    );

    let engine = DetectionEngine::from_config(config).await?;
    let mut updates = engine.updates();
    info!(
        generation = engine.current_generation(),
        "engine running, waiting for updates (ctrl-c to stop)"
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                match updates.borrow_and_update().clone() {
                    UpdateCheckResult::NoUpdate => info!("no update available"),
                    UpdateCheckResult::Applied { generation } => {
                        info!(generation, "update applied");
                    }
                    UpdateCheckResult::Failed { reason } => {
                        warn!(%reason, "update check failed");
                    }
                }
            }
        }
    }

    engine.stop().await?;
    Ok(())
}

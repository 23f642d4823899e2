#![forbid(unsafe_code)]

use engine::{
    DetectionEngine, Evidence, Origin, ResourceLoader, ResourceManager, Services, SwapOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;

fn data_with_marker(marker: &str) -> String {
    format!("uascope-data/1\nMozilla\tMarker={marker};IsMobile=True\n")
}

fn write_data(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn load(dir: &TempDir, name: &str, content: &str) -> engine::LoadedResource {
    let path = write_data(dir, name, content);
    ResourceLoader::new(&config::Data::default())
        .load_file(&path, Origin::File(path.clone()))
        .unwrap()
}

/// Readers racing a writer: every lookup observes one internally
/// consistent generation, and superseded generations stay alive while a
/// handle pins them.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_readers_see_single_generations() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(ResourceManager::new(load(&dir, "g1", &data_with_marker("A"))));
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let stop = Arc::clone(&stop);
            tokio::task::spawn_blocking(move || {
                let mut observations = Vec::new();
                while !stop.load(Ordering::Relaxed) {
                    let handle = manager.acquire();
                    let generation = handle.generation();
                    let values = handle.dataset().lookup("Mozilla/5.0").unwrap();
                    observations.push((generation, values.get("Marker").unwrap().clone()));
                }
                observations
            })
        })
        .collect();

    // Writer: alternate two data sets. Generation 1 carries marker A, so
    // even generations carry B and odd ones A.
    for i in 0..40u64 {
        let marker = if i % 2 == 0 { "B" } else { "A" };
        let candidate = load(&dir, &format!("swap-{i}"), &data_with_marker(marker));
        match manager.install(candidate) {
            SwapOutcome::Installed { generation, .. } => assert_eq!(generation, i + 2),
            SwapOutcome::Unchanged => panic!("alternating contents must always swap"),
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    stop.store(true, Ordering::Relaxed);

    for reader in readers {
        let observations = reader.await.unwrap();
        assert!(!observations.is_empty());
        for (generation, marker) in observations {
            let expected = if generation % 2 == 1 { "A" } else { "B" };
            assert_eq!(
                marker, expected,
                "generation {generation} reported marker {marker}"
            );
        }
    }

    assert_eq!(manager.outstanding(), 0);
    assert_eq!(manager.current_generation(), 41);
}

/// A handle taken before a swap keeps the superseded resource readable
/// until it is dropped; the drop releases the last reference.
#[tokio::test]
async fn superseded_generation_lives_until_released() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ResourceManager::new(load(&dir, "g1", &data_with_marker("A")));

    let held = manager.acquire();
    let previous = match manager.install(load(&dir, "g2", &data_with_marker("B"))) {
        SwapOutcome::Installed { previous, .. } => previous,
        SwapOutcome::Unchanged => panic!("expected swap"),
    };

    // Old generation still fully readable through the held handle.
    let values = held.dataset().lookup("Mozilla/5.0").unwrap();
    assert_eq!(values.get("Marker").map(String::as_str), Some("A"));
    assert_eq!(held.generation(), 1);

    assert!(Arc::strong_count(&previous) >= 2);
    drop(held);
    assert_eq!(Arc::strong_count(&previous), 1);
    assert_eq!(manager.outstanding(), 0);
}

/// Re-installing identical bytes is a no-op at every layer: no new
/// generation, no swap, no spurious release of the current resource.
#[tokio::test]
async fn repeated_identical_install_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ResourceManager::new(load(&dir, "g1", &data_with_marker("A")));

    for round in 0..3 {
        match manager.install(load(&dir, &format!("same-{round}"), &data_with_marker("A"))) {
            SwapOutcome::Unchanged => {}
            SwapOutcome::Installed { .. } => panic!("identical payload must not swap"),
        }
    }
    assert_eq!(manager.current_generation(), 1);
}

/// Engine-level variant of the stress: process() while the data file is
/// rewritten and manually reloaded. Every result is bound to exactly one
/// generation's marker.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn process_races_reloads_without_mixing_generations() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_data(&dir, "data.txt", &data_with_marker("A"));

    let mut config = config::Config::default();
    config.data.file = path.clone();
    config.update.auto_update = false;
    config.update.file_watch = true;

    let services = Services::from_config(&config);
    let engine = Arc::new(DetectionEngine::new(config, services).await.unwrap());
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..6)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let stop = Arc::clone(&stop);
            tokio::task::spawn_blocking(move || {
                let evidence = vec![Evidence::header("user-agent", "Mozilla/5.0 (iPhone)")];
                while !stop.load(Ordering::Relaxed) {
                    let result = engine.process(&evidence).unwrap();
                    let expected = if result.generation() % 2 == 1 { "A" } else { "B" };
                    assert_eq!(result.value("Marker"), Some(expected));
                }
            })
        })
        .collect();

    for i in 0..10u64 {
        let marker = if i % 2 == 0 { "B" } else { "A" };
        std::fs::write(&path, data_with_marker(marker)).unwrap();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(i + 1))
            .unwrap();
        engine.poll_now().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    stop.store(true, Ordering::Relaxed);

    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(engine.current_generation(), 11);
    engine.stop().await.unwrap();
}

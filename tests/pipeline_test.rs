//! End-to-end pipeline test: a real watcher, the built-in classifier, and
//! the record store wired together through `ScanPipeline`.

use std::io::Write as _;
use std::time::Duration;

use vigil::classifier::FingerprintClassifier;
use vigil::config::VigilConfig;
use vigil::ScanPipeline;

fn test_config(data_dir: &std::path::Path, watch_root: &std::path::Path) -> VigilConfig {
    let mut config = VigilConfig::load_or_create(data_dir).unwrap();
    config.monitor.roots = vec![watch_root.to_path_buf()];
    config.monitor.scan_delay_secs = 0;
    config.sync.enabled = false;
    config
}

/// Poll until `check` passes or the deadline expires.
async fn wait_for(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    check()
}

#[tokio::test]
async fn created_file_flows_to_the_record_store() {
    let data_dir = tempfile::tempdir().unwrap();
    let watch_root = tempfile::tempdir().unwrap();
    let config = test_config(data_dir.path(), watch_root.path());

    let pipeline = ScanPipeline::start(config, Box::new(FingerprintClassifier), None)
        .await
        .unwrap();

    let path = watch_root.path().join("dropped.bin");
    std::fs::File::create(&path)
        .unwrap()
        .write_all(b"fresh file contents")
        .unwrap();

    let store = pipeline.store().clone();
    let scanned = wait_for(Duration::from_secs(10), || {
        pipeline.stats().scans.files_scanned >= 1
    })
    .await;
    assert!(scanned, "watcher event should reach the scan worker");

    let mut counts = store.counts().await.unwrap();
    for _ in 0..50 {
        if counts.total >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        counts = store.counts().await.unwrap();
    }
    assert_eq!(counts.total, 1);
    assert_eq!(counts.pending, 1, "nothing synced with sync disabled");

    pipeline.stop().await;
}

#[tokio::test]
async fn whitelisted_directory_is_never_scanned() {
    let data_dir = tempfile::tempdir().unwrap();
    let watch_root = tempfile::tempdir().unwrap();
    let mut config = test_config(data_dir.path(), watch_root.path());
    config.monitor.whitelist_paths = vec![watch_root.path().to_path_buf()];

    let pipeline = ScanPipeline::start(config, Box::new(FingerprintClassifier), None)
        .await
        .unwrap();

    let path = watch_root.path().join("ignored.bin");
    std::fs::File::create(&path)
        .unwrap()
        .write_all(b"never scanned")
        .unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(pipeline.stats().scans.files_scanned, 0);
    assert_eq!(pipeline.store().counts().await.unwrap().total, 0);

    pipeline.stop().await;
}

#[tokio::test]
async fn stop_joins_all_loops() {
    let data_dir = tempfile::tempdir().unwrap();
    let watch_root = tempfile::tempdir().unwrap();
    let config = test_config(data_dir.path(), watch_root.path());

    let pipeline = ScanPipeline::start(config, Box::new(FingerprintClassifier), None)
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(10), pipeline.stop())
        .await
        .expect("shutdown must complete within the loops' poll granularity");
}

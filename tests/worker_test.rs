//! Scan worker behavior: dwell delay, dedup, detections, error handling,
//! shutdown.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{watch, Mutex};
use vigil::cache::SeenCache;
use vigil::classifier::{fingerprint_file, Classifier, ScanOutcome, Verdict};
use vigil::error::ClassifyError;
use vigil::queue::{ScanPriority, ScanQueue};
use vigil::store::RecordStore;
use vigil::worker::{ScanStats, ScanWorker};

/// Classifier that fingerprints for real but returns a scripted verdict,
/// counting invocations.
struct ScriptedClassifier {
    verdict: Verdict,
    fail: bool,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&mut self, path: &Path) -> Result<ScanOutcome, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ClassifyError::Inference("scripted failure".into()));
        }
        let fingerprint = fingerprint_file(path).map_err(|e| ClassifyError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(ScanOutcome {
            verdict: self.verdict,
            raw_scores: vec![0.5, 0.5],
            fingerprint,
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_size_bytes: 1,
            produced_at: Utc::now(),
            device_descriptor: "test".into(),
        })
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    queue: Arc<ScanQueue>,
    cache: Arc<SeenCache>,
    store: RecordStore,
    stats: Arc<ScanStats>,
    calls: Arc<AtomicU32>,
}

impl Fixture {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        Self {
            store: RecordStore::open(dir.path()).await.unwrap(),
            _dir: dir,
            root,
            queue: Arc::new(ScanQueue::new(64)),
            cache: Arc::new(SeenCache::new(100)),
            stats: Arc::new(ScanStats::default()),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    fn write_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.root.join(name);
        std::fs::File::create(&path).unwrap().write_all(contents).unwrap();
        path
    }

    fn spawn_worker(
        &self,
        verdict: Verdict,
        fail: bool,
        scan_delay: Duration,
        on_detection: Option<vigil::worker::DetectionHook>,
    ) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
        let classifier: Box<dyn Classifier> = Box::new(ScriptedClassifier {
            verdict,
            fail,
            calls: self.calls.clone(),
        });
        let worker = ScanWorker::new(
            self.queue.clone(),
            self.cache.clone(),
            self.store.clone(),
            Arc::new(Mutex::new(classifier)),
            on_detection,
            self.stats.clone(),
            scan_delay,
        );
        let (tx, rx) = watch::channel(false);
        let handle = worker.spawn(rx);
        (tx, handle)
    }
}

#[tokio::test]
async fn dwell_delay_is_enforced_before_classification() {
    let fx = Fixture::new().await;
    let file = fx.write_file("settle.bin", b"payload");
    let (tx, handle) = fx.spawn_worker(Verdict::Benign, false, Duration::from_millis(600), None);

    fx.queue.enqueue(file, ScanPriority::High);

    // Well inside the dwell window: no classification, no record.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(fx.calls.load(Ordering::SeqCst), 0, "must not scan before the dwell delay");
    assert_eq!(fx.store.counts().await.unwrap().total, 0);

    // Past the window: exactly one classification and one record.
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(fx.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fx.store.counts().await.unwrap().total, 1);
    assert_eq!(fx.stats.snapshot().files_scanned, 1);

    let _ = tx.send(true);
    handle.await.unwrap();
}

#[tokio::test]
async fn identical_content_under_two_paths_yields_one_record() {
    let fx = Fixture::new().await;
    let a = fx.write_file("copy-a.bin", b"same bytes");
    let b = fx.write_file("copy-b.bin", b"same bytes");
    let (tx, handle) = fx.spawn_worker(Verdict::Benign, false, Duration::ZERO, None);

    fx.queue.enqueue(a, ScanPriority::Normal);
    fx.queue.enqueue(b, ScanPriority::Normal);
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(fx.calls.load(Ordering::SeqCst), 2, "both paths are scanned");
    assert_eq!(fx.store.counts().await.unwrap().total, 1, "one record per content");
    let stats = fx.stats.snapshot();
    assert_eq!(stats.files_scanned, 2);
    assert_eq!(stats.duplicates, 1);

    let _ = tx.send(true);
    handle.await.unwrap();
}

#[tokio::test]
async fn malware_verdict_fires_detection_hook() {
    let fx = Fixture::new().await;
    let file = fx.write_file("evil.bin", b"malicious");
    let fired = Arc::new(AtomicBool::new(false));
    let fired2 = fired.clone();
    let hook: vigil::worker::DetectionHook = Arc::new(move |_path, outcome| {
        assert_eq!(outcome.verdict, Verdict::Malware);
        fired2.store(true, Ordering::SeqCst);
    });
    let (tx, handle) = fx.spawn_worker(Verdict::Malware, false, Duration::ZERO, Some(hook));

    fx.queue.enqueue(file, ScanPriority::High);
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(fired.load(Ordering::SeqCst));
    let stats = fx.stats.snapshot();
    assert_eq!(stats.malware_detected, 1);
    let pending = fx.store.list_pending(10).await.unwrap();
    assert_eq!(pending[0].label, "Malware");

    let _ = tx.send(true);
    handle.await.unwrap();
}

#[tokio::test]
async fn classifier_failure_skips_item_without_killing_the_loop() {
    let fx = Fixture::new().await;
    let first = fx.write_file("bad.bin", b"1");
    let (tx, handle) = fx.spawn_worker(Verdict::Benign, true, Duration::ZERO, None);

    fx.queue.enqueue(first, ScanPriority::Normal);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let stats = fx.stats.snapshot();
    assert_eq!(stats.scan_errors, 1);
    assert_eq!(stats.files_scanned, 0, "a failed scan is not a scanned file");
    assert_eq!(fx.store.counts().await.unwrap().total, 0, "no stored verdict on failure");

    // The loop is still alive: it keeps consuming the queue.
    let second = fx.write_file("bad2.bin", b"2");
    fx.queue.enqueue(second, ScanPriority::Normal);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(fx.stats.snapshot().scan_errors, 2);

    let _ = tx.send(true);
    handle.await.unwrap();
}

#[tokio::test]
async fn deleted_file_is_dropped_silently() {
    let fx = Fixture::new().await;
    let file = fx.write_file("fleeting.bin", b"gone soon");
    let (tx, handle) = fx.spawn_worker(Verdict::Benign, false, Duration::from_millis(300), None);

    fx.queue.enqueue(file.clone(), ScanPriority::High);
    // Delete during the dwell window.
    std::fs::remove_file(&file).unwrap();
    tokio::time::sleep(Duration::from_millis(800)).await;

    assert_eq!(fx.calls.load(Ordering::SeqCst), 0, "vanished file is never classified");
    assert_eq!(fx.store.counts().await.unwrap().total, 0);

    let _ = tx.send(true);
    handle.await.unwrap();
}

#[tokio::test]
async fn worker_joins_promptly_on_shutdown() {
    let fx = Fixture::new().await;
    let (tx, handle) = fx.spawn_worker(Verdict::Benign, false, Duration::from_secs(30), None);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let _ = tx.send(true);
    tokio::time::timeout(Duration::from_secs(3), handle)
        .await
        .expect("worker must observe shutdown within its poll granularity")
        .unwrap();
}

#[tokio::test]
async fn scanned_path_is_marked_seen() {
    let fx = Fixture::new().await;
    let file = fx.write_file("seen.bin", b"content");
    let (tx, handle) = fx.spawn_worker(Verdict::Benign, false, Duration::ZERO, None);

    fx.queue.enqueue(file.clone(), ScanPriority::High);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(fx.cache.seen(&file));

    let _ = tx.send(true);
    handle.await.unwrap();
}

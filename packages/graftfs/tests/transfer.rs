use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use graftfs::{
    Adapter, AdapterOptions, Bytes, Capabilities, FsError, FsManager, MemoryAdapter, Node,
    OperationEvent, OperationKind, OperationStatus, Result, VPath,
};
use tokio::sync::{broadcast, mpsc, Semaphore};
use uuid::Uuid;

/// Memory-backed adapter that rejects writes once a budget is spent.
struct FlakyWrites {
    inner: MemoryAdapter,
    budget: AtomicUsize,
}

impl FlakyWrites {
    fn new(budget: usize) -> Self {
        Self {
            inner: MemoryAdapter::new(),
            budget: AtomicUsize::new(budget),
        }
    }
}

#[async_trait]
impl Adapter for FlakyWrites {
    fn kind(&self) -> &'static str {
        "flaky"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    async fn read(&self, path: &VPath) -> Result<Bytes> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &VPath, data: Bytes) -> Result<()> {
        let left = self.budget.load(Ordering::SeqCst);
        if left == 0 {
            return Err(FsError::other("disk full"));
        }
        self.budget.store(left - 1, Ordering::SeqCst);
        self.inner.write(path, data).await
    }

    async fn stat(&self, path: &VPath) -> Result<Node> {
        self.inner.stat(path).await
    }

    async fn list(&self, path: &VPath) -> Result<Vec<Node>> {
        self.inner.list(path).await
    }

    async fn mkdir(&self, path: &VPath, recursive: bool) -> Result<()> {
        self.inner.mkdir(path, recursive).await
    }

    async fn remove(&self, path: &VPath, recursive: bool) -> Result<()> {
        self.inner.remove(path, recursive).await
    }
}

/// Memory-backed adapter whose writes park on a semaphore, and signal the
/// test when they do.
struct GatedWrites {
    inner: MemoryAdapter,
    entered: mpsc::UnboundedSender<()>,
    gate: Arc<Semaphore>,
}

#[async_trait]
impl Adapter for GatedWrites {
    fn kind(&self) -> &'static str {
        "gated"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    async fn read(&self, path: &VPath) -> Result<Bytes> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &VPath, data: Bytes) -> Result<()> {
        let _ = self.entered.send(());
        let permit = self.gate.acquire().await.unwrap();
        permit.forget();
        self.inner.write(path, data).await
    }

    async fn stat(&self, path: &VPath) -> Result<Node> {
        self.inner.stat(path).await
    }

    async fn list(&self, path: &VPath) -> Result<Vec<Node>> {
        self.inner.list(path).await
    }

    async fn mkdir(&self, path: &VPath, recursive: bool) -> Result<()> {
        self.inner.mkdir(path, recursive).await
    }

    async fn remove(&self, path: &VPath, recursive: bool) -> Result<()> {
        self.inner.remove(path, recursive).await
    }
}

/// Collect events for one operation until its terminal event arrives.
async fn events_until_terminal(
    rx: &mut broadcast::Receiver<OperationEvent>,
    id: Uuid,
) -> Vec<OperationEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("operation event feed went quiet")
            .unwrap();
        if event.operation().id != id {
            continue;
        }
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}

fn assert_progress_monotonic(events: &[OperationEvent]) {
    let mut last = 0;
    for event in events {
        let progress = event.operation().progress;
        assert!(
            progress >= last,
            "progress went backwards: {progress} after {last}"
        );
        last = progress;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_native_copy_within_one_mount() {
    let fs = FsManager::new();
    fs.write_file("/notes.txt", "keep both").await.unwrap();

    let mut events = fs.subscribe_operations();
    let op = fs.copy("/notes.txt", "/copy.txt").await.unwrap();
    assert_eq!(op.kind, OperationKind::Copy);
    assert_eq!(op.status, OperationStatus::Pending);

    let done = fs.wait(op.id).await.unwrap();
    assert_eq!(done.status, OperationStatus::Completed);
    assert_eq!(done.progress, 100);

    assert_eq!(&fs.read_file("/copy.txt").await.unwrap()[..], b"keep both");
    assert_eq!(&fs.read_file("/notes.txt").await.unwrap()[..], b"keep both");

    let seen = events_until_terminal(&mut events, op.id).await;
    assert_progress_monotonic(&seen);
    assert!(matches!(
        seen.last().unwrap(),
        OperationEvent::Completed { .. }
    ));
    assert_eq!(
        seen.iter().filter(|e| e.is_terminal()).count(),
        1,
        "exactly one terminal event"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_native_move_renames_in_place() {
    let fs = FsManager::new();
    fs.write_file("/old-name.txt", "contents").await.unwrap();

    let op = fs.move_path("/old-name.txt", "/new-name.txt").await.unwrap();
    assert_eq!(op.kind, OperationKind::Move);
    fs.wait(op.id).await.unwrap();

    assert!(!fs.exists("/old-name.txt").await.unwrap());
    assert_eq!(&fs.read_file("/new-name.txt").await.unwrap()[..], b"contents");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_streaming_copy_across_mounts() {
    let fs = FsManager::new();
    fs.mount("/src", "memory", AdapterOptions::new())
        .await
        .unwrap();
    fs.mount("/dst", "memory", AdapterOptions::new())
        .await
        .unwrap();

    fs.write_file("/src/docs/a.txt", "alpha").await.unwrap();
    fs.write_file("/src/docs/b.txt", "beta").await.unwrap();
    fs.write_file("/src/docs/sub/c.txt", "gamma").await.unwrap();

    let mut events = fs.subscribe_operations();
    let op = fs.copy("/src/docs", "/dst/docs").await.unwrap();
    fs.wait(op.id).await.unwrap();

    assert_eq!(&fs.read_file("/dst/docs/a.txt").await.unwrap()[..], b"alpha");
    assert_eq!(&fs.read_file("/dst/docs/b.txt").await.unwrap()[..], b"beta");
    assert_eq!(
        &fs.read_file("/dst/docs/sub/c.txt").await.unwrap()[..],
        b"gamma"
    );
    // Copy leaves the source alone.
    assert!(fs.exists("/src/docs/a.txt").await.unwrap());

    let seen = events_until_terminal(&mut events, op.id).await;
    assert_progress_monotonic(&seen);
    assert!(seen.len() > 2, "streaming copies report per-entry progress");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_streaming_move_removes_source() {
    let fs = FsManager::new();
    fs.mount("/src", "memory", AdapterOptions::new())
        .await
        .unwrap();
    fs.mount("/dst", "memory", AdapterOptions::new())
        .await
        .unwrap();
    fs.write_file("/src/tree/leaf.txt", "carry me").await.unwrap();

    let op = fs.move_path("/src/tree", "/dst/tree").await.unwrap();
    fs.wait(op.id).await.unwrap();

    assert_eq!(
        &fs.read_file("/dst/tree/leaf.txt").await.unwrap()[..],
        b"carry me"
    );
    assert!(!fs.exists("/src/tree").await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_copy_into_host_mount() {
    let dir = tempfile::tempdir().unwrap();
    let fs = FsManager::new();
    let mut options = AdapterOptions::new();
    options.insert("root".to_string(), dir.path().display().to_string());
    fs.mount("/disk", "host", options).await.unwrap();

    fs.write_file("/stage/one.txt", "1").await.unwrap();
    fs.write_file("/stage/nested/two.txt", "22").await.unwrap();

    let op = fs.copy("/stage", "/disk/stage").await.unwrap();
    fs.wait(op.id).await.unwrap();

    assert_eq!(
        std::fs::read_to_string(dir.path().join("stage/one.txt")).unwrap(),
        "1"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("stage/nested/two.txt")).unwrap(),
        "22"
    );
}

#[tokio::test]
async fn test_transfer_validation_rejects_bad_requests() {
    let fs = FsManager::new();
    fs.write_file("/dir/file.txt", "x").await.unwrap();

    // Missing source.
    assert!(matches!(
        fs.copy("/nope", "/elsewhere").await,
        Err(FsError::NotFound { .. })
    ));
    // Source and destination identical.
    assert!(matches!(
        fs.copy("/dir/file.txt", "/dir/file.txt").await,
        Err(FsError::InvalidPath { .. })
    ));
    // Destination nested inside the source.
    assert!(matches!(
        fs.copy("/dir", "/dir/inner").await,
        Err(FsError::InvalidPath { .. })
    ));
    // Destination parent does not exist.
    assert!(matches!(
        fs.copy("/dir/file.txt", "/missing/file.txt").await,
        Err(FsError::NotFound { .. })
    ));
    // Destination parent is a file.
    assert!(matches!(
        fs.copy("/dir", "/dir/file.txt/sub").await,
        Err(FsError::InvalidPath { .. } | FsError::NotADirectory { .. })
    ));
    // The namespace root is not a transfer destination.
    assert!(matches!(
        fs.copy("/dir", "/").await,
        Err(FsError::InvalidPath { .. })
    ));
}

#[tokio::test]
async fn test_moving_a_mount_point_is_rejected() {
    let fs = FsManager::new();
    fs.mount("/m", "memory", AdapterOptions::new()).await.unwrap();

    assert!(matches!(
        fs.move_path("/m", "/renamed").await,
        Err(FsError::InvalidPath { .. })
    ));
    // Copying out of a mount is fine.
    fs.write_file("/m/f.txt", "data").await.unwrap();
    let op = fs.copy("/m", "/taken").await.unwrap();
    fs.wait(op.id).await.unwrap();
    assert_eq!(&fs.read_file("/taken/f.txt").await.unwrap()[..], b"data");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_partial_failure_reports_what_succeeded() {
    let fs = FsManager::new();
    fs.write_file("/data/a.txt", "a").await.unwrap();
    fs.write_file("/data/b.txt", "b").await.unwrap();
    fs.write_file("/data/c.txt", "c").await.unwrap();

    fs.mount_adapter("/flaky", Arc::new(FlakyWrites::new(2)), AdapterOptions::new())
        .await
        .unwrap();

    let op = fs.copy("/data", "/flaky/data").await.unwrap();
    let err = fs.wait(op.id).await.unwrap_err();

    match err {
        FsError::OperationFailed { message, succeeded } => {
            assert!(message.contains("disk full"), "unexpected message: {message}");
            assert_eq!(
                succeeded
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>(),
                vec!["/flaky/data", "/flaky/data/a.txt", "/flaky/data/b.txt"]
            );
        }
        other => panic!("expected OperationFailed, got {other:?}"),
    }

    // Nothing was rolled back, and the source is untouched.
    assert!(fs.exists("/flaky/data/a.txt").await.unwrap());
    assert!(!fs.exists("/flaky/data/c.txt").await.unwrap());
    assert!(fs.exists("/data/c.txt").await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_move_keeps_the_source() {
    let fs = FsManager::new();
    fs.write_file("/keep/one.txt", "1").await.unwrap();
    fs.write_file("/keep/two.txt", "2").await.unwrap();

    fs.mount_adapter("/flaky", Arc::new(FlakyWrites::new(1)), AdapterOptions::new())
        .await
        .unwrap();

    let op = fs.move_path("/keep", "/flaky/keep").await.unwrap();
    let err = fs.wait(op.id).await.unwrap_err();
    assert!(matches!(err, FsError::OperationFailed { .. }));

    assert!(fs.exists("/keep/one.txt").await.unwrap());
    assert!(fs.exists("/keep/two.txt").await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unmounting_source_fails_transfer_in_flight() {
    let fs = FsManager::new();
    fs.mount("/src", "memory", AdapterOptions::new())
        .await
        .unwrap();
    fs.write_file("/src/one.txt", "1").await.unwrap();
    fs.write_file("/src/two.txt", "2").await.unwrap();

    let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
    let gate = Arc::new(Semaphore::new(0));
    let dest = GatedWrites {
        inner: MemoryAdapter::new(),
        entered: entered_tx,
        gate: Arc::clone(&gate),
    };
    fs.mount_adapter("/dst", Arc::new(dest), AdapterOptions::new())
        .await
        .unwrap();

    let op = fs.copy("/src", "/dst/src").await.unwrap();

    // The engine is parked inside the first file write. Pull the source
    // mount out from under it, then let the write finish.
    entered_rx.recv().await.unwrap();
    fs.unmount("/src").unwrap();
    gate.add_permits(10);

    let err = fs.wait(op.id).await.unwrap_err();
    match err {
        FsError::OperationFailed { message, succeeded } => {
            assert!(
                message.contains("no longer available"),
                "unexpected message: {message}"
            );
            assert_eq!(
                succeeded
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>(),
                vec!["/dst/src", "/dst/src/one.txt"]
            );
        }
        other => panic!("expected OperationFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_operation_records_stay_queryable() {
    let fs = FsManager::new();
    fs.write_file("/f.txt", "x").await.unwrap();

    let op = fs.copy("/f.txt", "/g.txt").await.unwrap();
    assert!(fs.operation(op.id).is_some());

    let done = fs.wait(op.id).await.unwrap();
    let snapshot = fs.operation(op.id).unwrap();
    assert_eq!(snapshot.status, OperationStatus::Completed);
    assert_eq!(snapshot.progress, done.progress);
}

#[tokio::test]
async fn test_waiting_on_an_unknown_operation_errors() {
    let fs = FsManager::new();
    assert!(fs.wait(Uuid::new_v4()).await.is_err());
}

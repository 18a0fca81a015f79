//! Tracked asynchronous copy and move operations.
//!
//! `copy` and `move_path` return a pending [`Operation`] immediately; the
//! transfer runs on the tokio runtime and reports through a broadcast feed.
//! Records of finished operations stay queryable until the retention window
//! elapses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use graftfs_core::{
    FsError, Node, Operation, OperationEvent, OperationKind, OperationStatus, Resolved, Result,
    VPath,
};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Tracker record: the public snapshot plus the destinations written so far,
/// kept so a late [`outcome`](OperationTracker::outcome) call can still report
/// partial results.
struct Tracked {
    operation: Operation,
    succeeded: Vec<VPath>,
}

/// Table of live and recently finished operations, shared between the manager
/// and the transfer tasks.
#[derive(Clone)]
pub(crate) struct OperationTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    table: Mutex<HashMap<Uuid, Tracked>>,
    events: broadcast::Sender<OperationEvent>,
    retention: Duration,
}

impl OperationTracker {
    pub(crate) fn new(channel_capacity: usize, retention: Duration) -> Self {
        // broadcast::channel panics on a zero capacity.
        let (events, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            inner: Arc::new(TrackerInner {
                table: Mutex::new(HashMap::new()),
                events,
                retention,
            }),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<Uuid, Tracked>> {
        self.inner
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<OperationEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn get(&self, id: Uuid) -> Option<Operation> {
        self.table().get(&id).map(|t| t.operation.clone())
    }

    /// Register a fresh pending operation and return its snapshot.
    pub(crate) fn begin(
        &self,
        kind: OperationKind,
        source: VPath,
        destination: VPath,
    ) -> Operation {
        let operation = Operation::new(kind, source, destination);
        self.table().insert(
            operation.id,
            Tracked {
                operation: operation.clone(),
                succeeded: Vec::new(),
            },
        );
        operation
    }

    /// Outcome of an operation: `None` while it is still running, the result
    /// once it reached a terminal status. An unknown id (never started, or
    /// already purged) reports as an error.
    pub(crate) fn outcome(&self, id: Uuid) -> Option<Result<Operation>> {
        let table = self.table();
        let Some(tracked) = table.get(&id) else {
            return Some(Err(FsError::other(format!("unknown operation '{id}'"))));
        };
        match tracked.operation.status {
            OperationStatus::Completed => Some(Ok(tracked.operation.clone())),
            OperationStatus::Failed | OperationStatus::Cancelled => {
                Some(Err(FsError::OperationFailed {
                    message: tracked.operation.error.clone().unwrap_or_default(),
                    succeeded: tracked.succeeded.clone(),
                }))
            }
            OperationStatus::Pending | OperationStatus::Running => None,
        }
    }

    /// Advance progress. The published value never decreases, and nothing is
    /// published once the operation reached a terminal status. Events are sent
    /// while holding the table lock so the feed order matches the state order.
    fn progress(&self, id: Uuid, progress: u8) {
        let mut table = self.table();
        let Some(tracked) = table.get_mut(&id) else {
            return;
        };
        if tracked.operation.is_terminal() {
            return;
        }
        tracked.operation.status = OperationStatus::Running;
        tracked.operation.progress = tracked.operation.progress.max(progress.min(100));
        let _ = self.inner.events.send(OperationEvent::Progress {
            operation: tracked.operation.clone(),
        });
    }

    fn complete(&self, id: Uuid) {
        {
            let mut table = self.table();
            let Some(tracked) = table.get_mut(&id) else {
                return;
            };
            if tracked.operation.is_terminal() {
                return;
            }
            tracked.operation.status = OperationStatus::Completed;
            tracked.operation.progress = 100;
            let _ = self.inner.events.send(OperationEvent::Completed {
                operation: tracked.operation.clone(),
            });
        }
        self.schedule_purge(id);
    }

    fn fail(&self, id: Uuid, message: String, succeeded: Vec<VPath>) {
        {
            let mut table = self.table();
            let Some(tracked) = table.get_mut(&id) else {
                return;
            };
            if tracked.operation.is_terminal() {
                return;
            }
            tracked.operation.status = OperationStatus::Failed;
            tracked.operation.error = Some(message);
            tracked.succeeded = succeeded.clone();
            let _ = self.inner.events.send(OperationEvent::Failed {
                operation: tracked.operation.clone(),
                succeeded,
            });
        }
        self.schedule_purge(id);
    }

    fn schedule_purge(&self, id: Uuid) {
        let tracker = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(tracker.inner.retention).await;
            tracker.table().remove(&id);
        });
    }
}

/// Mid-transfer failure: the cause plus the destinations already written.
struct Interrupted {
    error: FsError,
    succeeded: Vec<VPath>,
}

impl From<FsError> for Interrupted {
    fn from(error: FsError) -> Self {
        Self {
            error,
            succeeded: Vec::new(),
        }
    }
}

/// Run a registered operation in the background.
///
/// The transfer works on the mount pair resolved when the operation was
/// requested. Unmounting either side mid-flight fails the operation with
/// `AdapterUnavailable` on its next adapter access.
pub(crate) fn spawn_transfer(
    tracker: OperationTracker,
    operation: Operation,
    source: Resolved,
    destination: Resolved,
) {
    tokio::spawn(async move {
        let id = operation.id;
        debug!(
            operation = %id,
            kind = ?operation.kind,
            source = %operation.source,
            destination = %operation.destination,
            "transfer started"
        );
        match run(&tracker, &operation, &source, &destination).await {
            Ok(()) => {
                debug!(operation = %id, "transfer completed");
                tracker.complete(id);
            }
            Err(stop) => {
                debug!(operation = %id, error = %stop.error, "transfer failed");
                tracker.fail(id, stop.error.to_string(), stop.succeeded);
            }
        }
    });
}

async fn run(
    tracker: &OperationTracker,
    op: &Operation,
    source: &Resolved,
    destination: &Resolved,
) -> std::result::Result<(), Interrupted> {
    tracker.progress(op.id, 0);

    // Both endpoints on one adapter with a native implementation: delegate
    // in one shot instead of streaming entry by entry.
    if Arc::ptr_eq(&source.mount, &destination.mount) {
        let capabilities = source.mount.adapter().capabilities();
        let native = match op.kind {
            OperationKind::Copy => capabilities.copy,
            OperationKind::Move => capabilities.rename,
        };
        if native {
            delegate(source, destination, op.kind).await?;
            return Ok(());
        }
    }

    stream(tracker, op, source, destination).await
}

async fn delegate(source: &Resolved, destination: &Resolved, kind: OperationKind) -> Result<()> {
    source.mount.ensure_attached()?;
    let adapter = source.mount.adapter();
    let result = match kind {
        OperationKind::Copy => adapter.copy(&source.rest, &destination.rest).await,
        OperationKind::Move => adapter.rename(&source.rest, &destination.rest).await,
    };
    result.map_err(|e| e.with_base(source.mount.path()))
}

/// Entry-by-entry transfer between arbitrary adapters: directories are
/// recreated, files are read whole and written whole. Progress counts
/// entries against the pre-counted total.
async fn stream(
    tracker: &OperationTracker,
    op: &Operation,
    source: &Resolved,
    destination: &Resolved,
) -> std::result::Result<(), Interrupted> {
    let entries = collect(source).await?;
    let total = entries.len() + usize::from(op.kind == OperationKind::Move);

    let mut succeeded: Vec<VPath> = Vec::new();
    for (done, entry) in entries.iter().enumerate() {
        let rel = entry.path.strip_prefix(&source.rest).unwrap_or_default();
        let target = destination.rest.join(&rel);
        let virtual_target = destination.mount.path().join(&target);

        if let Err(error) = copy_entry(source, destination, entry, &target).await {
            return Err(Interrupted { error, succeeded });
        }
        succeeded.push(virtual_target);
        tracker.progress(op.id, entry_progress(done + 1, total));
    }

    if op.kind == OperationKind::Move {
        if let Err(error) = remove_source(source).await {
            return Err(Interrupted { error, succeeded });
        }
    }
    Ok(())
}

/// Walk the source subtree in preorder, parents before children.
async fn collect(source: &Resolved) -> Result<Vec<Node>> {
    source.mount.ensure_attached()?;
    let adapter = source.mount.adapter();
    let root = adapter
        .stat(&source.rest)
        .await
        .map_err(|e| e.with_base(source.mount.path()))?;

    let mut entries = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let path = node.path.clone();
        let is_dir = node.kind.is_dir();
        entries.push(node);
        if is_dir {
            source.mount.ensure_attached()?;
            let mut children = adapter
                .list(&path)
                .await
                .map_err(|e| e.with_base(source.mount.path()))?;
            // Listings are sorted; reversed here so the stack pops them back
            // in order.
            children.reverse();
            stack.extend(children);
        }
    }
    Ok(entries)
}

async fn copy_entry(
    source: &Resolved,
    destination: &Resolved,
    entry: &Node,
    target: &VPath,
) -> Result<()> {
    destination.mount.ensure_attached()?;
    if entry.kind.is_dir() {
        // Parents were created in an earlier iteration; the root's parent
        // was validated before the operation was registered.
        return destination
            .mount
            .adapter()
            .mkdir(target, false)
            .await
            .map_err(|e| e.with_base(destination.mount.path()));
    }
    source.mount.ensure_attached()?;
    let data = source
        .mount
        .adapter()
        .read(&entry.path)
        .await
        .map_err(|e| e.with_base(source.mount.path()))?;
    destination
        .mount
        .adapter()
        .write(target, data)
        .await
        .map_err(|e| e.with_base(destination.mount.path()))
}

async fn remove_source(source: &Resolved) -> Result<()> {
    source.mount.ensure_attached()?;
    source
        .mount
        .adapter()
        .remove(&source.rest, true)
        .await
        .map_err(|e| e.with_base(source.mount.path()))
}

fn entry_progress(done: usize, total: usize) -> u8 {
    ((done * 100) / total.max(1)) as u8
}

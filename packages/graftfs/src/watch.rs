//! Change notification for namespace paths.
//!
//! A [`Watcher`] delivers [`WatchEvent`]s for the subtree at one path. Mounts
//! whose adapter has a native change feed get per-write events forwarded and
//! re-based; everything else is observed by periodic snapshot diffing.
//! Callbacks run on their own task, fed through an unbounded channel, so an
//! event producer never blocks on user code.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use graftfs_core::{Node, Resolved, Result, VPath, WatchEvent};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::manager::FsManager;

pub(crate) type WatchCallback = Box<dyn Fn(WatchEvent) + Send>;

/// Builds watchers, picking the native or polling strategy per mount.
pub(crate) struct WatchBus {
    poll_interval: Duration,
}

impl WatchBus {
    pub(crate) fn new(poll_interval: Duration) -> Self {
        // tokio's interval panics on a zero period.
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub(crate) async fn attach(
        &self,
        manager: &FsManager,
        path: VPath,
        callback: WatchCallback,
    ) -> Result<Watcher> {
        let resolved = manager.resolve_attached(&path)?;
        let native = resolved
            .mount
            .adapter()
            .capabilities()
            .watch
            .then(|| resolved.mount.adapter().subscribe())
            .flatten();

        let closed = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();

        let id = Uuid::new_v4();
        let producer = match native {
            Some(events) => {
                debug!(watcher = %id, path = %path, "native watch attached");
                forward_native(resolved, events, tx)
            }
            None => {
                // Baseline before returning, so everything that changes
                // after this call is a diff against the state at this call.
                let baseline = Snapshot::take(manager, &path).await;
                debug!(watcher = %id, path = %path, "polling watch attached");
                poll_changes(manager.clone(), path.clone(), self.poll_interval, baseline, tx)
            }
        };
        let delivery = deliver(rx, Arc::clone(&closed), callback);

        Ok(Watcher {
            id,
            path,
            closed,
            producer,
            delivery,
        })
    }
}

/// Live subscription to changes at a namespace path.
///
/// Dropping the watcher closes it.
#[derive(Debug)]
pub struct Watcher {
    id: Uuid,
    path: VPath,
    closed: Arc<AtomicBool>,
    producer: JoinHandle<()>,
    delivery: JoinHandle<()>,
}

impl Watcher {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The watched path, normalized.
    pub fn path(&self) -> &VPath {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop the watcher. Idempotent; once the first call returns, no new
    /// callback invocation begins.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.producer.abort();
        self.delivery.abort();
        debug!(watcher = %self.id, path = %self.path, "watcher closed");
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Forward events from an adapter's native feed, keeping those inside the
/// watched subtree and re-basing their paths onto the namespace.
fn forward_native(
    resolved: Resolved,
    mut events: broadcast::Receiver<WatchEvent>,
    tx: mpsc::UnboundedSender<WatchEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if !resolved.mount.is_attached() {
                        break;
                    }
                    if !event.path.starts_with(&resolved.rest) {
                        continue;
                    }
                    if tx.send(event.rebased(resolved.mount.path())).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "native watch feed lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Snapshot the path every interval and emit the differences.
fn poll_changes(
    manager: FsManager,
    path: VPath,
    interval: Duration,
    baseline: Snapshot,
    tx: mpsc::UnboundedSender<WatchEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut previous = baseline;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of an interval completes immediately; the baseline
        // already covers it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let current = Snapshot::take(&manager, &path).await;
            for event in current.diff(&previous, &path) {
                if tx.send(event).is_err() {
                    return;
                }
            }
            previous = current;
        }
    })
}

/// Run the user callback for each queued event until the gate closes.
fn deliver(
    mut rx: mpsc::UnboundedReceiver<WatchEvent>,
    closed: Arc<AtomicBool>,
    callback: WatchCallback,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if closed.load(Ordering::SeqCst) {
                break;
            }
            callback(event);
        }
    })
}

/// What a polling watcher saw at a path: the entry itself plus one level of
/// children.
#[derive(Default)]
struct Snapshot {
    node: Option<Node>,
    children: BTreeMap<String, Node>,
}

impl Snapshot {
    /// Observe through the manager, so mounts grafted or removed between
    /// ticks are picked up. Unreadable state observes as absent.
    async fn take(manager: &FsManager, path: &VPath) -> Snapshot {
        let Ok(node) = manager.stat_path(path).await else {
            return Snapshot::default();
        };
        let mut children = BTreeMap::new();
        if node.kind.is_dir() {
            if let Ok(listed) = manager.read_dir_path(path).await {
                for child in listed {
                    children.insert(child.name.clone(), child);
                }
            }
        }
        Snapshot {
            node: Some(node),
            children,
        }
    }

    /// Changes from `previous` to `self`: the watched entry first, then its
    /// children in name order.
    fn diff(&self, previous: &Snapshot, path: &VPath) -> Vec<WatchEvent> {
        let mut events = Vec::new();
        match (&previous.node, &self.node) {
            (None, Some(_)) => events.push(WatchEvent::created(path.clone())),
            (Some(_), None) => events.push(WatchEvent::deleted(path.clone())),
            (Some(before), Some(now)) => {
                if before.kind != now.kind {
                    events.push(WatchEvent::deleted(path.clone()));
                    events.push(WatchEvent::created(path.clone()));
                } else if now.kind.is_file()
                    && (before.modified != now.modified || before.size != now.size)
                {
                    events.push(WatchEvent::modified(path.clone()));
                }
            }
            (None, None) => {}
        }
        for (name, child) in &self.children {
            match previous.children.get(name) {
                None => events.push(WatchEvent::created(child.path.clone())),
                Some(old) if old.kind != child.kind => {
                    events.push(WatchEvent::deleted(child.path.clone()));
                    events.push(WatchEvent::created(child.path.clone()));
                }
                Some(old) if old.modified != child.modified || old.size != child.size => {
                    events.push(WatchEvent::modified(child.path.clone()));
                }
                Some(_) => {}
            }
        }
        for (name, old) in &previous.children {
            if !self.children.contains_key(name) {
                events.push(WatchEvent::deleted(old.path.clone()));
            }
        }
        events
    }
}

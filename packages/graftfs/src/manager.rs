//! The filesystem manager: one namespace, many adapters.
//!
//! [`FsManager`] owns the mount table, the adapter registry, the operation
//! tracker and the watch machinery. Every call takes a raw path string,
//! normalizes it, resolves the owning mount by longest prefix and delegates
//! to that mount's adapter with the adapter-relative remainder. Nodes and
//! errors coming back are re-based onto the virtual namespace before callers
//! see them.

use std::collections::BTreeMap;
use std::sync::Arc;

use graftfs_core::{
    Adapter, AdapterFactory, AdapterOptions, Bytes, FsError, Mount, MountTable, Node, Operation,
    OperationEvent, OperationKind, Resolved, Result, VPath, WatchEvent,
};
use graftfs_host::HostAdapterFactory;
use graftfs_memory::{MemoryAdapter, MemoryAdapterFactory};
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::config::FsConfig;
use crate::ops::{self, OperationTracker};
use crate::registry::AdapterRegistry;
use crate::search;
use crate::watch::{WatchBus, Watcher};

/// A path-addressed virtual filesystem.
///
/// The namespace is rooted in an in-memory adapter; other backends are
/// grafted in with [`mount`](FsManager::mount) and taken out again with
/// [`unmount`](FsManager::unmount). Cloning is cheap and every clone works
/// on the same namespace.
///
/// # Examples
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> graftfs::Result<()> {
/// use graftfs::FsManager;
///
/// let fs = FsManager::new();
/// fs.mkdir("/notes", false).await?;
/// fs.write_file("/notes/today.txt", "stand-up at ten").await?;
///
/// let text = fs.read_file("/notes/today.txt").await?;
/// assert_eq!(&text[..], b"stand-up at ten");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FsManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: FsConfig,
    mounts: MountTable,
    registry: AdapterRegistry,
    operations: OperationTracker,
    watches: WatchBus,
}

impl FsManager {
    /// Manager with the default configuration.
    pub fn new() -> Self {
        Self::with_config(FsConfig::default())
    }

    pub fn with_config(config: FsConfig) -> Self {
        let registry = AdapterRegistry::new();
        // A fresh registry cannot already hold the built-in kinds.
        let _ = registry.register(Arc::new(MemoryAdapterFactory));
        let _ = registry.register(Arc::new(HostAdapterFactory));

        let operations = OperationTracker::new(
            config.operation_channel_capacity,
            config.operation_retention,
        );
        let watches = WatchBus::new(config.watch_poll_interval);
        Self {
            inner: Arc::new(ManagerInner {
                mounts: MountTable::new(Arc::new(MemoryAdapter::new())),
                registry,
                operations,
                watches,
                config,
            }),
        }
    }

    pub fn config(&self) -> &FsConfig {
        &self.inner.config
    }

    /// Normalize a raw path into its canonical string form.
    pub fn normalize_path(&self, path: &str) -> Result<String> {
        Ok(VPath::parse(path)?.to_string())
    }

    // ----- file and directory operations -------------------------------

    pub async fn read_file(&self, path: &str) -> Result<Bytes> {
        self.read_path(&VPath::parse(path)?).await
    }

    pub async fn write_file(&self, path: &str, contents: impl Into<Bytes>) -> Result<()> {
        self.write_path(&VPath::parse(path)?, contents.into()).await
    }

    pub async fn stat(&self, path: &str) -> Result<Node> {
        self.stat_path(&VPath::parse(path)?).await
    }

    /// Whether an entry exists at the path. Malformed input is still an
    /// error; only a clean miss reports `false`.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        let path = VPath::parse(path)?;
        let resolved = self.resolve_attached(&path)?;
        resolved
            .mount
            .adapter()
            .exists(&resolved.rest)
            .await
            .map_err(|e| e.with_base(resolved.mount.path()))
    }

    pub async fn read_dir(&self, path: &str) -> Result<Vec<Node>> {
        self.read_dir_path(&VPath::parse(path)?).await
    }

    pub async fn mkdir(&self, path: &str, recursive: bool) -> Result<()> {
        let path = VPath::parse(path)?;
        let resolved = self.resolve_attached(&path)?;
        resolved
            .mount
            .adapter()
            .mkdir(&resolved.rest, recursive)
            .await
            .map_err(|e| e.with_base(resolved.mount.path()))
    }

    /// Remove the entry at the path. Mount points cannot be removed this
    /// way; they are namespace bindings, not entries.
    pub async fn remove(&self, path: &str, recursive: bool) -> Result<()> {
        let path = VPath::parse(path)?;
        if self.inner.mounts.is_mount_point(&path) {
            return Err(FsError::invalid_path(
                path.to_string(),
                "path is a mount point; unmount it instead",
            ));
        }
        let resolved = self.resolve_attached(&path)?;
        resolved
            .mount
            .adapter()
            .remove(&resolved.rest, recursive)
            .await
            .map_err(|e| e.with_base(resolved.mount.path()))
    }

    // ----- mounts ------------------------------------------------------

    /// Build an adapter of the registered `kind` and graft it at `path`.
    ///
    /// Anything already mounted at exactly that path is replaced and
    /// detached. The subtree the adapter serves shadows whatever the
    /// underlying adapter had at that prefix, and comes back when the
    /// mount is removed.
    pub async fn mount(
        &self,
        path: &str,
        kind: &str,
        options: AdapterOptions,
    ) -> Result<Arc<Mount>> {
        let adapter = self.inner.registry.create(kind, &options)?;
        self.mount_adapter(path, adapter, options).await
    }

    /// Graft a pre-built adapter instance at `path`.
    pub async fn mount_adapter(
        &self,
        path: &str,
        adapter: Arc<dyn Adapter>,
        options: AdapterOptions,
    ) -> Result<Arc<Mount>> {
        let path = VPath::parse(path)?;
        if let Some(parent) = path.parent() {
            // A missing parent is fine (the mount is reachable by direct
            // path); a parent that is a file is not a place to hang one.
            match self.stat_path(&parent).await {
                Ok(node) if node.kind.is_file() => {
                    return Err(FsError::not_a_directory(&parent));
                }
                Err(err @ FsError::NotADirectory { .. }) => return Err(err),
                _ => {}
            }
        }
        let mount = self.inner.mounts.mount(path, adapter, options);
        info!(path = %mount.path(), kind = mount.adapter().kind(), "adapter mounted");
        Ok(mount)
    }

    /// Remove the mount at exactly `path` and detach its adapter.
    /// Operations and watchers still holding the mount observe
    /// `AdapterUnavailable` on their next access.
    pub fn unmount(&self, path: &str) -> Result<()> {
        let path = VPath::parse(path)?;
        let mount = self.inner.mounts.unmount(&path)?;
        info!(path = %mount.path(), kind = mount.adapter().kind(), "adapter unmounted");
        Ok(())
    }

    /// All current mounts, sorted by path. The implicit root mount is
    /// included.
    pub fn list_mounts(&self) -> Vec<Arc<Mount>> {
        self.inner.mounts.list()
    }

    /// Register an additional adapter factory. `memory` and `host` are
    /// registered out of the box.
    pub fn register_adapter(&self, factory: Arc<dyn AdapterFactory>) -> Result<()> {
        self.inner.registry.register(factory)
    }

    pub fn get_adapter(&self, kind: &str) -> Option<Arc<dyn AdapterFactory>> {
        self.inner.registry.get(kind)
    }

    pub fn adapter_kinds(&self) -> Vec<&'static str> {
        self.inner.registry.kinds()
    }

    // ----- transfers ---------------------------------------------------

    /// Start copying `source` to `destination` and return the pending
    /// operation. Progress and the terminal outcome arrive on the
    /// operation feed; [`wait`](FsManager::wait) awaits them.
    pub async fn copy(&self, source: &str, destination: &str) -> Result<Operation> {
        self.transfer(OperationKind::Copy, source, destination)
            .await
    }

    /// Start moving `source` to `destination`. Without a native rename the
    /// move copies and then removes the source; the source stays intact if
    /// any part of the copy fails.
    pub async fn move_path(&self, source: &str, destination: &str) -> Result<Operation> {
        self.transfer(OperationKind::Move, source, destination)
            .await
    }

    async fn transfer(
        &self,
        kind: OperationKind,
        source: &str,
        destination: &str,
    ) -> Result<Operation> {
        let source = VPath::parse(source)?;
        let destination = VPath::parse(destination)?;

        self.stat_path(&source).await?;
        if destination == source {
            return Err(FsError::invalid_path(
                destination.to_string(),
                "source and destination are the same path",
            ));
        }
        if destination.starts_with(&source) {
            return Err(FsError::invalid_path(
                destination.to_string(),
                "destination is inside the source",
            ));
        }
        let Some(parent) = destination.parent() else {
            return Err(FsError::invalid_path(
                destination.to_string(),
                "destination is the namespace root",
            ));
        };
        let parent_node = self.stat_path(&parent).await?;
        if parent_node.kind.is_file() {
            return Err(FsError::not_a_directory(&parent));
        }
        if kind == OperationKind::Move && self.inner.mounts.is_mount_point(&source) {
            return Err(FsError::invalid_path(
                source.to_string(),
                "cannot move a mount point; unmount it instead",
            ));
        }

        let src = self.resolve_attached(&source)?;
        let dst = self.resolve_attached(&destination)?;
        let operation = self.inner.operations.begin(kind, source, destination);
        ops::spawn_transfer(self.inner.operations.clone(), operation.clone(), src, dst);
        Ok(operation)
    }

    /// Subscribe to progress and terminal events of all operations.
    pub fn subscribe_operations(&self) -> broadcast::Receiver<OperationEvent> {
        self.inner.operations.subscribe()
    }

    /// Snapshot of a tracked operation, until its record is purged.
    pub fn operation(&self, id: Uuid) -> Option<Operation> {
        self.inner.operations.get(id)
    }

    /// Wait for an operation to finish. A failed operation reports
    /// [`FsError::OperationFailed`] carrying the destinations that were
    /// written before the failure.
    pub async fn wait(&self, id: Uuid) -> Result<Operation> {
        let mut rx = self.inner.operations.subscribe();
        // Snapshot after subscribing, so a terminal transition cannot slip
        // between the check and the first recv.
        if let Some(outcome) = self.inner.operations.outcome(id) {
            return outcome;
        }
        loop {
            match rx.recv().await {
                Ok(OperationEvent::Completed { operation }) if operation.id == id => {
                    return Ok(operation);
                }
                Ok(OperationEvent::Failed {
                    operation,
                    succeeded,
                }) if operation.id == id => {
                    return Err(FsError::OperationFailed {
                        message: operation.error.unwrap_or_default(),
                        succeeded,
                    });
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    if let Some(outcome) = self.inner.operations.outcome(id) {
                        return outcome;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(FsError::other("operation event feed closed"));
                }
            }
        }
    }

    // ----- watch and search --------------------------------------------

    /// Watch the subtree at `path`, invoking `callback` for every change.
    ///
    /// Adapters with a native change feed deliver per-write events; other
    /// mounts are polled. The watcher stops on [`Watcher::close`] or drop.
    pub async fn watch<F>(&self, path: &str, callback: F) -> Result<Watcher>
    where
        F: Fn(WatchEvent) + Send + 'static,
    {
        let path = VPath::parse(path)?;
        self.stat_path(&path).await?;
        self.inner
            .watches
            .attach(self, path, Box::new(callback))
            .await
    }

    /// Case-insensitive name search under `base`, capped at the configured
    /// result limit.
    pub async fn search(&self, query: &str, base: &str) -> Result<Vec<Node>> {
        let base = VPath::parse(base)?;
        search::run(self, query, &base, self.inner.config.search_limit).await
    }

    // ----- internal plumbing -------------------------------------------

    pub(crate) fn resolve_attached(&self, path: &VPath) -> Result<Resolved> {
        self.inner.mounts.resolve_attached(path)
    }

    pub(crate) async fn read_path(&self, path: &VPath) -> Result<Bytes> {
        let resolved = self.resolve_attached(path)?;
        resolved
            .mount
            .adapter()
            .read(&resolved.rest)
            .await
            .map_err(|e| e.with_base(resolved.mount.path()))
    }

    pub(crate) async fn write_path(&self, path: &VPath, data: Bytes) -> Result<()> {
        let resolved = self.resolve_attached(path)?;
        resolved
            .mount
            .adapter()
            .write(&resolved.rest, data)
            .await
            .map_err(|e| e.with_base(resolved.mount.path()))
    }

    pub(crate) async fn stat_path(&self, path: &VPath) -> Result<Node> {
        let resolved = self.resolve_attached(path)?;
        resolved
            .mount
            .adapter()
            .stat(&resolved.rest)
            .await
            .map(|node| node.rebased(resolved.mount.path()))
            .map_err(|e| e.with_base(resolved.mount.path()))
    }

    /// List a directory and merge in mount points grafted directly under
    /// it. A mount shadows an adapter entry of the same name.
    pub(crate) async fn read_dir_path(&self, path: &VPath) -> Result<Vec<Node>> {
        let resolved = self.resolve_attached(path)?;
        let listed = resolved
            .mount
            .adapter()
            .list(&resolved.rest)
            .await
            .map_err(|e| e.with_base(resolved.mount.path()))?;

        let mut merged: BTreeMap<String, Node> = BTreeMap::new();
        for node in listed {
            let node = node.rebased(resolved.mount.path());
            merged.insert(node.name.clone(), node);
        }
        for mount in self.inner.mounts.mounts_under(path) {
            if mount.path().parent().as_ref() != Some(path) {
                continue;
            }
            let node = match mount.adapter().stat(&VPath::root()).await {
                Ok(node) => node.rebased(mount.path()),
                Err(_) => Node::directory(mount.path().clone(), mount.created_at()),
            };
            merged.insert(node.name.clone(), node);
        }
        Ok(merged.into_values().collect())
    }
}

impl Default for FsManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graftfs_core::{vpath, NodeKind};

    #[tokio::test]
    async fn root_always_exists() {
        let fs = FsManager::new();
        let root = fs.stat("/").await.unwrap();
        assert_eq!(root.kind, NodeKind::Directory);
        assert_eq!(root.path, vpath!("/"));
        assert!(fs.exists("/").await.unwrap());
    }

    #[tokio::test]
    async fn write_read_through_root_mount() {
        let fs = FsManager::new();
        fs.write_file("/a/b.txt", "payload").await.unwrap();

        assert_eq!(&fs.read_file("/a/b.txt").await.unwrap()[..], b"payload");
        let node = fs.stat("/a/b.txt").await.unwrap();
        assert_eq!(node.name, "b.txt");
        assert_eq!(node.size, 7);
    }

    #[tokio::test]
    async fn paths_are_normalized_on_entry() {
        let fs = FsManager::new();
        fs.write_file("/docs/deep/../file.md", "x").await.unwrap();

        assert!(fs.exists("\\docs\\file.md").await.unwrap());
        assert_eq!(fs.normalize_path("//docs//./file.md").unwrap(), "/docs/file.md");
        assert!(matches!(
            fs.normalize_path("/../escape"),
            Err(FsError::InvalidPath { .. })
        ));
    }

    #[tokio::test]
    async fn mount_shadows_and_unmount_restores() {
        let fs = FsManager::new();
        fs.mkdir("/data", false).await.unwrap();
        fs.write_file("/data/original.txt", "underneath")
            .await
            .unwrap();

        fs.mount("/data", "memory", AdapterOptions::new())
            .await
            .unwrap();
        assert_eq!(fs.read_dir("/data").await.unwrap().len(), 0);
        fs.write_file("/data/grafted.txt", "on top").await.unwrap();

        fs.unmount("/data").unwrap();
        let names: Vec<_> = fs
            .read_dir("/data")
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["original.txt"]);
    }

    #[tokio::test]
    async fn mount_points_appear_in_listings() {
        let fs = FsManager::new();
        fs.write_file("/readme.md", "hi").await.unwrap();
        fs.mount("/mem", "memory", AdapterOptions::new())
            .await
            .unwrap();

        let names: Vec<_> = fs
            .read_dir("/")
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["mem", "readme.md"]);

        let mem = fs.stat("/mem").await.unwrap();
        assert_eq!(mem.kind, NodeKind::Directory);
        assert_eq!(mem.name, "mem");
    }

    #[tokio::test]
    async fn mount_replaces_previous_binding() {
        let fs = FsManager::new();
        fs.mount("/m", "memory", AdapterOptions::new())
            .await
            .unwrap();
        fs.write_file("/m/old.txt", "first").await.unwrap();

        fs.mount("/m", "memory", AdapterOptions::new())
            .await
            .unwrap();
        assert!(!fs.exists("/m/old.txt").await.unwrap());
    }

    #[tokio::test]
    async fn mounting_under_a_file_is_rejected() {
        let fs = FsManager::new();
        fs.write_file("/blob", "not a dir").await.unwrap();

        let err = fs
            .mount("/blob/sub", "memory", AdapterOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err, FsError::not_a_directory(&vpath!("/blob")));
    }

    #[tokio::test]
    async fn unknown_adapter_kind_is_rejected() {
        let fs = FsManager::new();
        let err = fs
            .mount("/x", "carrier-pigeon", AdapterOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn unmounting_nothing_is_an_error() {
        let fs = FsManager::new();
        assert!(matches!(
            fs.unmount("/nothing"),
            Err(FsError::MountNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn removing_a_mount_point_is_rejected() {
        let fs = FsManager::new();
        fs.mount("/m", "memory", AdapterOptions::new())
            .await
            .unwrap();

        let err = fs.remove("/m", true).await.unwrap_err();
        assert!(matches!(err, FsError::InvalidPath { .. }));
        let err = fs.remove("/", true).await.unwrap_err();
        assert!(matches!(err, FsError::InvalidPath { .. }));
    }

    #[tokio::test]
    async fn errors_carry_virtual_paths() {
        let fs = FsManager::new();
        fs.mount("/mem", "memory", AdapterOptions::new())
            .await
            .unwrap();

        let err = fs.read_file("/mem/missing.txt").await.unwrap_err();
        assert_eq!(err, FsError::not_found(&vpath!("/mem/missing.txt")));
    }

    #[tokio::test]
    async fn registered_kinds_are_listed() {
        let fs = FsManager::new();
        assert_eq!(fs.adapter_kinds(), vec!["host", "memory"]);
        assert!(fs.get_adapter("memory").is_some());
        assert!(fs.get_adapter("tape").is_none());
    }
}

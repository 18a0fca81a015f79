//! Mount bindings and longest-prefix path resolution.
//!
//! The table routes every virtual path to the deepest mount whose prefix
//! matches, handing back the adapter-relative remainder. The root prefix
//! always carries a mount, so resolution cannot miss.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::adapter::{Adapter, AdapterOptions};
use crate::error::{FsError, Result};
use crate::node::now_millis;
use crate::trie::PathTrie;
use crate::vpath::VPath;

/// One binding between a namespace prefix and an adapter instance.
///
/// Mounts are shared as `Arc<Mount>`. Unmounting detaches the binding in
/// place, so in-flight holders of the `Arc` observe the change on their
/// next [`Mount::ensure_attached`] check instead of silently writing into
/// an orphaned adapter.
pub struct Mount {
    path: VPath,
    adapter: Arc<dyn Adapter>,
    options: AdapterOptions,
    created_at: u64,
    attached: AtomicBool,
}

impl Mount {
    fn new(path: VPath, adapter: Arc<dyn Adapter>, options: AdapterOptions) -> Arc<Mount> {
        Arc::new(Mount {
            path,
            adapter,
            options,
            created_at: now_millis(),
            attached: AtomicBool::new(true),
        })
    }

    /// Namespace prefix this mount owns.
    pub fn path(&self) -> &VPath {
        &self.path
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    pub fn options(&self) -> &AdapterOptions {
        &self.options
    }

    /// Unix milliseconds at bind time.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }

    /// `AdapterUnavailable` once the mount has been detached.
    pub fn ensure_attached(&self) -> Result<()> {
        if self.is_attached() {
            Ok(())
        } else {
            Err(FsError::adapter_unavailable(&self.path))
        }
    }
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("path", &self.path)
            .field("adapter", &self.adapter.kind())
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Outcome of resolving a virtual path: the winning mount plus the
/// adapter-relative remainder.
#[derive(Clone, Debug)]
pub struct Resolved {
    pub mount: Arc<Mount>,
    pub rest: VPath,
}

struct TableInner {
    trie: PathTrie<Arc<Mount>>,
    /// Current root mount, mirrored out of the trie for the fallback path.
    root: Arc<Mount>,
    /// Adapter the implicit root mount wraps; restored when an explicit
    /// root mount is removed.
    default_adapter: Arc<dyn Adapter>,
    root_is_default: bool,
}

/// Thread-safe mount table with deepest-mount-wins resolution.
pub struct MountTable {
    inner: RwLock<TableInner>,
}

impl MountTable {
    /// Table with the implicit root mount wrapping `default_adapter`.
    pub fn new(default_adapter: Arc<dyn Adapter>) -> MountTable {
        let root = Mount::new(VPath::root(), default_adapter.clone(), AdapterOptions::new());
        let mut trie = PathTrie::new();
        trie.insert(&VPath::root(), root.clone());
        MountTable {
            inner: RwLock::new(TableInner {
                trie,
                root,
                default_adapter,
                root_is_default: true,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, TableInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TableInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind an adapter at `path`, replacing (and detaching) whatever was
    /// bound at exactly that path. Mounts nested above or below survive.
    pub fn mount(
        &self,
        path: VPath,
        adapter: Arc<dyn Adapter>,
        options: AdapterOptions,
    ) -> Arc<Mount> {
        let mount = Mount::new(path.clone(), adapter, options);
        let mut inner = self.write();
        if path.is_root() {
            inner.root = mount.clone();
            inner.root_is_default = false;
        }
        if let Some(previous) = inner.trie.insert(&path, mount.clone()) {
            previous.detach();
        }
        mount
    }

    /// Remove the binding at exactly `path` and detach it.
    ///
    /// Unmounting the root only works if something was explicitly mounted
    /// there; the implicit default root then comes back, wrapping the
    /// adapter the table was created with.
    pub fn unmount(&self, path: &VPath) -> Result<Arc<Mount>> {
        let mut inner = self.write();
        if path.is_root() {
            if inner.root_is_default {
                return Err(FsError::mount_not_found(path));
            }
            let restored = Mount::new(
                VPath::root(),
                inner.default_adapter.clone(),
                AdapterOptions::new(),
            );
            let removed = inner.trie.insert(path, restored.clone());
            inner.root = restored;
            inner.root_is_default = true;
            // The insert invariant guarantees a previous root value.
            return match removed {
                Some(previous) => {
                    previous.detach();
                    Ok(previous)
                }
                None => Err(FsError::mount_not_found(path)),
            };
        }
        match inner.trie.remove(path) {
            Some(mount) => {
                mount.detach();
                Ok(mount)
            }
            None => Err(FsError::mount_not_found(path)),
        }
    }

    /// Longest-prefix resolution. Never fails: the root mount is the
    /// floor every path lands on.
    pub fn resolve(&self, path: &VPath) -> Resolved {
        let inner = self.read();
        match inner.trie.longest_prefix(path) {
            Some((mount, rest)) => Resolved {
                mount: mount.clone(),
                rest,
            },
            None => Resolved {
                mount: inner.root.clone(),
                rest: path.clone(),
            },
        }
    }

    /// Resolve and require the winning mount to still be attached.
    ///
    /// Resolution never falls through to a shallower mount once a deeper
    /// one has won, so a detached winner is `AdapterUnavailable`.
    pub fn resolve_attached(&self, path: &VPath) -> Result<Resolved> {
        let resolved = self.resolve(path);
        resolved.mount.ensure_attached()?;
        Ok(resolved)
    }

    /// Whether `path` is exactly a mount point.
    pub fn is_mount_point(&self, path: &VPath) -> bool {
        self.read().trie.get(path).is_some()
    }

    /// All mounts, sorted by mount path.
    pub fn list(&self) -> Vec<Arc<Mount>> {
        self.read().trie.iter().map(|(_, m)| m.clone()).collect()
    }

    /// Mounts strictly below `prefix`, sorted by mount path.
    pub fn mounts_under(&self, prefix: &VPath) -> Vec<Arc<Mount>> {
        self.read()
            .trie
            .iter()
            .filter(|(path, _)| path.starts_with(prefix) && path != prefix)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().trie.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

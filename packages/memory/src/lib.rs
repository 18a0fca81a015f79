//! Reference in-memory adapter.
//!
//! Backs a tree of files and directories with plain process memory.
//! Everything optional is native here: rename detaches and re-attaches a
//! subtree, copy deep-clones one, and every mutation lands on a broadcast
//! change feed, which makes this the adapter watchers exercise first.
//!
//! # Example
//!
//! ```rust
//! use graftfs_core::{Adapter, vpath};
//! use graftfs_memory::MemoryAdapter;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mem = MemoryAdapter::new();
//! mem.write(&vpath!("/docs/a.txt"), "hello".into()).await.unwrap();
//! assert_eq!(mem.read(&vpath!("/docs/a.txt")).await.unwrap(), "hello");
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use graftfs_core::{
    now_millis, Adapter, AdapterFactory, AdapterOptions, Capabilities, FsError, Node, Result,
    VPath, WatchEvent,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One entry in the tree.
#[derive(Clone)]
enum Entry {
    File {
        data: Bytes,
        modified: u64,
    },
    Dir {
        children: BTreeMap<String, Entry>,
        modified: u64,
    },
}

impl Entry {
    fn dir(modified: u64) -> Entry {
        Entry::Dir {
            children: BTreeMap::new(),
            modified,
        }
    }

    fn to_node(&self, path: VPath) -> Node {
        match self {
            Entry::File { data, modified } => Node::file(path, data.len() as u64, *modified),
            Entry::Dir { modified, .. } => Node::directory(path, *modified),
        }
    }
}

/// Walk to the entry at `path`.
fn find<'a>(root: &'a Entry, path: &VPath) -> Result<&'a Entry> {
    let mut current = root;
    let mut walked = VPath::root();
    for name in path.components() {
        let children = match current {
            Entry::Dir { children, .. } => children,
            Entry::File { .. } => return Err(FsError::not_a_directory(&walked)),
        };
        current = children.get(name).ok_or_else(|| FsError::not_found(path))?;
        walked = walked.child(name);
    }
    Ok(current)
}

fn find_mut<'a>(root: &'a mut Entry, path: &VPath) -> Result<&'a mut Entry> {
    let mut current = root;
    let mut walked = VPath::root();
    for name in path.components() {
        let children = match current {
            Entry::Dir { children, .. } => children,
            Entry::File { .. } => return Err(FsError::not_a_directory(&walked)),
        };
        current = children
            .get_mut(name)
            .ok_or_else(|| FsError::not_found(path))?;
        walked = walked.child(name);
    }
    Ok(current)
}

/// Walk to the directory at `path`, creating missing directories on the way.
fn ensure_dirs<'a>(root: &'a mut Entry, path: &VPath, now: u64) -> Result<&'a mut Entry> {
    let mut current = root;
    let mut walked = VPath::root();
    for name in path.components() {
        let children = match current {
            Entry::Dir { children, .. } => children,
            Entry::File { .. } => return Err(FsError::not_a_directory(&walked)),
        };
        current = children
            .entry(name.to_string())
            .or_insert_with(|| Entry::dir(now));
        walked = walked.child(name);
    }
    match current {
        Entry::Dir { .. } => Ok(current),
        Entry::File { .. } => Err(FsError::not_a_directory(&walked)),
    }
}

/// Split a non-root path into parent and final component.
fn split(path: &VPath) -> Option<(VPath, String)> {
    match (path.parent(), path.name()) {
        (Some(parent), Some(name)) => Some((parent, name.to_string())),
        _ => None,
    }
}

/// In-memory tree adapter with the full native capability set.
pub struct MemoryAdapter {
    root: RwLock<Entry>,
    events: broadcast::Sender<WatchEvent>,
}

impl MemoryAdapter {
    pub fn new() -> MemoryAdapter {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        MemoryAdapter {
            root: RwLock::new(Entry::dir(now_millis())),
            events,
        }
    }

    fn tree(&self) -> RwLockReadGuard<'_, Entry> {
        self.root.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn tree_mut(&self) -> RwLockWriteGuard<'_, Entry> {
        self.root.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: WatchEvent) {
        // No receivers is fine; nobody is watching.
        let _ = self.events.send(event);
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn read(&self, path: &VPath) -> Result<Bytes> {
        let root = self.tree();
        match find(&root, path)? {
            Entry::File { data, .. } => Ok(data.clone()),
            Entry::Dir { .. } => Err(FsError::is_a_directory(path)),
        }
    }

    async fn write(&self, path: &VPath, data: Bytes) -> Result<()> {
        let event = {
            let mut root = self.tree_mut();
            let now = now_millis();
            let Some((parent_path, name)) = split(path) else {
                return Err(FsError::is_a_directory(path));
            };
            let parent = ensure_dirs(&mut root, &parent_path, now)?;
            let Entry::Dir { children, modified } = parent else {
                return Err(FsError::not_a_directory(&parent_path));
            };
            match children.get_mut(&name) {
                Some(Entry::Dir { .. }) => return Err(FsError::is_a_directory(path)),
                Some(Entry::File {
                    data: existing,
                    modified: file_modified,
                }) => {
                    *existing = data;
                    *file_modified = now;
                    WatchEvent::modified(path.clone())
                }
                None => {
                    children.insert(
                        name,
                        Entry::File {
                            data,
                            modified: now,
                        },
                    );
                    *modified = now;
                    WatchEvent::created(path.clone())
                }
            }
        };
        self.emit(event);
        Ok(())
    }

    async fn stat(&self, path: &VPath) -> Result<Node> {
        let root = self.tree();
        Ok(find(&root, path)?.to_node(path.clone()))
    }

    async fn list(&self, path: &VPath) -> Result<Vec<Node>> {
        let root = self.tree();
        match find(&root, path)? {
            Entry::Dir { children, .. } => Ok(children
                .iter()
                .map(|(name, entry)| entry.to_node(path.child(name)))
                .collect()),
            Entry::File { .. } => Err(FsError::not_a_directory(path)),
        }
    }

    async fn mkdir(&self, path: &VPath, recursive: bool) -> Result<()> {
        if path.is_root() {
            // The adapter root always exists.
            return Ok(());
        }
        let event = {
            let mut root = self.tree_mut();
            let now = now_millis();
            if recursive {
                let present = match find(&root, path) {
                    Ok(Entry::Dir { .. }) => true,
                    Ok(Entry::File { .. }) => return Err(FsError::not_a_directory(path)),
                    Err(FsError::NotFound { .. }) => false,
                    Err(e) => return Err(e),
                };
                if present {
                    None
                } else {
                    ensure_dirs(&mut root, path, now)?;
                    Some(WatchEvent::created(path.clone()))
                }
            } else {
                let Some((parent_path, name)) = split(path) else {
                    return Ok(());
                };
                let parent = find_mut(&mut root, &parent_path)?;
                let Entry::Dir { children, modified } = parent else {
                    return Err(FsError::not_a_directory(&parent_path));
                };
                match children.get(&name) {
                    Some(Entry::Dir { .. }) => None,
                    Some(Entry::File { .. }) => return Err(FsError::not_a_directory(path)),
                    None => {
                        children.insert(name, Entry::dir(now));
                        *modified = now;
                        Some(WatchEvent::created(path.clone()))
                    }
                }
            }
        };
        if let Some(event) = event {
            self.emit(event);
        }
        Ok(())
    }

    async fn remove(&self, path: &VPath, recursive: bool) -> Result<()> {
        let event = {
            let mut root = self.tree_mut();
            let now = now_millis();
            let Some((parent_path, name)) = split(path) else {
                return Err(FsError::invalid_path(
                    path.to_string(),
                    "cannot remove the adapter root",
                ));
            };
            let parent = find_mut(&mut root, &parent_path)?;
            let Entry::Dir { children, modified } = parent else {
                return Err(FsError::not_a_directory(&parent_path));
            };
            match children.get(&name) {
                None => return Err(FsError::not_found(path)),
                Some(Entry::Dir { children: sub, .. }) if !recursive && !sub.is_empty() => {
                    return Err(FsError::directory_not_empty(path));
                }
                Some(_) => {
                    children.remove(&name);
                    *modified = now;
                }
            }
            WatchEvent::deleted(path.clone())
        };
        self.emit(event);
        Ok(())
    }

    async fn rename(&self, from: &VPath, to: &VPath) -> Result<()> {
        let events = {
            let mut root = self.tree_mut();
            let now = now_millis();
            if to.starts_with(from) {
                return Err(FsError::invalid_path(
                    to.to_string(),
                    "destination is inside the source",
                ));
            }
            let Some((from_parent, from_name)) = split(from) else {
                return Err(FsError::invalid_path(
                    from.to_string(),
                    "cannot move the adapter root",
                ));
            };
            let Some((to_parent, to_name)) = split(to) else {
                return Err(FsError::is_a_directory(to));
            };

            // Validate both ends before detaching anything.
            find(&root, from)?;
            let dest = ensure_dirs(&mut root, &to_parent, now)?;
            if let Entry::Dir { children, .. } = dest {
                if matches!(children.get(&to_name), Some(Entry::Dir { .. })) {
                    return Err(FsError::is_a_directory(to));
                }
            }

            let entry = match find_mut(&mut root, &from_parent)? {
                Entry::Dir { children, modified } => {
                    let entry = children
                        .remove(&from_name)
                        .ok_or_else(|| FsError::not_found(from))?;
                    *modified = now;
                    entry
                }
                Entry::File { .. } => return Err(FsError::not_a_directory(&from_parent)),
            };
            match find_mut(&mut root, &to_parent)? {
                Entry::Dir { children, modified } => {
                    children.insert(to_name, entry);
                    *modified = now;
                }
                Entry::File { .. } => return Err(FsError::not_a_directory(&to_parent)),
            }
            [
                WatchEvent::deleted(from.clone()),
                WatchEvent::created(to.clone()),
            ]
        };
        for event in events {
            self.emit(event);
        }
        Ok(())
    }

    async fn copy(&self, from: &VPath, to: &VPath) -> Result<()> {
        let event = {
            let mut root = self.tree_mut();
            let now = now_millis();
            if to.starts_with(from) {
                return Err(FsError::invalid_path(
                    to.to_string(),
                    "destination is inside the source",
                ));
            }
            let Some((to_parent, to_name)) = split(to) else {
                return Err(FsError::is_a_directory(to));
            };
            let subtree = find(&root, from)?.clone();
            let dest = ensure_dirs(&mut root, &to_parent, now)?;
            match dest {
                Entry::Dir { children, modified } => {
                    if matches!(children.get(&to_name), Some(Entry::Dir { .. })) {
                        return Err(FsError::is_a_directory(to));
                    }
                    children.insert(to_name, subtree);
                    *modified = now;
                }
                Entry::File { .. } => return Err(FsError::not_a_directory(&to_parent)),
            }
            WatchEvent::created(to.clone())
        };
        self.emit(event);
        Ok(())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<WatchEvent>> {
        Some(self.events.subscribe())
    }
}

/// Builds [`MemoryAdapter`] instances; registered under kind `"memory"`.
///
/// Options are ignored: a fresh adapter starts empty.
#[derive(Default)]
pub struct MemoryAdapterFactory;

impl AdapterFactory for MemoryAdapterFactory {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn create(&self, _options: &AdapterOptions) -> Result<Arc<dyn Adapter>> {
        Ok(Arc::new(MemoryAdapter::new()))
    }
}

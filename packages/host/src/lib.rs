//! Host-directory adapter.
//!
//! Maps the adapter namespace onto a real directory through `tokio::fs`.
//! The root is validated and canonicalized once at construction; virtual
//! components are appended below it, and since normalized paths can never
//! contain `..` the mapping cannot escape the root.
//!
//! Rename is native (`rename(2)` via tokio). There is no native copy and
//! no native change feed, so transfers stream through the manager and
//! watchers on host mounts use the polling strategy.

use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;

use graftfs_core::{
    Adapter, AdapterFactory, AdapterOptions, Capabilities, FsError, Node, Result, VPath,
};

fn system_time_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn node_from_metadata(path: VPath, meta: &std::fs::Metadata) -> Node {
    let modified = meta.modified().map(system_time_millis).unwrap_or_default();
    if meta.is_dir() {
        Node::directory(path, modified)
    } else {
        Node::file(path, meta.len(), modified)
    }
}

/// Translate io failures into the shared taxonomy, keeping the virtual
/// path instead of the host path.
fn map_io(err: io::Error, path: &VPath) -> FsError {
    match err.kind() {
        io::ErrorKind::NotFound => FsError::not_found(path),
        io::ErrorKind::NotADirectory => FsError::not_a_directory(path),
        io::ErrorKind::IsADirectory => FsError::is_a_directory(path),
        io::ErrorKind::DirectoryNotEmpty => FsError::directory_not_empty(path),
        _ => FsError::other(format!("io error at '{}': {}", path, err)),
    }
}

/// Adapter over a real directory on the host filesystem.
pub struct HostAdapter {
    root: PathBuf,
}

impl HostAdapter {
    /// Validate that `root` is an existing directory and canonicalize it.
    pub fn new(root: impl AsRef<Path>) -> Result<HostAdapter> {
        let root = root.as_ref();
        let display = root.display().to_string();
        let meta = std::fs::metadata(root)
            .map_err(|e| FsError::invalid_path(&display, format!("unusable host root: {}", e)))?;
        if !meta.is_dir() {
            return Err(FsError::invalid_path(
                &display,
                "host root must be a directory",
            ));
        }
        let root = root
            .canonicalize()
            .map_err(|e| FsError::invalid_path(&display, format!("unusable host root: {}", e)))?;
        Ok(HostAdapter { root })
    }

    /// Canonical host root this adapter serves.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, path: &VPath) -> PathBuf {
        self.root
            .components()
            .chain(path.components().map(|s| Component::Normal(OsStr::new(s))))
            .collect()
    }
}

#[async_trait]
impl Adapter for HostAdapter {
    fn kind(&self) -> &'static str {
        "host"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            rename: true,
            copy: false,
            watch: false,
        }
    }

    async fn read(&self, path: &VPath) -> Result<Bytes> {
        // Reading a directory is platform-dependent at the io layer, so
        // classify through stat first.
        let node = self.stat(path).await?;
        if node.kind.is_dir() {
            return Err(FsError::is_a_directory(path));
        }
        let data = fs::read(self.host_path(path))
            .await
            .map_err(|e| map_io(e, path))?;
        Ok(Bytes::from(data))
    }

    async fn write(&self, path: &VPath, data: Bytes) -> Result<()> {
        if path.is_root() {
            return Err(FsError::is_a_directory(path));
        }
        let host = self.host_path(path);
        if let Some(parent) = host.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(e, &path.parent().unwrap_or_default()))?;
        }
        fs::write(&host, &data).await.map_err(|e| map_io(e, path))
    }

    async fn stat(&self, path: &VPath) -> Result<Node> {
        let meta = fs::metadata(self.host_path(path))
            .await
            .map_err(|e| map_io(e, path))?;
        Ok(node_from_metadata(path.clone(), &meta))
    }

    async fn list(&self, path: &VPath) -> Result<Vec<Node>> {
        let mut dir = fs::read_dir(self.host_path(path))
            .await
            .map_err(|e| map_io(e, path))?;
        let mut nodes = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| map_io(e, path))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            match entry.metadata().await {
                Ok(meta) => nodes.push(node_from_metadata(path.child(&name), &meta)),
                // Entry vanished between readdir and stat.
                Err(_) => continue,
            }
        }
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }

    async fn mkdir(&self, path: &VPath, recursive: bool) -> Result<()> {
        match self.stat(path).await {
            Ok(node) if node.kind.is_dir() => return Ok(()),
            Ok(_) => return Err(FsError::not_a_directory(path)),
            Err(FsError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        let host = self.host_path(path);
        let result = if recursive {
            fs::create_dir_all(&host).await
        } else {
            fs::create_dir(&host).await
        };
        result.map_err(|e| map_io(e, path))
    }

    async fn remove(&self, path: &VPath, recursive: bool) -> Result<()> {
        if path.is_root() {
            return Err(FsError::invalid_path(
                path.to_string(),
                "cannot remove the adapter root",
            ));
        }
        let node = self.stat(path).await?;
        let host = self.host_path(path);
        let result = if node.kind.is_file() {
            fs::remove_file(&host).await
        } else if recursive {
            fs::remove_dir_all(&host).await
        } else {
            fs::remove_dir(&host).await
        };
        result.map_err(|e| map_io(e, path))
    }

    async fn rename(&self, from: &VPath, to: &VPath) -> Result<()> {
        if to.starts_with(from) {
            return Err(FsError::invalid_path(
                to.to_string(),
                "destination is inside the source",
            ));
        }
        let to_host = self.host_path(to);
        if let Some(parent) = to_host.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(e, &to.parent().unwrap_or_default()))?;
        }
        fs::rename(self.host_path(from), to_host)
            .await
            .map_err(|e| map_io(e, from))
    }
}

/// Builds [`HostAdapter`] instances; registered under kind `"host"`.
///
/// Requires a `root` option pointing at an existing directory.
#[derive(Default)]
pub struct HostAdapterFactory;

impl AdapterFactory for HostAdapterFactory {
    fn kind(&self) -> &'static str {
        "host"
    }

    fn create(&self, options: &AdapterOptions) -> Result<Arc<dyn Adapter>> {
        let Some(root) = options.get("root") else {
            return Err(FsError::invalid_path(
                "",
                "host mount requires a 'root' option",
            ));
        };
        Ok(Arc::new(HostAdapter::new(root)?))
    }
}

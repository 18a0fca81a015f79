//! The storage adapter contract.
//!
//! An adapter is a storage backend grafted into the namespace at a mount
//! point. Adapters speak adapter-relative paths only: `/` is the adapter's
//! own root and mount prefixes never appear in the paths they receive.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{FsError, Result};
use crate::node::Node;
use crate::vpath::VPath;
use crate::watch::WatchEvent;

/// Optional operations an adapter implements natively.
///
/// The manager consults this before delegating: anything not advertised is
/// handled by a generic strategy instead (streamed transfers, polling
/// watchers). Calling an unadvertised native method returns
/// [`FsError::Unsupported`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Moves an entry without copying payloads.
    pub rename: bool,
    /// Clones an entry within the adapter.
    pub copy: bool,
    /// Has a native change feed behind [`Adapter::subscribe`].
    pub watch: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        rename: false,
        copy: false,
        watch: false,
    };

    pub const ALL: Capabilities = Capabilities {
        rename: true,
        copy: true,
        watch: true,
    };
}

/// Storage backend contract.
///
/// Implementations must be shareable across tasks behind an `Arc`; all
/// methods take `&self` and interior mutability is the adapter's business.
///
/// # Edge cases every implementation honors
///
/// - traversing through a file component is `NotADirectory`
/// - `read`/`write` on a directory is `IsADirectory`
/// - non-recursive `remove` of a populated directory is `DirectoryNotEmpty`
/// - non-recursive `mkdir` under a missing parent is `NotFound`
/// - `mkdir` where a file sits is `NotADirectory`; on an existing
///   directory it succeeds
/// - `remove` of the adapter root is `InvalidPath`
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Symbolic adapter kind, e.g. `"memory"`.
    fn kind(&self) -> &'static str;

    /// Which optional operations this adapter handles natively.
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    /// Full payload of the file at `path`.
    async fn read(&self, path: &VPath) -> Result<Bytes>;

    /// Replace the payload at `path`, creating the file and any missing
    /// parent directories.
    async fn write(&self, path: &VPath, data: Bytes) -> Result<()>;

    /// Metadata for the entry at `path`.
    async fn stat(&self, path: &VPath) -> Result<Node>;

    /// Direct children of the directory at `path`, sorted by name.
    async fn list(&self, path: &VPath) -> Result<Vec<Node>>;

    /// Create a directory. With `recursive`, missing ancestors are created
    /// as well.
    async fn mkdir(&self, path: &VPath, recursive: bool) -> Result<()>;

    /// Remove the entry at `path`. Directories require `recursive` unless
    /// empty.
    async fn remove(&self, path: &VPath, recursive: bool) -> Result<()>;

    /// Whether an entry exists at `path`.
    ///
    /// A missing leaf and a parent chain blocked by a file both report
    /// `false`; only backend failures surface as errors.
    async fn exists(&self, path: &VPath) -> Result<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(FsError::NotFound { .. }) | Err(FsError::NotADirectory { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Move an entry within this adapter. Called only when
    /// [`Capabilities::rename`] is advertised.
    async fn rename(&self, _from: &VPath, _to: &VPath) -> Result<()> {
        Err(FsError::unsupported("rename"))
    }

    /// Clone an entry within this adapter. Called only when
    /// [`Capabilities::copy`] is advertised.
    async fn copy(&self, _from: &VPath, _to: &VPath) -> Result<()> {
        Err(FsError::unsupported("copy"))
    }

    /// Native change feed carrying adapter-relative events, or `None` for
    /// adapters without change tracking (those get the polling strategy).
    fn subscribe(&self) -> Option<broadcast::Receiver<WatchEvent>> {
        None
    }
}

/// String options handed to factories at mount time.
pub type AdapterOptions = BTreeMap<String, String>;

/// Builds adapter instances from mount options.
///
/// Factories are registered under their symbolic kind; a mount that names
/// a kind instead of passing an instance goes through the registry.
pub trait AdapterFactory: Send + Sync {
    /// Kind this factory builds, e.g. `"host"`.
    fn kind(&self) -> &'static str;

    /// Build a fresh adapter from `options`.
    fn create(&self, options: &AdapterOptions) -> Result<Arc<dyn Adapter>>;
}

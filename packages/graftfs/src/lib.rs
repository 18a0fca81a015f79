//! GraftFS: one path-addressed namespace over pluggable storage backends.
//!
//! An [`FsManager`] serves a single virtual filesystem tree. Storage
//! backends (adapters) are grafted into the tree at mount points; every
//! operation resolves its path to the deepest covering mount and delegates
//! to that adapter with the remainder. The tree is rooted in an in-memory
//! adapter, so a fresh manager works without any setup.
//!
//! What the crate provides:
//!
//! - Normalized virtual paths ([`VPath`]) with `/` and `\` input forms.
//! - A mount table with longest-prefix resolution, nesting and shadowing.
//! - `memory` and `host` adapters, plus an [`AdapterFactory`] registry for
//!   custom kinds.
//! - Tracked asynchronous copy/move with progress events.
//! - Watchers over native change feeds or polling, and namespace-wide name
//!   search.
//!
//! # Examples
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> graftfs::Result<()> {
//! use graftfs::{AdapterOptions, FsManager};
//!
//! let fs = FsManager::new();
//! fs.mount("/scratch", "memory", AdapterOptions::new()).await?;
//! fs.write_file("/scratch/hello.txt", "hi there").await?;
//!
//! let hits = fs.search("hello", "/").await?;
//! assert_eq!(hits[0].path.to_string(), "/scratch/hello.txt");
//!
//! fs.unmount("/scratch")?;
//! assert!(!fs.exists("/scratch/hello.txt").await?);
//! # Ok(())
//! # }
//! ```

mod config;
mod manager;
mod ops;
mod registry;
mod search;
mod watch;

pub use config::FsConfig;
pub use manager::FsManager;
pub use registry::AdapterRegistry;
pub use watch::Watcher;

pub use graftfs_core::{
    vpath, Adapter, AdapterFactory, AdapterOptions, Bytes, Capabilities, FsError, Mount, Node,
    NodeKind, Operation, OperationEvent, OperationKind, OperationStatus, Result, VPath, WatchEvent,
    WatchEventKind,
};
pub use graftfs_host::{HostAdapter, HostAdapterFactory};
pub use graftfs_memory::{MemoryAdapter, MemoryAdapterFactory};

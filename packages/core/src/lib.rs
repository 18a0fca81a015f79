//! Core GraftFS: the namespace data model.
//!
//! This crate defines everything adapters and the manager agree on:
//! - `VPath`: normalized absolute path in the virtual namespace
//! - `Node`: metadata record for files and directories
//! - `FsError`: the error taxonomy every operation returns
//! - `Adapter`: the async storage backend contract
//! - `MountTable`: longest-prefix routing from paths to mounts
//!
//! Backends implement [`Adapter`] against adapter-relative paths; the
//! manager in the `graftfs` crate does the mounting, routing and
//! re-basing.
//!
//! # Example
//!
//! ```rust
//! use graftfs_core::{VPath, vpath};
//!
//! let p = VPath::parse("/docs/../notes/a.txt").unwrap();
//! assert_eq!(p, vpath!("/notes/a.txt"));
//! ```

pub use bytes::Bytes;

mod adapter;
mod error;
mod mount;
mod node;
mod operation;
mod trie;
mod vpath;
mod watch;

pub use adapter::{Adapter, AdapterFactory, AdapterOptions, Capabilities};
pub use error::{FsError, Result};
pub use mount::{Mount, MountTable, Resolved};
pub use node::{now_millis, Node, NodeKind};
pub use operation::{Operation, OperationEvent, OperationKind, OperationStatus};
pub use trie::{PathTrie, PathTrieIter};
pub use vpath::VPath;
pub use watch::{WatchEvent, WatchEventKind};

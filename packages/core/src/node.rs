//! Metadata records returned by stat and directory listings.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::vpath::VPath;

/// What kind of entry a [`Node`] describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }
}

/// Metadata for one entry in the namespace.
///
/// `size` is payload bytes for files and 0 for directories. `modified`
/// is a unix timestamp in milliseconds. Adapters produce nodes with
/// adapter-relative paths; the manager re-bases them with [`Node::rebased`]
/// before handing them to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub path: VPath,
    pub name: String,
    pub kind: NodeKind,
    pub size: u64,
    pub modified: u64,
}

impl Node {
    /// File node; `name` is derived from the final path component.
    pub fn file(path: VPath, size: u64, modified: u64) -> Node {
        let name = path.name().unwrap_or("").to_string();
        Node {
            path,
            name,
            kind: NodeKind::File,
            size,
            modified,
        }
    }

    /// Directory node; directories always report size 0.
    pub fn directory(path: VPath, modified: u64) -> Node {
        let name = path.name().unwrap_or("").to_string();
        Node {
            path,
            name,
            kind: NodeKind::Directory,
            size: 0,
            modified,
        }
    }

    /// Re-root the node under `base`, keeping kind, size and timestamp.
    #[must_use]
    pub fn rebased(self, base: &VPath) -> Node {
        let path = base.join(&self.path);
        let name = path.name().unwrap_or("").to_string();
        Node { path, name, ..self }
    }
}

/// Current wall-clock time as unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

//! Change notification event shapes.

use serde::{Deserialize, Serialize};

use crate::node::now_millis;
use crate::vpath::VPath;

/// What happened to the entry a [`WatchEvent`] names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchEventKind {
    Created,
    Modified,
    Deleted,
}

/// One observed change.
///
/// Adapters emit events with adapter-relative paths on their native feed;
/// watchers re-base them to virtual paths before delivery, so callback
/// consumers only ever see virtual paths.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub path: VPath,
    pub kind: WatchEventKind,
    /// Unix milliseconds at emission time.
    pub timestamp: u64,
}

impl WatchEvent {
    pub fn new(path: VPath, kind: WatchEventKind) -> WatchEvent {
        WatchEvent {
            path,
            kind,
            timestamp: now_millis(),
        }
    }

    pub fn created(path: VPath) -> WatchEvent {
        WatchEvent::new(path, WatchEventKind::Created)
    }

    pub fn modified(path: VPath) -> WatchEvent {
        WatchEvent::new(path, WatchEventKind::Modified)
    }

    pub fn deleted(path: VPath) -> WatchEvent {
        WatchEvent::new(path, WatchEventKind::Deleted)
    }

    /// Re-root the event path under a mount point.
    #[must_use]
    pub fn rebased(self, base: &VPath) -> WatchEvent {
        WatchEvent {
            path: base.join(&self.path),
            ..self
        }
    }
}

//! Tracked transfer operations and their event feed shapes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::vpath::VPath;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Copy,
    Move,
}

/// Lifecycle of a tracked operation.
///
/// `Cancelled` is part of the persisted data model for hosts that record
/// operations; the engine itself only produces `Completed` and `Failed`
/// terminals (cancellation happens implicitly through unmounting, which
/// fails the operation).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    /// Terminal statuses never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }
}

/// Snapshot of one tracked copy or move.
///
/// Snapshots are value types: mutating one does not affect the tracker's
/// record. `progress` is 0..=100 and never decreases across the snapshots
/// the tracker publishes for a given id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    pub kind: OperationKind,
    pub status: OperationStatus,
    pub progress: u8,
    pub source: VPath,
    pub destination: VPath,
    /// Failure message once the status is `Failed`.
    pub error: Option<String>,
}

impl Operation {
    /// Fresh pending operation with a random id.
    pub fn new(kind: OperationKind, source: VPath, destination: VPath) -> Operation {
        Operation {
            id: Uuid::new_v4(),
            kind,
            status: OperationStatus::Pending,
            progress: 0,
            source,
            destination,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Events published on the operation feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OperationEvent {
    /// Progress advanced (non-terminal).
    Progress { operation: Operation },
    /// The operation finished; `operation.progress` is 100.
    Completed { operation: Operation },
    /// The operation failed; `succeeded` lists children transferred
    /// before the failure. Nothing is rolled back.
    Failed {
        operation: Operation,
        succeeded: Vec<VPath>,
    },
}

impl OperationEvent {
    pub fn operation(&self) -> &Operation {
        match self {
            OperationEvent::Progress { operation }
            | OperationEvent::Completed { operation }
            | OperationEvent::Failed { operation, .. } => operation,
        }
    }

    /// True for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationEvent::Progress { .. })
    }
}

//! Error taxonomy shared across the workspace.

use crate::vpath::VPath;

/// Convenience alias used throughout GraftFS.
pub type Result<T> = std::result::Result<T, FsError>;

/// Errors surfaced by namespace and adapter operations.
///
/// Adapters translate their internal failures into this taxonomy before
/// returning, so callers never see backend-specific error shapes. Adapter
/// errors carry adapter-relative paths; the manager re-bases them onto
/// the mount point with [`FsError::with_base`] before they reach callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    /// The input cannot be normalized into a path, or the operation would
    /// address something outside the namespace.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// No entry exists at the path.
    #[error("not found: {path}")]
    NotFound { path: VPath },

    /// A directory operation reached a file.
    #[error("not a directory: {path}")]
    NotADirectory { path: VPath },

    /// A file operation reached a directory.
    #[error("is a directory: {path}")]
    IsADirectory { path: VPath },

    /// Non-recursive removal of a directory that still has entries.
    #[error("directory not empty: {path}")]
    DirectoryNotEmpty { path: VPath },

    /// No mount is bound at exactly this path.
    #[error("no mount at '{path}'")]
    MountNotFound { path: VPath },

    /// The operation reached a mount whose adapter has been detached.
    #[error("adapter for mount '{mount}' is no longer available")]
    AdapterUnavailable { mount: VPath },

    /// A bulk transfer failed partway through. `succeeded` lists the
    /// children that were already transferred; nothing is rolled back.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        succeeded: Vec<VPath>,
    },

    /// The adapter does not implement this optional operation.
    #[error("'{operation}' is not supported by this adapter")]
    Unsupported { operation: String },

    /// Backend failure that fits no structured variant.
    #[error("{message}")]
    Other { message: String },
}

impl FsError {
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> FsError {
        FsError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(path: &VPath) -> FsError {
        FsError::NotFound { path: path.clone() }
    }

    pub fn not_a_directory(path: &VPath) -> FsError {
        FsError::NotADirectory { path: path.clone() }
    }

    pub fn is_a_directory(path: &VPath) -> FsError {
        FsError::IsADirectory { path: path.clone() }
    }

    pub fn directory_not_empty(path: &VPath) -> FsError {
        FsError::DirectoryNotEmpty { path: path.clone() }
    }

    pub fn mount_not_found(path: &VPath) -> FsError {
        FsError::MountNotFound { path: path.clone() }
    }

    pub fn adapter_unavailable(mount: &VPath) -> FsError {
        FsError::AdapterUnavailable {
            mount: mount.clone(),
        }
    }

    pub fn unsupported(operation: impl Into<String>) -> FsError {
        FsError::Unsupported {
            operation: operation.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> FsError {
        FsError::Other {
            message: message.into(),
        }
    }

    /// Re-base adapter-relative paths onto a mount point.
    ///
    /// Variants that carry a path inside the adapter's tree get the mount
    /// prefix prepended; everything else passes through unchanged.
    #[must_use]
    pub fn with_base(self, base: &VPath) -> FsError {
        if base.is_root() {
            return self;
        }
        match self {
            FsError::NotFound { path } => FsError::NotFound {
                path: base.join(&path),
            },
            FsError::NotADirectory { path } => FsError::NotADirectory {
                path: base.join(&path),
            },
            FsError::IsADirectory { path } => FsError::IsADirectory {
                path: base.join(&path),
            },
            FsError::DirectoryNotEmpty { path } => FsError::DirectoryNotEmpty {
                path: base.join(&path),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vpath;

    #[test]
    fn display_messages() {
        let err = FsError::invalid_path("/..", "escapes the namespace root");
        assert_eq!(
            err.to_string(),
            "invalid path '/..': escapes the namespace root"
        );

        let err = FsError::not_found(&vpath!("/a/b"));
        assert_eq!(err.to_string(), "not found: /a/b");

        let err = FsError::adapter_unavailable(&vpath!("/mem"));
        assert!(err.to_string().contains("/mem"));
    }

    #[test]
    fn with_base_rebases_tree_paths() {
        let err = FsError::not_found(&vpath!("/docs/a.txt")).with_base(&vpath!("/mem"));
        assert_eq!(
            err,
            FsError::NotFound {
                path: vpath!("/mem/docs/a.txt")
            }
        );
    }

    #[test]
    fn with_base_on_root_is_identity() {
        let err = FsError::not_found(&vpath!("/a"));
        assert_eq!(err.clone().with_base(&VPath::root()), err);
    }

    #[test]
    fn with_base_leaves_other_variants() {
        let err = FsError::unsupported("rename").with_base(&vpath!("/mem"));
        assert_eq!(
            err,
            FsError::Unsupported {
                operation: "rename".to_string()
            }
        );
    }

    #[test]
    fn implements_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(FsError::other("boom"));
        assert_eq!(err.to_string(), "boom");
    }
}

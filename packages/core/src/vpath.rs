//! Virtual path type and the namespace normalization rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::FsError;

/// A normalized absolute path in the virtual namespace.
///
/// Stored as a vector of validated components. The textual form is always
/// `/`-rooted with single `/` separators; the root path renders as `/`.
/// Parsing accepts both `/` and `\` separators, collapses repeats, drops
/// `.` segments and resolves `..` segments. A `..` that would climb above
/// the root is rejected rather than clamped.
///
/// # Examples
///
/// ```rust
/// use graftfs_core::VPath;
///
/// let p = VPath::parse("/docs//notes\\drafts/../a.txt").unwrap();
/// assert_eq!(p.to_string(), "/docs/notes/a.txt");
///
/// // Parsing its own display form is a fixed point
/// assert_eq!(VPath::parse(&p.to_string()).unwrap(), p);
/// ```
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct VPath {
    components: Vec<String>,
}

impl VPath {
    /// The namespace root.
    pub fn root() -> VPath {
        VPath {
            components: Vec::new(),
        }
    }

    /// Parse and normalize a path string.
    ///
    /// # Path Syntax
    ///
    /// - `/` and `\` both separate components
    /// - Repeated and trailing separators are collapsed
    /// - `.` segments are dropped, `..` pops the previous component
    /// - Empty input and bare separators normalize to the root
    ///
    /// # Errors
    ///
    /// `InvalidPath` when `..` would escape the root, or when a component
    /// is whitespace-only or contains a NUL byte.
    pub fn parse(input: &str) -> Result<VPath, FsError> {
        let mut components: Vec<String> = Vec::new();
        for segment in input.split(|c| c == '/' || c == '\\') {
            match segment {
                "" | "." => continue,
                ".." => {
                    if components.pop().is_none() {
                        return Err(FsError::invalid_path(input, "escapes the namespace root"));
                    }
                }
                other => {
                    Self::validate_component(input, other)?;
                    components.push(other.to_string());
                }
            }
        }
        Ok(VPath { components })
    }

    fn validate_component(input: &str, component: &str) -> Result<(), FsError> {
        if component.trim().is_empty() {
            return Err(FsError::invalid_path(input, "whitespace-only component"));
        }
        if component.contains('\0') {
            return Err(FsError::invalid_path(input, "NUL byte in component"));
        }
        Ok(())
    }

    /// Build a path from components that are already valid segments.
    pub(crate) fn from_components(components: Vec<String>) -> VPath {
        VPath { components }
    }

    /// True for the namespace root.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Number of components (0 for the root).
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// Iterate over components.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(String::as_str)
    }

    /// Final component, `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// Path with the final component dropped, `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<VPath> {
        if self.components.is_empty() {
            None
        } else {
            Some(VPath {
                components: self.components[..self.components.len() - 1].to_vec(),
            })
        }
    }

    /// Append another path's components to this one.
    #[must_use]
    pub fn join(&self, other: &VPath) -> VPath {
        let mut components = self.components.clone();
        components.extend(other.components.iter().cloned());
        VPath { components }
    }

    /// Append a single component.
    ///
    /// `name` must be one plain segment; it is not re-parsed. Listing
    /// entries and trie keys satisfy this by construction.
    #[must_use]
    pub fn child(&self, name: &str) -> VPath {
        debug_assert!(
            !name.is_empty() && !name.contains('/') && !name.contains('\\'),
            "child() takes a single path segment"
        );
        let mut components = self.components.clone();
        components.push(name.to_string());
        VPath { components }
    }

    /// Check whether `prefix` is an ancestor-or-self of this path.
    pub fn starts_with(&self, prefix: &VPath) -> bool {
        prefix.components.len() <= self.components.len()
            && prefix.components == self.components[..prefix.components.len()]
    }

    /// Strip an ancestor prefix, returning the remainder.
    ///
    /// Returns `None` if `prefix` is not an ancestor-or-self.
    #[must_use]
    pub fn strip_prefix(&self, prefix: &VPath) -> Option<VPath> {
        if self.starts_with(prefix) {
            Some(VPath {
                components: self.components[prefix.components.len()..].to_vec(),
            })
        } else {
            None
        }
    }
}

impl fmt::Display for VPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl FromStr for VPath {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VPath::parse(s)
    }
}

impl Serialize for VPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        VPath::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Macro for path literals in code and tests.
///
/// # Example
///
/// ```rust
/// use graftfs_core::vpath;
///
/// let p = vpath!("/users/alice");
/// assert_eq!(p.depth(), 2);
/// ```
#[macro_export]
macro_rules! vpath {
    ($s:expr) => {
        $crate::VPath::parse($s).expect("invalid path literal")
    };
}

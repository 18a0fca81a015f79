//! Prefix trie keyed by path components.
//!
//! Backs the mount table: lookups cost O(k) in path depth, and
//! `longest_prefix` implements deepest-mount-wins resolution.

use std::collections::BTreeMap;

use crate::vpath::VPath;

/// A prefix trie keyed by [`VPath`] components.
///
/// Each node optionally holds a value; children are indexed by component
/// in a `BTreeMap` so iteration comes out in sorted path order.
///
/// # Example
///
/// ```rust
/// use graftfs_core::{PathTrie, vpath};
///
/// let mut trie: PathTrie<i32> = PathTrie::new();
/// trie.insert(&vpath!("/a/b"), 1);
/// trie.insert(&vpath!("/a/b/c"), 2);
///
/// // Deepest value along the path wins; the suffix is what remains.
/// let (value, suffix) = trie.longest_prefix(&vpath!("/a/b/c/d")).unwrap();
/// assert_eq!(*value, 2);
/// assert_eq!(suffix, vpath!("/d"));
/// ```
#[derive(Debug, Clone)]
pub struct PathTrie<T> {
    value: Option<T>,
    children: BTreeMap<String, PathTrie<T>>,
}

impl<T> Default for PathTrie<T> {
    fn default() -> Self {
        PathTrie {
            value: None,
            children: BTreeMap::new(),
        }
    }
}

impl<T> PathTrie<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&self, path: &VPath) -> Option<&PathTrie<T>> {
        let mut current = self;
        for component in path.components() {
            current = current.children.get(component)?;
        }
        Some(current)
    }

    fn node_mut(&mut self, path: &VPath) -> Option<&mut PathTrie<T>> {
        let mut current = self;
        for component in path.components() {
            current = current.children.get_mut(component)?;
        }
        Some(current)
    }

    /// Insert a value at `path`, creating intermediate nodes. Returns the
    /// previous value at exactly that path, if any.
    pub fn insert(&mut self, path: &VPath, value: T) -> Option<T> {
        let mut current = self;
        for component in path.components() {
            current = current.children.entry(component.to_string()).or_default();
        }
        current.value.replace(value)
    }

    /// Remove and return the value at exactly `path`. Values deeper in the
    /// trie are untouched.
    pub fn remove(&mut self, path: &VPath) -> Option<T> {
        self.node_mut(path)?.value.take()
    }

    /// Value at exactly `path`.
    pub fn get(&self, path: &VPath) -> Option<&T> {
        self.node(path)?.value.as_ref()
    }

    /// Deepest value on the component chain of `path`, together with the
    /// path remainder below it.
    pub fn longest_prefix(&self, path: &VPath) -> Option<(&T, VPath)> {
        let mut current = self;
        let mut best: Option<&T> = self.value.as_ref();
        let mut best_depth = 0;

        for (depth, component) in path.components().enumerate() {
            match current.children.get(component) {
                Some(child) => {
                    current = child;
                    if child.value.is_some() {
                        best = child.value.as_ref();
                        best_depth = depth + 1;
                    }
                }
                None => break,
            }
        }

        best.map(|value| {
            let suffix = VPath::from_components(
                path.components()
                    .skip(best_depth)
                    .map(str::to_string)
                    .collect(),
            );
            (value, suffix)
        })
    }

    /// Number of values stored (not nodes).
    pub fn len(&self) -> usize {
        let own = usize::from(self.value.is_some());
        own + self.children.values().map(PathTrie::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.values().all(PathTrie::is_empty)
    }

    /// All `(path, value)` pairs in sorted path order.
    pub fn iter(&self) -> PathTrieIter<'_, T> {
        PathTrieIter {
            stack: vec![(VPath::root(), self)],
        }
    }
}

/// Iterator over `(VPath, &T)` pairs of a [`PathTrie`].
pub struct PathTrieIter<'a, T> {
    stack: Vec<(VPath, &'a PathTrie<T>)>,
}

impl<'a, T> Iterator for PathTrieIter<'a, T> {
    type Item = (VPath, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((path, node)) = self.stack.pop() {
            // Reverse so the BTreeMap order survives the stack.
            for (name, child) in node.children.iter().rev() {
                self.stack.push((path.child(name), child));
            }
            if let Some(ref value) = node.value {
                return Some((path, value));
            }
        }
        None
    }
}

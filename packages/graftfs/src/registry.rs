//! Registry of adapter factories, keyed by adapter kind.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use graftfs_core::{Adapter, AdapterFactory, AdapterOptions, FsError, Result};

type FactoryMap = BTreeMap<&'static str, Arc<dyn AdapterFactory>>;

/// Holds one [`AdapterFactory`] per kind and builds adapter instances for
/// [`mount`](crate::FsManager::mount) calls.
pub struct AdapterRegistry {
    factories: RwLock<FactoryMap>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(FactoryMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, FactoryMap> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a factory. Each kind can be registered once; a second
    /// registration under the same kind is an error.
    pub fn register(&self, factory: Arc<dyn AdapterFactory>) -> Result<()> {
        let mut factories = self
            .factories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let kind = factory.kind();
        if factories.contains_key(kind) {
            return Err(FsError::other(format!(
                "adapter kind '{kind}' is already registered"
            )));
        }
        factories.insert(kind, factory);
        Ok(())
    }

    /// Look up the factory for a kind.
    pub fn get(&self, kind: &str) -> Option<Arc<dyn AdapterFactory>> {
        self.read().get(kind).cloned()
    }

    /// Build an adapter instance of the given kind.
    pub fn create(&self, kind: &str, options: &AdapterOptions) -> Result<Arc<dyn Adapter>> {
        let factory = self
            .get(kind)
            .ok_or_else(|| FsError::unsupported(format!("adapter kind '{kind}'")))?;
        factory.create(options)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.read().keys().copied().collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graftfs_host::HostAdapterFactory;
    use graftfs_memory::MemoryAdapterFactory;

    #[test]
    fn registers_and_creates() {
        let registry = AdapterRegistry::new();
        registry
            .register(Arc::new(MemoryAdapterFactory))
            .unwrap();

        let adapter = registry.create("memory", &AdapterOptions::new()).unwrap();
        assert_eq!(adapter.kind(), "memory");
    }

    #[test]
    fn duplicate_kind_is_rejected() {
        let registry = AdapterRegistry::new();
        registry
            .register(Arc::new(MemoryAdapterFactory))
            .unwrap();

        let err = registry
            .register(Arc::new(MemoryAdapterFactory))
            .unwrap_err();
        assert!(matches!(err, FsError::Other { .. }));
    }

    #[test]
    fn unknown_kind_is_unsupported() {
        let registry = AdapterRegistry::new();
        let err = registry
            .create("nonesuch", &AdapterOptions::new())
            .err()
            .unwrap();
        assert!(matches!(err, FsError::Unsupported { .. }));
    }

    #[test]
    fn kinds_are_sorted() {
        let registry = AdapterRegistry::new();
        registry
            .register(Arc::new(MemoryAdapterFactory))
            .unwrap();
        registry
            .register(Arc::new(HostAdapterFactory))
            .unwrap();

        assert_eq!(registry.kinds(), vec!["host", "memory"]);
    }
}

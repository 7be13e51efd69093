//! Protocol registration state.

// RwLock.read()/write().unwrap() only panics on lock poisoning (prior panic
// while holding lock). This is intentional - corrupted state should not propagate.
#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::cache::{MemoryStatCache, StatCache};
use crate::error::{Error, Result};
use crate::fs::Filesystem;

#[derive(Default)]
struct ProtocolEntry {
    filesystem: Option<Arc<dyn Filesystem>>,
    cache: Option<Arc<dyn StatCache>>,
}

/// Registry mapping protocol names to filesystems and their stat caches.
///
/// This is the bridge's only shared state, held explicitly rather than as
/// ambient process globals: callers needing isolation construct their own
/// registry (or use distinct protocol names). Concurrent registration of
/// the same name is last-writer-wins.
#[derive(Default)]
pub struct ProtocolRegistry {
    protocols: RwLock<HashMap<String, ProtocolEntry>>,
}

impl std::fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let protocols: Vec<String> = self.protocols.read().unwrap().keys().cloned().collect();
        f.debug_struct("ProtocolRegistry")
            .field("protocols", &protocols)
            .finish()
    }
}

impl ProtocolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `filesystem` under `protocol`, replacing any prior
    /// registration.
    ///
    /// When `cache` is `None`, a cache that survived an earlier
    /// registration of the same protocol is kept; otherwise an in-memory
    /// cache is created.
    pub fn register(
        &self,
        filesystem: Arc<dyn Filesystem>,
        protocol: impl Into<String>,
        cache: Option<Arc<dyn StatCache>>,
    ) {
        let protocol = protocol.into();
        tracing::debug!(protocol = %protocol, backend = filesystem.name(), "registering protocol");

        let mut protocols = self.protocols.write().unwrap();
        let entry = protocols.entry(protocol).or_default();
        entry.filesystem = Some(filesystem);
        match cache {
            Some(cache) => entry.cache = Some(cache),
            None => {
                if entry.cache.is_none() {
                    entry.cache = Some(Arc::new(MemoryStatCache::new()));
                }
            }
        }
    }

    /// Clear the registration for `protocol`. Unknown names are a no-op.
    pub fn unregister(&self, protocol: &str) {
        let mut protocols = self.protocols.write().unwrap();
        if let Some(entry) = protocols.get_mut(protocol) {
            tracing::debug!(protocol = %protocol, "unregistering protocol");
            entry.filesystem = None;
            entry.cache = None;
        }
    }

    /// The filesystem registered under `protocol`.
    pub fn filesystem(&self, protocol: &str) -> Result<Arc<dyn Filesystem>> {
        self.protocols
            .read()
            .unwrap()
            .get(protocol)
            .and_then(|entry| entry.filesystem.clone())
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "no filesystem registered for protocol {protocol}"
                ))
            })
    }

    /// The stat cache registered under `protocol`, if any.
    pub fn cache(&self, protocol: &str) -> Option<Arc<dyn StatCache>> {
        self.protocols
            .read()
            .unwrap()
            .get(protocol)
            .and_then(|entry| entry.cache.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;

    #[test]
    fn test_lookup_unregistered_protocol() {
        let registry = ProtocolRegistry::new();
        let err = registry.filesystem("files").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_register_creates_default_cache() {
        let registry = ProtocolRegistry::new();
        registry.register(Arc::new(MemoryFs::new()), "files", None);
        assert!(registry.filesystem("files").is_ok());
        assert!(registry.cache("files").is_some());
    }

    #[test]
    fn test_reregister_keeps_existing_cache() {
        let registry = ProtocolRegistry::new();
        registry.register(Arc::new(MemoryFs::new()), "files", None);
        let cache = registry.cache("files").unwrap();

        registry.register(Arc::new(MemoryFs::new()), "files", None);
        assert!(Arc::ptr_eq(&cache, &registry.cache("files").unwrap()));
    }

    #[test]
    fn test_unregister_clears_configuration() {
        let registry = ProtocolRegistry::new();
        registry.register(Arc::new(MemoryFs::new()), "files", None);
        registry.unregister("files");
        assert!(registry.filesystem("files").is_err());
        assert!(registry.cache("files").is_none());

        // Unknown names are a no-op.
        registry.unregister("never-registered");
    }
}

//! Metadata-caching decorator.

// RwLock.read()/write().unwrap() only panics on lock poisoning (prior panic
// while holding lock). This is intentional - corrupted state should not propagate.
#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::path;
use super::traits::{Entry, Filesystem, Metadata, ReadStream, Visibility};
use crate::capability::{Capability, Directories, IncludeExecution, Profile};
use crate::error::{Error, Result};
use crate::mirror::{self, MirrorOptions};

/// Decorator that caches metadata and listings for the wrapped backend.
///
/// Content operations pass straight through. Mutations delegate and then
/// purge the affected cache entries, so repeated `metadata`/`has`/
/// `list_dir` calls between mutations hit the cache.
///
/// The decorator re-exposes the wrapped backend's capability profile as its
/// own: [`Filesystem::profile`] asks the inner backend and rebinds the
/// result, re-running verification with the decorator as subject.
pub struct CachedFs {
    inner: Arc<dyn Filesystem>,
    name: String,
    metadata_cache: RwLock<HashMap<String, Metadata>>,
    listing_cache: RwLock<HashMap<(String, bool), Vec<Entry>>>,
}

impl CachedFs {
    /// Wrap `inner` with a metadata cache.
    pub fn new(inner: Arc<dyn Filesystem>) -> Self {
        let name = format!("cached({})", inner.name());
        Self {
            inner,
            name,
            metadata_cache: RwLock::new(HashMap::new()),
            listing_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Drop cached records for `fs_path` and everything beneath it, along
    /// with all cached listings.
    fn purge(&self, fs_path: &str) {
        let mut metadata = self.metadata_cache.write().unwrap();
        metadata.retain(|key, _| !path::is_within(key, fs_path));
        drop(metadata);

        self.listing_cache.write().unwrap().clear();
    }
}

#[async_trait]
impl Filesystem for CachedFs {
    fn name(&self) -> &str {
        &self.name
    }

    fn profile(&self) -> Result<Profile> {
        self.inner.profile()?.rebind(self)
    }

    fn directories(&self) -> Option<&dyn Directories> {
        // Only claim the contract when the wrapped backend backs it.
        self.inner.directories().map(|_| self as &dyn Directories)
    }

    fn include_execution(&self) -> Option<&dyn IncludeExecution> {
        self.inner.include_execution()
    }

    async fn has(&self, fs_path: &str) -> Result<bool> {
        let fs_path = path::normalize(fs_path);
        if self.metadata_cache.read().unwrap().contains_key(&fs_path) {
            return Ok(true);
        }
        self.inner.has(&fs_path).await
    }

    async fn read(&self, fs_path: &str) -> Result<Vec<u8>> {
        self.inner.read(fs_path).await
    }

    async fn read_stream(&self, fs_path: &str) -> Result<ReadStream> {
        self.inner.read_stream(fs_path).await
    }

    async fn write(&self, fs_path: &str, contents: &[u8]) -> Result<()> {
        self.inner.write(fs_path, contents).await?;
        self.purge(&path::normalize(fs_path));
        Ok(())
    }

    async fn write_stream(&self, fs_path: &str, stream: ReadStream) -> Result<()> {
        self.inner.write_stream(fs_path, stream).await?;
        self.purge(&path::normalize(fs_path));
        Ok(())
    }

    async fn update(&self, fs_path: &str, contents: &[u8]) -> Result<()> {
        self.inner.update(fs_path, contents).await?;
        self.purge(&path::normalize(fs_path));
        Ok(())
    }

    async fn update_stream(&self, fs_path: &str, stream: ReadStream) -> Result<()> {
        self.inner.update_stream(fs_path, stream).await?;
        self.purge(&path::normalize(fs_path));
        Ok(())
    }

    async fn delete(&self, fs_path: &str) -> Result<bool> {
        let deleted = self.inner.delete(fs_path).await?;
        if deleted {
            self.purge(&path::normalize(fs_path));
        }
        Ok(deleted)
    }

    async fn create_dir(&self, fs_path: &str) -> Result<()> {
        self.inner.create_dir(fs_path).await?;
        self.purge(&path::normalize(fs_path));
        Ok(())
    }

    async fn delete_dir(&self, fs_path: &str) -> Result<bool> {
        let deleted = self.inner.delete_dir(fs_path).await?;
        if deleted {
            self.purge(&path::normalize(fs_path));
        }
        Ok(deleted)
    }

    async fn list_dir(&self, fs_path: &str, recursive: bool) -> Result<Vec<Entry>> {
        let key = (path::normalize(fs_path), recursive);
        if let Some(entries) = self.listing_cache.read().unwrap().get(&key) {
            return Ok(entries.clone());
        }

        let entries = self.inner.list_dir(&key.0, recursive).await?;
        self.listing_cache
            .write()
            .unwrap()
            .insert(key, entries.clone());
        Ok(entries)
    }

    async fn metadata(&self, fs_path: &str) -> Result<Metadata> {
        let fs_path = path::normalize(fs_path);
        if let Some(meta) = self.metadata_cache.read().unwrap().get(&fs_path) {
            return Ok(meta.clone());
        }

        let meta = self.inner.metadata(&fs_path).await?;
        self.metadata_cache
            .write()
            .unwrap()
            .insert(fs_path, meta.clone());
        Ok(meta)
    }

    async fn set_visibility(&self, fs_path: &str, visibility: Visibility) -> Result<()> {
        self.inner.set_visibility(fs_path, visibility).await?;
        self.purge(&path::normalize(fs_path));
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.inner.rename(from, to).await?;
        self.purge(&path::normalize(from));
        self.purge(&path::normalize(to));
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        self.inner.copy(from, to).await?;
        self.purge(&path::normalize(to));
        Ok(())
    }

    async fn mirror(&self, from: &str, to: &str, options: MirrorOptions) -> Result<()> {
        mirror::mirror_trees(self, from, self, to, options).await
    }
}

#[async_trait]
impl Directories for CachedFs {
    async fn has_dir(&self, fs_path: &str) -> Result<bool> {
        match self.inner.directories() {
            Some(dirs) => dirs.has_dir(fs_path).await,
            None => Err(Error::UnsupportedCapability {
                capability: Capability::Directories.label(),
                subject: self.name.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;
    use serde_json::json;

    fn cached_over_memory() -> (Arc<dyn Filesystem>, CachedFs) {
        let inner: Arc<dyn Filesystem> = Arc::new(MemoryFs::new());
        let cached = CachedFs::new(Arc::clone(&inner));
        (inner, cached)
    }

    #[tokio::test]
    async fn test_profile_rebinds_to_decorator() {
        let (_inner, cached) = cached_over_memory();
        let profile = cached.profile().unwrap();
        assert_eq!(profile.subject(), "cached(memory)");
        assert!(profile.supports(Capability::Directories));
    }

    #[tokio::test]
    async fn test_include_capability_passes_through() {
        let inner: Arc<dyn Filesystem> =
            Arc::new(MemoryFs::with_include_handler(|_, _| Ok(json!(true))));
        let cached = CachedFs::new(inner);
        let profile = cached.profile().unwrap();
        assert!(profile.supports(Capability::IncludeExecution));
        assert!(cached.include_execution().is_some());
    }

    #[tokio::test]
    async fn test_metadata_is_served_from_cache() {
        let (inner, cached) = cached_over_memory();
        inner.write("a.txt", b"one").await.unwrap();

        let before = cached.metadata("a.txt").await.unwrap();
        assert_eq!(before.size, 3);

        // Mutate behind the decorator's back: the stale record survives.
        inner.write("a.txt", b"longer").await.unwrap();
        let stale = cached.metadata("a.txt").await.unwrap();
        assert_eq!(stale.size, 3);
    }

    #[tokio::test]
    async fn test_mutation_through_decorator_purges() {
        let (_inner, cached) = cached_over_memory();
        cached.write("a.txt", b"one").await.unwrap();
        assert_eq!(cached.metadata("a.txt").await.unwrap().size, 3);

        cached.write("a.txt", b"longer").await.unwrap();
        assert_eq!(cached.metadata("a.txt").await.unwrap().size, 6);
    }

    #[tokio::test]
    async fn test_has_dir_delegates() {
        let (inner, cached) = cached_over_memory();
        inner.create_dir("d").await.unwrap();
        assert!(cached.has_dir("d").await.unwrap());
        assert!(!cached.has_dir("missing").await.unwrap());
    }
}

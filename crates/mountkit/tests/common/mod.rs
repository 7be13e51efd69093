//! Shared test fixtures.

// Not every test binary exercises every fixture method.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use mountkit::{
    async_trait, Directories, Entry, Filesystem, Metadata, MirrorOptions, Profile, ReadStream,
    Result, Visibility,
};

/// Delegating wrapper that counts backend calls and can hide the inner
/// backend's directory capability, standing in for a backend that only
/// emulates directories.
pub struct InstrumentedFs {
    inner: Arc<dyn Filesystem>,
    expose_directories: bool,
    pub metadata_calls: AtomicUsize,
    pub write_calls: AtomicUsize,
}

impl InstrumentedFs {
    pub fn new(inner: Arc<dyn Filesystem>) -> Self {
        Self {
            inner,
            expose_directories: true,
            metadata_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
        }
    }

    /// Hide the inner backend's directory capability.
    pub fn emulated(inner: Arc<dyn Filesystem>) -> Self {
        Self {
            expose_directories: false,
            ..Self::new(inner)
        }
    }

    pub fn metadata_count(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Filesystem for InstrumentedFs {
    fn name(&self) -> &str {
        "instrumented"
    }

    fn profile(&self) -> Result<Profile> {
        if self.expose_directories {
            self.inner.profile()?.rebind(self)
        } else {
            Ok(Profile::new(self.name()))
        }
    }

    fn directories(&self) -> Option<&dyn Directories> {
        if self.expose_directories {
            self.inner.directories()
        } else {
            None
        }
    }

    async fn has(&self, path: &str) -> Result<bool> {
        self.inner.has(path).await
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn read_stream(&self, path: &str) -> Result<ReadStream> {
        self.inner.read_stream(path).await
    }

    async fn write(&self, path: &str, contents: &[u8]) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.write(path, contents).await
    }

    async fn write_stream(&self, path: &str, stream: ReadStream) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.write_stream(path, stream).await
    }

    async fn update(&self, path: &str, contents: &[u8]) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.update(path, contents).await
    }

    async fn update_stream(&self, path: &str, stream: ReadStream) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.update_stream(path, stream).await
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        self.inner.delete(path).await
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        self.inner.create_dir(path).await
    }

    async fn delete_dir(&self, path: &str) -> Result<bool> {
        self.inner.delete_dir(path).await
    }

    async fn list_dir(&self, path: &str, recursive: bool) -> Result<Vec<Entry>> {
        self.inner.list_dir(path, recursive).await
    }

    async fn metadata(&self, path: &str) -> Result<Metadata> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.metadata(path).await
    }

    async fn timestamp(&self, path: &str) -> Result<SystemTime> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.timestamp(path).await
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        self.inner.set_visibility(path, visibility).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.inner.rename(from, to).await
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        self.inner.copy(from, to).await
    }

    async fn mirror(&self, from: &str, to: &str, options: MirrorOptions) -> Result<()> {
        self.inner.mirror(from, to, options).await
    }
}

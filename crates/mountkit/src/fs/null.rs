//! No-op filesystem backend.

use async_trait::async_trait;

use super::path;
use super::traits::{Entry, Filesystem, Metadata, ReadStream, Visibility};
use crate::error::{Error, Result};
use crate::mirror::{self, MirrorOptions};

/// Backend that reports nonexistence for everything.
///
/// Writes are accepted and discarded. The router mounts one of these when
/// asked to mount a location that does not exist, so lookups against the
/// prefix behave like an empty, unwritable store instead of failing at
/// mount time.
#[derive(Debug, Default)]
pub struct NullFs;

impl NullFs {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Filesystem for NullFs {
    fn name(&self) -> &str {
        "null"
    }

    async fn has(&self, _fs_path: &str) -> Result<bool> {
        Ok(false)
    }

    async fn read(&self, fs_path: &str) -> Result<Vec<u8>> {
        Err(Error::not_found(path::normalize(fs_path)))
    }

    async fn read_stream(&self, fs_path: &str) -> Result<ReadStream> {
        Err(Error::not_found(path::normalize(fs_path)))
    }

    async fn write(&self, _fs_path: &str, _contents: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn write_stream(&self, _fs_path: &str, _stream: ReadStream) -> Result<()> {
        Ok(())
    }

    async fn update(&self, fs_path: &str, _contents: &[u8]) -> Result<()> {
        Err(Error::not_found(path::normalize(fs_path)))
    }

    async fn update_stream(&self, fs_path: &str, _stream: ReadStream) -> Result<()> {
        Err(Error::not_found(path::normalize(fs_path)))
    }

    async fn delete(&self, _fs_path: &str) -> Result<bool> {
        Ok(false)
    }

    async fn create_dir(&self, _fs_path: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_dir(&self, _fs_path: &str) -> Result<bool> {
        Ok(false)
    }

    async fn list_dir(&self, _fs_path: &str, _recursive: bool) -> Result<Vec<Entry>> {
        Ok(Vec::new())
    }

    async fn metadata(&self, fs_path: &str) -> Result<Metadata> {
        Err(Error::not_found(path::normalize(fs_path)))
    }

    async fn set_visibility(&self, fs_path: &str, _visibility: Visibility) -> Result<()> {
        Err(Error::not_found(path::normalize(fs_path)))
    }

    async fn rename(&self, from: &str, _to: &str) -> Result<()> {
        Err(Error::not_found(path::normalize(from)))
    }

    async fn copy(&self, from: &str, _to: &str) -> Result<()> {
        Err(Error::not_found(path::normalize(from)))
    }

    async fn mirror(&self, from: &str, to: &str, options: MirrorOptions) -> Result<()> {
        mirror::mirror_trees(self, from, self, to, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capability, Profile};

    #[tokio::test]
    async fn test_reports_nonexistence() {
        let fs = NullFs::new();
        assert!(!fs.has("anything").await.unwrap());
        assert!(fs.read("anything").await.unwrap_err().is_not_found());
        assert!(fs.list_dir("", false).await.unwrap().is_empty());
        assert!(!fs.delete("anything").await.unwrap());
    }

    #[tokio::test]
    async fn test_writes_are_discarded() {
        let fs = NullFs::new();
        fs.write("a.txt", b"gone").await.unwrap();
        assert!(!fs.has("a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_profile_claims_nothing_and_enable_fails_fast() {
        let fs = NullFs::new();
        let profile = fs.profile().unwrap();
        assert!(!profile.supports(Capability::Directories));

        // Capability fail-fast: claiming directories without the contract
        // fails at enable, not at first use.
        let err = Profile::new("null")
            .enable(&fs, Capability::Directories)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedCapability { .. }));
    }
}

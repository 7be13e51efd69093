//! Prefix-based filesystem routing.
//!
//! A [`Router`] composes multiple [`Filesystem`] instances under string
//! prefixes and dispatches `"prefix://path"` calls to the right backend.
//! Prefixes match exactly; there is no partial or longest-prefix matching.

// RwLock.read()/write().unwrap() only panics on lock poisoning (prior panic
// while holding lock). This is intentional - corrupted state should not propagate.
#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::fs::{Entry, Filesystem, LocalFs, Metadata, NullFs, ReadStream, Visibility};
use crate::mirror::{self, MirrorOptions};

/// Separator between a mount prefix and the backend-relative path.
pub const PREFIX_SEPARATOR: &str = "://";

/// Routes filesystem operations to mounted backends by path prefix.
///
/// Every [`Filesystem`] operation resolves the prefix and delegates
/// verbatim, with two exceptions: `list_dir` stamps each returned entry
/// with the prefix it came from, and `copy` supports differing source and
/// destination prefixes by streaming through the source handle.
pub struct Router {
    mounts: RwLock<BTreeMap<String, Arc<dyn Filesystem>>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mounts: Vec<String> = self.mounts.read().unwrap().keys().cloned().collect();
        f.debug_struct("Router").field("mounts", &mounts).finish()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a router with no mounts.
    pub fn new() -> Self {
        Self {
            mounts: RwLock::new(BTreeMap::new()),
        }
    }

    /// Mount a filesystem under `prefix`, replacing any previous mount.
    pub fn mount(&self, prefix: impl Into<String>, fs: Arc<dyn Filesystem>) -> Result<()> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(Error::argument("mount prefix must be a non-empty string"));
        }
        tracing::debug!(prefix = %prefix, backend = fs.name(), "mounting filesystem");
        self.mounts.write().unwrap().insert(prefix, fs);
        Ok(())
    }

    /// Mount a raw location under `prefix`: a [`LocalFs`] when the location
    /// is an existing directory, otherwise a [`NullFs`].
    pub async fn mount_path(
        &self,
        prefix: impl Into<String>,
        location: impl AsRef<Path>,
    ) -> Result<()> {
        let location = location.as_ref();
        let fs: Arc<dyn Filesystem> = if location.is_dir() {
            Arc::new(LocalFs::new(location).await?)
        } else {
            Arc::new(NullFs::new())
        };
        self.mount(prefix, fs)
    }

    /// Remove the mount under `prefix`. Returns `true` if one was removed.
    pub fn unmount(&self, prefix: &str) -> bool {
        let removed = self.mounts.write().unwrap().remove(prefix).is_some();
        if removed {
            tracing::debug!(prefix = %prefix, "unmounted filesystem");
        }
        removed
    }

    /// The filesystem mounted under `prefix`.
    pub fn filesystem(&self, prefix: &str) -> Result<Arc<dyn Filesystem>> {
        self.mounts
            .read()
            .unwrap()
            .get(prefix)
            .cloned()
            .ok_or_else(|| Error::MountNotFound {
                prefix: prefix.to_string(),
            })
    }

    /// Currently mounted prefixes.
    pub fn mounts(&self) -> Vec<String> {
        self.mounts.read().unwrap().keys().cloned().collect()
    }

    /// Split `"prefix://path"` into its parts.
    ///
    /// Fails with an argument error when the separator is missing or the
    /// prefix is empty.
    pub fn split_prefix(path: &str) -> Result<(&str, &str)> {
        match path.split_once(PREFIX_SEPARATOR) {
            Some((prefix, rest)) if !prefix.is_empty() => Ok((prefix, rest)),
            _ => Err(Error::argument(format!("no prefix detected in path: {path}"))),
        }
    }

    /// Resolve a prefixed path to (backend, backend-relative path).
    pub fn resolve(&self, path: &str) -> Result<(Arc<dyn Filesystem>, String)> {
        let (prefix, rest) = Self::split_prefix(path)?;
        Ok((self.filesystem(prefix)?, rest.to_string()))
    }
}

#[async_trait]
impl Filesystem for Router {
    fn name(&self) -> &str {
        "router"
    }

    async fn has(&self, path: &str) -> Result<bool> {
        let (fs, rest) = self.resolve(path)?;
        fs.has(&rest).await
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let (fs, rest) = self.resolve(path)?;
        fs.read(&rest).await
    }

    async fn read_stream(&self, path: &str) -> Result<ReadStream> {
        let (fs, rest) = self.resolve(path)?;
        fs.read_stream(&rest).await
    }

    async fn write(&self, path: &str, contents: &[u8]) -> Result<()> {
        let (fs, rest) = self.resolve(path)?;
        fs.write(&rest, contents).await
    }

    async fn write_stream(&self, path: &str, stream: ReadStream) -> Result<()> {
        let (fs, rest) = self.resolve(path)?;
        fs.write_stream(&rest, stream).await
    }

    async fn update(&self, path: &str, contents: &[u8]) -> Result<()> {
        let (fs, rest) = self.resolve(path)?;
        fs.update(&rest, contents).await
    }

    async fn update_stream(&self, path: &str, stream: ReadStream) -> Result<()> {
        let (fs, rest) = self.resolve(path)?;
        fs.update_stream(&rest, stream).await
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let (fs, rest) = self.resolve(path)?;
        fs.delete(&rest).await
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let (fs, rest) = self.resolve(path)?;
        fs.create_dir(&rest).await
    }

    async fn delete_dir(&self, path: &str) -> Result<bool> {
        let (fs, rest) = self.resolve(path)?;
        fs.delete_dir(&rest).await
    }

    async fn list_dir(&self, path: &str, recursive: bool) -> Result<Vec<Entry>> {
        let (prefix, rest) = Self::split_prefix(path)?;
        let fs = self.filesystem(prefix)?;

        let mut entries = fs.list_dir(rest, recursive).await?;
        for entry in &mut entries {
            entry.filesystem = Some(prefix.to_string());
        }
        Ok(entries)
    }

    async fn metadata(&self, path: &str) -> Result<Metadata> {
        let (fs, rest) = self.resolve(path)?;
        fs.metadata(&rest).await
    }

    async fn size(&self, path: &str) -> Result<u64> {
        let (fs, rest) = self.resolve(path)?;
        fs.size(&rest).await
    }

    async fn mimetype(&self, path: &str) -> Result<Option<String>> {
        let (fs, rest) = self.resolve(path)?;
        fs.mimetype(&rest).await
    }

    async fn timestamp(&self, path: &str) -> Result<SystemTime> {
        let (fs, rest) = self.resolve(path)?;
        fs.timestamp(&rest).await
    }

    async fn visibility(&self, path: &str) -> Result<Visibility> {
        let (fs, rest) = self.resolve(path)?;
        fs.visibility(&rest).await
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        let (fs, rest) = self.resolve(path)?;
        fs.set_visibility(&rest, visibility).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let (from_fs, from_rest) = self.resolve(from)?;
        let (to_fs, to_rest) = self.resolve(to)?;

        if !Arc::ptr_eq(&from_fs, &to_fs) {
            return Err(Error::argument(
                "cannot rename across mounts; copy then delete",
            ));
        }
        from_fs.rename(&from_rest, &to_rest).await
    }

    /// Copy between possibly different mounts by streaming the source into
    /// the destination. The intermediate handle is dropped on every exit
    /// path; a failed source open never reaches the write.
    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let (from_fs, from_rest) = self.resolve(from)?;
        let stream = from_fs.read_stream(&from_rest).await?;

        let (to_fs, to_rest) = self.resolve(to)?;
        to_fs.write_stream(&to_rest, stream).await
    }

    async fn mirror(&self, from: &str, to: &str, options: MirrorOptions) -> Result<()> {
        let (from_fs, from_rest) = self.resolve(from)?;
        let (to_fs, to_rest) = self.resolve(to)?;

        if Arc::ptr_eq(&from_fs, &to_fs) {
            return from_fs.mirror(&from_rest, &to_rest, options).await;
        }
        mirror::mirror_trees(
            from_fs.as_ref(),
            &from_rest,
            to_fs.as_ref(),
            &to_rest,
            options,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;

    fn router_with_memory(prefixes: &[&str]) -> Router {
        let router = Router::new();
        for prefix in prefixes {
            router
                .mount(*prefix, Arc::new(MemoryFs::new()))
                .expect("mount");
        }
        router
    }

    #[test]
    fn test_split_prefix() {
        assert_eq!(
            Router::split_prefix("files://a/b.txt").unwrap(),
            ("files", "a/b.txt")
        );
        assert_eq!(Router::split_prefix("files://").unwrap(), ("files", ""));
        assert!(matches!(
            Router::split_prefix("no-separator"),
            Err(Error::Argument(_))
        ));
        assert!(matches!(
            Router::split_prefix("://orphan"),
            Err(Error::Argument(_))
        ));
    }

    #[test]
    fn test_resolve_unmounted_prefix() {
        let router = router_with_memory(&["files"]);
        let err = router.resolve("cache://x").unwrap_err();
        assert!(matches!(err, Error::MountNotFound { .. }));
    }

    #[test]
    fn test_mount_rejects_empty_prefix() {
        let router = Router::new();
        let err = router.mount("", Arc::new(MemoryFs::new())).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn test_exact_prefix_match_only() {
        let router = router_with_memory(&["files"]);
        // "file" is not a partial match for "files".
        assert!(matches!(
            router.resolve("file://a"),
            Err(Error::MountNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_round_trip_through_router() {
        let router = router_with_memory(&["files"]);
        router.write("files://a/b.txt", b"payload").await.unwrap();
        assert!(router.has("files://a/b.txt").await.unwrap());
        assert_eq!(router.read("files://a/b.txt").await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_list_dir_stamps_prefix() {
        let router = router_with_memory(&["files"]);
        router.write("files://docs/a.txt", b"x").await.unwrap();

        let entries = router.list_dir("files://docs", false).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filesystem.as_deref(), Some("files"));
        assert_eq!(entries[0].path, "docs/a.txt");
    }

    #[tokio::test]
    async fn test_copy_across_mounts() {
        let router = router_with_memory(&["src", "dst"]);
        router.write("src://data.bin", b"cross").await.unwrap();

        router.copy("src://data.bin", "dst://copied.bin").await.unwrap();
        assert_eq!(router.read("dst://copied.bin").await.unwrap(), b"cross");
        // Source untouched.
        assert_eq!(router.read("src://data.bin").await.unwrap(), b"cross");
    }

    #[tokio::test]
    async fn test_copy_missing_source_never_writes() {
        let router = router_with_memory(&["src", "dst"]);
        let err = router.copy("src://nope", "dst://out").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!router.has("dst://out").await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_across_mounts_rejected() {
        let router = router_with_memory(&["a", "b"]);
        router.write("a://f.txt", b"x").await.unwrap();
        let err = router.rename("a://f.txt", "b://f.txt").await.unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[tokio::test]
    async fn test_mount_path_missing_location_is_null() {
        let router = Router::new();
        router
            .mount_path("ghost", "/definitely/not/a/real/location")
            .await
            .unwrap();
        assert!(!router.has("ghost://anything").await.unwrap());
    }

    #[tokio::test]
    async fn test_remount_replaces() {
        let router = router_with_memory(&["files"]);
        router.write("files://a.txt", b"old").await.unwrap();

        router.mount("files", Arc::new(MemoryFs::new())).unwrap();
        assert!(!router.has("files://a.txt").await.unwrap());
    }

    #[test]
    fn test_mounts_introspection() {
        let router = router_with_memory(&["b", "a"]);
        assert_eq!(router.mounts(), vec!["a".to_string(), "b".to_string()]);
    }
}

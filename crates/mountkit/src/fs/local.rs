//! Local-disk filesystem backend.

use async_trait::async_trait;
use std::io::{Error as IoError, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::io::AsyncWriteExt;

use super::path;
use super::traits::{Entry, Filesystem, Metadata, ReadStream, Visibility};
use crate::capability::{
    Capability, Directories, IncludeExecution, IncludeOutcome, IncludeState, Profile,
};
use crate::error::{Error, Result};
use crate::mirror::{self, MirrorOptions};

#[cfg(unix)]
const DIR_MODE_PUBLIC: u32 = 0o755;
#[cfg(unix)]
const DIR_MODE_PRIVATE: u32 = 0o700;
#[cfg(unix)]
const FILE_MODE_PUBLIC: u32 = 0o644;
#[cfg(unix)]
const FILE_MODE_PRIVATE: u32 = 0o600;

/// Filesystem backend rooted at a local directory.
///
/// All operations pass through to `tokio::fs`, with paths resolved against
/// the root. The profile claims [`Capability::Directories`] (the disk has
/// real directories) and [`Capability::NativeStreams`] (`read_stream` hands
/// back the opened file).
pub struct LocalFs {
    root: PathBuf,
    include: Option<IncludeState>,
}

impl LocalFs {
    /// Open a backend rooted at `root`, creating the directory if missing.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        Self::ensure_root(&root).await?;
        Ok(Self {
            root,
            include: None,
        })
    }

    /// Like [`LocalFs::new`], with stored files executable through
    /// `handler`.
    pub async fn with_include_handler(
        root: impl Into<PathBuf>,
        handler: impl Fn(&str, &[u8]) -> std::result::Result<serde_json::Value, String>
        + Send
        + Sync
        + 'static,
    ) -> Result<Self> {
        let mut fs = Self::new(root).await?;
        fs.include = Some(IncludeState::new(handler));
        Ok(fs)
    }

    /// The root directory this backend operates under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn ensure_root(root: &Path) -> Result<()> {
        if tokio::fs::try_exists(root).await? {
            return Ok(());
        }
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|_| Error::DirectoryCreation {
                path: root.display().to_string(),
            })?;
        // create_dir_all is narrowed by the process umask; apply the
        // intended mode explicitly afterwards.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(root, std::fs::Permissions::from_mode(DIR_MODE_PUBLIC))
                .await?;
        }
        Ok(())
    }

    /// Resolve a backend-relative path to (normalized relative, absolute).
    fn resolve(&self, fs_path: &str) -> (String, PathBuf) {
        let rel = path::normalize(fs_path);
        let full = if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&rel)
        };
        (rel, full)
    }

    async fn ensure_parent(&self, full: &Path) -> Result<()> {
        if let Some(parent) = full.parent() {
            if !tokio::fs::try_exists(parent).await? {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|_| Error::DirectoryCreation {
                        path: parent.display().to_string(),
                    })?;
            }
        }
        Ok(())
    }

    fn map_not_found(err: IoError, rel: &str) -> Error {
        if err.kind() == ErrorKind::NotFound {
            Error::not_found(rel)
        } else {
            Error::Io(err)
        }
    }

    fn metadata_from_std(rel: &str, meta: &std::fs::Metadata) -> Metadata {
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let mut out = if meta.is_dir() {
            Metadata::directory(rel, modified)
        } else {
            Metadata::file(rel, meta.len(), modified)
        };
        out.visibility = Self::visibility_from_std(meta);
        out
    }

    #[cfg(unix)]
    fn visibility_from_std(meta: &std::fs::Metadata) -> Visibility {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o044 != 0 {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }

    #[cfg(not(unix))]
    fn visibility_from_std(_meta: &std::fs::Metadata) -> Visibility {
        Visibility::Public
    }

    async fn list_one(&self, dir_rel: &str, dir_full: &Path) -> Result<Vec<Entry>> {
        let mut reader = tokio::fs::read_dir(dir_full)
            .await
            .map_err(|err| Self::map_not_found(err, dir_rel))?;

        let mut entries = Vec::new();
        while let Some(dirent) = reader.next_entry().await? {
            let name = dirent.file_name().to_string_lossy().to_string();
            let rel = path::join(dir_rel, &name);
            let meta = dirent.metadata().await?;
            entries.push(Entry::from_metadata(&Self::metadata_from_std(&rel, &meta)));
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

#[async_trait]
impl Filesystem for LocalFs {
    fn name(&self) -> &str {
        "local"
    }

    fn profile(&self) -> Result<Profile> {
        let profile = Profile::new(self.name())
            .enable(self, Capability::Directories)?
            .enable(self, Capability::NativeStreams)?;
        if self.include.is_some() {
            profile.enable(self, Capability::IncludeExecution)
        } else {
            Ok(profile)
        }
    }

    fn directories(&self) -> Option<&dyn Directories> {
        Some(self)
    }

    fn include_execution(&self) -> Option<&dyn IncludeExecution> {
        self.include
            .as_ref()
            .map(|_| self as &dyn IncludeExecution)
    }

    async fn has(&self, fs_path: &str) -> Result<bool> {
        let (_, full) = self.resolve(fs_path);
        Ok(tokio::fs::try_exists(&full).await?)
    }

    async fn read(&self, fs_path: &str) -> Result<Vec<u8>> {
        let (rel, full) = self.resolve(fs_path);
        tokio::fs::read(&full)
            .await
            .map_err(|err| Self::map_not_found(err, &rel))
    }

    async fn read_stream(&self, fs_path: &str) -> Result<ReadStream> {
        let (rel, full) = self.resolve(fs_path);
        let file = tokio::fs::File::open(&full)
            .await
            .map_err(|err| Self::map_not_found(err, &rel))?;
        Ok(Box::new(file))
    }

    async fn write(&self, fs_path: &str, contents: &[u8]) -> Result<()> {
        let (_, full) = self.resolve(fs_path);
        self.ensure_parent(&full).await?;
        tokio::fs::write(&full, contents).await?;
        Ok(())
    }

    async fn write_stream(&self, fs_path: &str, mut stream: ReadStream) -> Result<()> {
        let (_, full) = self.resolve(fs_path);
        self.ensure_parent(&full).await?;
        let mut file = tokio::fs::File::create(&full).await?;
        tokio::io::copy(&mut stream, &mut file).await?;
        file.flush().await?;
        Ok(())
    }

    async fn update(&self, fs_path: &str, contents: &[u8]) -> Result<()> {
        let (rel, full) = self.resolve(fs_path);
        if !tokio::fs::try_exists(&full).await? {
            return Err(Error::not_found(rel));
        }
        tokio::fs::write(&full, contents).await?;
        Ok(())
    }

    async fn update_stream(&self, fs_path: &str, stream: ReadStream) -> Result<()> {
        let (rel, full) = self.resolve(fs_path);
        if !tokio::fs::try_exists(&full).await? {
            return Err(Error::not_found(rel));
        }
        self.write_stream(fs_path, stream).await
    }

    async fn delete(&self, fs_path: &str) -> Result<bool> {
        let (_, full) = self.resolve(fs_path);
        // Writability pre-check: a missing or non-writable target is a
        // definitive `false`, not an error.
        let meta = match tokio::fs::metadata(&full).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        if meta.is_dir() || meta.permissions().readonly() {
            return Ok(false);
        }
        tokio::fs::remove_file(&full).await?;
        Ok(true)
    }

    async fn create_dir(&self, fs_path: &str) -> Result<()> {
        let (rel, full) = self.resolve(fs_path);
        if tokio::fs::try_exists(&full).await? {
            let meta = tokio::fs::metadata(&full).await?;
            if meta.is_dir() {
                return Ok(());
            }
            return Err(Error::DirectoryCreation { path: rel });
        }
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|_| Error::DirectoryCreation { path: rel })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&full, std::fs::Permissions::from_mode(DIR_MODE_PUBLIC))
                .await?;
        }
        Ok(())
    }

    async fn delete_dir(&self, fs_path: &str) -> Result<bool> {
        let (_, full) = self.resolve(fs_path);
        let meta = match tokio::fs::metadata(&full).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        if !meta.is_dir() || meta.permissions().readonly() {
            return Ok(false);
        }
        tokio::fs::remove_dir_all(&full).await?;
        Ok(true)
    }

    async fn list_dir(&self, fs_path: &str, recursive: bool) -> Result<Vec<Entry>> {
        let (rel, full) = self.resolve(fs_path);

        if !recursive {
            return self.list_one(&rel, &full).await;
        }

        let mut result = Vec::new();
        let mut queue = vec![(rel, full)];
        while let Some((dir_rel, dir_full)) = queue.pop() {
            let entries = self.list_one(&dir_rel, &dir_full).await?;
            for entry in &entries {
                if entry.kind.is_dir() {
                    queue.push((entry.path.clone(), self.root.join(&entry.path)));
                }
            }
            result.extend(entries);
        }

        result.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(result)
    }

    async fn metadata(&self, fs_path: &str) -> Result<Metadata> {
        let (rel, full) = self.resolve(fs_path);
        let meta = tokio::fs::metadata(&full)
            .await
            .map_err(|err| Self::map_not_found(err, &rel))?;
        Ok(Self::metadata_from_std(&rel, &meta))
    }

    async fn set_visibility(&self, fs_path: &str, visibility: Visibility) -> Result<()> {
        let (rel, full) = self.resolve(fs_path);
        let meta = tokio::fs::metadata(&full)
            .await
            .map_err(|err| Self::map_not_found(err, &rel))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = match (meta.is_dir(), visibility) {
                (true, Visibility::Public) => DIR_MODE_PUBLIC,
                (true, Visibility::Private) => DIR_MODE_PRIVATE,
                (false, Visibility::Public) => FILE_MODE_PUBLIC,
                (false, Visibility::Private) => FILE_MODE_PRIVATE,
            };
            tokio::fs::set_permissions(&full, std::fs::Permissions::from_mode(mode)).await?;
        }
        #[cfg(not(unix))]
        {
            let _ = (meta, visibility);
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let (from_rel, from_full) = self.resolve(from);
        let (_, to_full) = self.resolve(to);
        self.ensure_parent(&to_full).await?;
        tokio::fs::rename(&from_full, &to_full)
            .await
            .map_err(|err| Self::map_not_found(err, &from_rel))
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let (from_rel, from_full) = self.resolve(from);
        let (_, to_full) = self.resolve(to);
        self.ensure_parent(&to_full).await?;
        tokio::fs::copy(&from_full, &to_full)
            .await
            .map_err(|err| Self::map_not_found(err, &from_rel))?;
        Ok(())
    }

    async fn mirror(&self, from: &str, to: &str, options: MirrorOptions) -> Result<()> {
        mirror::mirror_trees(self, from, self, to, options).await
    }
}

#[async_trait]
impl Directories for LocalFs {
    async fn has_dir(&self, fs_path: &str) -> Result<bool> {
        let (_, full) = self.resolve(fs_path);
        match tokio::fs::metadata(&full).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl IncludeExecution for LocalFs {
    async fn include_file(&self, fs_path: &str, once: bool) -> Result<IncludeOutcome> {
        let state = self.include.as_ref().ok_or(Error::UnsupportedCapability {
            capability: Capability::IncludeExecution.label(),
            subject: self.name().to_string(),
        })?;

        let rel = path::normalize(fs_path);
        if once && state.already_included(&rel) {
            return Ok(IncludeOutcome::AlreadyIncluded);
        }

        let contents = self.read(&rel).await?;
        state.run(&rel, &contents, once)
    }
}

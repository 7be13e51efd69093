//! Filesystem trait definitions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::io::AsyncRead;

use crate::capability::{Directories, IncludeExecution, Profile};
use crate::error::Result;
use crate::mirror::MirrorOptions;

/// A readable byte stream handed out by a backend.
///
/// Backends with native stream support return the underlying handle;
/// emulating backends return a cursor over a buffered copy. The
/// `NativeStreams` capability on the backend's [`Profile`] tells the two
/// apart.
pub type ReadStream = Box<dyn AsyncRead + Send + Unpin>;

/// Entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl EntryKind {
    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        matches!(self, EntryKind::File)
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

/// Visibility of a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// Metadata for a file or directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Path relative to the backend root.
    pub path: String,
    /// Entry type.
    pub kind: EntryKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Entry visibility.
    pub visibility: Visibility,
    /// Guessed mimetype. None for directories.
    pub mimetype: Option<String>,
}

impl Metadata {
    /// Metadata for a file.
    pub fn file(path: impl Into<String>, size: u64, modified: SystemTime) -> Self {
        let path = path.into();
        let mimetype = Some(super::mime::guess_mimetype(&path).to_string());
        Self {
            path,
            kind: EntryKind::File,
            size,
            modified,
            visibility: Visibility::Public,
            mimetype,
        }
    }

    /// Metadata for a directory.
    pub fn directory(path: impl Into<String>, modified: SystemTime) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            size: 0,
            modified,
            visibility: Visibility::Public,
            mimetype: None,
        }
    }

    /// Seconds since the Unix epoch for the modification time.
    pub fn unix_timestamp(&self) -> i64 {
        match self.modified.duration_since(SystemTime::UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_secs() as i64,
            Err(before) => -(before.duration().as_secs() as i64),
        }
    }
}

/// A directory listing entry.
///
/// `filesystem` is empty for entries listed straight off a backend; the
/// router stamps it with the mount prefix the entry came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// Mount prefix the entry was listed through, if any.
    pub filesystem: Option<String>,
    /// Path relative to the backend root.
    pub path: String,
    /// Entry type.
    pub kind: EntryKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
}

impl Entry {
    /// Build an entry from metadata.
    pub fn from_metadata(meta: &Metadata) -> Self {
        Self {
            filesystem: None,
            path: meta.path.clone(),
            kind: meta.kind,
            size: meta.size,
            modified: meta.modified,
        }
    }
}

/// Abstract filesystem interface.
///
/// Every backend and every composed filesystem (router, decorators)
/// implements this trait. Paths are `/`-separated strings relative to the
/// backend root; the empty string addresses the root itself.
///
/// Optional behaviors (true directory semantics, include-execution) are
/// negotiated through [`Profile`] and surfaced through the capability
/// accessors rather than probed at call time.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Short name describing this backend; used as the default profile
    /// subject and in error messages.
    fn name(&self) -> &str;

    /// The capability profile describing this backend.
    ///
    /// The default claims nothing. Decorators delegate to the wrapped
    /// backend and rebind the result to themselves.
    fn profile(&self) -> Result<Profile> {
        Ok(Profile::new(self.name()))
    }

    /// Access the directory-semantics contract, when implemented.
    fn directories(&self) -> Option<&dyn Directories> {
        None
    }

    /// Access the include-execution contract, when implemented.
    fn include_execution(&self) -> Option<&dyn IncludeExecution> {
        None
    }

    /// Check whether a path exists.
    async fn has(&self, path: &str) -> Result<bool>;

    /// Read the entire contents of a file.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Open a file for reading as a byte stream.
    async fn read_stream(&self, path: &str) -> Result<ReadStream>;

    /// Write contents to a file, creating it (and missing parent
    /// directories) if needed, replacing it otherwise.
    async fn write(&self, path: &str, contents: &[u8]) -> Result<()>;

    /// Write a byte stream to a file, with `write` semantics.
    async fn write_stream(&self, path: &str, stream: ReadStream) -> Result<()>;

    /// Replace the contents of an existing file.
    ///
    /// Fails with `FileNotFound` when the target does not exist.
    async fn update(&self, path: &str, contents: &[u8]) -> Result<()>;

    /// Replace the contents of an existing file from a byte stream.
    async fn update_stream(&self, path: &str, stream: ReadStream) -> Result<()>;

    /// Delete a file.
    ///
    /// Returns `Ok(false)` for a missing or non-writable target; errors are
    /// reserved for unexpected I/O faults.
    async fn delete(&self, path: &str) -> Result<bool>;

    /// Create a directory, including missing parents.
    async fn create_dir(&self, path: &str) -> Result<()>;

    /// Delete a directory and its contents.
    ///
    /// Returns `Ok(false)` for a missing or non-writable target; errors are
    /// reserved for unexpected I/O faults.
    async fn delete_dir(&self, path: &str) -> Result<bool>;

    /// List a directory.
    ///
    /// With `recursive` set, nested entries are included, parents before
    /// children. Entry order is otherwise backend-defined.
    async fn list_dir(&self, path: &str, recursive: bool) -> Result<Vec<Entry>>;

    /// Get metadata for a file or directory.
    async fn metadata(&self, path: &str) -> Result<Metadata>;

    /// Size of a file in bytes.
    async fn size(&self, path: &str) -> Result<u64> {
        Ok(self.metadata(path).await?.size)
    }

    /// Guessed mimetype of a file. None for directories.
    async fn mimetype(&self, path: &str) -> Result<Option<String>> {
        Ok(self.metadata(path).await?.mimetype)
    }

    /// Last modification time.
    async fn timestamp(&self, path: &str) -> Result<SystemTime> {
        Ok(self.metadata(path).await?.modified)
    }

    /// Entry visibility.
    async fn visibility(&self, path: &str) -> Result<Visibility> {
        Ok(self.metadata(path).await?.visibility)
    }

    /// Change entry visibility.
    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()>;

    /// Rename/move an entry.
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Copy a file within this filesystem.
    async fn copy(&self, from: &str, to: &str) -> Result<()>;

    /// Mirror the subtree at `from` onto `to` within this filesystem.
    ///
    /// This is the backend-local primitive behind
    /// [`mirror`](crate::mirror::mirror), which delegates here when origin
    /// and target share a filesystem instance.
    async fn mirror(&self, from: &str, to: &str, options: MirrorOptions) -> Result<()>;
}

impl std::fmt::Debug for dyn Filesystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filesystem")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

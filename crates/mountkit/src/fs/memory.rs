//! In-memory filesystem backend.

// RwLock.read()/write().unwrap() only panics on lock poisoning (prior panic
// while holding lock). This is intentional - corrupted state should not propagate.
#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{Cursor, Error as IoError};
use std::sync::RwLock;
use std::time::SystemTime;
use tokio::io::AsyncReadExt;

use super::path;
use super::traits::{Entry, EntryKind, Filesystem, Metadata, ReadStream, Visibility};
use crate::capability::{
    Capability, Directories, IncludeExecution, IncludeOutcome, IncludeState, Profile,
};
use crate::error::{Error, Result};
use crate::mirror::{self, MirrorOptions};

/// In-memory filesystem with true directory nodes.
///
/// Directories are stored as real entries, so `has` and `metadata` answer
/// for them; the profile claims [`Capability::Directories`]. Streams are
/// cursors over buffered copies, so `NativeStreams` is not claimed.
///
/// An include handler may be attached at construction, in which case the
/// profile additionally claims [`Capability::IncludeExecution`] and the
/// backend tracks which paths already executed.
pub struct MemoryFs {
    nodes: RwLock<HashMap<String, Node>>,
    include: Option<IncludeState>,
}

#[derive(Debug, Clone)]
enum Node {
    File {
        contents: Vec<u8>,
        modified: SystemTime,
        visibility: Visibility,
    },
    Directory {
        modified: SystemTime,
        visibility: Visibility,
    },
}

impl Node {
    fn directory() -> Self {
        Node::Directory {
            modified: SystemTime::now(),
            visibility: Visibility::Public,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Node::Directory { .. })
    }

    fn metadata(&self, node_path: &str) -> Metadata {
        match self {
            Node::File {
                contents,
                modified,
                visibility,
            } => {
                let mut meta = Metadata::file(node_path, contents.len() as u64, *modified);
                meta.visibility = *visibility;
                meta
            }
            Node::Directory {
                modified,
                visibility,
            } => {
                let mut meta = Metadata::directory(node_path, *modified);
                meta.visibility = *visibility;
                meta
            }
        }
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create an empty in-memory filesystem.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(String::new(), Node::directory());
        Self {
            nodes: RwLock::new(nodes),
            include: None,
        }
    }

    /// Create an in-memory filesystem whose stored files can be executed
    /// through `handler`.
    pub fn with_include_handler(
        handler: impl Fn(&str, &[u8]) -> std::result::Result<serde_json::Value, String>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        let mut fs = Self::new();
        fs.include = Some(IncludeState::new(handler));
        fs
    }

    /// Insert directory nodes for every missing ancestor of `node_path`.
    fn ensure_parents(nodes: &mut HashMap<String, Node>, node_path: &str) -> Result<()> {
        let mut ancestor = path::parent(node_path);
        let mut missing = Vec::new();

        loop {
            match nodes.get(ancestor) {
                Some(node) if node.is_dir() => break,
                Some(_) => {
                    return Err(
                        IoError::other(format!("{} is not a directory", ancestor)).into(),
                    );
                }
                None => {
                    missing.push(ancestor.to_string());
                    if ancestor.is_empty() {
                        break;
                    }
                }
            }
            ancestor = path::parent(ancestor);
        }

        for dir in missing {
            nodes.insert(dir, Node::directory());
        }
        Ok(())
    }

    fn put(&self, node_path: &str, contents: &[u8]) -> Result<()> {
        let mut nodes = self.nodes.write().unwrap();
        if let Some(node) = nodes.get(node_path) {
            if node.is_dir() {
                return Err(IoError::other("is a directory").into());
            }
        }
        Self::ensure_parents(&mut nodes, node_path)?;
        nodes.insert(
            node_path.to_string(),
            Node::File {
                contents: contents.to_vec(),
                modified: SystemTime::now(),
                visibility: Visibility::Public,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl Filesystem for MemoryFs {
    fn name(&self) -> &str {
        "memory"
    }

    fn profile(&self) -> Result<Profile> {
        let profile = Profile::new(self.name()).enable(self, Capability::Directories)?;
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
        let fs_path = path::normalize(fs_path);
        Ok(self.nodes.read().unwrap().contains_key(&fs_path))
    }

    async fn read(&self, fs_path: &str) -> Result<Vec<u8>> {
        let fs_path = path::normalize(fs_path);
        match self.nodes.read().unwrap().get(&fs_path) {
            Some(Node::File { contents, .. }) => Ok(contents.clone()),
            Some(Node::Directory { .. }) => Err(IoError::other("is a directory").into()),
            None => Err(Error::not_found(fs_path)),
        }
    }

    async fn read_stream(&self, fs_path: &str) -> Result<ReadStream> {
        let contents = self.read(fs_path).await?;
        Ok(Box::new(Cursor::new(contents)))
    }

    async fn write(&self, fs_path: &str, contents: &[u8]) -> Result<()> {
        self.put(&path::normalize(fs_path), contents)
    }

    async fn write_stream(&self, fs_path: &str, mut stream: ReadStream) -> Result<()> {
        let mut contents = Vec::new();
        stream.read_to_end(&mut contents).await?;
        self.put(&path::normalize(fs_path), &contents)
    }

    async fn update(&self, fs_path: &str, contents: &[u8]) -> Result<()> {
        let fs_path = path::normalize(fs_path);
        if !self.has(&fs_path).await? {
            return Err(Error::not_found(fs_path));
        }
        self.put(&fs_path, contents)
    }

    async fn update_stream(&self, fs_path: &str, mut stream: ReadStream) -> Result<()> {
        let mut contents = Vec::new();
        stream.read_to_end(&mut contents).await?;
        self.update(fs_path, &contents).await
    }

    async fn delete(&self, fs_path: &str) -> Result<bool> {
        let fs_path = path::normalize(fs_path);
        let mut nodes = self.nodes.write().unwrap();
        match nodes.get(&fs_path) {
            Some(node) if !node.is_dir() => {
                nodes.remove(&fs_path);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_dir(&self, fs_path: &str) -> Result<()> {
        let fs_path = path::normalize(fs_path);
        let mut nodes = self.nodes.write().unwrap();
        match nodes.get(&fs_path) {
            Some(node) if node.is_dir() => Ok(()),
            Some(_) => Err(Error::DirectoryCreation { path: fs_path }),
            None => {
                Self::ensure_parents(&mut nodes, &fs_path)
                    .map_err(|_| Error::DirectoryCreation {
                        path: fs_path.clone(),
                    })?;
                nodes.insert(fs_path, Node::directory());
                Ok(())
            }
        }
    }

    async fn delete_dir(&self, fs_path: &str) -> Result<bool> {
        let fs_path = path::normalize(fs_path);
        // The root itself is not deletable.
        if fs_path.is_empty() {
            return Ok(false);
        }
        let mut nodes = self.nodes.write().unwrap();
        match nodes.get(&fs_path) {
            Some(node) if node.is_dir() => {
                let doomed: Vec<String> = nodes
                    .keys()
                    .filter(|key| path::is_within(key, &fs_path))
                    .cloned()
                    .collect();
                for key in doomed {
                    nodes.remove(&key);
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_dir(&self, fs_path: &str, recursive: bool) -> Result<Vec<Entry>> {
        let fs_path = path::normalize(fs_path);
        let nodes = self.nodes.read().unwrap();

        match nodes.get(&fs_path) {
            Some(node) if node.is_dir() => {}
            Some(_) => return Err(IoError::other("not a directory").into()),
            None => return Err(Error::not_found(fs_path)),
        }

        let mut entries: Vec<Entry> = nodes
            .iter()
            .filter(|(key, _)| {
                if key.as_str() == fs_path {
                    return false;
                }
                if recursive {
                    path::is_within(key, &fs_path)
                } else {
                    path::parent(key) == fs_path
                }
            })
            .map(|(key, node)| Entry::from_metadata(&node.metadata(key)))
            .collect();

        // Deterministic order; a parent always sorts before its children.
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn metadata(&self, fs_path: &str) -> Result<Metadata> {
        let fs_path = path::normalize(fs_path);
        match self.nodes.read().unwrap().get(&fs_path) {
            Some(node) => Ok(node.metadata(&fs_path)),
            None => Err(Error::not_found(fs_path)),
        }
    }

    async fn set_visibility(&self, fs_path: &str, new_visibility: Visibility) -> Result<()> {
        let fs_path = path::normalize(fs_path);
        let mut nodes = self.nodes.write().unwrap();
        match nodes.get_mut(&fs_path) {
            Some(Node::File { visibility, .. }) | Some(Node::Directory { visibility, .. }) => {
                *visibility = new_visibility;
                Ok(())
            }
            None => Err(Error::not_found(fs_path)),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = path::normalize(from);
        let to = path::normalize(to);
        let mut nodes = self.nodes.write().unwrap();

        if !nodes.contains_key(&from) {
            return Err(Error::not_found(from));
        }
        Self::ensure_parents(&mut nodes, &to)?;

        let moving: Vec<String> = nodes
            .keys()
            .filter(|key| path::is_within(key, &from))
            .cloned()
            .collect();
        for key in moving {
            if let Some(node) = nodes.remove(&key) {
                nodes.insert(path::rebase(&key, &from, &to), node);
            }
        }
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let from = path::normalize(from);
        let to = path::normalize(to);
        let mut nodes = self.nodes.write().unwrap();

        let node = match nodes.get(&from) {
            Some(node) if !node.is_dir() => node.clone(),
            Some(_) => return Err(IoError::other("cannot copy a directory").into()),
            None => return Err(Error::not_found(from)),
        };
        Self::ensure_parents(&mut nodes, &to)?;
        nodes.insert(to, node);
        Ok(())
    }

    async fn mirror(&self, from: &str, to: &str, options: MirrorOptions) -> Result<()> {
        mirror::mirror_trees(self, from, self, to, options).await
    }
}

#[async_trait]
impl Directories for MemoryFs {
    async fn has_dir(&self, fs_path: &str) -> Result<bool> {
        let fs_path = path::normalize(fs_path);
        Ok(self
            .nodes
            .read()
            .unwrap()
            .get(&fs_path)
            .is_some_and(Node::is_dir))
    }
}

#[async_trait]
impl IncludeExecution for MemoryFs {
    async fn include_file(&self, fs_path: &str, once: bool) -> Result<IncludeOutcome> {
        let state = self.include.as_ref().ok_or(Error::UnsupportedCapability {
            capability: Capability::IncludeExecution.label(),
            subject: self.name().to_string(),
        })?;

        let fs_path = path::normalize(fs_path);
        if once && state.already_included(&fs_path) {
            return Ok(IncludeOutcome::AlreadyIncluded);
        }

        let contents = self.read(&fs_path).await?;
        state.run(&fs_path, &contents, once)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_write_and_read() {
        let fs = MemoryFs::new();
        fs.write("notes/today.txt", b"hello").await.unwrap();
        assert_eq!(fs.read("notes/today.txt").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_write_creates_parents() {
        let fs = MemoryFs::new();
        fs.write("a/b/c.txt", b"x").await.unwrap();
        assert!(fs.has("a").await.unwrap());
        assert!(fs.has_dir("a/b").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_requires_existing_file() {
        let fs = MemoryFs::new();
        let err = fs.update("missing.txt", b"x").await.unwrap_err();
        assert!(err.is_not_found());

        fs.write("present.txt", b"1").await.unwrap();
        fs.update("present.txt", b"2").await.unwrap();
        assert_eq!(fs.read("present.txt").await.unwrap(), b"2");
    }

    #[tokio::test]
    async fn test_delete_semantics() {
        let fs = MemoryFs::new();
        fs.write("a.txt", b"x").await.unwrap();
        assert!(fs.delete("a.txt").await.unwrap());
        assert!(!fs.delete("a.txt").await.unwrap());
        // delete() refuses directories.
        fs.create_dir("d").await.unwrap();
        assert!(!fs.delete("d").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_dir_removes_subtree() {
        let fs = MemoryFs::new();
        fs.write("d/one.txt", b"1").await.unwrap();
        fs.write("d/sub/two.txt", b"2").await.unwrap();
        assert!(fs.delete_dir("d").await.unwrap());
        assert!(!fs.has("d").await.unwrap());
        assert!(!fs.has("d/sub/two.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_dir() {
        let fs = MemoryFs::new();
        fs.write("d/a.txt", b"1").await.unwrap();
        fs.write("d/sub/b.txt", b"2").await.unwrap();

        let flat = fs.list_dir("d", false).await.unwrap();
        let paths: Vec<_> = flat.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["d/a.txt", "d/sub"]);

        let deep = fs.list_dir("d", true).await.unwrap();
        let paths: Vec<_> = deep.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["d/a.txt", "d/sub", "d/sub/b.txt"]);
    }

    #[tokio::test]
    async fn test_rename_moves_subtree() {
        let fs = MemoryFs::new();
        fs.write("old/f.txt", b"x").await.unwrap();
        fs.rename("old", "new").await.unwrap();
        assert!(!fs.has("old/f.txt").await.unwrap());
        assert_eq!(fs.read("new/f.txt").await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_profile_claims_directories() {
        let fs = MemoryFs::new();
        let profile = fs.profile().unwrap();
        assert!(profile.supports(Capability::Directories));
        assert!(!profile.supports(Capability::NativeStreams));
        assert!(!profile.supports(Capability::IncludeExecution));
        assert_eq!(profile.subject(), "memory");
    }

    #[tokio::test]
    async fn test_enable_include_without_handler_fails_fast() {
        let fs = MemoryFs::new();
        let err = Profile::new("memory")
            .enable(&fs, Capability::IncludeExecution)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedCapability { .. }));
    }

    #[tokio::test]
    async fn test_include_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let fs = MemoryFs::with_include_handler(move |_, contents| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!(contents.len()))
        });
        assert!(fs.profile().unwrap().supports(Capability::IncludeExecution));

        fs.write("init.cfg", b"abc").await.unwrap();

        let outcome = fs.include_file("init.cfg", true).await.unwrap();
        assert_eq!(outcome, IncludeOutcome::Executed(json!(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let outcome = fs.include_file("init.cfg", true).await.unwrap();
        assert_eq!(outcome, IncludeOutcome::AlreadyIncluded);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_visibility_round_trip() {
        let fs = MemoryFs::new();
        fs.write("v.txt", b"x").await.unwrap();
        assert_eq!(fs.visibility("v.txt").await.unwrap(), Visibility::Public);
        fs.set_visibility("v.txt", Visibility::Private).await.unwrap();
        assert_eq!(fs.visibility("v.txt").await.unwrap(), Visibility::Private);
    }
}

//! Open byte-stream and directory handles.

use std::io::SeekFrom;
use std::sync::Arc;

use super::cache::{StatCache, StatRecord};
use crate::error::{Error, Result};
use crate::fs::Filesystem;

/// Mode a byte-stream handle is opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Reading,
    Writing,
    Appending,
}

impl OpenMode {
    /// Parse an fopen-style mode string.
    pub fn parse(mode: &str) -> Result<Self> {
        match mode.trim_end_matches('b') {
            "r" => Ok(OpenMode::Reading),
            "w" => Ok(OpenMode::Writing),
            "a" => Ok(OpenMode::Appending),
            other => Err(Error::argument(format!("unsupported open mode: {other}"))),
        }
    }
}

/// An open byte stream over one backend file.
///
/// Reading buffers the file into a seekable cursor at open time; writing
/// and appending buffer locally and persist through the backend on
/// `flush`/`close`. The handle's lifecycle is open → read/write/seek →
/// close; dropping an unflushed writer discards its buffered bytes.
pub struct FileHandle {
    fs: Arc<dyn Filesystem>,
    rest: String,
    full_path: String,
    mode: OpenMode,
    buffer: Vec<u8>,
    position: u64,
    dirty: bool,
    cache: Arc<dyn StatCache>,
    invalidate_on_write: bool,
}

impl FileHandle {
    pub(super) async fn open(
        fs: Arc<dyn Filesystem>,
        rest: String,
        full_path: String,
        mode: OpenMode,
        cache: Arc<dyn StatCache>,
        invalidate_on_write: bool,
    ) -> Result<Self> {
        let (buffer, position, dirty) = match mode {
            OpenMode::Reading => (fs.read(&rest).await?, 0, false),
            // Opening for writing truncates: the empty buffer must be
            // persisted even if nothing is ever written.
            OpenMode::Writing => (Vec::new(), 0, true),
            OpenMode::Appending => {
                let existing = if fs.has(&rest).await? {
                    fs.read(&rest).await?
                } else {
                    Vec::new()
                };
                let len = existing.len() as u64;
                (existing, len, false)
            }
        };

        Ok(Self {
            fs,
            rest,
            full_path,
            mode,
            buffer,
            position,
            dirty,
            cache,
            invalidate_on_write,
        })
    }

    /// The full prefixed path this handle was opened at.
    pub fn path(&self) -> &str {
        &self.full_path
    }

    /// Read up to `count` bytes from the current position.
    pub fn read(&mut self, count: usize) -> Result<Vec<u8>> {
        if self.mode != OpenMode::Reading {
            return Err(Error::argument("handle is not open for reading"));
        }
        let start = (self.position as usize).min(self.buffer.len());
        let end = (start + count).min(self.buffer.len());
        self.position = end as u64;
        Ok(self.buffer[start..end].to_vec())
    }

    /// Write `data` at the current position (at the end, in append mode).
    /// Returns the number of bytes written.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.mode == OpenMode::Reading {
            return Err(Error::argument("handle is not open for writing"));
        }
        if self.mode == OpenMode::Appending {
            self.position = self.buffer.len() as u64;
        }

        let start = self.position as usize;
        let end = start + data.len();
        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
        }
        self.buffer[start..end].copy_from_slice(data);
        self.position = end as u64;
        self.dirty = true;
        Ok(data.len())
    }

    /// Move the cursor. Returns the new position.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let len = self.buffer.len() as i64;
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.position as i64 + delta,
            SeekFrom::End(delta) => len + delta,
        };
        if target < 0 {
            return Err(Error::argument("seek before start of stream"));
        }
        self.position = target as u64;
        Ok(self.position)
    }

    /// Current cursor position.
    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Is the cursor at or past the end of the buffered contents?
    pub fn eof(&self) -> bool {
        self.position >= self.buffer.len() as u64
    }

    /// Persist buffered writes through the backend.
    pub async fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.fs.write(&self.rest, &self.buffer).await?;
        self.dirty = false;
        if self.invalidate_on_write {
            self.cache.delete(&self.full_path);
        }
        Ok(())
    }

    /// Flush and close the handle.
    pub async fn close(mut self) -> Result<()> {
        self.flush().await
    }
}

/// An open directory enumeration cursor.
///
/// The listing is snapshotted at open time; `rewind` restarts the same
/// snapshot rather than relisting. Each yielded child's stat record is
/// cached under its full prefixed path, so a follow-up stat on that path
/// (the usual pattern during a recursive walk) is served from cache.
pub struct DirHandle {
    protocol: String,
    base: String,
    entries: Vec<crate::fs::Entry>,
    index: usize,
    cache: Arc<dyn StatCache>,
}

impl std::fmt::Debug for DirHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirHandle")
            .field("protocol", &self.protocol)
            .field("base", &self.base)
            .field("entries", &self.entries)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl DirHandle {
    pub(super) fn new(
        protocol: String,
        base: String,
        entries: Vec<crate::fs::Entry>,
        cache: Arc<dyn StatCache>,
    ) -> Self {
        Self {
            protocol,
            base,
            entries,
            index: 0,
            cache,
        }
    }

    /// Yield the next child, as a path relative to the opened directory.
    /// Returns `None` at the end of the snapshot.
    pub fn next_entry(&mut self) -> Option<String> {
        let entry = self.entries.get(self.index)?;
        self.index += 1;

        let key = format!("{}://{}", self.protocol, entry.path);
        self.cache.save(&key, StatRecord::from_entry(entry));

        let relative = if self.base.is_empty() {
            entry.path.clone()
        } else {
            entry
                .path
                .strip_prefix(&format!("{}/", self.base))
                .unwrap_or(&entry.path)
                .to_string()
        };
        Some(relative)
    }

    /// Restart enumeration of the same snapshot.
    pub fn rewind(&mut self) {
        self.index = 0;
    }

    /// Discard the cursor.
    pub fn close(self) {}
}

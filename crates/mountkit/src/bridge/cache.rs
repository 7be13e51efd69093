//! Stat records and the metadata cache behind the bridge.

// RwLock.read()/write().unwrap() only panics on lock poisoning (prior panic
// while holding lock). This is intentional - corrupted state should not propagate.
#![allow(clippy::unwrap_used)]

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::fs::{Entry, Metadata};

/// Mode bit pattern reported for directories.
pub const DIR_MODE: u32 = 0o040777;
/// Mode bit pattern reported for files.
pub const FILE_MODE: u32 = 0o100666;

/// POSIX-stat-shaped metadata record returned by bridge probes.
///
/// Fields the backend model cannot answer are zero-filled, or -1 where a
/// sentinel is conventional. Creation time equals modification time; the
/// model does not distinguish them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: i64,
    pub size: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub blksize: i64,
    pub blocks: i64,
}

impl StatRecord {
    /// The all-benign template: zeros, with -1 sentinels where a value
    /// would be meaningless.
    pub fn zeroed() -> Self {
        Self {
            dev: 0,
            ino: 0,
            mode: 0,
            nlink: 0,
            uid: 0,
            gid: 0,
            rdev: -1,
            size: 0,
            atime: 0,
            mtime: 0,
            ctime: 0,
            blksize: -1,
            blocks: -1,
        }
    }

    /// Record for a directory.
    pub fn directory(mtime: i64) -> Self {
        Self {
            mode: DIR_MODE,
            mtime,
            ctime: mtime,
            ..Self::zeroed()
        }
    }

    /// Record for a file of `size` bytes.
    pub fn file(size: u64, mtime: i64) -> Self {
        Self {
            mode: FILE_MODE,
            size,
            mtime,
            ctime: mtime,
            ..Self::zeroed()
        }
    }

    /// Build a record from backend metadata.
    pub fn from_metadata(meta: &Metadata) -> Self {
        if meta.kind.is_dir() {
            Self::directory(meta.unix_timestamp())
        } else {
            Self::file(meta.size, meta.unix_timestamp())
        }
    }

    /// Build a record from a listing entry.
    pub fn from_entry(entry: &Entry) -> Self {
        let mtime = match entry.modified.duration_since(std::time::SystemTime::UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_secs() as i64,
            Err(before) => -(before.duration().as_secs() as i64),
        };
        if entry.kind.is_dir() {
            Self::directory(mtime)
        } else {
            Self::file(entry.size, mtime)
        }
    }

    /// Does the mode carry the directory bit pattern?
    pub fn is_dir(&self) -> bool {
        self.mode & 0o170000 == 0o040000
    }
}

/// Cache of stat records keyed by full prefixed path.
pub trait StatCache: Send + Sync {
    /// Look up a record.
    fn fetch(&self, key: &str) -> Option<StatRecord>;
    /// Store a record.
    fn save(&self, key: &str, record: StatRecord);
    /// Drop a record, if present.
    fn delete(&self, key: &str);
}

/// In-memory [`StatCache`]; the default created by protocol registration.
#[derive(Debug, Default)]
pub struct MemoryStatCache {
    records: RwLock<HashMap<String, StatRecord>>,
}

impl MemoryStatCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatCache for MemoryStatCache {
    fn fetch(&self, key: &str) -> Option<StatRecord> {
        self.records.read().unwrap().get(key).cloned()
    }

    fn save(&self, key: &str, record: StatRecord) {
        self.records.write().unwrap().insert(key.to_string(), record);
    }

    fn delete(&self, key: &str) {
        self.records.write().unwrap().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_patterns() {
        assert!(StatRecord::directory(0).is_dir());
        assert!(!StatRecord::file(10, 0).is_dir());
        assert_eq!(StatRecord::directory(0).mode, 0o040777);
        assert_eq!(StatRecord::file(10, 0).mode, 0o100666);
    }

    #[test]
    fn test_ctime_mirrors_mtime() {
        let rec = StatRecord::file(1, 1234);
        assert_eq!(rec.mtime, 1234);
        assert_eq!(rec.ctime, 1234);
        assert_eq!(rec.atime, 0);
        assert_eq!(rec.blksize, -1);
    }

    #[test]
    fn test_memory_cache_round_trip() {
        let cache = MemoryStatCache::new();
        assert!(cache.fetch("files://a").is_none());

        cache.save("files://a", StatRecord::file(3, 1));
        assert_eq!(cache.fetch("files://a"), Some(StatRecord::file(3, 1)));

        cache.delete("files://a");
        assert!(cache.fetch("files://a").is_none());
    }
}

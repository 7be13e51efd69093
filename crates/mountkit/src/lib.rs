//! mountkit - Virtual filesystem toolkit with prefix routing
//!
//! A uniform async interface over heterogeneous storage backends, composed
//! three ways:
//!
//! - [`Router`] mounts backends under string prefixes and dispatches
//!   `"prefix://path"` operations to the right one.
//! - [`Profile`] negotiates which optional behaviors a backend genuinely
//!   supports (true directories, native stream handles, include
//!   execution) versus emulates.
//! - [`bridge::StreamBridge`] exposes any filesystem through a
//!   stream/stat/readdir surface with a stat cache, keyed by registered
//!   protocol names.
//!
//! [`mirror`] replicates directory subtrees between locations, including
//! across backends.
//!
//! # Example
//!
//! ```rust
//! use mountkit::{Filesystem, MemoryFs, Router};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> mountkit::Result<()> {
//!     let router = Router::new();
//!     router.mount("files", Arc::new(MemoryFs::new()))?;
//!
//!     router.write("files://notes/today.txt", b"hello").await?;
//!     assert_eq!(router.read("files://notes/today.txt").await?, b"hello");
//!     Ok(())
//! }
//! ```

pub mod bridge;
mod capability;
mod error;
mod fs;
mod mirror;
mod router;

pub use capability::{
    Capability, Directories, IncludeExecution, IncludeHandler, IncludeOutcome, IncludeState,
    Profile,
};
pub use error::{Error, Result};
pub use fs::{
    CachedFs, Entry, EntryKind, Filesystem, LocalFs, MemoryFs, Metadata, NullFs, ReadStream,
    Visibility,
};
pub use mirror::{copy_file, mirror, MirrorOptions};
pub use router::{Router, PREFIX_SEPARATOR};

// Re-exported so custom Filesystem implementations don't need their own
// async-trait dependency.
pub use async_trait::async_trait;

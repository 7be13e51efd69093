//! Filesystem backends and the abstract interface they implement.
//!
//! - [`MemoryFs`]: in-memory store with true directory nodes
//! - [`LocalFs`]: local-disk store rooted at a directory
//! - [`NullFs`]: reports nonexistence for everything
//! - [`CachedFs`]: metadata-caching decorator over any backend

mod cached;
mod local;
mod memory;
pub mod mime;
mod null;
pub mod path;
mod traits;

pub use cached::CachedFs;
pub use local::LocalFs;
pub use memory::MemoryFs;
pub use null::NullFs;
pub use traits::{Entry, EntryKind, Filesystem, Metadata, ReadStream, Visibility};

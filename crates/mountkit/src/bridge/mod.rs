//! Stream protocol bridge.
//!
//! Exposes any [`Filesystem`] through a stream/stat/readdir surface keyed
//! by protocol name. Registration state lives in an explicit, injectable
//! [`ProtocolRegistry`]; the [`StreamBridge`] resolves `"protocol://path"`
//! calls against it and delegates to the registered filesystem, caching
//! stat records along the way.
//!
//! Probe failures follow a quiet/loud policy: existence-style probes
//! (quiet) report absence without a diagnostic, while plain probes log a
//! warning in addition to returning the failure, matching how native
//! stat-like calls surface unexpected errors loudly but expected-missing
//! paths quietly.

mod cache;
mod handle;
mod registry;

pub use cache::{MemoryStatCache, StatCache, StatRecord, DIR_MODE, FILE_MODE};
pub use handle::{DirHandle, FileHandle, OpenMode};
pub use registry::ProtocolRegistry;

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::fs::{path, Filesystem};
use crate::router::Router;

/// Cache behavior knobs for a bridge.
///
/// By default a write through the bridge does not purge a stale stat
/// cached for the same path; that staleness window is inherent to the
/// cache design and left observable. `invalidate_on_write` opts into
/// purging on every mutating operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeCachePolicy {
    pub invalidate_on_write: bool,
}

/// Per-call options. Call-level settings win over the protocol-wide
/// defaults held by the registry.
#[derive(Default, Clone)]
pub struct CallContext {
    /// Cache override for this call.
    pub cache: Option<Arc<dyn StatCache>>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `cache` for this call instead of the protocol default.
    pub fn with_cache(cache: Arc<dyn StatCache>) -> Self {
        Self { cache: Some(cache) }
    }
}

/// Flags accompanying a stat probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatFlags {
    /// Existence-style probe: report absence without raising a diagnostic.
    pub quiet: bool,
    /// Link-style probe: combined with `quiet`, failure yields a benign
    /// all-zero record instead of an error.
    pub link: bool,
}

impl StatFlags {
    /// A plain (loud) probe.
    pub fn loud() -> Self {
        Self::default()
    }

    /// An existence-style probe.
    pub fn quiet() -> Self {
        Self {
            quiet: true,
            link: false,
        }
    }

    /// A link-style existence probe.
    pub fn quiet_link() -> Self {
        Self {
            quiet: true,
            link: true,
        }
    }
}

/// Bridge between prefixed paths and registered filesystems.
pub struct StreamBridge {
    registry: Arc<ProtocolRegistry>,
    policy: BridgeCachePolicy,
}

impl StreamBridge {
    /// Create a bridge over `registry` with the default cache policy.
    pub fn new(registry: Arc<ProtocolRegistry>) -> Self {
        Self {
            registry,
            policy: BridgeCachePolicy::default(),
        }
    }

    /// Create a bridge with an explicit cache policy.
    pub fn with_policy(registry: Arc<ProtocolRegistry>, policy: BridgeCachePolicy) -> Self {
        Self { registry, policy }
    }

    /// The registry this bridge resolves against.
    pub fn registry(&self) -> &Arc<ProtocolRegistry> {
        &self.registry
    }

    /// Resolve `"protocol://path"` to (filesystem, protocol, relative
    /// path).
    ///
    /// Fails with an argument error for a malformed path and a
    /// configuration error when nothing is registered for the protocol.
    pub fn resolve_handler(&self, full_path: &str) -> Result<(Arc<dyn Filesystem>, String, String)> {
        let (protocol, rest) = Router::split_prefix(full_path)?;
        let fs = self.registry.filesystem(protocol)?;
        Ok((fs, protocol.to_string(), path::normalize(rest)))
    }

    fn effective_cache(&self, protocol: &str, ctx: &CallContext) -> Arc<dyn StatCache> {
        ctx.cache
            .clone()
            .or_else(|| self.registry.cache(protocol))
            .unwrap_or_else(|| Arc::new(MemoryStatCache::new()))
    }

    fn cache_key(protocol: &str, rest: &str) -> String {
        format!("{protocol}://{rest}")
    }

    /// Route a probe failure through the quiet/loud policy.
    fn probe_failure(full_path: &str, err: Error, flags: StatFlags) -> Result<StatRecord> {
        if flags.quiet {
            if flags.link {
                return Ok(StatRecord::zeroed());
            }
            return Err(err);
        }
        tracing::warn!(path = %full_path, error = %err, "stat probe failed");
        Err(err)
    }

    /// Probe metadata for `full_path`.
    ///
    /// The stat cache is consulted first; on a miss the handler is
    /// resolved, the record built from its reported type, size, and
    /// timestamp, and the result cached before returning.
    pub async fn stat_path(
        &self,
        full_path: &str,
        flags: StatFlags,
        ctx: &CallContext,
    ) -> Result<StatRecord> {
        let (fs, protocol, rest) = match self.resolve_handler(full_path) {
            Ok(resolved) => resolved,
            Err(err) => return Self::probe_failure(full_path, err, flags),
        };

        let cache = self.effective_cache(&protocol, ctx);
        let key = Self::cache_key(&protocol, &rest);
        if let Some(record) = cache.fetch(&key) {
            return Ok(record);
        }

        match fs.metadata(&rest).await {
            Ok(meta) => {
                let record = StatRecord::from_metadata(&meta);
                cache.save(&key, record.clone());
                Ok(record)
            }
            Err(err) => Self::probe_failure(full_path, err, flags),
        }
    }

    /// Open a byte-stream handle at `full_path`.
    pub async fn open(
        &self,
        full_path: &str,
        mode: OpenMode,
        ctx: &CallContext,
    ) -> Result<FileHandle> {
        let (fs, protocol, rest) = self.resolve_handler(full_path)?;
        let cache = self.effective_cache(&protocol, ctx);
        let key = Self::cache_key(&protocol, &rest);

        FileHandle::open(
            fs,
            rest,
            key,
            mode,
            cache,
            self.policy.invalidate_on_write,
        )
        .await
        .inspect_err(|err| {
            tracing::warn!(path = %full_path, error = %err, "stream open failed");
        })
    }

    /// Open a directory enumeration cursor at `full_path`.
    ///
    /// The path must denote an existing directory; failures honor the
    /// quiet flag like a stat probe.
    pub async fn opendir(
        &self,
        full_path: &str,
        flags: StatFlags,
        ctx: &CallContext,
    ) -> Result<DirHandle> {
        let open = async {
            let (fs, protocol, rest) = self.resolve_handler(full_path)?;
            let meta = fs.metadata(&rest).await?;
            if !meta.kind.is_dir() {
                return Err(Error::argument(format!("not a directory: {full_path}")));
            }
            let entries = fs.list_dir(&rest, false).await?;
            let cache = self.effective_cache(&protocol, ctx);
            Ok(DirHandle::new(protocol, rest, entries, cache))
        };

        match open.await {
            Ok(handle) => Ok(handle),
            Err(err) => {
                if !flags.quiet {
                    tracing::warn!(path = %full_path, error = %err, "directory open failed");
                }
                Err(err)
            }
        }
    }

    /// Create a directory.
    pub async fn mkdir(&self, full_path: &str, ctx: &CallContext) -> Result<()> {
        let (fs, protocol, rest) = self.resolve_handler(full_path)?;
        fs.create_dir(&rest).await.inspect_err(|err| {
            tracing::warn!(path = %full_path, error = %err, "mkdir failed");
        })?;
        self.after_mutation(&protocol, &rest, ctx);
        Ok(())
    }

    /// Remove a directory.
    pub async fn rmdir(&self, full_path: &str, ctx: &CallContext) -> Result<()> {
        let (fs, protocol, rest) = self.resolve_handler(full_path)?;
        let removed = fs.delete_dir(&rest).await.inspect_err(|err| {
            tracing::warn!(path = %full_path, error = %err, "rmdir failed");
        })?;
        if !removed {
            return Err(Error::not_found(full_path));
        }
        self.after_mutation(&protocol, &rest, ctx);
        Ok(())
    }

    /// Delete a file.
    pub async fn unlink(&self, full_path: &str, ctx: &CallContext) -> Result<()> {
        let (fs, protocol, rest) = self.resolve_handler(full_path)?;
        let deleted = fs.delete(&rest).await.inspect_err(|err| {
            tracing::warn!(path = %full_path, error = %err, "unlink failed");
        })?;
        if !deleted {
            return Err(Error::not_found(full_path));
        }
        self.after_mutation(&protocol, &rest, ctx);
        Ok(())
    }

    /// Rename within one protocol's filesystem.
    pub async fn rename(&self, from: &str, to: &str, ctx: &CallContext) -> Result<()> {
        let (from_fs, from_protocol, from_rest) = self.resolve_handler(from)?;
        let (to_fs, to_protocol, to_rest) = self.resolve_handler(to)?;

        if !Arc::ptr_eq(&from_fs, &to_fs) {
            return Err(Error::argument(
                "cannot rename across protocol registrations",
            ));
        }

        from_fs.rename(&from_rest, &to_rest).await.inspect_err(|err| {
            tracing::warn!(from = %from, to = %to, error = %err, "rename failed");
        })?;
        self.after_mutation(&from_protocol, &from_rest, ctx);
        self.after_mutation(&to_protocol, &to_rest, ctx);
        Ok(())
    }

    fn after_mutation(&self, protocol: &str, rest: &str, ctx: &CallContext) {
        if !self.policy.invalidate_on_write {
            return;
        }
        let cache = self.effective_cache(protocol, ctx);
        cache.delete(&Self::cache_key(protocol, rest));
    }
}

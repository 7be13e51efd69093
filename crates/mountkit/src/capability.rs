//! Capability negotiation.
//!
//! A [`Profile`] describes which optional behaviors a backend genuinely
//! implements, as opposed to emulating. Enabling a capability verifies the
//! owning backend exposes the matching contract trait and fails fast
//! otherwise; a profile that made it through construction can be trusted
//! without re-checking at call sites.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::fs::Filesystem;

/// Optional backend capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// The backend distinguishes real directories from emulated path
    /// prefixes: `has` and `metadata` work for directories too.
    Directories,
    /// `read_stream` hands back a true handle into the store rather than a
    /// cursor over a buffered copy. A pure claim; there is no separate
    /// contract trait to verify against.
    NativeStreams,
    /// Stored file contents can be executed through an attached evaluation
    /// function, with once-per-path de-duplication.
    IncludeExecution,
}

impl Capability {
    /// Human-readable label, used in errors.
    pub fn label(&self) -> &'static str {
        match self {
            Capability::Directories => "directories",
            Capability::NativeStreams => "native streams",
            Capability::IncludeExecution => "include execution",
        }
    }
}

/// Immutable-after-verification capability descriptor for one backend.
#[derive(Debug, Clone)]
pub struct Profile {
    subject: String,
    directories: bool,
    native_streams: bool,
    include_execution: bool,
}

impl Profile {
    /// A profile claiming nothing, describing `subject`.
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            directories: false,
            native_streams: false,
            include_execution: false,
        }
    }

    /// Name of the backend this profile describes.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Claim a capability, verifying `owner` structurally backs it.
    ///
    /// Fails with `UnsupportedCapability` when the owner lacks the matching
    /// contract trait. This is a backend misconfiguration surfaced at
    /// construction time, not a recoverable runtime condition.
    pub fn enable(mut self, owner: &dyn Filesystem, capability: Capability) -> Result<Self> {
        Self::verify(owner, capability)?;
        match capability {
            Capability::Directories => self.directories = true,
            Capability::NativeStreams => self.native_streams = true,
            Capability::IncludeExecution => self.include_execution = true,
        }
        Ok(self)
    }

    /// Pure query: is `capability` claimed?
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Directories => self.directories,
            Capability::NativeStreams => self.native_streams,
            Capability::IncludeExecution => self.include_execution,
        }
    }

    /// Copy this profile onto a different owner, re-running verification
    /// for every claimed capability against the new owner.
    ///
    /// Decorators use this to re-expose a wrapped backend's capabilities as
    /// their own.
    pub fn rebind(&self, new_owner: &dyn Filesystem) -> Result<Profile> {
        let mut profile = Profile::new(new_owner.name());
        for capability in [
            Capability::Directories,
            Capability::NativeStreams,
            Capability::IncludeExecution,
        ] {
            if self.supports(capability) {
                profile = profile.enable(new_owner, capability)?;
            }
        }
        Ok(profile)
    }

    fn verify(owner: &dyn Filesystem, capability: Capability) -> Result<()> {
        let backed = match capability {
            Capability::Directories => owner.directories().is_some(),
            Capability::IncludeExecution => owner.include_execution().is_some(),
            Capability::NativeStreams => true,
        };
        if backed {
            Ok(())
        } else {
            Err(Error::UnsupportedCapability {
                capability: capability.label(),
                subject: owner.name().to_string(),
            })
        }
    }
}

/// Contract backing [`Capability::Directories`].
#[async_trait]
pub trait Directories: Send + Sync {
    /// Check whether a real directory exists at `path`.
    async fn has_dir(&self, path: &str) -> Result<bool>;
}

/// Outcome of an include-execution call.
#[derive(Debug, Clone, PartialEq)]
pub enum IncludeOutcome {
    /// The contents were executed; the handler's value is returned.
    Executed(serde_json::Value),
    /// The once flag was set and the path had already been executed.
    /// Reported as success without re-running the handler.
    AlreadyIncluded,
}

/// Contract backing [`Capability::IncludeExecution`].
#[async_trait]
pub trait IncludeExecution: Send + Sync {
    /// Load the file at `path` and execute its contents.
    ///
    /// With `once` set, a path that already executed is a no-op reporting
    /// [`IncludeOutcome::AlreadyIncluded`].
    async fn include_file(&self, path: &str, once: bool) -> Result<IncludeOutcome>;
}

/// Sandboxed evaluation function executing stored contents in a restricted
/// scope. Receives the path and raw bytes, returns the evaluated value.
pub type IncludeHandler =
    dyn Fn(&str, &[u8]) -> std::result::Result<serde_json::Value, String> + Send + Sync;

/// Include-execution bookkeeping owned by a backend instance: the injected
/// evaluation function plus the "already executed" path set.
pub struct IncludeState {
    handler: Box<IncludeHandler>,
    included: RwLock<HashSet<String>>,
}

impl std::fmt::Debug for IncludeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncludeState")
            .field("included", &self.included.read().unwrap().len())
            .finish()
    }
}

impl IncludeState {
    /// Wrap an evaluation function.
    pub fn new(
        handler: impl Fn(&str, &[u8]) -> std::result::Result<serde_json::Value, String>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            included: RwLock::new(HashSet::new()),
        }
    }

    /// Has `path` already executed? Callers use this to short-circuit a
    /// once-flagged include before loading contents.
    pub fn already_included(&self, path: &str) -> bool {
        self.included.read().unwrap().contains(path)
    }

    /// Run the handler over `contents`, honoring the once flag.
    pub fn run(&self, path: &str, contents: &[u8], once: bool) -> Result<IncludeOutcome> {
        if once && self.included.read().unwrap().contains(path) {
            return Ok(IncludeOutcome::AlreadyIncluded);
        }

        let value = (self.handler)(path, contents).map_err(|message| Error::Include {
            path: path.to_string(),
            message,
        })?;

        self.included.write().unwrap().insert(path.to_string());

        Ok(IncludeOutcome::Executed(value))
    }
}

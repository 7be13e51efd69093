//! Error types for mountkit
//!
//! One error enum covers the whole library:
//! - Programming errors (`Argument`) that are never recoverable
//! - Routing/registration state errors (`MountNotFound`, `Configuration`)
//! - Expected, caller-recoverable conditions (`FileNotFound`)
//! - Unexpected low-level faults (`Io`, `DirectoryCreation`)
//! - Capability violations (`UnsupportedCapability`, `Include`)

use thiserror::Error;

/// Result type alias using mountkit's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// mountkit error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed path or wrong argument shape. Always a programming error.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// A path referenced a prefix with no mounted filesystem.
    #[error("no filesystem mounted with prefix {prefix}")]
    MountNotFound { prefix: String },

    /// Missing or malformed registration state (protocol registry).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The path does not exist. Expected and recoverable by caller logic.
    #[error("file not found at path {path}")]
    FileNotFound { path: String },

    /// Unexpected I/O fault from the backing store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A directory could not be created.
    #[error("failed to create directory {path}")]
    DirectoryCreation { path: String },

    /// A capability was claimed or required without structural backing.
    #[error("{subject} does not support {capability}")]
    UnsupportedCapability {
        capability: &'static str,
        subject: String,
    },

    /// Executing a stored file's contents failed.
    #[error("failed to include {path}: {message}")]
    Include { path: String, message: String },
}

impl Error {
    /// Create an argument error.
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument(message.into())
    }

    /// Create a not-found error for the given path.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// True for errors that mean "the path is not there", as opposed to an
    /// unexpected fault. The mirror delete pass and quiet probes branch on
    /// this.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::FileNotFound { .. } => true,
            Self::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

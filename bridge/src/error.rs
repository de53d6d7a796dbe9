//! Error types for the bridge.
//!
//! Remote errors come from the client library and are delivered to the
//! consumer as ordinary results. Everything else is raised synchronously to
//! the caller before any operation starts, except `Lifecycle`, which marks a
//! broken handoff.

use std::fmt;

use thiserror::Error;

/// Codes the client library reports when an operation is torn down rather
/// than failing on its own.
pub mod code {
    /// `operation_cancelled`
    pub const OPERATION_CANCELLED: i32 = 1101;
    /// `transaction_cancelled`
    pub const TRANSACTION_CANCELLED: i32 = 1025;
    /// `not_committed` (transaction conflict)
    pub const NOT_COMMITTED: i32 = 1020;
    /// `client_invalid_operation`
    pub const CLIENT_INVALID_OPERATION: i32 = 2000;
    /// `api_version_already_set`
    pub const API_VERSION_ALREADY_SET: i32 = 2201;
}

/// A non-zero error code returned by the client library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub code: i32,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (fdb_errcode {})", self.message, self.code)
    }
}

impl std::error::Error for RemoteError {}

/// Main error type for bridge operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The client library rejected the operation.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Option code or value has the wrong shape.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Version buffers are always exactly 8 bytes.
    #[error("Invalid version buffer - must be 8 bytes, got {0}")]
    InvalidVersion(usize),

    /// Malformed argument at the binding boundary.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The client library could not be loaded or is missing a symbol.
    #[error("Failed to load FoundationDB client library: {0}")]
    Library(#[from] libloading::Error),

    /// Configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// The handoff protocol or network lifecycle was violated.
    #[error("Lifecycle violation: {0}")]
    Lifecycle(String),
}

impl Error {
    /// Library error code, if this error came from the client library.
    pub fn remote_code(&self) -> Option<i32> {
        match self {
            Error::Remote(e) => Some(e.code),
            _ => None,
        }
    }
}

/// Result type alias using the bridge [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

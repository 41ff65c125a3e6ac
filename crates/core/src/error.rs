//! Error types for cse-core
//!
//! One error enum covers configuration, enumeration, mapping and transfer
//! failures. Each variant carries a stable exit code, and [`Error::context`]
//! attaches "which item, which direction" information without changing the
//! variant.

use std::fmt::Display;

use thiserror::Error;

/// Result type alias for cse-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cse-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid mode selection or missing/invalid run parameters
    #[error("Configuration error: {0}")]
    Config(String),

    /// Path or key that cannot be mapped safely
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Several sources resolve to one destination
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Local filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Local directory traversal error
    #[error("Walk error: {0}")]
    Walk(String),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Authentication or permission failure
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Bucket or object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network or backend error
    #[error("Network error: {0}")]
    Network(String),

    /// Encrypted payload failed authentication or could not be unwrapped
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// The run was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Get the appropriate exit code for this error
    pub const fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) | Error::InvalidPath(_) | Error::InvalidUrl(_) => 2, // UsageError
            Error::TomlParse(_) => 2,                                              // UsageError
            Error::Network(_) => 3,                                                // NetworkError
            Error::Auth(_) => 4,                                                   // AuthError
            Error::NotFound(_) => 5,                                               // NotFound
            Error::Conflict(_) => 6,                                               // Conflict
            Error::Integrity(_) => 8,                                              // IntegrityError
            Error::Cancelled => 130,                                               // Interrupted
            _ => 1,                                                                // GeneralError
        }
    }

    /// Prefix the message with `ctx`, keeping the error kind.
    pub fn context(self, ctx: impl Display) -> Self {
        match self {
            Error::Config(m) => Error::Config(format!("{ctx}: {m}")),
            Error::InvalidPath(m) => Error::InvalidPath(format!("{ctx}: {m}")),
            Error::Conflict(m) => Error::Conflict(format!("{ctx}: {m}")),
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), format!("{ctx}: {e}"))),
            Error::Walk(m) => Error::Walk(format!("{ctx}: {m}")),
            Error::Auth(m) => Error::Auth(format!("{ctx}: {m}")),
            Error::NotFound(m) => Error::NotFound(format!("{ctx}: {m}")),
            Error::Network(m) => Error::Network(format!("{ctx}: {m}")),
            Error::Integrity(m) => Error::Integrity(format!("{ctx}: {m}")),
            Error::General(m) => Error::General(format!("{ctx}: {m}")),
            other @ (Error::TomlParse(_) | Error::InvalidUrl(_) | Error::Cancelled) => other,
        }
    }

    /// True for errors detected before any I/O happens
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::InvalidUrl(_) | Error::TomlParse(_)
        )
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        let path = err
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        match err.into_io_error() {
            Some(io) if path.is_empty() => Error::Io(io),
            Some(io) => Error::Io(std::io::Error::new(io.kind(), format!("{path}: {io}"))),
            None => Error::Walk(format!("filesystem loop detected at {path}")),
        }
    }
}

//! Exit code definitions for csesync
//!
//! Scripts rely on these values; changing one is a breaking change.

use cse_core::Error;

/// Exit codes for the csesync binary.
///
/// These codes follow a consistent convention to allow scripts and automation
/// to handle different error scenarios appropriately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Every mapped item was transferred
    Success = 0,

    /// General/unspecified error, including local I/O failures
    GeneralError = 1,

    /// Invalid mode selection, missing parameters, unsafe path
    UsageError = 2,

    /// Network or backend error
    NetworkError = 3,

    /// Authentication or permission failure
    AuthError = 4,

    /// Resource not found: bucket, object, KMS key or local path
    NotFound = 5,

    /// Several local files would be written to one key
    Conflict = 6,

    /// Decryption or authentication of stored content failed
    IntegrityError = 8,

    /// Operation was interrupted (e.g., Ctrl+C)
    Interrupted = 130,
}

impl ExitCode {
    /// Convert exit code to i32 for use with std::process::exit
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Create exit code from i32 value
    ///
    /// Returns None if the value doesn't correspond to a known exit code.
    pub const fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::GeneralError),
            2 => Some(Self::UsageError),
            3 => Some(Self::NetworkError),
            4 => Some(Self::AuthError),
            5 => Some(Self::NotFound),
            6 => Some(Self::Conflict),
            8 => Some(Self::IntegrityError),
            130 => Some(Self::Interrupted),
            _ => None,
        }
    }

    /// Get a human-readable description of the exit code
    pub const fn description(self) -> &'static str {
        match self {
            Self::Success => "Operation completed successfully",
            Self::GeneralError => "General error",
            Self::UsageError => "Invalid arguments or path",
            Self::NetworkError => "Network error",
            Self::AuthError => "Authentication or permission failure",
            Self::NotFound => "Resource not found",
            Self::Conflict => "Conflicting destinations",
            Self::IntegrityError => "Integrity check failed",
            Self::Interrupted => "Operation interrupted",
        }
    }
}

impl From<&Error> for ExitCode {
    fn from(error: &Error) -> Self {
        Self::from_i32(error.exit_code()).unwrap_or(Self::GeneralError)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.as_i32()
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::GeneralError.as_i32(), 1);
        assert_eq!(ExitCode::UsageError.as_i32(), 2);
        assert_eq!(ExitCode::NetworkError.as_i32(), 3);
        assert_eq!(ExitCode::AuthError.as_i32(), 4);
        assert_eq!(ExitCode::NotFound.as_i32(), 5);
        assert_eq!(ExitCode::Conflict.as_i32(), 6);
        assert_eq!(ExitCode::IntegrityError.as_i32(), 8);
        assert_eq!(ExitCode::Interrupted.as_i32(), 130);
    }

    #[test]
    fn test_exit_code_from_i32() {
        assert_eq!(ExitCode::from_i32(0), Some(ExitCode::Success));
        assert_eq!(ExitCode::from_i32(6), Some(ExitCode::Conflict));
        assert_eq!(ExitCode::from_i32(8), Some(ExitCode::IntegrityError));
        assert_eq!(ExitCode::from_i32(130), Some(ExitCode::Interrupted));
        assert_eq!(ExitCode::from_i32(7), None);
        assert_eq!(ExitCode::from_i32(99), None);
    }

    #[test]
    fn test_exit_code_from_error() {
        let cases = [
            (Error::Config("both modes".into()), ExitCode::UsageError),
            (Error::InvalidPath("..".into()), ExitCode::UsageError),
            (Error::Conflict("one key".into()), ExitCode::Conflict),
            (Error::Network("reset".into()), ExitCode::NetworkError),
            (Error::Auth("denied".into()), ExitCode::AuthError),
            (Error::NotFound("k".into()), ExitCode::NotFound),
            (Error::Integrity("tag".into()), ExitCode::IntegrityError),
            (Error::Cancelled, ExitCode::Interrupted),
            (Error::General("x".into()), ExitCode::GeneralError),
        ];
        for (error, expected) in cases {
            assert_eq!(ExitCode::from(&error), expected, "{error}");
        }
    }

    #[test]
    fn test_exit_code_display() {
        let display = format!("{}", ExitCode::Success);
        assert!(display.contains("0"));
        assert!(display.contains("successfully"));

        let display = format!("{}", ExitCode::IntegrityError);
        assert!(display.contains("8"));
        assert!(display.contains("Integrity"));
    }
}

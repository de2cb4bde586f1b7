//! Codec Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A codec error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for encoding and decoding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A persisted fingerprint is not a JSON object of the expected shape.
    #[display("malformed fingerprint: {_0}")]
    MalformedFingerprint(#[error(not(source))] String),
    /// A batch hash report is not well-formed.
    #[display("malformed batch report: {_0}")]
    MalformedReport(#[error(not(source))] String),
    /// The destination of an encoded document could not be written to.
    #[display("unable to write encoded output")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(
            ErrorKind::MalformedReport("at byte 12".to_string()).to_string(),
            "malformed batch report: at byte 12"
        );
        assert_eq!(ErrorKind::Io.to_string(), "unable to write encoded output");
    }

    #[test]
    fn error_kind_retryable() {
        assert!(ErrorKind::Io.is_retryable());
        assert!(!ErrorKind::MalformedFingerprint("not an object".to_string()).is_retryable());
    }
}

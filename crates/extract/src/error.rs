//! Extraction Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction and fingerprinting operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The book archive could not be opened or read. Fatal for every book
    /// inside it.
    #[display("unable to read book archive: {_0}")]
    Archive(#[error(not(source))] String),
    /// A listed entry is missing from the book archive.
    #[display("missing archive entry: {_0}")]
    MissingEntry(#[error(not(source))] String),
    /// The book body claims to be compressed but cannot be decompressed.
    #[display("invalid or corrupted book data")]
    InvalidData,
    /// The book body decompresses to more than the configured limit.
    #[display("decompressed book exceeds {_0} bytes")]
    TooLarge(#[error(not(source))] u64),
    /// The markup of the book could not be walked.
    #[display("malformed book text: {_0}")]
    MalformedText(#[error(not(source))] String),
    /// Image bytes could not be decoded for perceptual hashing.
    #[display("unrecognised or corrupted image")]
    InvalidImage,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Archives are opened read-only from local disk; a failure is only
        // worth retrying if the file system hiccupped.
        matches!(self, Self::Archive(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exn::ResultExt;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::InvalidData.to_string(), "invalid or corrupted book data");
        assert_eq!(
            ErrorKind::MissingEntry("book.fb2".to_string()).to_string(),
            "missing archive entry: book.fb2"
        );
    }

    #[test]
    fn error_kind_retryable() {
        assert!(ErrorKind::Archive("books.zip".to_string()).is_retryable());
        assert!(!ErrorKind::InvalidData.is_retryable());
        assert!(!ErrorKind::TooLarge(1024).is_retryable());
        assert!(!ErrorKind::MalformedText("unexpected eof".to_string()).is_retryable());
    }

    #[test]
    fn error_from_result() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));
        let err: Result<()> = result.or_raise(|| ErrorKind::Archive("books.zip".to_string()));
        let exn = err.unwrap_err();
        assert_eq!(*exn, ErrorKind::Archive("books.zip".to_string()));
    }
}

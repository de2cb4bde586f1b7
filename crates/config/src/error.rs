//! Configuration Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration loading.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A configuration source could not be read or does not match the
    /// expected shape.
    #[display("unable to load configuration{}", source_suffix(_0))]
    Load(#[error(not(source))] Option<PathBuf>),
    /// The configuration loaded, but a value is out of range.
    #[display("invalid configuration value for {_0}")]
    Invalid(#[error(not(source))] &'static str),
}

fn source_suffix(path: &Option<PathBuf>) -> String {
    path.as_ref().map(|path| format!(" from {}", path.display())).unwrap_or_default()
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

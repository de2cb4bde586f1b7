pub mod archive;
pub mod compare;
pub mod error;
pub mod hash;
pub mod models;

use std::path::Path;

use tracing::instrument;

pub use crate::archive::{HashExtractor, RawBook, RawImage};
pub use crate::compare::{Comparator, CompareOptions, Comparison, Side, Signal, Signals, Verdict, compare};
use crate::error::Result;
pub use crate::hash::{FingerprintBuilder, HashOptions, TextHasher};
use crate::models::BookFingerprint;

/// Easy, top-level entrypoint for fingerprinting one book of an archive.
///
/// Opens the archive (and its optional `covers/` and `images/` siblings),
/// reads the entry and hashes it with the default handlers. When
/// fingerprinting many books of the same archive, keep a [`HashExtractor`]
/// and a [`FingerprintBuilder`] around instead.
#[instrument(skip(path, options), fields(path = %path.as_ref().display()))]
pub fn hash_book(path: impl AsRef<Path>, entry: &str, options: &HashOptions) -> Result<BookFingerprint> {
    let mut extractor = HashExtractor::open(path.as_ref())?;
    let book = extractor.extract(entry)?;
    FingerprintBuilder::new(*options).build(book)
}

//! The persisted per-book fingerprint document.

use std::borrow::Cow;

use bookprint_extract::models::{BookFingerprint, HashParseResult, HistogramItem, ImageFingerprint};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{ErrorKind, Result};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Document<'a> {
    #[serde(borrow)]
    folder: Cow<'a, str>,
    #[serde(borrow)]
    file: Cow<'a, str>,
    #[serde(borrow)]
    id: Cow<'a, str>,
    #[serde(borrow)]
    hash: Cow<'a, str>,
    #[serde(borrow)]
    title: Cow<'a, str>,
    #[serde(borrow)]
    histogram: Vec<Item<'a>>,
    #[serde(borrow, skip_serializing_if = "Option::is_none")]
    cover: Option<Cover<'a>>,
    #[serde(borrow, skip_serializing_if = "Vec::is_empty")]
    images: Vec<Image<'a>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Item<'a> {
    count: u64,
    #[serde(borrow)]
    word: Cow<'a, str>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Cover<'a> {
    #[serde(borrow)]
    hash: Cow<'a, str>,
    #[serde(with = "crate::phash")]
    phash: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Image<'a> {
    #[serde(borrow)]
    id: Cow<'a, str>,
    #[serde(borrow)]
    hash: Cow<'a, str>,
    #[serde(with = "crate::phash")]
    phash: u64,
}

impl<'a> From<&'a BookFingerprint> for Document<'a> {
    fn from(book: &'a BookFingerprint) -> Self {
        Self {
            folder: Cow::Borrowed(&book.folder),
            file: Cow::Borrowed(&book.file),
            id: Cow::Borrowed(&book.text.id),
            hash: Cow::Borrowed(&book.text.hash_text),
            title: Cow::Borrowed(&book.text.title),
            histogram: book
                .text
                .histogram
                .iter()
                .map(|item| Item {
                    count: item.count,
                    word: Cow::Borrowed(&item.word),
                })
                .collect(),
            cover: (!book.cover.is_empty()).then(|| Cover {
                hash: Cow::Borrowed(&book.cover.hash),
                phash: book.cover.phash,
            }),
            images: book
                .images
                .iter()
                .map(|image| Image {
                    id: Cow::Borrowed(&image.id),
                    hash: Cow::Borrowed(&image.hash),
                    phash: image.phash,
                })
                .collect(),
        }
    }
}

impl From<Document<'_>> for BookFingerprint {
    fn from(document: Document<'_>) -> Self {
        let cover = document
            .cover
            .map(|cover| ImageFingerprint::new("", cover.hash, cover.phash))
            .unwrap_or_default();
        Self {
            folder: document.folder.into_owned(),
            file: document.file.into_owned(),
            cover,
            images: document
                .images
                .into_iter()
                .map(|image| ImageFingerprint::new(image.id, image.hash, image.phash))
                .collect(),
            text: HashParseResult {
                id: document.id.into_owned(),
                title: document.title.into_owned(),
                hash_text: document.hash.into_owned(),
                histogram: document
                    .histogram
                    .into_iter()
                    .map(|item| HistogramItem::new(item.count, item.word))
                    .collect(),
                ..Default::default()
            },
        }
    }
}

/// Encode a fingerprint as a compact JSON object.
///
/// The `cover` key is omitted when the book has no cover, `images` when it
/// has no inline images. Section counts are not part of the document.
#[instrument(skip_all, fields(folder = %book.folder, file = %book.file))]
pub fn serialize(book: &BookFingerprint) -> Vec<u8> {
    // Strings, integers and sequences of those have no failing encoding.
    serde_json::to_vec(&Document::from(book)).expect("fingerprint document to encode")
}

/// Decode a fingerprint, failing on malformed input.
///
/// Missing keys decode to empty values.
///
/// # Errors
///
/// Returns [`ErrorKind::MalformedFingerprint`] if `bytes` is not a JSON
/// object of the expected shape, including a `phash` that is not hex.
#[instrument(skip_all, fields(size = bytes.len()))]
pub fn try_deserialize(bytes: &[u8]) -> Result<BookFingerprint> {
    let document: Document<'_> = serde_json::from_slice(bytes).or_raise(|| {
        ErrorKind::MalformedFingerprint(format!("{} bytes are not a fingerprint object", bytes.len()))
    })?;
    Ok(document.into())
}

/// Decode a fingerprint, substituting an empty one for malformed input.
///
/// A bad document is logged rather than failing the batch it belongs to.
pub fn deserialize(bytes: &[u8]) -> BookFingerprint {
    try_deserialize(bytes).unwrap_or_else(|err| {
        tracing::warn!(error = ?err, "Ignoring malformed fingerprint");
        BookFingerprint::default()
    })
}

//! Turning a [`RawBook`] into a [`BookFingerprint`].
//!
//! Text is routed to a [`TextHasher`] chosen by the book's file suffix; covers
//! and inline images get an exact BLAKE3 hash plus a [`PerceptualHasher`]
//! hash.

mod content;
mod fb2;
mod generic;
mod image;
mod text;

use std::collections::HashMap;

use tracing::instrument;

use crate::archive::{RawBook, RawImage};
use crate::error::Result;
use crate::models::{BookFingerprint, HashParseResult, ImageFingerprint};

pub use self::content::Encoding;
pub use self::fb2::Fb2Hasher;
pub use self::generic::GenericHasher;
pub use self::image::{GradientHasher, PerceptualHasher};

/// Upper bound on a decompressed book body: 256 MiB.
pub const DEFAULT_MAX_BODY_SIZE: u64 = 256 * 1024 * 1024;

/// Tuning of the word histogram and of body decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashOptions {
    /// Number of most frequent words kept in the histogram
    pub histogram_size: usize,
    /// Words shorter than this (in characters) are not counted
    pub min_word_length: usize,
    /// Compressed bodies inflating past this many bytes are rejected
    pub max_body_size: u64,
}
impl Default for HashOptions {
    fn default() -> Self {
        Self {
            histogram_size: 10,
            min_word_length: 3,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

/// A format-specific walker over a book body.
pub trait TextHasher: Send + Sync {
    fn parse(&self, body: &[u8], options: &HashOptions) -> Result<HashParseResult>;
}

/// Text handlers keyed by lower-cased file suffix, with a fallback.
pub struct HandlerRegistry {
    handlers: HashMap<String, Box<dyn TextHasher>>,
    fallback: Box<dyn TextHasher>,
}
impl HandlerRegistry {
    /// An empty registry sending everything to `fallback`.
    pub fn new(fallback: impl TextHasher + 'static) -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Box::new(fallback),
        }
    }

    pub fn register(&mut self, suffix: impl AsRef<str>, handler: impl TextHasher + 'static) {
        self.handlers.insert(suffix.as_ref().to_lowercase(), Box::new(handler));
    }

    /// Handler for `suffix`, or the fallback.
    pub fn get(&self, suffix: &str) -> &dyn TextHasher {
        self.handlers.get(suffix).map_or(self.fallback.as_ref(), Box::as_ref)
    }
}
impl Default for HandlerRegistry {
    fn default() -> Self {
        let mut registry = Self::new(GenericHasher);
        registry.register("fb2", Fb2Hasher);
        registry
    }
}

/// Builds fingerprints from raw books.
///
/// ```rust
/// use bookprint_extract::archive::RawBook;
/// use bookprint_extract::hash::{FingerprintBuilder, HashOptions};
///
/// let builder = FingerprintBuilder::new(HashOptions::default());
/// let book = RawBook {
///     folder: "books.zip".to_string(),
///     file: "1.txt".to_string(),
///     body: b"Call me Ishmael".to_vec(),
///     ..Default::default()
/// };
/// let fingerprint = builder.build(book).unwrap();
/// assert_eq!(fingerprint.text.title, "Call me Ishmael");
/// assert!(fingerprint.cover.is_empty());
/// ```
pub struct FingerprintBuilder {
    options: HashOptions,
    registry: HandlerRegistry,
    images: Box<dyn PerceptualHasher>,
}
impl FingerprintBuilder {
    pub fn new(options: HashOptions) -> Self {
        Self {
            options,
            registry: HandlerRegistry::default(),
            images: Box::new(GradientHasher),
        }
    }

    /// Route books with the given file suffix to `handler`.
    pub fn with_handler(mut self, suffix: impl AsRef<str>, handler: impl TextHasher + 'static) -> Self {
        self.registry.register(suffix, handler);
        self
    }

    pub fn with_image_hasher(mut self, hasher: impl PerceptualHasher + 'static) -> Self {
        self.images = Box::new(hasher);
        self
    }

    pub fn options(&self) -> &HashOptions {
        &self.options
    }

    /// Hash the text, cover and inline images of a book.
    ///
    /// The raw bodies are dropped once hashing finishes. A text handler
    /// failure fails the book; an undecodable image only loses its perceptual
    /// hash.
    #[instrument(skip_all, fields(folder = %book.folder, file = %book.file))]
    pub fn build(&self, book: RawBook) -> Result<BookFingerprint> {
        let RawBook {
            folder,
            file,
            body,
            cover,
            images,
        } = book;
        let suffix = RawBook::suffix_of(&file);
        let text = self.registry.get(&suffix).parse(&body, &self.options)?;
        drop(body);
        let cover = self.image(RawImage { name: String::new(), ..cover });
        let images = images.into_iter().map(|image| self.image(image)).collect();
        Ok(BookFingerprint {
            folder,
            file,
            cover,
            images,
            text,
        })
    }

    fn image(&self, image: RawImage) -> ImageFingerprint {
        if image.body.is_empty() {
            return ImageFingerprint::new(image.name, String::new(), 0);
        }
        let hash = blake3::hash(&image.body).to_hex().to_string();
        let phash = self.images.hash(&image.body).unwrap_or_else(|err| {
            tracing::warn!(image = %image.name, error = %err, "unable to compute perceptual hash");
            0
        });
        ImageFingerprint::new(image.name, hash, phash)
    }
}
impl Default for FingerprintBuilder {
    fn default() -> Self {
        Self::new(HashOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use exn::bail;
    use rstest::rstest;

    struct Fixed(&'static str);
    impl TextHasher for Fixed {
        fn parse(&self, _: &[u8], _: &HashOptions) -> Result<HashParseResult> {
            Ok(HashParseResult {
                title: self.0.to_string(),
                ..Default::default()
            })
        }
    }

    struct Failing;
    impl TextHasher for Failing {
        fn parse(&self, _: &[u8], _: &HashOptions) -> Result<HashParseResult> {
            bail!(ErrorKind::MalformedText("always".to_string()))
        }
    }

    struct Constant(u64);
    impl PerceptualHasher for Constant {
        fn hash(&self, _: &[u8]) -> Result<u64> {
            Ok(self.0)
        }
    }

    fn book(file: &str) -> RawBook {
        RawBook {
            folder: "books.zip".to_string(),
            file: file.to_string(),
            body: b"Plain words in a plain book".to_vec(),
            ..Default::default()
        }
    }

    #[rstest]
    #[case("1.fb2", "fb2")]
    #[case("1.FB2", "fb2")]
    #[case("1.txt", "fallback")]
    #[case("nested/dir/1.fb2", "fb2")]
    #[case("no-extension", "fallback")]
    fn dispatches_by_suffix(#[case] file: &str, #[case] expected: &str) {
        let mut registry = HandlerRegistry::new(Fixed("fallback"));
        registry.register("FB2", Fixed("fb2"));
        let suffix = RawBook::suffix_of(file);
        let parsed = registry.get(&suffix).parse(b"", &HashOptions::default()).unwrap();
        assert_eq!(parsed.title, expected);
    }

    #[test]
    fn builds_text_and_keeps_origin() {
        let fingerprint = FingerprintBuilder::default().build(book("1.txt")).unwrap();
        assert_eq!(fingerprint.folder, "books.zip");
        assert_eq!(fingerprint.file, "1.txt");
        assert_eq!(fingerprint.text.title, "Plain words in a plain book");
        assert_eq!(fingerprint.text.id.len(), 64);
        assert!(fingerprint.cover.is_empty());
        assert!(fingerprint.images.is_empty());
    }

    #[test]
    fn text_handler_failure_fails_the_book() {
        let builder = FingerprintBuilder::default().with_handler("txt", Failing);
        let err = builder.build(book("1.txt")).unwrap_err();
        assert!(matches!(*err, ErrorKind::MalformedText(_)));
    }

    #[test]
    fn hashes_cover_and_images() {
        let builder = FingerprintBuilder::default().with_image_hasher(Constant(0xFF));
        let mut raw = book("1.txt");
        raw.cover = RawImage::new("1", b"cover bytes".to_vec());
        raw.images = vec![RawImage::new("b.png", b"second".to_vec()), RawImage::new("a.png", Vec::new())];
        let fingerprint = builder.build(raw).unwrap();
        assert_eq!(fingerprint.cover.id, "");
        assert_eq!(fingerprint.cover.hash, blake3::hash(b"cover bytes").to_hex().to_string());
        assert_eq!(fingerprint.cover.phash, 0xFF);
        // Archive order is kept, empty bodies have no hash.
        assert_eq!(fingerprint.images[0].id, "b.png");
        assert_eq!(fingerprint.images[0].phash, 0xFF);
        assert_eq!(fingerprint.images[1], ImageFingerprint::new("a.png", "", 0));
    }

    #[test]
    fn undecodable_image_keeps_exact_hash() {
        let mut raw = book("1.txt");
        raw.images = vec![RawImage::new("broken.jpg", b"definitely not a jpeg".to_vec())];
        let fingerprint = FingerprintBuilder::default().build(raw).unwrap();
        let image = &fingerprint.images[0];
        assert!(!image.is_empty());
        assert_eq!(image.phash, 0);
    }

    #[test]
    fn real_images_get_a_perceptual_hash() {
        let mut raw = book("1.txt");
        raw.cover = RawImage::new("1", super::image::tests::gradient_png(90, 80, true));
        let fingerprint = FingerprintBuilder::default().build(raw).unwrap();
        assert_eq!(fingerprint.cover.phash, u64::MAX);
    }
}

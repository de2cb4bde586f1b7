//! Transparent decompression of book bodies.

use crate::error::{ErrorKind, Result};
use bzip2::read::BzDecoder;
use exn::ResultExt;
use flate2::read::GzDecoder;
use std::borrow::Cow;
use std::io::Read;
use tracing::instrument;

const BZIP2_MAGIC: [u8; 3] = [0x42, 0x5A, 0x68];
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// How a book body is stored inside its archive entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Stored as-is
    #[default]
    Plain,
    /// Bzip2 stream (.bz2)
    Bzip2,
    /// Gzip stream (.gz)
    Gzip,
}
impl Encoding {
    /// Detect the encoding from magic bytes. Anything unrecognised is plain.
    #[must_use]
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(&BZIP2_MAGIC) {
            return Self::Bzip2;
        }
        if bytes.starts_with(&GZIP_MAGIC) {
            return Self::Gzip;
        }
        Self::Plain
    }

    /// Decode a body, borrowing it when it is already plain.
    ///
    /// Decompression stops one byte past `limit`; a stream that gets that far
    /// is rejected. Plain bodies are already in memory and are not checked.
    #[instrument(skip(input), fields(encoding = ?self, input_size = input.len()))]
    pub fn decode<'a>(&self, input: &'a [u8], limit: u64) -> Result<Cow<'a, [u8]>> {
        let mut output = Vec::new();
        let capped = limit.saturating_add(1);
        let read = match self {
            Self::Plain => return Ok(Cow::Borrowed(input)),
            Self::Bzip2 => BzDecoder::new(input).take(capped).read_to_end(&mut output),
            Self::Gzip => GzDecoder::new(input).take(capped).read_to_end(&mut output),
        };
        read.or_raise(|| ErrorKind::InvalidData)?;
        if output.len() as u64 > limit {
            exn::bail!(ErrorKind::TooLarge(limit));
        }
        Ok(Cow::Owned(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use rstest::rstest;
    use std::io::Write;

    #[rstest]
    #[case(b"<?xml version=\"1.0\"?>", Encoding::Plain)]
    #[case(b"", Encoding::Plain)]
    #[case(&[0x42, 0x5A, 0x68, 0x39], Encoding::Bzip2)]
    #[case(&[0x1F, 0x8B, 0x08, 0x00], Encoding::Gzip)]
    fn test_detect(#[case] bytes: &[u8], #[case] expected: Encoding) {
        assert_eq!(Encoding::detect(bytes), expected);
    }

    #[test]
    fn plain_is_borrowed() {
        let body = b"plain text";
        assert!(matches!(Encoding::Plain.decode(body, 0).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn gzip_round_trip() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"Hello, world!").unwrap();
        let compressed = encoder.finish().unwrap();
        let encoding = Encoding::detect(&compressed);
        assert_eq!(encoding, Encoding::Gzip);
        assert_eq!(encoding.decode(&compressed, 13).unwrap().as_ref(), b"Hello, world!");
    }

    #[test]
    fn inflating_past_the_limit_is_rejected() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&vec![b'a'; 1 << 20]).unwrap();
        let compressed = encoder.finish().unwrap();
        assert!(compressed.len() < 4096);
        let err = Encoding::Gzip.decode(&compressed, 4096).unwrap_err();
        assert_eq!(*err, ErrorKind::TooLarge(4096));
    }

    #[test]
    fn corrupt_stream_is_invalid_data() {
        let err = Encoding::Gzip.decode(&[0x1F, 0x8B, 0xFF, 0xFF], 1024).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData);
    }
}

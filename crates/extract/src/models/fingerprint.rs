use super::{HashParseResult, ImageFingerprint};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// The persisted fingerprint of one book.
///
/// Holds only derived hashes; raw bodies never make it into this type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFingerprint {
    /// File name of the archive the book was read from
    pub folder: String,
    /// Entry name inside the archive
    pub file: String,
    pub cover: ImageFingerprint,
    /// Inline images, in archive order (not sorted)
    pub images: Vec<ImageFingerprint>,
    pub text: HashParseResult,
}

impl Display for BookFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "{}/{}, {}", self.folder, self.file, self.text.title)?;
        writeln!(f, "full hash: {}", self.text.id)?;
        write!(f, "top hash: {}", self.text.hash_text)?;
        for item in &self.text.histogram {
            write!(f, "\n{item}")?;
        }
        match self.cover.is_empty() {
            true => write!(f, "\ncover not found")?,
            false => write!(f, "\ncover hash: {}, pHash: {:016x}", self.cover.hash, self.cover.phash)?,
        }
        for image in &self.images {
            write!(f, "\nimage {} hash: {}, pHash: {:016x}", image.id, image.hash, image.phash)?;
        }
        Ok(())
    }
}

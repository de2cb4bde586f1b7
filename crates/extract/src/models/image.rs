use std::cmp::Ordering;

/// Returns the number of differing bits between two perceptual hashes.
#[inline]
#[must_use]
pub fn hamming_distance(left: u64, right: u64) -> u32 {
    (left ^ right).count_ones()
}

/// Fingerprint of a single cover or inline image.
///
/// An empty `hash` means the image had no content; `phash` is only meaningful
/// when `hash` is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ImageFingerprint {
    /// Image file name (without the `<book>/` namespace), empty for covers
    pub id: String,
    /// BLAKE3 hash of the raw image bytes
    pub hash: String,
    /// 64-bit perceptual hash
    pub phash: u64,
}
impl ImageFingerprint {
    pub fn new(id: impl Into<String>, hash: impl Into<String>, phash: u64) -> Self {
        Self {
            id: id.into(),
            hash: hash.into(),
            phash,
        }
    }

    /// Returns `true` when there was no image content to hash.
    pub fn is_empty(&self) -> bool {
        self.hash.is_empty()
    }

    /// Hamming distance between the perceptual hashes of two images.
    pub fn distance(&self, other: &Self) -> u32 {
        hamming_distance(self.phash, other.phash)
    }
}

impl Ord for ImageFingerprint {
    /// Exact hash first, identifier second; images are merge-matched in this
    /// order.
    fn cmp(&self, other: &Self) -> Ordering {
        self.hash
            .cmp(&other.hash)
            .then_with(|| self.id.cmp(&other.id))
            .then_with(|| self.phash.cmp(&other.phash))
    }
}
impl PartialOrd for ImageFingerprint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

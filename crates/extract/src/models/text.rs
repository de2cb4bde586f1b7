use super::{SectionTree, TextHistogram};

/// Result of walking a book's text.
///
/// Equality covers the hashes, title and histogram only. Section counts are a
/// by-product of the walk and are not persisted in a fingerprint document.
#[derive(Debug, Clone, Default)]
pub struct HashParseResult {
    /// BLAKE3 hash of the canonical text
    pub id: String,
    /// Book title, as found in the text (may be empty)
    pub title: String,
    /// Near-duplicate hash derived from the histogram
    pub hash_text: String,
    /// Most frequent words, in order of first appearance
    pub histogram: TextHistogram,
    /// Per-section word counts
    pub sections: SectionTree,
}

impl PartialEq for HashParseResult {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.title == other.title
            && self.hash_text == other.hash_text
            && self.histogram == other.histogram
    }
}
impl Eq for HashParseResult {}

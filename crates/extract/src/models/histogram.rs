use std::fmt::{Display, Formatter, Result as FmtResult};

/// Ordered word histogram of a book's text.
///
/// Items keep the order in which the words were first met while walking the
/// document; they are deliberately not sorted by count.
pub type TextHistogram = Vec<HistogramItem>;

/// A single `(count, word)` pair of a [`TextHistogram`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HistogramItem {
    pub count: u64,
    pub word: String,
}
impl HistogramItem {
    pub fn new(count: u64, word: impl Into<String>) -> Self {
        Self {
            count,
            word: word.into(),
        }
    }
}
impl From<(u64, &str)> for HistogramItem {
    fn from((count, word): (u64, &str)) -> Self {
        Self::new(count, word)
    }
}
impl From<(u64, String)> for HistogramItem {
    fn from((count, word): (u64, String)) -> Self {
        Self::new(count, word)
    }
}
impl Display for HistogramItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}: {}", self.word, self.count)
    }
}

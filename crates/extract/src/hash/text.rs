//! Word accumulation shared by every text handler.

use super::HashOptions;
use crate::models::{HashParseResult, HistogramItem, SectionTree, TextHistogram};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct WordStats {
    count: u64,
    /// Order of first appearance
    first: usize,
}

/// Streams words into the canonical text hash and the frequency table.
///
/// Canonical text is every alphanumeric word, lower-cased, joined with a
/// single space; it is hashed incrementally and never held in memory.
pub(crate) struct TextAnalysis<'a> {
    options: &'a HashOptions,
    canonical: blake3::Hasher,
    words: HashMap<String, WordStats>,
    total: u64,
}
impl<'a> TextAnalysis<'a> {
    pub(crate) fn new(options: &'a HashOptions) -> Self {
        Self {
            options,
            canonical: blake3::Hasher::new(),
            words: HashMap::new(),
            total: 0,
        }
    }

    /// Feed a run of text, returning how many words it contained.
    pub(crate) fn push(&mut self, text: &str) -> u64 {
        let mut pushed = 0;
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|word| !word.is_empty()) {
            let word = word.to_lowercase();
            if self.total > 0 {
                self.canonical.update(b" ");
            }
            self.canonical.update(word.as_bytes());
            self.total += 1;
            pushed += 1;
            if word.chars().count() >= self.options.min_word_length {
                let next = self.words.len();
                self.words.entry(word).or_insert(WordStats { count: 0, first: next }).count += 1;
            }
        }
        pushed
    }

    pub(crate) fn finish(self, title: String, sections: SectionTree) -> HashParseResult {
        let mut ranked: Vec<(String, WordStats)> = self.words.into_iter().collect();
        ranked.sort_by(|(_, a), (_, b)| b.count.cmp(&a.count).then(a.first.cmp(&b.first)));
        ranked.truncate(self.options.histogram_size);
        ranked.sort_by_key(|(_, stats)| stats.first);
        let histogram: TextHistogram =
            ranked.into_iter().map(|(word, stats)| HistogramItem::new(stats.count, word)).collect();
        HashParseResult {
            id: self.canonical.finalize().to_hex().to_string(),
            title,
            hash_text: near_duplicate_hash(&histogram),
            histogram,
            sections,
        }
    }
}

/// Hash of the `"<count> <word>\n"` lines of a histogram.
pub(crate) fn near_duplicate_hash(histogram: &TextHistogram) -> String {
    let mut hasher = blake3::Hasher::new();
    for item in histogram {
        hasher.update(format!("{} {}\n", item.count, item.word).as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

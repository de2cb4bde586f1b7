//! Deciding whether two fingerprints describe the same book.
//!
//! Text, cover and inline images each raise [`Signal`]s; the final
//! [`Verdict`] is derived from the set of raised signals alone.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter, Result as FmtResult};

use tracing::instrument;

use crate::models::{BookFingerprint, ImageFingerprint};

/// Width numeric image identifiers are padded to when ordering explanation
/// lines.
const NUMERIC_KEY_WIDTH: usize = 16;

/// Tuning of the comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareOptions {
    /// Largest Hamming distance (in bits, out of 64) at which two images are
    /// still considered the same picture
    pub threshold: u32,
}
impl Default for CompareOptions {
    fn default() -> Self {
        Self { threshold: 16 }
    }
}

/// One side of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}
impl Side {
    pub fn other(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}
impl Display for Side {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
        })
    }
}

/// Independent observations made while comparing two books.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Signal {
    /// The near-duplicate text hashes differ
    TextDiffers,
    /// The left book has a cover or image the right one lacks
    LeftOnly,
    /// The right book has a cover or image the left one lacks
    RightOnly,
    /// Some cover or image pair differs, but only slightly
    ImagesOnly,
}

/// Set of raised [`Signal`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signals(BTreeSet<Signal>);
impl Signals {
    pub fn insert(&mut self, signal: Signal) {
        self.0.insert(signal);
    }

    /// Raise both side signals: neither book can include the other.
    pub fn all_different(&mut self) {
        self.insert(Signal::LeftOnly);
        self.insert(Signal::RightOnly);
    }

    pub fn contains(&self, signal: Signal) -> bool {
        self.0.contains(&signal)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Signal> + '_ {
        self.0.iter().copied()
    }
}
impl Extend<Signal> for Signals {
    fn extend<T: IntoIterator<Item = Signal>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}
impl FromIterator<Signal> for Signals {
    fn from_iter<T: IntoIterator<Item = Signal>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Final classification of a pair of books.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Same,
    ProbablySame,
    Different,
    /// `side` contains everything the other book has, and more
    Includes { side: Side, probably: bool },
}
impl Verdict {
    /// Classify a set of signals.
    ///
    /// # Panics
    ///
    /// If text differs without both side signals being raised, which the
    /// comparator never produces.
    pub fn from_signals(signals: &Signals) -> Self {
        let text = signals.contains(Signal::TextDiffers);
        let left = signals.contains(Signal::LeftOnly);
        let right = signals.contains(Signal::RightOnly);
        let images = signals.contains(Signal::ImagesOnly);
        match (text, left, right, images) {
            (false, false, false, false) => Self::Same,
            (false, false, false, true) => Self::ProbablySame,
            (_, true, true, _) => Self::Different,
            (false, true, false, probably) => Self::Includes { side: Side::Left, probably },
            (false, false, true, probably) => Self::Includes { side: Side::Right, probably },
            (true, _, _, _) => unreachable!("differing text must mark both sides"),
        }
    }
}
impl Display for Verdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Same => f.write_str("books are the same"),
            Self::ProbablySame => f.write_str("books are probably the same"),
            Self::Different => f.write_str("books are different"),
            Self::Includes { side, probably: true } => write!(f, "{side} probably includes {}", side.other()),
            Self::Includes { side, probably: false } => write!(f, "{side} includes {}", side.other()),
        }
    }
}

/// Outcome of comparing two fingerprints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub verdict: Verdict,
    pub signals: Signals,
    /// Human readable reasoning, in the order it was established
    pub explanation: Vec<String>,
}

/// Compares fingerprints using a perceptual distance threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct Comparator {
    options: CompareOptions,
}
impl Comparator {
    pub fn new(options: CompareOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompareOptions {
        &self.options
    }

    #[instrument(skip_all, fields(left = %left.file, right = %right.file))]
    pub fn compare(&self, left: &BookFingerprint, right: &BookFingerprint) -> Comparison {
        let mut signals = Signals::default();
        let mut explanation = Vec::new();
        Self::texts(left, right, &mut signals, &mut explanation);
        self.covers(&left.cover, &right.cover, &mut signals, &mut explanation);
        self.images(&left.images, &right.images, &mut signals, &mut explanation);
        let verdict = Verdict::from_signals(&signals);
        tracing::debug!(%verdict, signals = signals.len(), "compared books");
        Comparison {
            verdict,
            signals,
            explanation,
        }
    }

    fn texts(left: &BookFingerprint, right: &BookFingerprint, signals: &mut Signals, lines: &mut Vec<String>) {
        if left.text.hash_text == right.text.hash_text {
            lines.push("texts are equal".to_string());
            return;
        }
        signals.insert(Signal::TextDiffers);
        signals.all_different();
        lines.push("texts are different".to_string());
        lines.extend(
            left.text.histogram.iter().zip(&right.text.histogram).map(|(left, right)| format!("{left} | {right}")),
        );
    }

    fn covers(
        &self,
        left: &ImageFingerprint,
        right: &ImageFingerprint,
        signals: &mut Signals,
        lines: &mut Vec<String>,
    ) {
        match (left.is_empty(), right.is_empty()) {
            _ if left.hash == right.hash => {
                if !left.is_empty() {
                    lines.push("covers are equal".to_string());
                }
            },
            (false, true) => {
                signals.insert(Signal::LeftOnly);
                lines.push("left has cover".to_string());
            },
            (true, false) => {
                signals.insert(Signal::RightOnly);
                lines.push("right has cover".to_string());
            },
            _ => {
                let distance = left.distance(right);
                let closeness = self.classify(distance, signals);
                lines.push(format!("covers are {closeness}, distance {distance}"));
            },
        }
    }

    /// Two-phase image matching: exact hashes first, then greedy nearest
    /// perceptual pairs.
    fn images(
        &self,
        left: &[ImageFingerprint],
        right: &[ImageFingerprint],
        signals: &mut Signals,
        lines: &mut Vec<String>,
    ) {
        // Signals raised by the images alone; earlier phases may already have
        // raised the same ones.
        let mut found = Signals::default();
        let (left, right) = exact_leftovers(left, right);

        let mut pairs = Vec::new();
        for (l, a) in left.iter().enumerate().filter(|(_, image)| !image.is_empty()) {
            for (r, b) in right.iter().enumerate().filter(|(_, image)| !image.is_empty()) {
                pairs.push((a.distance(b), l, r));
            }
        }
        pairs.sort_by_key(|&(distance, _, _)| distance);

        let mut left_taken = vec![false; left.len()];
        let mut right_taken = vec![false; right.len()];
        let mut keyed = Vec::new();
        for (distance, l, r) in pairs {
            if left_taken[l] || right_taken[r] {
                continue;
            }
            left_taken[l] = true;
            right_taken[r] = true;
            let closeness = self.classify(distance, &mut found);
            keyed.push((
                numeric_sort_key(&left[l].id),
                format!("images {} and {} are {closeness}, distance {distance}", left[l].id, right[r].id),
            ));
        }
        for (side, images, taken) in [(Side::Left, &left, &left_taken), (Side::Right, &right, &right_taken)] {
            for image in images.iter().zip(taken.iter()).filter(|(_, taken)| !**taken).map(|(image, _)| image) {
                found.insert(match side {
                    Side::Left => Signal::LeftOnly,
                    Side::Right => Signal::RightOnly,
                });
                keyed.push((numeric_sort_key(&image.id), format!("{side} has image {}", image.id)));
            }
        }
        keyed.sort_by(|(a, _), (b, _)| a.cmp(b));
        lines.extend(keyed.into_iter().map(|(_, line)| line));

        lines.push(match found.is_empty() {
            true => "images are equal".to_string(),
            false => "images are different".to_string(),
        });
        signals.extend(found.iter());
    }

    /// Map a perceptual distance to a signal, returning how the pair reads.
    fn classify(&self, distance: u32, signals: &mut Signals) -> &'static str {
        if distance == 0 {
            "perceptually equal"
        } else if distance <= self.options.threshold {
            signals.insert(Signal::ImagesOnly);
            "similar"
        } else {
            signals.all_different();
            "different"
        }
    }
}

/// Compare two fingerprints with the default options.
pub fn compare(left: &BookFingerprint, right: &BookFingerprint) -> Comparison {
    Comparator::default().compare(left, right)
}

/// Merge-walk both sides ordered by exact hash, returning the images without
/// an exact counterpart.
fn exact_leftovers<'a>(
    left: &'a [ImageFingerprint],
    right: &'a [ImageFingerprint],
) -> (Vec<&'a ImageFingerprint>, Vec<&'a ImageFingerprint>) {
    let mut left: Vec<_> = left.iter().collect();
    let mut right: Vec<_> = right.iter().collect();
    left.sort();
    right.sort();
    let (mut left_free, mut right_free) = (Vec::new(), Vec::new());
    let (mut l, mut r) = (0, 0);
    while l < left.len() && r < right.len() {
        match left[l].hash.cmp(&right[r].hash) {
            std::cmp::Ordering::Less => {
                left_free.push(left[l]);
                l += 1;
            },
            std::cmp::Ordering::Greater => {
                right_free.push(right[r]);
                r += 1;
            },
            std::cmp::Ordering::Equal => {
                l += 1;
                r += 1;
            },
        }
    }
    left_free.extend_from_slice(&left[l..]);
    right_free.extend_from_slice(&right[r..]);
    (left_free, right_free)
}

/// Ordering key for image identifiers: a purely numeric stem (the part before
/// the first `.`) is zero-padded so `2.jpg` sorts before `10.jpg`.
pub fn numeric_sort_key(id: &str) -> String {
    let (stem, rest) = id.find('.').map_or((id, ""), |dot| id.split_at(dot));
    match !stem.is_empty() && stem.len() <= NUMERIC_KEY_WIDTH && stem.bytes().all(|b| b.is_ascii_digit()) {
        true => format!("{stem:0>width$}{rest}", width = NUMERIC_KEY_WIDTH),
        false => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HashParseResult, HistogramItem};
    use rstest::rstest;

    fn book(hash_text: &str, cover: ImageFingerprint, images: Vec<ImageFingerprint>) -> BookFingerprint {
        BookFingerprint {
            folder: "books.zip".to_string(),
            file: "1.fb2".to_string(),
            cover,
            images,
            text: HashParseResult {
                id: format!("id-{hash_text}"),
                title: "Title".to_string(),
                hash_text: hash_text.to_string(),
                histogram: vec![HistogramItem::new(5, "whale"), HistogramItem::new(3, "ship")],
                ..Default::default()
            },
        }
    }

    fn cover(hash: &str, phash: u64) -> ImageFingerprint {
        ImageFingerprint::new("", hash, phash)
    }

    fn mirrored(verdict: Verdict) -> Verdict {
        match verdict {
            Verdict::Includes { side, probably } => Verdict::Includes {
                side: side.other(),
                probably,
            },
            other => other,
        }
    }

    #[test]
    fn same_cover_same_text_is_the_same_book() {
        let a = book("T", cover("X", 0), Vec::new());
        let b = book("T", cover("X", 0), Vec::new());
        let comparison = compare(&a, &b);
        assert_eq!(comparison.verdict, Verdict::Same);
        assert_eq!(comparison.verdict.to_string(), "books are the same");
        assert_eq!(comparison.explanation, ["texts are equal", "covers are equal", "images are equal"]);
    }

    #[test]
    fn extra_cover_on_the_right_includes_left() {
        let a = book("T", ImageFingerprint::default(), Vec::new());
        let b = book("T", cover("Y", 0), Vec::new());
        let comparison = compare(&a, &b);
        assert!(comparison.explanation.iter().any(|line| line == "right has cover"));
        assert_eq!(comparison.verdict, Verdict::Includes { side: Side::Right, probably: false });
        assert_eq!(comparison.verdict.to_string(), "right includes left");
    }

    #[test]
    fn one_close_and_one_distant_image_pair_is_different() {
        let a = book(
            "T",
            ImageFingerprint::default(),
            vec![ImageFingerprint::new("1.jpg", "a1", 0), ImageFingerprint::new("2.jpg", "a2", u64::MAX)],
        );
        let b = book(
            "T",
            ImageFingerprint::default(),
            vec![ImageFingerprint::new("1.jpg", "b1", 0b111), ImageFingerprint::new("2.jpg", "b2", (1 << 24) - 1)],
        );
        let comparison = compare(&a, &b);
        assert!(comparison.signals.contains(Signal::ImagesOnly));
        assert!(comparison.signals.contains(Signal::LeftOnly));
        assert!(comparison.signals.contains(Signal::RightOnly));
        assert_eq!(comparison.verdict.to_string(), "books are different");
        assert_eq!(
            comparison.explanation[1..],
            [
                "images 1.jpg and 1.jpg are similar, distance 3",
                "images 2.jpg and 2.jpg are different, distance 40",
                "images are different",
            ]
        );
    }

    #[test]
    fn compare_is_reflexive() {
        let books = [
            book("T", ImageFingerprint::default(), Vec::new()),
            book("T", cover("X", 42), Vec::new()),
            book(
                "T",
                cover("X", 42),
                vec![ImageFingerprint::new("1.png", "a", 1), ImageFingerprint::new("1.png", "a", 1)],
            ),
        ];
        for f in &books {
            let comparison = compare(f, f);
            assert_eq!(comparison.verdict, Verdict::Same);
            assert!(comparison.signals.is_empty());
            assert!(comparison.explanation.contains(&"texts are equal".to_string()));
            assert!(comparison.explanation.contains(&"images are equal".to_string()));
            let covers = comparison.explanation.iter().any(|line| line.starts_with("covers"));
            assert_eq!(covers, !f.cover.is_empty());
        }
    }

    #[rstest]
    #[case(book("T", cover("X", 0), Vec::new()), book("U", cover("X", 0), Vec::new()))]
    #[case(book("T", cover("X", 0), Vec::new()), book("T", cover("Y", 1), Vec::new()))]
    #[case(book("T", cover("X", 0), Vec::new()), book("T", ImageFingerprint::default(), Vec::new()))]
    #[case(
        book("T", cover("X", 0), vec![ImageFingerprint::new("1.jpg", "i", 7)]),
        book("T", cover("Y", 3), Vec::new())
    )]
    #[case(
        book("T", cover("X", 0), vec![ImageFingerprint::new("1.jpg", "i", 0)]),
        book("T", cover("X", 0), vec![ImageFingerprint::new("1.jpg", "j", u64::MAX)])
    )]
    fn classification_is_symmetric(#[case] a: BookFingerprint, #[case] b: BookFingerprint) {
        let forward = compare(&a, &b).verdict;
        let backward = compare(&b, &a).verdict;
        assert_eq!(forward, mirrored(backward));
    }

    #[test]
    fn cover_signal_is_monotonic_in_distance() {
        for k in 0..=64u32 {
            let phash = u64::MAX.checked_shr(64 - k).unwrap_or(0);
            let comparison = compare(&book("T", cover("X", 0), Vec::new()), &book("T", cover("Y", phash), Vec::new()));
            let expected = match k {
                0 => Verdict::Same,
                1..=16 => Verdict::ProbablySame,
                _ => Verdict::Different,
            };
            assert_eq!(comparison.verdict, expected, "distance {k}");
        }
    }

    #[test]
    fn threshold_is_configurable() {
        let a = book("T", cover("X", 0), Vec::new());
        let b = book("T", cover("Y", 0xFF), Vec::new());
        assert_eq!(compare(&a, &b).verdict, Verdict::ProbablySame);
        let strict = Comparator::new(CompareOptions { threshold: 4 });
        assert_eq!(strict.compare(&a, &b).verdict, Verdict::Different);
    }

    #[test]
    fn differing_text_lists_histogram_pairs() {
        let a = book("T", ImageFingerprint::default(), Vec::new());
        let mut b = book("U", ImageFingerprint::default(), Vec::new());
        b.text.histogram.truncate(1);
        let comparison = compare(&a, &b);
        assert!(comparison.signals.contains(Signal::TextDiffers));
        assert_eq!(comparison.explanation[..2], ["texts are different", "whale: 5 | whale: 5"]);
        assert_eq!(comparison.verdict, Verdict::Different);
    }

    #[test]
    fn extra_images_probably_include() {
        let a = book(
            "T",
            cover("X", 0),
            vec![
                ImageFingerprint::new("10.jpg", "c", 9),
                ImageFingerprint::new("2.jpg", "b", 0),
                ImageFingerprint::new("1.jpg", "a", 0),
            ],
        );
        let b = book("T", cover("Y", 1), vec![ImageFingerprint::new("1.jpg", "a", 0)]);
        let comparison = compare(&a, &b);
        assert_eq!(comparison.verdict.to_string(), "left probably includes right");
        assert_eq!(
            comparison.explanation[2..],
            ["left has image 2.jpg", "left has image 10.jpg", "images are different"]
        );
    }

    #[test]
    fn distant_images_differ_even_when_the_covers_already_do() {
        let a = book("T", cover("X", 0), vec![ImageFingerprint::new("1.jpg", "a", 0)]);
        let b = book("T", cover("Y", u64::MAX), vec![ImageFingerprint::new("1.jpg", "b", u64::MAX)]);
        let comparison = compare(&a, &b);
        assert_eq!(comparison.verdict, Verdict::Different);
        assert_eq!(
            comparison.explanation[2..],
            ["images 1.jpg and 1.jpg are different, distance 64", "images are different"]
        );
    }

    #[test]
    fn exact_images_match_regardless_of_order() {
        let images = vec![ImageFingerprint::new("1.jpg", "a", 0), ImageFingerprint::new("2.jpg", "b", 5)];
        let reversed = images.iter().rev().cloned().collect();
        let comparison = compare(&book("T", cover("X", 0), images), &book("T", cover("X", 0), reversed));
        assert_eq!(comparison.verdict, Verdict::Same);
    }

    #[test]
    #[should_panic(expected = "differing text")]
    fn text_without_sides_is_a_logic_error() {
        Verdict::from_signals(&[Signal::TextDiffers].into_iter().collect());
    }

    #[rstest]
    #[case("12.jpg", "0000000000000012.jpg")]
    #[case("12", "0000000000000012")]
    #[case("cover.png", "cover.png")]
    #[case("1a.png", "1a.png")]
    #[case("", "")]
    #[case("12345678901234567.jpg", "12345678901234567.jpg")]
    fn numeric_key(#[case] id: &str, #[case] expected: &str) {
        assert_eq!(numeric_sort_key(id), expected);
    }
}

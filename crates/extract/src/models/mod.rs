mod fingerprint;
mod histogram;
mod image;
mod section;
mod text;

pub use self::fingerprint::BookFingerprint;
pub use self::histogram::{HistogramItem, TextHistogram};
pub use self::image::{ImageFingerprint, hamming_distance};
pub use self::section::{Section, SectionId, SectionTree};
pub use self::text::HashParseResult;

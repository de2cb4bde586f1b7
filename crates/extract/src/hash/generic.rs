use super::content::Encoding;
use super::text::TextAnalysis;
use super::{HashOptions, TextHasher};
use crate::error::Result;
use crate::models::{HashParseResult, SectionTree};
use std::borrow::Cow;
use tracing::instrument;

const MAX_TITLE_CHARS: usize = 256;

/// Fallback handler for any book format without a dedicated handler.
///
/// The body may be gzip or bzip2 compressed. Markup tags are dropped, the
/// first non-empty line becomes the title and the whole text is treated as a
/// single section.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericHasher;

impl TextHasher for GenericHasher {
    #[instrument(skip_all, fields(body_size = body.len()))]
    fn parse(&self, body: &[u8], options: &HashOptions) -> Result<HashParseResult> {
        let content = Encoding::detect(body).decode(body, options.max_body_size)?;
        let decoded = String::from_utf8_lossy(&content);
        let text = strip_markup(&decoded);
        let title = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(|line| line.chars().take(MAX_TITLE_CHARS).collect())
            .unwrap_or_default();
        let mut analysis = TextAnalysis::new(options);
        let words = analysis.push(&text);
        let mut sections = SectionTree::new();
        sections.set_count(sections.root(), words);
        Ok(analysis.finish(title, sections))
    }
}

/// Drop everything between `<` and `>` when the text looks like markup.
fn strip_markup(text: &str) -> Cow<'_, str> {
    if !text.trim_start_matches('\u{feff}').trim_start().starts_with('<') {
        return Cow::Borrowed(text);
    }
    let mut stripped = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            // Tags separate words.
            '>' if in_tag => {
                in_tag = false;
                stripped.push(' ');
            },
            _ if !in_tag => stripped.push(c),
            _ => {},
        }
    }
    Cow::Owned(stripped)
}

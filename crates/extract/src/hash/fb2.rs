//! FictionBook (FB2) text handler.

use super::content::Encoding;
use super::text::TextAnalysis;
use super::{HashOptions, TextHasher};
use crate::error::{ErrorKind, Result};
use crate::models::{HashParseResult, SectionId, SectionTree};
use exn::ResultExt;
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::instrument;

const BODY: &str = "body";
const SECTION: &str = "section";
/// Location of the book title below the document element.
const TITLE_PATH: [&str; 3] = ["description", "title-info", "book-title"];

/// Handler for FictionBook documents.
///
/// Only text inside `<body>` elements counts towards the content hash, so
/// edits to the `<description>` block (metadata) or embedded `<binary>`
/// payloads do not change it. Nested `<section>` elements become a
/// [`SectionTree`] keyed by their 1-based position among siblings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fb2Hasher;

/// Book-keeping for a single pass over the document.
struct Walk<'a> {
    analysis: TextAnalysis<'a>,
    sections: SectionTree,
    current: SectionId,
    /// Words directly inside each open section, innermost last. Index 0 is
    /// body text outside any section.
    counts: Vec<u64>,
    /// Children seen so far for each open section, innermost last.
    ordinals: Vec<usize>,
    elements: Vec<String>,
    title: String,
}
impl<'a> Walk<'a> {
    fn new(options: &'a HashOptions) -> Self {
        let sections = SectionTree::new();
        let current = sections.root();
        Self {
            analysis: TextAnalysis::new(options),
            sections,
            current,
            counts: vec![0],
            ordinals: vec![0],
            elements: Vec::new(),
            title: String::new(),
        }
    }

    fn in_body(&self) -> bool {
        self.elements.iter().any(|element| element == BODY)
    }

    fn in_title(&self) -> bool {
        self.elements.len() == TITLE_PATH.len() + 1 && self.elements[1..].iter().map(String::as_str).eq(TITLE_PATH)
    }

    fn open_section(&mut self) {
        let ordinal = self.ordinals.last_mut().map(|ordinal| {
            *ordinal += 1;
            *ordinal
        });
        let key = ordinal.unwrap_or(1).to_string();
        self.current = self.sections.insert(self.current, key, 0);
        self.counts.push(0);
        self.ordinals.push(0);
    }

    fn close_section(&mut self) {
        // The root entry is never popped; an unbalanced close is already
        // rejected by the reader's end-name check.
        if self.counts.len() > 1 {
            let count = self.counts.pop().unwrap_or_default();
            self.ordinals.pop();
            self.sections.set_count(self.current, count);
            self.current = self.sections.parent(self.current).unwrap_or(self.sections.root());
        }
    }

    fn start(&mut self, name: String) {
        if name == SECTION && self.in_body() {
            self.open_section();
        }
        self.elements.push(name);
    }

    fn end(&mut self) {
        if let Some(name) = self.elements.pop()
            && name == SECTION
            && self.in_body()
        {
            self.close_section();
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_title() {
            if !self.title.is_empty() {
                self.title.push(' ');
            }
            self.title.push_str(text.trim());
        } else if self.in_body() {
            let words = self.analysis.push(text);
            if let Some(count) = self.counts.last_mut() {
                *count += words;
            }
        }
    }

    fn finish(mut self) -> HashParseResult {
        let root = self.sections.root();
        self.sections.set_count(root, self.counts.first().copied().unwrap_or_default());
        self.analysis.finish(self.title, self.sections)
    }
}

impl TextHasher for Fb2Hasher {
    #[instrument(skip_all, fields(body_size = body.len()))]
    fn parse(&self, body: &[u8], options: &HashOptions) -> Result<HashParseResult> {
        // FB2 files are frequently distributed as `.fb2.gz` under the same name.
        let content = Encoding::detect(body).decode(body, options.max_body_size)?;
        let mut reader = Reader::from_reader(content.as_ref());
        reader.config_mut().trim_text(true);
        let mut walk = Walk::new(options);
        let mut buf = Vec::new();
        loop {
            let event = reader
                .read_event_into(&mut buf)
                .or_raise(|| ErrorKind::MalformedText(format!("at byte {}", reader.buffer_position())))?;
            match event {
                Event::Start(element) => {
                    walk.start(String::from_utf8_lossy(element.local_name().as_ref()).into_owned());
                },
                Event::Empty(element) => {
                    walk.start(String::from_utf8_lossy(element.local_name().as_ref()).into_owned());
                    walk.end();
                },
                Event::End(_) => walk.end(),
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .or_raise(|| ErrorKind::MalformedText(format!("at byte {}", reader.buffer_position())))?;
                    walk.text(&text);
                },
                Event::CData(data) => walk.text(&String::from_utf8_lossy(&data)),
                Event::Eof => break,
                _ => {},
            }
            buf.clear();
        }
        Ok(walk.finish())
    }
}

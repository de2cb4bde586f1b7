//! The batch hash report: one XML document describing many books.
//!
//! ```xml
//! <books source="library">
//!   <book id="…" hash="…" folder="fb2-000001.zip" file="1.fb2" title="…" originFolder="" originFile="">
//!     <cover pHash="00000000000000ab">c0ffee</cover>
//!     <image id="1.jpg" pHash="0000000000000001">f00d</image>
//!     <section id="1" count="120"><section id="1" count="40"/></section>
//!     <histogram><item count="7" word="whale"/></histogram>
//!   </book>
//! </books>
//! ```
//!
//! Top-level `<section>` elements are children of an implicit root section.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::ops::ControlFlow;

use bookprint_extract::models::{
    BookFingerprint, HashParseResult, HistogramItem, ImageFingerprint, SectionId, SectionTree, TextHistogram,
};
use exn::ResultExt;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::encoding::Decoder;
use quick_xml::{Reader, Writer};
use tracing::instrument;

use crate::error::{ErrorKind, Result};
use crate::phash;

const BOOKS: &str = "books";
const BOOK: &str = "book";
const ORIGIN: &str = "origin";
const COVER: &str = "cover";
const IMAGE: &str = "image";
const SECTION: &str = "section";
const HISTOGRAM: &str = "histogram";
const ITEM: &str = "item";

/// One `<book>` record of a batch report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportBook {
    /// Exact hash of the canonical text
    pub id: String,
    /// Near-duplicate hash
    pub hash: String,
    pub folder: String,
    pub file: String,
    pub title: String,
    /// Archive the book was first seen in, when it was re-packaged
    pub origin_folder: String,
    pub origin_file: String,
    pub cover: ImageFingerprint,
    pub images: Vec<ImageFingerprint>,
    pub sections: SectionTree,
    pub histogram: TextHistogram,
}
impl ReportBook {
    /// Drop the origin and keep what a comparison needs.
    pub fn into_fingerprint(self) -> BookFingerprint {
        BookFingerprint {
            folder: self.folder,
            file: self.file,
            cover: self.cover,
            images: self.images,
            text: HashParseResult {
                id: self.id,
                title: self.title,
                hash_text: self.hash,
                histogram: self.histogram,
                sections: self.sections,
            },
        }
    }
}
impl From<BookFingerprint> for ReportBook {
    fn from(book: BookFingerprint) -> Self {
        Self {
            id: book.text.id,
            hash: book.text.hash_text,
            folder: book.folder,
            file: book.file,
            title: book.text.title,
            origin_folder: String::new(),
            origin_file: String::new(),
            cover: book.cover,
            images: book.images,
            sections: book.text.sections,
            histogram: book.text.histogram,
        }
    }
}

/// Receives books as a batch report is parsed.
pub trait ReportObserver {
    /// Called when the `<books>` element opens, with its `source` attribute.
    fn on_parse_started(&mut self, source: &str) {
        let _ = source;
    }

    /// Called for every completed `<book>`; return `Break` to stop parsing.
    fn on_book_parsed(&mut self, book: ReportBook) -> ControlFlow<()>;
}
impl<F> ReportObserver for F
where
    F: FnMut(ReportBook) -> ControlFlow<()>,
{
    fn on_book_parsed(&mut self, book: ReportBook) -> ControlFlow<()> {
        self(book)
    }
}

/// How a batch report parse ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The whole document was read
    Completed,
    /// The observer asked to stop
    Stopped,
}

/// State of a single forward pass.
#[derive(Default)]
struct Parse {
    elements: Vec<String>,
    book: Option<ReportBook>,
    /// Section new `<section>` elements are inserted under
    current: Option<SectionId>,
    books: usize,
}
impl Parse {
    /// Whether the open elements are exactly `path`, outermost first.
    fn at(&self, path: &[&str]) -> bool {
        self.elements.iter().map(String::as_str).eq(path.iter().copied())
    }

    fn start(
        &mut self,
        name: String,
        attributes: HashMap<String, String>,
        observer: &mut impl ReportObserver,
    ) -> Result<()> {
        self.elements.push(name);
        let name = self.elements.last().map(String::as_str).unwrap_or_default();
        let attribute = |key: &str| attributes.get(key).cloned().unwrap_or_default();
        if self.at(&[BOOKS]) {
            observer.on_parse_started(&attribute("source"));
        } else if self.at(&[BOOKS, BOOK]) {
            let book = ReportBook {
                id: attribute("id"),
                hash: attribute("hash"),
                folder: attribute("folder"),
                file: attribute("file"),
                title: attribute("title"),
                origin_folder: attribute("originFolder"),
                origin_file: attribute("originFile"),
                ..Default::default()
            };
            self.current = Some(book.sections.root());
            self.book = Some(book);
        } else if let Some(book) = self.book.as_mut() {
            if self.elements.len() > 2 && name == SECTION {
                let parent = self.current.unwrap_or(book.sections.root());
                let count = number(&attributes, "count")?;
                self.current = Some(book.sections.insert(parent, attribute("id"), count));
            } else if self.elements[2..] == [ORIGIN] {
                book.origin_folder = attribute("folder");
                book.origin_file = attribute("file");
            } else if self.elements[2..] == [COVER] {
                book.cover.phash = pixels(&attributes)?;
            } else if self.elements[2..] == [IMAGE] {
                book.images.push(ImageFingerprint::new(attribute("id"), String::new(), pixels(&attributes)?));
            } else if self.elements[2..] == [HISTOGRAM, ITEM] {
                book.histogram.push(HistogramItem::new(number(&attributes, "count")?, attribute("word")));
            }
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        let Some(book) = self.book.as_mut().filter(|_| self.elements.len() == 3) else {
            return;
        };
        match self.elements[2].as_str() {
            COVER => book.cover.hash.push_str(text),
            IMAGE => {
                if let Some(image) = book.images.last_mut() {
                    image.hash.push_str(text);
                }
            },
            _ => {},
        }
    }

    fn end(&mut self, observer: &mut impl ReportObserver) -> ControlFlow<()> {
        let at_book = self.at(&[BOOKS, BOOK]);
        let Some(name) = self.elements.pop() else {
            return ControlFlow::Continue(());
        };
        if at_book {
            self.current = None;
            if let Some(book) = self.book.take() {
                self.books += 1;
                return observer.on_book_parsed(book);
            }
        } else if name == SECTION
            && let (Some(book), Some(current)) = (self.book.as_ref(), self.current)
        {
            self.current = book.sections.parent(current).or(Some(current));
        }
        ControlFlow::Continue(())
    }
}

fn malformed(reader: &Reader<impl BufRead>) -> ErrorKind {
    ErrorKind::MalformedReport(format!("at byte {}", reader.buffer_position()))
}

fn attributes(element: &BytesStart<'_>, decoder: Decoder) -> Result<HashMap<String, String>> {
    element
        .attributes()
        .map(|attribute| {
            let attribute = attribute.or_raise(|| ErrorKind::MalformedReport("invalid attribute".to_string()))?;
            let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
            let value = attribute
                .decode_and_unescape_value(decoder)
                .or_raise(|| ErrorKind::MalformedReport(format!("invalid value of attribute {key}")))?;
            Ok((key, value.into_owned()))
        })
        .collect()
}

fn number(attributes: &HashMap<String, String>, key: &str) -> Result<u64> {
    match attributes.get(key).map(|value| value.trim()) {
        None | Some("") => Ok(0),
        Some(value) => value
            .parse::<u64>()
            .or_raise(|| ErrorKind::MalformedReport(format!("{key} is not a number: {value:?}"))),
    }
}

fn pixels(attributes: &HashMap<String, String>) -> Result<u64> {
    let value = attributes.get("pHash").map(String::as_str).unwrap_or_default();
    phash::parse(value).or_raise(|| ErrorKind::MalformedReport(format!("pHash is not hexadecimal: {value:?}")))
}

/// Stream a batch report, handing each book to `observer` as soon as its
/// element closes.
///
/// The reader is consumed in a single forward pass.
///
/// # Errors
///
/// Returns [`ErrorKind::MalformedReport`] if the document is not well-formed
/// XML or a numeric attribute cannot be parsed. Books already handed to the
/// observer stay delivered.
#[instrument(skip_all)]
pub fn parse_batch_report<R: BufRead>(reader: R, observer: &mut impl ReportObserver) -> Result<ParseOutcome> {
    let mut reader = Reader::from_reader(reader);
    reader.config_mut().trim_text(true);
    let mut parse = Parse::default();
    let mut buf = Vec::new();
    loop {
        let event = reader.read_event_into(&mut buf).or_raise(|| malformed(&reader))?;
        let flow = match event {
            Event::Start(element) => {
                let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
                parse.start(name, attributes(&element, reader.decoder())?, observer)?;
                ControlFlow::Continue(())
            },
            Event::Empty(element) => {
                let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
                parse.start(name, attributes(&element, reader.decoder())?, observer)?;
                parse.end(observer)
            },
            Event::End(_) => parse.end(observer),
            Event::Text(text) => {
                parse.text(&text.unescape().or_raise(|| malformed(&reader))?);
                ControlFlow::Continue(())
            },
            Event::CData(data) => {
                parse.text(&String::from_utf8_lossy(&data));
                ControlFlow::Continue(())
            },
            Event::Eof => break,
            _ => ControlFlow::Continue(()),
        };
        if flow.is_break() {
            tracing::debug!(books = parse.books, "Batch report parse stopped by observer");
            return Ok(ParseOutcome::Stopped);
        }
        buf.clear();
    }
    tracing::debug!(books = parse.books, "Batch report parsed");
    Ok(ParseOutcome::Completed)
}

/// Writes a batch report one book at a time.
pub struct ReportWriter<W: Write> {
    writer: Writer<W>,
}
impl<W: Write> ReportWriter<W> {
    /// Write the XML declaration and open `<books source="…">`.
    pub fn new(inner: W, source: &str) -> Result<Self> {
        let mut writer = Writer::new_with_indent(inner, b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .or_raise(|| ErrorKind::Io)?;
        writer
            .write_event(Event::Start(BytesStart::new(BOOKS).with_attributes([("source", source)])))
            .or_raise(|| ErrorKind::Io)?;
        Ok(Self { writer })
    }

    pub fn write_book(&mut self, book: &ReportBook) -> Result<()> {
        let start = BytesStart::new(BOOK).with_attributes([
            ("id", book.id.as_str()),
            ("hash", book.hash.as_str()),
            ("folder", book.folder.as_str()),
            ("file", book.file.as_str()),
            ("title", book.title.as_str()),
            ("originFolder", book.origin_folder.as_str()),
            ("originFile", book.origin_file.as_str()),
        ]);
        self.event(Event::Start(start))?;
        if !book.cover.is_empty() {
            self.image(COVER, None, &book.cover)?;
        }
        for image in &book.images {
            self.image(IMAGE, Some(&image.id), image)?;
        }
        let root = book.sections.get(book.sections.root());
        for (key, child) in root.children() {
            self.section(&book.sections, key, child)?;
        }
        if !book.histogram.is_empty() {
            self.event(Event::Start(BytesStart::new(HISTOGRAM)))?;
            for item in &book.histogram {
                let count = item.count.to_string();
                let element =
                    BytesStart::new(ITEM).with_attributes([("count", count.as_str()), ("word", item.word.as_str())]);
                self.event(Event::Empty(element))?;
            }
            self.event(Event::End(BytesEnd::new(HISTOGRAM)))?;
        }
        self.event(Event::End(BytesEnd::new(BOOK)))
    }

    /// Close `<books>` and hand back the destination.
    pub fn finish(mut self) -> Result<W> {
        self.event(Event::End(BytesEnd::new(BOOKS)))?;
        let mut inner = self.writer.into_inner();
        inner.write_all(b"\n").or_raise(|| ErrorKind::Io)?;
        inner.flush().or_raise(|| ErrorKind::Io)?;
        Ok(inner)
    }

    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer.write_event(event).or_raise(|| ErrorKind::Io)
    }

    fn image(&mut self, name: &str, id: Option<&str>, image: &ImageFingerprint) -> Result<()> {
        let phash = phash::format(image.phash);
        let mut start = BytesStart::new(name);
        if let Some(id) = id {
            start.push_attribute(("id", id));
        }
        start.push_attribute(("pHash", phash.as_str()));
        self.event(Event::Start(start))?;
        self.event(Event::Text(BytesText::new(&image.hash)))?;
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn section(&mut self, tree: &SectionTree, key: &str, id: SectionId) -> Result<()> {
        let section = tree.get(id);
        let count = section.count.to_string();
        let start = BytesStart::new(SECTION).with_attributes([("id", key), ("count", count.as_str())]);
        if section.is_empty() {
            return self.event(Event::Empty(start));
        }
        self.event(Event::Start(start))?;
        for (key, child) in section.children() {
            self.section(tree, key, child)?;
        }
        self.event(Event::End(BytesEnd::new(SECTION)))
    }
}

/// Write a complete batch report.
pub fn write_batch_report<'a, W: Write>(
    inner: W,
    source: &str,
    books: impl IntoIterator<Item = &'a ReportBook>,
) -> Result<W> {
    let mut writer = ReportWriter::new(inner, source)?;
    for book in books {
        writer.write_book(book)?;
    }
    writer.finish()
}

//! Reading books, covers and inline images out of zip archives.
//!
//! A book archive `<dir>/<base>.zip` may be accompanied by two sibling
//! archives:
//!
//! - `<dir>/covers/<base>.zip`, holding one entry per book named after the
//!   book's base name (no extension), and
//! - `<dir>/images/<base>.zip`, holding inline images namespaced as
//!   `<bookBaseName>/<imageFile>`.
//!
//! Both siblings are optional.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use tracing::instrument;
use zip::ZipArchive;
use zip::result::ZipError;

/// Directory holding the covers sibling archive.
pub const COVERS: &str = "covers";
/// Directory holding the inline images sibling archive.
pub const IMAGES: &str = "images";

/// Raw bytes of a cover or inline image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawImage {
    pub name: String,
    pub body: Vec<u8>,
}
impl RawImage {
    pub fn new(name: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

/// Everything read from the archives for one book, before hashing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBook {
    /// File name of the book archive
    pub folder: String,
    /// Entry name of the book inside the archive
    pub file: String,
    pub body: Vec<u8>,
    /// Empty body when the book has no cover
    pub cover: RawImage,
    pub images: Vec<RawImage>,
}
impl RawBook {
    /// Lower-cased extension of the book entry, used to pick a text handler.
    pub fn suffix(&self) -> String {
        Self::suffix_of(&self.file)
    }

    /// Lower-cased extension of an entry name, empty when there is none.
    pub fn suffix_of(entry: &str) -> String {
        let name = file_name(entry);
        match name.rsplit_once('.') {
            Some((base, extension)) if !base.is_empty() => extension.to_lowercase(),
            _ => String::new(),
        }
    }
}

/// Final path component of an archive entry name.
fn file_name(entry: &str) -> &str {
    entry.rsplit('/').next().unwrap_or(entry)
}

/// File name without its last extension (`a.b.fb2` becomes `a.b`).
pub(crate) fn complete_base_name(entry: &str) -> &str {
    let name = file_name(entry);
    match name.rsplit_once('.') {
        Some((base, _)) if !base.is_empty() => base,
        _ => name,
    }
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>> {
    let mut entry = archive.by_name(name).or_raise(|| ErrorKind::MissingEntry(name.to_string()))?;
    let mut body = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or_default());
    entry.read_to_end(&mut body).or_raise(|| ErrorKind::Archive(name.to_string()))?;
    Ok(body)
}

fn entry_names(archive: &ZipArchive<File>) -> impl Iterator<Item = String> + '_ {
    archive.file_names().filter(|name| !name.ends_with('/')).map(str::to_string)
}

/// An optional covers/images archive sitting next to the book archive.
struct Sibling {
    path: PathBuf,
    archive: ZipArchive<File>,
    /// Sorted, so namespaced lookups are range queries.
    names: BTreeSet<String>,
}
impl Sibling {
    fn open(book_archive: &Path, kind: &str) -> Option<Self> {
        let base = complete_base_name(book_archive.file_name()?.to_str()?);
        let path = book_archive.parent()?.join(kind).join(format!("{base}.zip"));
        if !path.is_file() {
            return None;
        }
        // A sibling that is present but unreadable is treated like a missing
        // one; only the primary archive is fatal.
        let archive = match File::open(&path).map_err(ZipError::from).and_then(ZipArchive::new) {
            Ok(archive) => archive,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Ignoring unreadable {kind} archive");
                return None;
            },
        };
        let names = entry_names(&archive).collect();
        Some(Self { path, archive, names })
    }

    fn read(&mut self, name: &str) -> Option<Vec<u8>> {
        match read_entry(&mut self.archive, name) {
            Ok(body) => Some(body),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), entry = name, error = %err, "Skipping unreadable entry");
                None
            },
        }
    }

    /// Names of every entry under `<namespace>/`, via a binary-searched range.
    fn namespaced(&self, namespace: &str) -> Vec<String> {
        let prefix = format!("{namespace}/");
        self.names
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .take_while(|name| name.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

/// Reads raw book records out of a book archive and its sibling archives.
///
/// An extractor owns its archive handles exclusively; open one extractor per
/// worker when extracting in parallel.
pub struct HashExtractor {
    path: PathBuf,
    folder: String,
    archive: ZipArchive<File>,
    entries: Vec<String>,
    covers: Option<Sibling>,
    images: Option<Sibling>,
}
impl HashExtractor {
    /// Open a book archive along with any sibling covers/images archives.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Archive`] if the book archive itself cannot be
    /// opened. Missing or broken sibling archives are not errors.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let display = path.display().to_string();
        let file = File::open(&path).or_raise(|| ErrorKind::Archive(display.clone()))?;
        let archive = ZipArchive::new(file).or_raise(|| ErrorKind::Archive(display))?;
        let entries = entry_names(&archive).collect();
        let folder = path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
        let covers = Sibling::open(&path, COVERS);
        let images = Sibling::open(&path, IMAGES);
        tracing::debug!(
            folder = %folder,
            covers = covers.is_some(),
            images = images.is_some(),
            "Opened book archive"
        );
        Ok(Self {
            path,
            folder,
            archive,
            entries,
            covers,
            images,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the book archive.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Names of the books inside the archive, in archive order.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Read a book together with its cover and inline images.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::MissingEntry`] if `entry` is not in the book
    /// archive, or [`ErrorKind::Archive`] if it cannot be read.
    #[instrument(skip(self), fields(folder = %self.folder))]
    pub fn extract(&mut self, entry: &str) -> Result<RawBook> {
        let body = read_entry(&mut self.archive, entry)?;
        let base = complete_base_name(entry);

        let cover = self
            .covers
            .as_mut()
            .filter(|covers| covers.names.contains(base))
            .and_then(|covers| covers.read(base))
            .map(|body| RawImage::new(String::new(), body))
            .unwrap_or_default();

        let images = match self.images.as_mut() {
            Some(images) => {
                let names = images.namespaced(base);
                names
                    .into_iter()
                    .filter_map(|name| {
                        let body = images.read(&name)?;
                        Some(RawImage::new(file_name(&name), body))
                    })
                    .collect()
            },
            None => Vec::new(),
        };

        tracing::debug!(
            entry,
            size = body.len(),
            cover = !cover.body.is_empty(),
            images = images.len(),
            "Extracted book"
        );
        Ok(RawBook {
            folder: self.folder.clone(),
            file: entry.to_string(),
            body,
            cover,
            images,
        })
    }
}

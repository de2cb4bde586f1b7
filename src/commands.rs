//! Subcommand implementations.

use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::ops::ControlFlow;
use std::path::Path;

use bookprint_codec::{ParseOutcome, ReportBook, ReportWriter, parse_batch_report, serialize, try_deserialize};
use bookprint_config::Config;
use bookprint_extract::models::BookFingerprint;
use bookprint_extract::{Comparator, FingerprintBuilder, HashExtractor, HashOptions};
use exn::ResultExt;
use rayon::prelude::*;
use tracing::instrument;

use crate::cli::Command;
use crate::error::{ErrorKind, Result};

pub fn run(config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Hash { archive, entries } => hash(config, &archive, entries),
        Command::Report { archive, source } => report(config, &archive, source),
        Command::Compare { left, right } => compare(config, &left, &right),
        Command::Show { fingerprint } => show(&fingerprint),
        Command::Audit { report, limit } => audit(&report, limit),
    }
}

fn stdout_error() -> ErrorKind {
    ErrorKind::Io("standard output".to_string())
}

/// Fingerprint the given entries (every entry when empty) of an archive.
///
/// Books are hashed in parallel, each worker with its own extractor. A book
/// that fails is logged and left out; results keep archive order.
#[instrument(skip_all, fields(path = %path.display(), requested = entries.len()))]
fn fingerprint_archive(path: &Path, entries: Vec<String>, options: HashOptions) -> Result<Vec<BookFingerprint>> {
    let extractor = HashExtractor::open(path).or_raise(|| ErrorKind::Archive)?;
    let entries = match entries.is_empty() {
        true => extractor.entries().map(str::to_string).collect(),
        false => entries,
    };
    drop(extractor);
    let builder = FingerprintBuilder::new(options);
    let results: Vec<_> = entries
        .par_iter()
        .map_init(
            || HashExtractor::open(path),
            |extractor, entry| {
                let Ok(extractor) = extractor.as_mut() else {
                    exn::bail!(ErrorKind::Archive);
                };
                let book = extractor.extract(entry).or_raise(|| ErrorKind::Archive)?;
                builder.build(book).or_raise(|| ErrorKind::Decode)
            },
        )
        .collect();
    let total = entries.len();
    let fingerprints: Vec<_> = entries
        .iter()
        .zip(results)
        .filter_map(|(entry, result)| match result {
            Ok(fingerprint) => Some(fingerprint),
            Err(err) => {
                tracing::error!(entry = %entry, error = ?err, "Unable to fingerprint book");
                None
            },
        })
        .collect();
    tracing::info!(total, hashed = fingerprints.len(), "Fingerprinted archive");
    Ok(fingerprints)
}

fn hash(config: &Config, archive: &Path, entries: Vec<String>) -> Result<()> {
    let fingerprints = fingerprint_archive(archive, entries, config.hash_options())?;
    let mut out = io::stdout().lock();
    for fingerprint in &fingerprints {
        out.write_all(&serialize(fingerprint)).or_raise(stdout_error)?;
        out.write_all(b"\n").or_raise(stdout_error)?;
    }
    out.flush().or_raise(stdout_error)
}

fn report(config: &Config, archive: &Path, source: Option<String>) -> Result<()> {
    let source = source.unwrap_or_else(|| {
        archive
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let fingerprints = fingerprint_archive(archive, Vec::new(), config.hash_options())?;
    let mut writer = ReportWriter::new(io::stdout().lock(), &source).or_raise(stdout_error)?;
    for fingerprint in fingerprints {
        writer.write_book(&ReportBook::from(fingerprint)).or_raise(stdout_error)?;
    }
    writer.finish().or_raise(stdout_error)?;
    Ok(())
}

fn read_fingerprint(path: &Path) -> Result<BookFingerprint> {
    let bytes = fs::read(path).or_raise(|| ErrorKind::Io(path.display().to_string()))?;
    try_deserialize(&bytes).or_raise(|| ErrorKind::Decode)
}

fn compare(config: &Config, left: &Path, right: &Path) -> Result<()> {
    let left = read_fingerprint(left)?;
    let right = read_fingerprint(right)?;
    let comparison = Comparator::new(config.compare_options()).compare(&left, &right);
    let mut out = io::stdout().lock();
    for line in &comparison.explanation {
        writeln!(out, "{line}").or_raise(stdout_error)?;
    }
    writeln!(out, "{}", comparison.verdict).or_raise(stdout_error)
}

fn show(path: &Path) -> Result<()> {
    let fingerprint = read_fingerprint(path)?;
    writeln!(io::stdout().lock(), "{fingerprint}").or_raise(stdout_error)
}

/// One line describing a book of a batch report.
fn summary(book: &ReportBook) -> String {
    let cover = match book.cover.is_empty() {
        true => "no cover",
        false => "cover",
    };
    format!(
        "{}/{}, {}: {cover}, {} images, {} sections, text {}",
        book.folder,
        book.file,
        book.title,
        book.images.len(),
        book.sections.len() - 1,
        book.id
    )
}

fn audit(path: &Path, limit: Option<usize>) -> Result<()> {
    let file = File::open(path).or_raise(|| ErrorKind::Io(path.display().to_string()))?;
    let mut out = io::stdout().lock();
    let mut seen = 0usize;
    let mut written = Ok(());
    let outcome = parse_batch_report(BufReader::new(file), &mut |book: ReportBook| {
        seen += 1;
        written = writeln!(out, "{}", summary(&book));
        match written.is_err() || limit.is_some_and(|limit| seen >= limit) {
            true => ControlFlow::Break(()),
            false => ControlFlow::Continue(()),
        }
    })
    .or_raise(|| ErrorKind::Decode)?;
    written.or_raise(stdout_error)?;
    if outcome == ParseOutcome::Stopped {
        tracing::info!(books = seen, "Stopped reading report");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookprint_extract::models::{ImageFingerprint, SectionTree};

    #[test]
    fn summary_counts_sections_below_root() {
        let mut sections = SectionTree::new();
        let first = sections.insert(sections.root(), "1", 10);
        sections.insert(first, "1", 4);
        let book = ReportBook {
            id: "abc".to_string(),
            folder: "fb2-000001.zip".to_string(),
            file: "1.fb2".to_string(),
            title: "Moby Dick".to_string(),
            images: vec![ImageFingerprint::new("1.jpg", "f00d", 0)],
            sections,
            ..Default::default()
        };
        assert_eq!(
            summary(&book),
            "fb2-000001.zip/1.fb2, Moby Dick: no cover, 1 images, 2 sections, text abc"
        );
    }
}

//! Command-line argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Fingerprint packaged books and decide whether two of them are the same work
#[derive(Parser, Debug)]
#[command(name = "bookprint", version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `bookprint_extract=trace` (overrides config)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print one JSON fingerprint per book of an archive
    Hash {
        /// Book archive; `covers/` and `images/` siblings are picked up automatically
        archive: PathBuf,

        /// Only hash these entries (can be specified multiple times)
        #[arg(short, long = "entry", value_name = "NAME")]
        entries: Vec<String>,
    },

    /// Print an XML batch report describing every book of an archive
    Report {
        archive: PathBuf,

        /// Library identifier written to the report (defaults to the archive name)
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Compare two JSON fingerprints and explain the verdict
    Compare { left: PathBuf, right: PathBuf },

    /// Print a JSON fingerprint in human-readable form
    Show { fingerprint: PathBuf },

    /// Print one summary line per book of an XML batch report
    Audit {
        report: PathBuf,

        /// Stop after this many books
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

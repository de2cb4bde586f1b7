//! Encoding and decoding of book fingerprints.
//!
//! - [`serialize`]/[`deserialize`]: the persisted per-book JSON document.
//! - [`parse_batch_report`]/[`ReportWriter`]: the streamed XML report
//!   describing every book of a library.

pub mod error;
mod json;
mod phash;
mod report;

pub use crate::json::{deserialize, serialize, try_deserialize};
pub use crate::report::{ParseOutcome, ReportBook, ReportObserver, ReportWriter, parse_batch_report, write_batch_report};

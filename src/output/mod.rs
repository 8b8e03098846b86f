//! Output formatters for duplicate scan results.
//!
//! - [`TextOutput`]: human-readable listing, one block per group
//! - [`JsonOutput`]: machine-readable output for scripting
//!
//! # Example
//!
//! ```no_run
//! use dupetree::duplicates::DuplicateFinder;
//! use dupetree::output::TextOutput;
//! use std::path::PathBuf;
//!
//! let finder = DuplicateFinder::with_defaults();
//! let (map, summary) = finder.find_duplicates(&[PathBuf::from(".")]).unwrap();
//! TextOutput::new(&map, &summary).write_to(&mut std::io::stdout()).unwrap();
//! ```

pub mod json;

use std::io::{self, Write};

use bytesize::ByteSize;
use serde::Serialize;

use crate::duplicates::{DuplicateMap, ScanSummary};
use crate::tree::DIR_KEY_PREFIX;

pub use json::{JsonOutput, JsonOutputError};

/// What a duplicate-map entry groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    /// Whole directories with identical content
    Directory,
    /// Individual files
    File,
}

/// Classify a duplicate-map key.
#[must_use]
pub fn group_kind(key: &str) -> GroupKind {
    if key.starts_with(DIR_KEY_PREFIX) {
        GroupKind::Directory
    } else {
        GroupKind::File
    }
}

/// Plain-text listing of a scan result.
#[derive(Debug)]
pub struct TextOutput<'a> {
    map: &'a DuplicateMap,
    summary: &'a ScanSummary,
}

impl<'a> TextOutput<'a> {
    /// Create a listing.
    #[must_use]
    pub fn new(map: &'a DuplicateMap, summary: &'a ScanSummary) -> Self {
        Self { map, summary }
    }

    /// Write directory groups, then file groups, then a one-line summary.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for kind in [GroupKind::Directory, GroupKind::File] {
            for (key, paths) in self.map.iter().filter(|(k, _)| group_kind(k) == kind) {
                let label = match kind {
                    GroupKind::Directory => "directory",
                    GroupKind::File => "file",
                };
                writeln!(writer, "{} group {} ({} copies)", label, short_key(key), paths.len())?;
                for path in paths {
                    writeln!(writer, "  {}", path.display())?;
                }
                writeln!(writer)?;
            }
        }

        let s = self.summary;
        writeln!(
            writer,
            "{} directories and {} files duplicated ({} in directories); {} files scanned, {} hashed, {} skipped, {:.2}s",
            s.duplicate_directories,
            s.duplicate_files,
            ByteSize::b(s.duplicate_directory_bytes),
            s.total_files,
            ByteSize::b(s.bytes_hashed),
            s.skipped_items,
            s.scan_duration.as_secs_f64()
        )
    }
}

/// Key shortened for display: prefix plus the first 12 hex characters.
fn short_key(key: &str) -> &str {
    let cut = key
        .char_indices()
        .nth(DIR_KEY_PREFIX.len() + 12)
        .map_or(key.len(), |(i, _)| i);
    &key[..cut]
}

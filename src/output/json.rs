//! JSON output formatter for duplicate scan results.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "duplicates": [
//!     {
//!       "key": "dir:9f86d08...",
//!       "kind": "directory",
//!       "paths": ["/data/a/photos", "/data/b/photos"]
//!     }
//!   ],
//!   "summary": {
//!     "roots": ["/data/a", "/data/b"],
//!     "total_files": 100,
//!     "duplicate_directories": 2,
//!     "duplicate_files": 0,
//!     "skipped_items": 0,
//!     "bytes_hashed": 65536,
//!     "scan_duration_ms": 12,
//!     "exit_code": 0,
//!     "exit_code_name": "DT000"
//!   }
//! }
//! ```
//!
//! # Example
//!
//! ```no_run
//! use dupetree::duplicates::DuplicateFinder;
//! use dupetree::error::ExitCode;
//! use dupetree::output::JsonOutput;
//! use std::path::PathBuf;
//!
//! let finder = DuplicateFinder::with_defaults();
//! let (map, summary) = finder.find_duplicates(&[PathBuf::from(".")]).unwrap();
//! let output = JsonOutput::new(&map, &summary, ExitCode::Success);
//! println!("{}", output.to_json_pretty().unwrap());
//! ```

use std::io::Write;

use serde::Serialize;

use super::{group_kind, GroupKind};
use crate::duplicates::{DuplicateMap, ScanSummary};
use crate::error::ExitCode;

/// One entry of the duplicate map.
#[derive(Debug, Clone, Serialize)]
pub struct JsonDuplicateGroup {
    /// Content key (`file:` or `dir:` prefixed)
    pub key: String,
    /// Whether the members are files or directories
    pub kind: GroupKind,
    /// Member paths, sorted
    pub paths: Vec<String>,
}

/// Per-stage hashing results.
#[derive(Debug, Clone, Serialize)]
pub struct JsonStage {
    /// Stage label
    pub stage: String,
    /// Files entering the stage
    pub input_files: usize,
    /// Files eliminated by the stage
    pub eliminated: usize,
    /// Files that failed to hash
    pub failed_files: usize,
    /// Bytes read by the stage
    pub bytes_read: u64,
}

/// Summary statistics in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Canonical scan roots
    pub roots: Vec<String>,
    /// Common ancestor of the roots
    pub common_ancestor: String,
    /// Eligible files found
    pub total_files: usize,
    /// Total size of eligible files in bytes
    pub total_size: u64,
    /// Files sharing their size with another file
    pub candidates: usize,
    /// Files eliminated by size alone
    pub eliminated_by_size: usize,
    /// Hashing stages in execution order
    pub stages: Vec<JsonStage>,
    /// Directory units reported
    pub duplicate_directories: usize,
    /// Loose duplicate files reported
    pub duplicate_files: usize,
    /// Total size of the reported directory units
    pub duplicate_directory_bytes: u64,
    /// Entries skipped because of access errors
    pub skipped_items: usize,
    /// Bytes read while hashing
    pub bytes_hashed: u64,
    /// Duration of the scan in milliseconds
    pub scan_duration_ms: u64,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "DT000")
    pub exit_code_name: String,
}

impl JsonSummary {
    /// Create a JSON summary from a [`ScanSummary`] and an exit code.
    #[must_use]
    pub fn from_scan_summary(summary: &ScanSummary, exit_code: ExitCode) -> Self {
        Self {
            roots: summary.roots.iter().map(|p| p.display().to_string()).collect(),
            common_ancestor: summary.common_ancestor.display().to_string(),
            total_files: summary.total_files,
            total_size: summary.total_size,
            candidates: summary.candidates,
            eliminated_by_size: summary.eliminated_by_size,
            stages: summary
                .hash_stages
                .iter()
                .map(|s| JsonStage {
                    stage: s.stage.label().to_string(),
                    input_files: s.input_files,
                    eliminated: s.eliminated,
                    failed_files: s.failed_files,
                    bytes_read: s.bytes_read,
                })
                .collect(),
            duplicate_directories: summary.duplicate_directories,
            duplicate_files: summary.duplicate_files,
            duplicate_directory_bytes: summary.duplicate_directory_bytes,
            skipped_items: summary.skipped_items,
            bytes_hashed: summary.bytes_hashed,
            scan_duration_ms: summary.scan_duration.as_millis() as u64,
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// Duplicate groups, directories first, each in key order
    pub duplicates: Vec<JsonDuplicateGroup>,
    /// Scan summary statistics
    pub summary: JsonSummary,
}

impl JsonOutput {
    /// Create a JSON output from the duplicate map, summary and exit code.
    ///
    /// # Example
    ///
    /// ```
    /// use dupetree::duplicates::{DuplicateMap, ScanSummary};
    /// use dupetree::error::ExitCode;
    /// use dupetree::output::JsonOutput;
    /// use std::path::PathBuf;
    ///
    /// let mut map = DuplicateMap::new();
    /// map.insert("file:3-abc".to_string(), vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    ///
    /// let output = JsonOutput::new(&map, &ScanSummary::default(), ExitCode::Success);
    /// assert_eq!(output.duplicates.len(), 1);
    /// ```
    #[must_use]
    pub fn new(map: &DuplicateMap, summary: &ScanSummary, exit_code: ExitCode) -> Self {
        let mut duplicates: Vec<JsonDuplicateGroup> = map
            .iter()
            .map(|(key, paths)| JsonDuplicateGroup {
                key: key.clone(),
                kind: group_kind(key),
                paths: paths.iter().map(|p| p.display().to_string()).collect(),
            })
            .collect();
        duplicates.sort_by_key(|g| g.kind);

        Self {
            duplicates,
            summary: JsonSummary::from_scan_summary(summary, exit_code),
        }
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error while writing JSON: {0}")]
    Io(#[from] std::io::Error),
}

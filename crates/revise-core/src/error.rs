//! Error types for the review store and the CSV codec.

use std::path::PathBuf;

use thiserror::Error;

/// Failures while reading or writing the persisted records.
#[derive(Debug, Error)]
pub enum StorageError {
  /// Record could not be read from disk
  #[error("failed reading {path}: {source}")]
  Read {
    path:   PathBuf,
    source: std::io::Error
  },

  /// Record could not be written to disk
  #[error("failed writing {path}: {source}")]
  Write {
    path:   PathBuf,
    source: std::io::Error
  },

  /// Record content is not valid JSON for its shape
  #[error("failed parsing {path} line {line}: {source}")]
  Decode {
    path:   PathBuf,
    line:   usize,
    source: serde_json::Error
  },

  /// Record could not be serialized
  #[error("failed encoding record: {0}")]
  Encode(#[from] serde_json::Error),

  /// Temp file could not replace the record
  #[error("failed to persist {path}: {source}")]
  Persist {
    path:   PathBuf,
    source: tempfile::PersistError
  }
}

/// Errors raised by task and type mutations.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("no task with id {0}")]
  NotFound(String),

  #[error("task type already exists: {0}")]
  DuplicateType(String),

  #[error("cannot delete the last task type")]
  LastType,

  #[error(
    "task type {label} is used by \
     {count} task(s)"
  )]
  TypeInUse { label: String, count: usize },

  #[error("task type name cannot be empty")]
  EmptyType,

  #[error(
    "task type {0:?} cannot contain \
     commas, quotes or line breaks"
  )]
  InvalidTypeLabel(String),

  #[error("unknown task type: {0}")]
  UnknownType(String),

  #[error("task name cannot be empty")]
  EmptyName,

  #[error(transparent)]
  Storage(#[from] StorageError)
}

/// First offending row of a rejected CSV import.
///
/// Line numbers count non-empty lines with the header as line 1.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
  #[error("csv has no data rows")]
  NoDataRows,

  #[error(
    "line {line}: fewer than 5 fields"
  )]
  MalformedRow { line: usize },

  #[error(
    "line {line}: date must be \
     YYYY-MM-DD"
  )]
  InvalidDate { line: usize },

  #[error("line {line}: name is empty")]
  EmptyName { line: usize }
}

impl ParseError {
  pub fn line(&self) -> Option<usize> {
    match self {
      | Self::NoDataRows => None,
      | Self::MalformedRow { line }
      | Self::InvalidDate { line }
      | Self::EmptyName { line } => {
        Some(*line)
      }
    }
  }
}

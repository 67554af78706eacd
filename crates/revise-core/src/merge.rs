use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use tracing::debug;

use crate::task::{Task, TaskDraft};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Imported rows replace the whole store.
    Overwrite,
    /// Imported rows go after the existing ones.
    Append,
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportMode::Overwrite => f.write_str("overwrite"),
            ImportMode::Append => f.write_str("append"),
        }
    }
}

impl FromStr for ImportMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" | "replace" => Ok(ImportMode::Overwrite),
            "append" => Ok(ImportMode::Append),
            other => Err(anyhow!("unknown import mode: {other} (expected overwrite or append)")),
        }
    }
}

/// Gives parsed rows fresh ids.
pub fn materialize(drafts: Vec<TaskDraft>) -> Vec<Task> {
    drafts.into_iter().map(Task::from_draft).collect()
}

/// Combines the store with imported tasks. Append keeps both orders and
/// does not deduplicate.
pub fn merge(existing: Vec<Task>, incoming: Vec<Task>, mode: ImportMode) -> Vec<Task> {
    debug!(
        existing = existing.len(),
        incoming = incoming.len(),
        %mode,
        "merging imported tasks"
    );
    match mode {
        ImportMode::Overwrite => incoming,
        ImportMode::Append => {
            let mut merged = existing;
            merged.extend(incoming);
            merged
        }
    }
}

//! CSV export and import of review items.
//!
//! The grammar is deliberately small: `"` toggles a quoted section in
//! which commas do not split, quote characters themselves are dropped and
//! there is no escaped-quote sequence. Export wraps `name` and `note` in
//! quotes without escaping, so values containing `"` do not survive a
//! round trip. Line breaks in `name` and `note` are written as spaces.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, warn};

use crate::datetime::parse_iso_date;
use crate::error::ParseError;
use crate::task::{Priority, Task, TaskDraft};

pub const BOM: char = '\u{feff}';
pub const HEADER: [&str; 6] = ["日期", "事项名称", "事项类型", "优先级", "完成状态", "备注"];
pub const COMPLETED_GLYPH: &str = "✅";
pub const INCOMPLETE_GLYPH: &str = "❌";
/// Type given to imported rows that leave the column blank.
pub const FALLBACK_TYPE: &str = "知识点复习";

const MIN_FIELDS: usize = 5;

fn date_pattern() -> &'static Regex {
    static DATE_RE: OnceLock<Regex> = OnceLock::new();
    DATE_RE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap_or_else(|err| {
            unreachable!("date pattern is a valid regex: {err}")
        })
    })
}

/// Renders the export file: BOM, header, then one row per task.
#[tracing::instrument(skip(tasks), fields(count = tasks.len()))]
pub fn serialize(tasks: &[Task]) -> String {
    let mut rows = Vec::with_capacity(tasks.len() + 1);
    rows.push(HEADER.join(","));

    for task in tasks {
        let row = [
            task.date.format("%Y-%m-%d").to_string(),
            format!("\"{}\"", single_line(&task.name)),
            task.task_type.clone(),
            task.priority.label().to_string(),
            task.status_glyph().to_string(),
            format!("\"{}\"", single_line(&task.note)),
        ];
        rows.push(row.join(","));
    }

    let mut out = String::new();
    out.push(BOM);
    out.push_str(&rows.join("\n"));
    out
}

/// Export file name for the given day, e.g. `复习事项_20240301.csv`.
pub fn export_file_name(today: NaiveDate) -> String {
    format!("复习事项_{}.csv", today.format("%Y%m%d"))
}

/// Rows are newline-delimited, so line breaks inside a value become spaces.
fn single_line(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// Parses an import file. The first invalid row aborts the whole parse.
#[tracing::instrument(skip(text), fields(bytes = text.len()))]
pub fn parse(text: &str) -> Result<Vec<TaskDraft>, ParseError> {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let lines: Vec<&str> = text
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .collect();
    if lines.len() < 2 {
        return Err(ParseError::NoDataRows);
    }

    let mut drafts = Vec::with_capacity(lines.len() - 1);
    for (idx, raw) in lines.iter().enumerate().skip(1) {
        let line = idx + 1;
        drafts.push(parse_row(raw.trim(), line)?);
    }

    debug!(count = drafts.len(), "parsed csv rows");
    Ok(drafts)
}

fn parse_row(row: &str, line: usize) -> Result<TaskDraft, ParseError> {
    let fields = split_fields(row);
    if fields.len() < MIN_FIELDS {
        return Err(ParseError::MalformedRow { line });
    }

    let date = if date_pattern().is_match(&fields[0]) {
        parse_iso_date(&fields[0])
    } else {
        None
    };
    let Some(date) = date else {
        return Err(ParseError::InvalidDate { line });
    };

    if fields[1].is_empty() {
        return Err(ParseError::EmptyName { line });
    }

    let task_type = if fields[2].is_empty() {
        FALLBACK_TYPE.to_string()
    } else {
        fields[2].clone()
    };

    let priority = if fields[3].is_empty() {
        Priority::default()
    } else {
        fields[3].parse::<Priority>().unwrap_or_else(|_| {
            warn!(line, value = %fields[3], "unrecognized priority; using default");
            Priority::default()
        })
    };

    Ok(TaskDraft {
        date,
        name: fields[1].clone(),
        task_type,
        priority,
        completed: Some(fields[4] == COMPLETED_GLYPH),
        note: fields.get(5).cloned().unwrap_or_default(),
    })
}

/// Splits one row on commas outside quoted sections; fields are trimmed.
pub fn split_fields(row: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in row.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

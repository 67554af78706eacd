use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Priority {
    #[serde(rename = "高", alias = "high", alias = "High")]
    High,
    #[default]
    #[serde(rename = "中", alias = "medium", alias = "Medium")]
    Medium,
    #[serde(rename = "低", alias = "low", alias = "Low")]
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// Label used in storage, CSV files and the table view.
    pub fn label(self) -> &'static str {
        match self {
            Priority::High => "高",
            Priority::Medium => "中",
            Priority::Low => "低",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "高" | "high" | "h" => Ok(Priority::High),
            "中" | "medium" | "m" => Ok(Priority::Medium),
            "低" | "low" | "l" => Ok(Priority::Low),
            other => Err(anyhow!("unknown priority: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,

    pub date: NaiveDate,

    pub name: String,

    #[serde(rename = "type")]
    pub task_type: String,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub note: String,
}

/// Field set of a task before it has an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    pub date: NaiveDate,
    pub name: String,
    pub task_type: String,
    pub priority: Priority,
    pub completed: Option<bool>,
    pub note: String,
}

impl TaskDraft {
    pub fn new(date: NaiveDate, name: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            date,
            name: name.into(),
            task_type: task_type.into(),
            priority: Priority::default(),
            completed: None,
            note: String::new(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub date: Option<NaiveDate>,
    pub name: Option<String>,
    pub task_type: Option<String>,
    pub priority: Option<Priority>,
    pub completed: Option<bool>,
    pub note: Option<String>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.name.is_none()
            && self.task_type.is_none()
            && self.priority.is_none()
            && self.completed.is_none()
            && self.note.is_none()
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(date) = self.date {
            task.date = date;
        }
        if let Some(name) = &self.name {
            task.name = name.clone();
        }
        if let Some(task_type) = &self.task_type {
            task.task_type = task_type.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(note) = &self.note {
            task.note = note.clone();
        }
    }
}

impl Task {
    pub fn from_draft(draft: TaskDraft) -> Self {
        Self {
            id: new_task_id(),
            date: draft.date,
            name: draft.name,
            task_type: draft.task_type,
            priority: draft.priority,
            completed: draft.completed.unwrap_or(false),
            note: draft.note,
        }
    }

    /// Status glyph shown in the table and written to CSV.
    pub fn status_glyph(&self) -> &'static str {
        if self.completed { "✅" } else { "❌" }
    }
}

pub fn new_task_id() -> String {
    Uuid::new_v4().to_string()
}

use std::cell::{Cell, RefCell};
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::task::Task;

pub const TASKS_FILE: &str = "review_tasks.data";
pub const TYPES_FILE: &str = "task_types.data";
pub const THEME_FILE: &str = "app_theme.data";

/// Persistence port for the three independent records.
///
/// `Ok(None)` from a loader means the record has never been written.
pub trait Storage {
    fn load_tasks(&self) -> Result<Option<Vec<Task>>, StorageError>;
    fn save_tasks(&self, tasks: &[Task]) -> Result<(), StorageError>;
    fn load_types(&self) -> Result<Option<Vec<String>>, StorageError>;
    fn save_types(&self, types: &[String]) -> Result<(), StorageError>;
    fn load_theme(&self) -> Result<Option<String>, StorageError>;
    fn save_theme(&self, theme: &str) -> Result<(), StorageError>;
}

#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub types_path: PathBuf,
    pub theme_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir).map_err(|source| StorageError::Write {
            path: data_dir.clone(),
            source,
        })?;

        let tasks_path = data_dir.join(TASKS_FILE);
        let types_path = data_dir.join(TYPES_FILE);
        let theme_path = data_dir.join(THEME_FILE);

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            types = %types_path.display(),
            theme = %theme_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            types_path,
            theme_path,
        })
    }
}

impl Storage for DataStore {
    #[tracing::instrument(skip(self))]
    fn load_tasks(&self) -> Result<Option<Vec<Task>>, StorageError> {
        load_jsonl(&self.tasks_path)
    }

    #[tracing::instrument(skip(self, tasks))]
    fn save_tasks(&self, tasks: &[Task]) -> Result<(), StorageError> {
        save_jsonl_atomic(&self.tasks_path, tasks)
    }

    #[tracing::instrument(skip(self))]
    fn load_types(&self) -> Result<Option<Vec<String>>, StorageError> {
        let Some(raw) = read_optional(&self.types_path)? else {
            return Ok(None);
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let types = serde_json::from_str(&raw).map_err(|source| StorageError::Decode {
            path: self.types_path.clone(),
            line: 1,
            source,
        })?;
        Ok(Some(types))
    }

    #[tracing::instrument(skip(self, types))]
    fn save_types(&self, types: &[String]) -> Result<(), StorageError> {
        let payload = serde_json::to_string(types)?;
        write_atomic(&self.types_path, payload.as_bytes())
    }

    #[tracing::instrument(skip(self))]
    fn load_theme(&self) -> Result<Option<String>, StorageError> {
        let raw = read_optional(&self.theme_path)?;
        Ok(raw
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty()))
    }

    #[tracing::instrument(skip(self))]
    fn save_theme(&self, theme: &str) -> Result<(), StorageError> {
        write_atomic(&self.theme_path, theme.as_bytes())
    }
}

/// Keeps records in memory; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tasks: RefCell<Option<Vec<Task>>>,
    types: RefCell<Option<Vec<String>>>,
    theme: RefCell<Option<String>>,
    writes: Cell<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let storage = Self::default();
        storage.tasks.replace(Some(tasks));
        storage
    }

    pub fn with_types(self, types: Vec<String>) -> Self {
        self.types.replace(Some(types));
        self
    }

    /// Number of save calls across all records.
    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    pub fn saved_tasks(&self) -> Option<Vec<Task>> {
        self.tasks.borrow().clone()
    }

    pub fn saved_types(&self) -> Option<Vec<String>> {
        self.types.borrow().clone()
    }

    fn bump(&self) {
        self.writes.set(self.writes.get() + 1);
    }
}

impl Storage for MemoryStorage {
    fn load_tasks(&self) -> Result<Option<Vec<Task>>, StorageError> {
        Ok(self.tasks.borrow().clone())
    }

    fn save_tasks(&self, tasks: &[Task]) -> Result<(), StorageError> {
        self.tasks.replace(Some(tasks.to_vec()));
        self.bump();
        Ok(())
    }

    fn load_types(&self) -> Result<Option<Vec<String>>, StorageError> {
        Ok(self.types.borrow().clone())
    }

    fn save_types(&self, types: &[String]) -> Result<(), StorageError> {
        self.types.replace(Some(types.to_vec()));
        self.bump();
        Ok(())
    }

    fn load_theme(&self) -> Result<Option<String>, StorageError> {
        Ok(self.theme.borrow().clone())
    }

    fn save_theme(&self, theme: &str) -> Result<(), StorageError> {
        self.theme.replace(Some(theme.to_string()));
        self.bump();
        Ok(())
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, StorageError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(file = %path.display(), "record not found");
            Ok(None)
        }
        Err(source) => Err(StorageError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Option<Vec<T>>, StorageError> {
    debug!(file = %path.display(), "loading jsonl");
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StorageError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| StorageError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let row: T = serde_json::from_str(trimmed).map_err(|source| StorageError::Decode {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        out.push(row);
    }

    debug!(count = out.len(), "loaded rows from jsonl");
    Ok(Some(out))
}

#[tracing::instrument(skip(path, rows))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), StorageError> {
    debug!(file = %path.display(), count = rows.len(), "saving jsonl atomically");

    let mut payload = String::new();
    for row in rows {
        payload.push_str(&serde_json::to_string(row)?);
        payload.push('\n');
    }
    write_atomic(path, payload.as_bytes())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let write_err = |source: io::Error| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir).map_err(write_err)?;
    temp.write_all(bytes).map_err(write_err)?;
    temp.flush().map_err(write_err)?;

    temp.persist(path).map_err(|source| StorageError::Persist {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::*;
    use crate::task::TaskDraft;

    #[test]
    fn missing_records_load_as_none() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");

        assert!(store.load_tasks().expect("load tasks").is_none());
        assert!(store.load_types().expect("load types").is_none());
        assert!(store.load_theme().expect("load theme").is_none());
    }

    #[test]
    fn records_roundtrip_through_files() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).expect("date");
        let tasks = vec![
            Task::from_draft(TaskDraft::new(date, "Algebra", "日常需求").with_note("ch. 3, 4")),
            Task::from_draft(TaskDraft::new(date, "Essay", "OKR事项").with_completed(true)),
        ];

        store.save_tasks(&tasks).expect("save tasks");
        store
            .save_types(&["日常需求".to_string(), "OKR事项".to_string()])
            .expect("save types");
        store.save_theme("eye-care").expect("save theme");

        let reopened = DataStore::open(temp.path()).expect("reopen");
        assert_eq!(reopened.load_tasks().expect("load tasks"), Some(tasks));
        assert_eq!(
            reopened.load_types().expect("load types"),
            Some(vec!["日常需求".to_string(), "OKR事项".to_string()])
        );
        assert_eq!(
            reopened.load_theme().expect("load theme").as_deref(),
            Some("eye-care")
        );
    }

    #[test]
    fn corrupt_task_line_reports_line_number() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        fs::write(&store.tasks_path, "\n{not json}\n").expect("write corrupt file");

        let err = store.load_tasks().expect_err("corrupt record");
        assert!(matches!(err, StorageError::Decode { line: 2, .. }));
    }

    #[test]
    fn memory_storage_counts_writes() {
        let storage = MemoryStorage::new();
        storage.save_theme("dark").expect("save theme");
        storage.save_types(&["A".to_string()]).expect("save types");
        assert_eq!(storage.writes(), 2);
        assert_eq!(storage.saved_types(), Some(vec!["A".to_string()]));
    }
}

use std::collections::HashSet;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::datastore::Storage;
use crate::error::StoreError;
use crate::task::{Task, TaskDraft, TaskPatch};

/// Types seeded on first run.
pub const DEFAULT_TYPES: [&str; 3] = ["日常需求", "研发优化", "OKR事项"];

/// Type labels are exported unquoted, so they must not carry CSV syntax.
pub fn check_type_label(label: &str) -> Result<(), StoreError> {
    if label.contains([',', '"', '\n', '\r']) {
        return Err(StoreError::InvalidTypeLabel(label.to_string()));
    }
    Ok(())
}

/// Ordered task collection; every mutation is written through to storage.
pub struct TaskStore {
    tasks: Vec<Task>,
    storage: Rc<dyn Storage>,
}

impl TaskStore {
    #[tracing::instrument(skip(storage))]
    pub fn load(storage: Rc<dyn Storage>) -> Result<Self, StoreError> {
        let tasks = storage.load_tasks()?.unwrap_or_default();
        debug!(count = tasks.len(), "loaded tasks");
        Ok(Self { tasks, storage })
    }

    pub fn all(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn count_of_type(&self, label: &str) -> usize {
        self.tasks
            .iter()
            .filter(|task| task.task_type == label)
            .count()
    }

    #[tracing::instrument(skip(self, draft), fields(name = %draft.name))]
    pub fn add(&mut self, draft: TaskDraft) -> Result<Task, StoreError> {
        let mut task = Task::from_draft(draft);
        while self.get(&task.id).is_some() {
            task.id = crate::task::new_task_id();
        }
        self.tasks.push(task.clone());
        self.persist()?;
        info!(id = %task.id, count = self.tasks.len(), "task added");
        Ok(task)
    }

    #[tracing::instrument(skip(self, patch))]
    pub fn update(&mut self, id: &str, patch: &TaskPatch) -> Result<Task, StoreError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch.apply(task);
        let updated = task.clone();
        self.persist()?;
        info!(id, "task updated");
        Ok(updated)
    }

    /// Flips the completion flag and returns the new value.
    #[tracing::instrument(skip(self))]
    pub fn toggle_completed(&mut self, id: &str) -> Result<bool, StoreError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        task.completed = !task.completed;
        let completed = task.completed;
        self.persist()?;
        info!(id, completed, "task status toggled");
        Ok(completed)
    }

    #[tracing::instrument(skip(self))]
    pub fn remove(&mut self, id: &str) -> Result<usize, StoreError> {
        self.remove_many([id])
    }

    /// Removes every task whose id is listed; unknown ids are ignored.
    #[tracing::instrument(skip(self, ids))]
    pub fn remove_many<I, S>(&mut self, ids: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: HashSet<String> = ids
            .into_iter()
            .map(|id| id.as_ref().to_string())
            .collect();
        let before = self.tasks.len();
        self.tasks.retain(|task| !ids.contains(&task.id));
        let removed = before - self.tasks.len();

        if removed > 0 {
            self.persist()?;
        }
        info!(
            requested = ids.len(),
            removed,
            remaining = self.tasks.len(),
            "tasks removed"
        );
        Ok(removed)
    }

    #[tracing::instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub fn replace_all(&mut self, tasks: Vec<Task>) -> Result<(), StoreError> {
        self.tasks = tasks;
        self.persist()
    }

    fn persist(&self) -> Result<(), StoreError> {
        self.storage.save_tasks(&self.tasks)?;
        Ok(())
    }
}

/// Ordered, duplicate-free list of task type labels. Never empty.
pub struct TypeRegistry {
    types: Vec<String>,
    storage: Rc<dyn Storage>,
}

impl TypeRegistry {
    /// Loads the registry, seeding and writing the defaults on first run.
    #[tracing::instrument(skip(storage))]
    pub fn load(storage: Rc<dyn Storage>) -> Result<Self, StoreError> {
        match storage.load_types()? {
            Some(types) if !types.is_empty() => {
                let mut registry = Self {
                    types: Vec::with_capacity(types.len()),
                    storage,
                };
                for label in types {
                    if !registry.contains(&label) {
                        registry.types.push(label);
                    }
                }
                debug!(count = registry.types.len(), "loaded task types");
                return Ok(registry);
            }
            Some(_) => warn!("stored task type list was empty; reseeding defaults"),
            None => {}
        }

        let registry = Self {
            types: DEFAULT_TYPES.iter().map(|label| label.to_string()).collect(),
            storage,
        };
        registry.persist()?;
        info!(count = registry.types.len(), "seeded default task types");
        Ok(registry)
    }

    pub fn list(&self) -> &[String] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.types.iter().any(|existing| existing == label)
    }

    /// Label preselected for new tasks.
    pub fn first(&self) -> &str {
        self.types.first().map(String::as_str).unwrap_or(DEFAULT_TYPES[0])
    }

    #[tracing::instrument(skip(self))]
    pub fn add(&mut self, label: &str) -> Result<String, StoreError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(StoreError::EmptyType);
        }
        check_type_label(label)?;
        if self.contains(label) {
            return Err(StoreError::DuplicateType(label.to_string()));
        }

        self.types.push(label.to_string());
        self.persist()?;
        info!(label, count = self.types.len(), "task type added");
        Ok(label.to_string())
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn remove(&mut self, label: &str, tasks: &TaskStore) -> Result<(), StoreError> {
        if self.types.len() <= 1 {
            return Err(StoreError::LastType);
        }
        let count = tasks.count_of_type(label);
        if count > 0 {
            return Err(StoreError::TypeInUse {
                label: label.to_string(),
                count,
            });
        }
        let idx = self
            .types
            .iter()
            .position(|existing| existing == label)
            .ok_or_else(|| StoreError::UnknownType(label.to_string()))?;

        self.types.remove(idx);
        self.persist()?;
        info!(label, count = self.types.len(), "task type removed");
        Ok(())
    }

    /// Labels from `labels` that are not registered yet, trimmed and
    /// deduplicated. Fails if any of them is not a valid type label.
    pub fn missing<'a, I>(&self, labels: I) -> Result<Vec<String>, StoreError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut missing: Vec<String> = Vec::new();
        for label in labels {
            let label = label.trim();
            if label.is_empty() || self.contains(label) || missing.iter().any(|m| m == label) {
                continue;
            }
            check_type_label(label)?;
            missing.push(label.to_string());
        }
        Ok(missing)
    }

    /// Registers any labels not yet known and returns the ones added.
    /// Nothing is registered when one of the new labels is invalid.
    #[tracing::instrument(skip(self, labels))]
    pub fn ensure<'a, I>(&mut self, labels: I) -> Result<Vec<String>, StoreError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let added = self.missing(labels)?;
        if !added.is_empty() {
            self.types.extend(added.iter().cloned());
            self.persist()?;
            info!(added = ?added, "registered task types from import");
        }
        Ok(added)
    }

    fn persist(&self) -> Result<(), StoreError> {
        self.storage.save_types(&self.types)?;
        Ok(())
    }
}

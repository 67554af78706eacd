//! Application context: the one owner of the task store, the type
//! registry, the theme preference and the clock.

use std::rc::Rc;

use anyhow::{Context, anyhow};
use tracing::{info, warn};

use crate::calendar::{CalendarCell, CalendarCursor};
use crate::csv;
use crate::datastore::Storage;
use crate::datetime::Clock;
use crate::error::StoreError;
use crate::filter::{FilterSpec, filter};
use crate::merge::{ImportMode, materialize, merge};
use crate::prompt::{Decider, Question};
use crate::store::{TaskStore, TypeRegistry};
use crate::task::{Task, TaskDraft, TaskPatch};
use crate::theme::Theme;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub total: usize,
    pub mode: ImportMode,
    /// Type labels registered because imported rows used them.
    pub new_types: Vec<String>,
}

pub struct App {
    storage: Rc<dyn Storage>,
    tasks: TaskStore,
    types: TypeRegistry,
    theme: Theme,
    clock: Clock,
}

impl App {
    #[tracing::instrument(skip(storage, clock))]
    pub fn open(storage: Rc<dyn Storage>, clock: Clock) -> Result<Self, StoreError> {
        let tasks = TaskStore::load(storage.clone())?;
        let types = TypeRegistry::load(storage.clone())?;
        let theme = storage
            .load_theme()?
            .map(|raw| Theme::from_storage(&raw))
            .unwrap_or_default();

        info!(
            tasks = tasks.len(),
            types = types.len(),
            %theme,
            "application state loaded"
        );
        Ok(Self {
            storage,
            tasks,
            types,
            theme,
            clock,
        })
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Blank draft for today with the first registered type.
    pub fn new_draft(&self, name: impl Into<String>) -> TaskDraft {
        TaskDraft::new(self.clock.today(), name, self.types.first())
    }

    pub fn add_task(&mut self, mut draft: TaskDraft) -> Result<Task, StoreError> {
        draft.name = draft.name.trim().to_string();
        self.check_fields(Some(&draft.name), Some(&draft.task_type))?;
        self.tasks.add(draft)
    }

    pub fn edit_task(&mut self, id: &str, patch: &TaskPatch) -> Result<Task, StoreError> {
        let mut patch = patch.clone();
        if let Some(name) = patch.name.as_mut() {
            *name = name.trim().to_string();
        }
        self.check_fields(patch.name.as_deref(), patch.task_type.as_deref())?;
        self.tasks.update(id, &patch)
    }

    pub fn toggle_task(&mut self, id: &str) -> Result<bool, StoreError> {
        self.tasks.toggle_completed(id)
    }

    /// Deletes one task after confirmation. Unknown ids are a no-op and
    /// are not asked about.
    pub fn delete_task(&mut self, id: &str, decider: &mut dyn Decider) -> anyhow::Result<bool> {
        let Some(task) = self.tasks.get(id) else {
            warn!(id, "delete requested for unknown task");
            return Ok(false);
        };
        let question = Question::DeleteTask {
            name: task.name.clone(),
        };
        if !decider.confirm(&question)? {
            info!(id, "delete declined");
            return Ok(false);
        }
        Ok(self.tasks.remove(id)? > 0)
    }

    pub fn delete_tasks(&mut self, ids: &[String], decider: &mut dyn Decider) -> anyhow::Result<usize> {
        if ids.is_empty() {
            return Err(anyhow!("select at least one item to delete"));
        }
        if !decider.confirm(&Question::DeleteTasks { count: ids.len() })? {
            info!(count = ids.len(), "batch delete declined");
            return Ok(0);
        }
        Ok(self.tasks.remove_many(ids)?)
    }

    pub fn add_type(&mut self, label: &str) -> Result<String, StoreError> {
        self.types.add(label)
    }

    /// Checks the registry guards first, then asks for confirmation.
    pub fn remove_type(&mut self, label: &str, decider: &mut dyn Decider) -> anyhow::Result<bool> {
        if self.types.len() <= 1 {
            return Err(StoreError::LastType.into());
        }
        let count = self.tasks.count_of_type(label);
        if count > 0 {
            return Err(StoreError::TypeInUse {
                label: label.to_string(),
                count,
            }
            .into());
        }
        if !self.types.contains(label) {
            return Err(StoreError::UnknownType(label.to_string()).into());
        }
        if !decider.confirm(&Question::DeleteType {
            label: label.to_string(),
        })? {
            return Ok(false);
        }
        self.types.remove(label, &self.tasks)?;
        Ok(true)
    }

    pub fn set_theme(&mut self, theme: Theme) -> Result<(), StoreError> {
        self.storage.save_theme(theme.storage_value())?;
        self.theme = theme;
        info!(%theme, "theme changed");
        Ok(())
    }

    pub fn filtered(&self, spec: &FilterSpec) -> Vec<&Task> {
        filter(self.tasks.all(), spec)
    }

    pub fn calendar(&self, cursor: CalendarCursor) -> Vec<CalendarCell<'_>> {
        cursor.grid(self.tasks.all(), self.clock.today())
    }

    /// CSV text of the whole store; refuses when there is nothing to export.
    pub fn export_csv(&self) -> anyhow::Result<String> {
        if self.tasks.is_empty() {
            return Err(anyhow!("no items to export"));
        }
        Ok(csv::serialize(self.tasks.all()))
    }

    pub fn export_file_name(&self) -> String {
        csv::export_file_name(self.clock.today())
    }

    /// Parses, asks for the mode when none is given, then merges. A parse
    /// failure or an unusable type label leaves the store untouched. Types
    /// used by the imported rows are registered only after the tasks are
    /// saved.
    #[tracing::instrument(skip(self, text, decider))]
    pub fn import_csv(
        &mut self,
        text: &str,
        mode: Option<ImportMode>,
        decider: &mut dyn Decider,
    ) -> anyhow::Result<ImportSummary> {
        let drafts = csv::parse(text).context("csv import rejected")?;
        let new_types = self
            .types
            .missing(drafts.iter().map(|draft| draft.task_type.as_str()))
            .context("csv import rejected")?;
        let mode = match mode {
            Some(mode) => mode,
            None => decider.import_mode(drafts.len())?,
        };

        let incoming = materialize(drafts);
        let imported = incoming.len();
        let merged = merge(self.tasks.all().to_vec(), incoming, mode);
        self.tasks.replace_all(merged)?;
        self.types.ensure(new_types.iter().map(String::as_str))?;

        info!(imported, %mode, total = self.tasks.len(), "csv imported");
        Ok(ImportSummary {
            imported,
            total: self.tasks.len(),
            mode,
            new_types,
        })
    }

    fn check_fields(&self, name: Option<&str>, task_type: Option<&str>) -> Result<(), StoreError> {
        if let Some(name) = name
            && name.is_empty()
        {
            return Err(StoreError::EmptyName);
        }
        if let Some(task_type) = task_type
            && !self.types.contains(task_type)
        {
            return Err(StoreError::UnknownType(task_type.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::datastore::MemoryStorage;
    use crate::error::ParseError;
    use crate::prompt::ScriptedDecider;
    use crate::task::Priority;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn open() -> (Rc<MemoryStorage>, App) {
        let storage = Rc::new(MemoryStorage::new());
        let app = App::open(storage.clone(), Clock::fixed(day(2024, 3, 15))).expect("open app");
        (storage, app)
    }

    #[test]
    fn new_draft_defaults_to_today_and_first_type() {
        let (_, app) = open();
        let draft = app.new_draft("Algebra");
        assert_eq!(draft.date, day(2024, 3, 15));
        assert_eq!(draft.task_type, "日常需求");
        assert_eq!(draft.priority, Priority::Medium);
    }

    #[test]
    fn add_validates_name_and_type() {
        let (_, mut app) = open();
        assert!(matches!(
            app.add_task(app.new_draft("   ")),
            Err(StoreError::EmptyName)
        ));
        let mut draft = app.new_draft("Algebra");
        draft.task_type = "Unknown".to_string();
        assert!(matches!(app.add_task(draft), Err(StoreError::UnknownType(_))));

        let task = app.add_task(app.new_draft("  Algebra ")).expect("add");
        assert_eq!(task.name, "Algebra");
        assert_eq!(app.tasks().len(), 1);
    }

    #[test]
    fn edit_rejects_unregistered_type() {
        let (_, mut app) = open();
        let task = app.add_task(app.new_draft("Algebra")).expect("add");
        let patch = TaskPatch {
            task_type: Some("Nope".to_string()),
            ..TaskPatch::default()
        };
        assert!(matches!(
            app.edit_task(&task.id, &patch),
            Err(StoreError::UnknownType(_))
        ));
    }

    #[test]
    fn declined_delete_keeps_task() {
        let (_, mut app) = open();
        let task = app.add_task(app.new_draft("Algebra")).expect("add");

        let mut no = ScriptedDecider::no();
        assert!(!app.delete_task(&task.id, &mut no).expect("declined"));
        assert_eq!(app.tasks().len(), 1);
        assert_eq!(no.asked, vec![Question::DeleteTask { name: "Algebra".to_string() }]);

        let mut yes = ScriptedDecider::yes();
        assert!(app.delete_task(&task.id, &mut yes).expect("confirmed"));
        assert!(app.tasks().is_empty());
        assert!(!app.delete_task(&task.id, &mut yes).expect("already gone"));
        assert_eq!(yes.asked.len(), 1);
    }

    #[test]
    fn batch_delete_needs_a_selection() {
        let (_, mut app) = open();
        let a = app.add_task(app.new_draft("A")).expect("add");
        app.add_task(app.new_draft("B")).expect("add");

        let mut yes = ScriptedDecider::yes();
        assert!(app.delete_tasks(&[], &mut yes).is_err());
        let removed = app
            .delete_tasks(&[a.id.clone(), "ghost".to_string()], &mut yes)
            .expect("delete");
        assert_eq!(removed, 1);
        assert_eq!(yes.asked, vec![Question::DeleteTasks { count: 2 }]);
    }

    #[test]
    fn remove_type_checks_guards_before_asking() {
        let (_, mut app) = open();
        app.add_task(app.new_draft("Algebra")).expect("add");
        let mut yes = ScriptedDecider::yes();

        let err = app.remove_type("日常需求", &mut yes).expect_err("in use");
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::TypeInUse { count: 1, .. })
        ));
        assert!(yes.asked.is_empty());

        assert!(app.remove_type("研发优化", &mut yes).expect("removed"));
        assert!(!app.types().contains("研发优化"));
    }

    #[test]
    fn theme_change_is_persisted() {
        let (storage, mut app) = open();
        assert_eq!(app.theme(), Theme::Light);
        app.set_theme(Theme::EyeCare).expect("set theme");

        let reopened = App::open(storage, Clock::fixed(day(2024, 3, 15))).expect("reopen");
        assert_eq!(reopened.theme(), Theme::EyeCare);
        assert_eq!(reopened.tasks().len(), 0);
    }

    #[test]
    fn failed_import_leaves_store_untouched() {
        let (storage, mut app) = open();
        app.add_task(app.new_draft("Keep")).expect("add");
        let writes = storage.writes();

        let text = "日期,事项名称,事项类型,优先级,完成状态,备注\n2024-03-01,A,日常需求,中,❌\n2024-13-01,B,日常需求,中,❌";
        let mut decider = ScriptedDecider::yes().with_mode(ImportMode::Overwrite);
        let err = app.import_csv(text, None, &mut decider).expect_err("bad row");

        assert_eq!(
            err.downcast_ref::<ParseError>(),
            Some(&ParseError::InvalidDate { line: 3 })
        );
        assert_eq!(storage.writes(), writes);
        assert_eq!(app.tasks().len(), 1);
    }

    #[test]
    fn import_appends_and_registers_new_types() {
        let (_, mut app) = open();
        app.add_task(app.new_draft("Existing")).expect("add");

        let text = "\u{feff}日期,事项名称,事项类型,优先级,完成状态,备注\n2024-03-02,\"Essay, draft\",,高,✅,\"\"";
        let mut decider = ScriptedDecider::no().with_mode(ImportMode::Append);
        let summary = app.import_csv(text, None, &mut decider).expect("import");

        assert_eq!(summary.imported, 1);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.new_types, vec![csv::FALLBACK_TYPE.to_string()]);
        assert!(app.types().contains(csv::FALLBACK_TYPE));
        let names: Vec<&str> = app.tasks().all().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Existing", "Essay, draft"]);
    }

    #[test]
    fn import_with_comma_in_type_is_rejected() {
        let (storage, mut app) = open();
        app.add_task(app.new_draft("Keep")).expect("add");
        let writes = storage.writes();

        let text = "h\n2024-03-02,Algebra,\"数学,英语\",高,✅";
        let mut decider = ScriptedDecider::no().with_mode(ImportMode::Append);
        let err = app.import_csv(text, None, &mut decider).expect_err("bad type");

        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::InvalidTypeLabel(_))
        ));
        assert_eq!(storage.writes(), writes);
        assert_eq!(app.tasks().len(), 1);
        assert!(!app.types().contains("数学,英语"));
    }

    #[test]
    fn exported_fields_survive_reimport() {
        let (_, mut app) = open();
        assert!(matches!(
            app.add_type("数学,英语"),
            Err(StoreError::InvalidTypeLabel(_))
        ));
        app.add_type("数学").expect("add type");
        let mut draft = app
            .new_draft("Algebra")
            .with_priority(Priority::High)
            .with_completed(true)
            .with_note("line one\nline two");
        draft.task_type = "数学".to_string();
        app.add_task(draft).expect("add");

        let text = app.export_csv().expect("export");
        let mut decider = ScriptedDecider::no();
        app.import_csv(&text, Some(ImportMode::Append), &mut decider)
            .expect("reimport");

        let copy = &app.tasks().all()[1];
        assert_eq!(copy.task_type, "数学");
        assert_eq!(copy.priority, Priority::High);
        assert!(copy.completed);
        assert_eq!(copy.note, "line one line two");
    }

    #[test]
    fn explicit_overwrite_mode_skips_the_question() {
        let (_, mut app) = open();
        app.add_task(app.new_draft("Old")).expect("add");
        let text = "h\n2024-03-02,New,日常需求,低,❌";

        let mut decider = ScriptedDecider::no();
        let summary = app
            .import_csv(text, Some(ImportMode::Overwrite), &mut decider)
            .expect("import");
        assert_eq!(summary.total, 1);
        assert_eq!(app.tasks().all()[0].name, "New");
        assert!(summary.new_types.is_empty());
    }

    #[test]
    fn export_refuses_empty_store() {
        let (_, mut app) = open();
        assert!(app.export_csv().is_err());
        app.add_task(app.new_draft("Algebra")).expect("add");
        let text = app.export_csv().expect("export");
        assert!(text.contains("\"Algebra\""));
        assert_eq!(app.export_file_name(), "复习事项_20240315.csv");
    }

    #[test]
    fn calendar_marks_today_from_clock() {
        let (_, mut app) = open();
        app.add_task(app.new_draft("Algebra")).expect("add");
        let cells = app.calendar(CalendarCursor::today(app.clock()));
        let today: Vec<_> = cells.iter().filter(|cell| cell.is_today).collect();
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].tasks.len(), 1);
    }
}

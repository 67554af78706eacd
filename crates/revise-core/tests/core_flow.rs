use std::fs;
use std::rc::Rc;

use chrono::NaiveDate;
use revise_core::app::App;
use revise_core::datastore::{DataStore, TASKS_FILE, THEME_FILE, TYPES_FILE};
use revise_core::datetime::Clock;
use revise_core::error::ParseError;
use revise_core::filter::FilterSpec;
use revise_core::merge::ImportMode;
use revise_core::prompt::ScriptedDecider;
use revise_core::store::DEFAULT_TYPES;
use revise_core::task::{Priority, TaskPatch};
use revise_core::theme::Theme;
use tempfile::tempdir;

fn clock() -> Clock {
    Clock::fixed(NaiveDate::from_ymd_opt(2024, 3, 15).expect("valid date"))
}

fn open(dir: &std::path::Path) -> App {
    let store = DataStore::open(dir).expect("open datastore");
    App::open(Rc::new(store), clock()).expect("open app")
}

#[test]
fn first_run_seeds_types_and_defaults() {
    let temp = tempdir().expect("tempdir");
    let app = open(temp.path());

    assert!(app.tasks().is_empty());
    assert_eq!(app.types().list(), DEFAULT_TYPES.map(str::to_string).as_slice());
    assert_eq!(app.theme(), Theme::Light);

    assert!(temp.path().join(TYPES_FILE).exists());
    assert!(!temp.path().join(TASKS_FILE).exists());
    assert!(!temp.path().join(THEME_FILE).exists());
}

#[test]
fn items_types_and_theme_survive_reopen() {
    let temp = tempdir().expect("tempdir");
    let id = {
        let mut app = open(temp.path());
        app.add_type("英语单词").expect("add type");
        let mut draft = app
            .new_draft("Unit 3 vocabulary")
            .with_priority(Priority::High)
            .with_note("list A");
        draft.task_type = "英语单词".to_string();
        let task = app.add_task(draft).expect("add task");
        app.toggle_task(&task.id).expect("toggle");
        app.set_theme(Theme::Dark).expect("theme");
        task.id
    };

    let app = open(temp.path());
    let task = app.tasks().get(&id).expect("task persisted");
    assert_eq!(task.name, "Unit 3 vocabulary");
    assert_eq!(task.task_type, "英语单词");
    assert_eq!(task.priority, Priority::High);
    assert!(task.completed);
    assert_eq!(task.note, "list A");
    assert!(app.types().contains("英语单词"));
    assert_eq!(app.theme(), Theme::Dark);

    let raw = fs::read_to_string(temp.path().join(THEME_FILE)).expect("theme file");
    assert_eq!(raw.trim(), "dark");
}

#[test]
fn edit_and_filter_through_the_app() {
    let temp = tempdir().expect("tempdir");
    let mut app = open(temp.path());

    let daily = app.add_task(app.new_draft("Daily review")).expect("add");
    let mut okr = app.new_draft("Quarter goals");
    okr.task_type = "OKR事项".to_string();
    let okr = app.add_task(okr).expect("add");

    let patch = TaskPatch {
        priority: Some(Priority::High),
        ..TaskPatch::default()
    };
    app.edit_task(&daily.id, &patch).expect("edit");

    let spec = FilterSpec::parse(&["type:日常需求".to_string(), "pri:高".to_string()], clock().today())
        .expect("filter");
    let hits: Vec<&str> = app.filtered(&spec).iter().map(|t| t.id.as_str()).collect();
    assert_eq!(hits, vec![daily.id.as_str()]);

    let spec = FilterSpec::parse(&["type:OKR事项".to_string()], clock().today()).expect("filter");
    let hits: Vec<&str> = app.filtered(&spec).iter().map(|t| t.id.as_str()).collect();
    assert_eq!(hits, vec![okr.id.as_str()]);
}

#[test]
fn declined_delete_keeps_item_on_disk() {
    let temp = tempdir().expect("tempdir");
    let id = {
        let mut app = open(temp.path());
        let task = app.add_task(app.new_draft("Keep me")).expect("add");
        let mut decider = ScriptedDecider::no();
        assert!(!app.delete_task(&task.id, &mut decider).expect("declined"));
        task.id
    };

    let mut app = open(temp.path());
    assert!(app.tasks().get(&id).is_some());

    let mut decider = ScriptedDecider::yes();
    assert!(app.delete_task(&id, &mut decider).expect("confirmed"));
    assert!(open(temp.path()).tasks().is_empty());
}

#[test]
fn export_then_import_round_trips() {
    let source = tempdir().expect("tempdir");
    let mut app = open(source.path());
    let mut draft = app.new_draft("线性代数").with_priority(Priority::Low);
    draft.note = "第三章".to_string();
    app.add_task(draft).expect("add");
    let done = app.add_task(app.new_draft("Essay")).expect("add");
    app.toggle_task(&done.id).expect("toggle");

    let csv = app.export_csv().expect("export");

    let target = tempdir().expect("tempdir");
    let mut fresh = open(target.path());
    let mut decider = ScriptedDecider::no();
    let summary = fresh
        .import_csv(&csv, Some(ImportMode::Append), &mut decider)
        .expect("import");
    assert_eq!(summary.imported, 2);

    let before: Vec<_> = app
        .tasks()
        .all()
        .iter()
        .map(|t| (t.date, t.name.clone(), t.task_type.clone(), t.priority, t.completed, t.note.clone()))
        .collect();
    let after: Vec<_> = open(target.path())
        .tasks()
        .all()
        .iter()
        .map(|t| (t.date, t.name.clone(), t.task_type.clone(), t.priority, t.completed, t.note.clone()))
        .collect();
    assert_eq!(before, after);
}

#[test]
fn rejected_import_leaves_files_untouched() {
    let temp = tempdir().expect("tempdir");
    let mut app = open(temp.path());
    app.add_task(app.new_draft("Existing")).expect("add");
    let tasks_before = fs::read_to_string(temp.path().join(TASKS_FILE)).expect("tasks file");

    let text = "日期,事项名称,事项类型,优先级,完成状态,备注\n2024-03-01,Good,日常需求,中,❌\n2024-03-02,,日常需求,中,❌";
    let mut decider = ScriptedDecider::yes().with_mode(ImportMode::Overwrite);
    let err = app.import_csv(text, None, &mut decider).expect_err("empty name");
    assert_eq!(
        err.downcast_ref::<ParseError>(),
        Some(&ParseError::EmptyName { line: 3 })
    );

    let tasks_after = fs::read_to_string(temp.path().join(TASKS_FILE)).expect("tasks file");
    assert_eq!(tasks_before, tasks_after);
    assert_eq!(open(temp.path()).tasks().len(), 1);
}

#[test]
fn overwrite_import_replaces_everything() {
    let temp = tempdir().expect("tempdir");
    let mut app = open(temp.path());
    app.add_task(app.new_draft("Old")).expect("add");

    let text = "header\n2024-04-01,New one,研发优化,high,✅,done early";
    let mut decider = ScriptedDecider::no().with_mode(ImportMode::Overwrite);
    app.import_csv(text, None, &mut decider).expect("import");

    let reopened = open(temp.path());
    let names: Vec<&str> = reopened.tasks().all().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["New one"]);
    let task = &reopened.tasks().all()[0];
    assert_eq!(task.priority, Priority::High);
    assert!(task.completed);
    assert_eq!(task.note, "done early");
}

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{Datelike, NaiveDate};
use tracing::{debug, info, instrument, warn};

use crate::app::App;
use crate::calendar::CalendarCursor;
use crate::cli::{AddArgs, Command, EditArgs, TypesAction};
use crate::config::{Config, ImportPolicy};
use crate::datetime::parse_date_expr;
use crate::filter::FilterSpec;
use crate::merge::ImportMode;
use crate::prompt::{Decider, ScriptedDecider, TerminalDecider};
use crate::render::Renderer;
use crate::task::{Priority, TaskPatch};
use crate::theme::Theme;

#[instrument(skip(app, cfg, renderer, command))]
pub fn dispatch(
    app: &mut App,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");

    match command {
        Command::Add(args) => cmd_add(app, renderer, args),
        Command::Edit(args) => cmd_edit(app, renderer, args),
        Command::Toggle { id } => cmd_toggle(app, &id),
        Command::Delete { ids, yes } => cmd_delete(app, cfg, &ids, yes),
        Command::List { terms } => cmd_list(app, renderer, &terms),
        Command::Calendar { month, prev, next } => {
            cmd_calendar(app, renderer, month.as_deref(), prev, next)
        }
        Command::Types { action } => cmd_types(app, cfg, renderer, action),
        Command::Theme { name } => cmd_theme(app, renderer, name.as_deref()),
        Command::Export { output, dir } => cmd_export(app, output.as_deref(), dir.as_deref()),
        Command::Import { file, mode } => cmd_import(app, cfg, &file, mode.as_deref()),
    }
}

/// Terminal prompts unless confirmations are skipped.
fn decider_for(cfg: &Config, yes: bool) -> Box<dyn Decider> {
    if yes || !cfg.confirm_enabled() {
        debug!(yes, "confirmations answered automatically");
        Box::new(ScriptedDecider::yes())
    } else {
        Box::new(TerminalDecider)
    }
}

/// Expands a unique id prefix to the full id. Tokens matching nothing
/// are returned unchanged so the store can report them.
pub fn resolve_id(app: &App, token: &str) -> anyhow::Result<String> {
    if token.trim().is_empty() {
        return Err(anyhow!("item id cannot be empty"));
    }
    let tasks = app.tasks().all();
    if tasks.iter().any(|task| task.id == token) {
        return Ok(token.to_string());
    }

    let mut matches = tasks.iter().filter(|task| task.id.starts_with(token));
    let Some(first) = matches.next() else {
        return Ok(token.to_string());
    };
    if matches.next().is_some() {
        return Err(anyhow!("id prefix {token} matches more than one item"));
    }
    Ok(first.id.clone())
}

#[instrument(skip(app, renderer, args))]
fn cmd_add(app: &mut App, renderer: &Renderer, args: AddArgs) -> anyhow::Result<()> {
    info!("command add");
    let today = app.clock().today();

    let mut draft = app.new_draft(args.name);
    if let Some(date) = args.date.as_deref() {
        draft.date = parse_date_expr(date, today)?;
    }
    if let Some(task_type) = args.task_type {
        draft.task_type = task_type;
    }
    if let Some(priority) = args.priority.as_deref() {
        draft.priority = priority.parse::<Priority>()?;
    }
    if let Some(note) = args.note {
        draft.note = note;
    }
    if args.done {
        draft.completed = Some(true);
    }

    let task = app.add_task(draft)?;
    println!("Created item {}.", task.id);
    renderer.print_task(&task)
}

#[instrument(skip(app, renderer, args))]
fn cmd_edit(app: &mut App, renderer: &Renderer, args: EditArgs) -> anyhow::Result<()> {
    info!("command edit");
    let today = app.clock().today();
    let id = resolve_id(app, &args.id)?;

    let completed = match (args.done, args.pending) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    };
    let patch = TaskPatch {
        date: args
            .date
            .as_deref()
            .map(|expr| parse_date_expr(expr, today))
            .transpose()?,
        name: args.name,
        task_type: args.task_type,
        priority: args
            .priority
            .as_deref()
            .map(str::parse::<Priority>)
            .transpose()?,
        completed,
        note: args.note,
    };
    if patch.is_empty() {
        return Err(anyhow!("nothing to change; pass at least one field option"));
    }

    let task = app.edit_task(&id, &patch)?;
    println!("Modified item {}.", task.id);
    renderer.print_task(&task)
}

#[instrument(skip(app))]
fn cmd_toggle(app: &mut App, token: &str) -> anyhow::Result<()> {
    info!("command toggle");
    let id = resolve_id(app, token)?;
    let completed = app.toggle_task(&id)?;
    let state = if completed { "done" } else { "pending" };
    println!("Item {id} is now {state}.");
    Ok(())
}

#[instrument(skip(app, cfg, tokens))]
fn cmd_delete(app: &mut App, cfg: &Config, tokens: &[String], yes: bool) -> anyhow::Result<()> {
    info!(count = tokens.len(), "command delete");
    let ids = tokens
        .iter()
        .map(|token| resolve_id(app, token))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let mut decider = decider_for(cfg, yes);

    let removed = match ids.as_slice() {
        [id] => usize::from(app.delete_task(id, decider.as_mut())?),
        _ => app.delete_tasks(&ids, decider.as_mut())?,
    };

    if removed == 0 {
        println!("No items deleted.");
    } else {
        println!("Deleted {removed} item(s).");
    }
    Ok(())
}

#[instrument(skip(app, renderer, terms))]
fn cmd_list(app: &App, renderer: &Renderer, terms: &[String]) -> anyhow::Result<()> {
    info!("command list");
    let spec = FilterSpec::parse(terms, app.clock().today())?;
    let rows = app.filtered(&spec);
    debug!(matched = rows.len(), total = app.tasks().len(), "filtered items");
    renderer.print_task_table(&rows)
}

#[instrument(skip(app, renderer))]
fn cmd_calendar(
    app: &App,
    renderer: &Renderer,
    month: Option<&str>,
    prev: u32,
    next: u32,
) -> anyhow::Result<()> {
    info!("command calendar");
    let cursor = match month {
        Some(raw) => parse_month(raw)?,
        None => CalendarCursor::today(app.clock()),
    };
    let offset = i64::from(next) - i64::from(prev);
    let offset = i32::try_from(offset).context("calendar offset out of range")?;
    let cursor = cursor.shift(offset);

    let cells = app.calendar(cursor);
    renderer.print_calendar(cursor, &cells)
}

fn parse_month(raw: &str) -> anyhow::Result<CalendarCursor> {
    let (year, month) = raw
        .trim()
        .split_once('-')
        .ok_or_else(|| anyhow!("month must look like YYYY-MM, got: {raw}"))?;
    let year: i32 = year
        .parse()
        .with_context(|| format!("invalid year in {raw}"))?;
    if year <= NaiveDate::MIN.year() || year >= NaiveDate::MAX.year() {
        return Err(anyhow!("year out of range in {raw}"));
    }
    let month: u32 = month
        .parse()
        .with_context(|| format!("invalid month in {raw}"))?;
    if !(1..=12).contains(&month) {
        return Err(anyhow!("month must be between 01 and 12, got: {raw}"));
    }
    Ok(CalendarCursor::new(year, month - 1))
}

#[instrument(skip(app, cfg, renderer, action))]
fn cmd_types(
    app: &mut App,
    cfg: &Config,
    renderer: &Renderer,
    action: Option<TypesAction>,
) -> anyhow::Result<()> {
    match action {
        None => {
            info!("command types");
            renderer.print_types(app.types(), app.tasks())
        }
        Some(TypesAction::Add { label }) => {
            info!("command types add");
            let label = app.add_type(&label)?;
            println!("Added type {label}.");
            Ok(())
        }
        Some(TypesAction::Remove { label, yes }) => {
            info!("command types remove");
            let mut decider = decider_for(cfg, yes);
            if app.remove_type(&label, decider.as_mut())? {
                println!("Removed type {label}.");
            } else {
                println!("Kept type {label}.");
            }
            Ok(())
        }
    }
}

#[instrument(skip(app, renderer))]
fn cmd_theme(app: &mut App, renderer: &mut Renderer, name: Option<&str>) -> anyhow::Result<()> {
    let Some(name) = name else {
        info!("command theme");
        return renderer.print_themes(app.theme());
    };

    info!("command theme set");
    let theme = name.parse::<Theme>()?;
    app.set_theme(theme)?;
    renderer.set_theme(theme);
    println!(
        "{}",
        renderer.paint(
            &format!("Theme set to {} ({}).", theme, theme.display_name()),
            theme.palette().accent
        )
    );
    Ok(())
}

#[instrument(skip(app))]
fn cmd_export(app: &App, output: Option<&Path>, dir: Option<&Path>) -> anyhow::Result<()> {
    info!("command export");
    let text = app.export_csv()?;

    if output == Some(Path::new("-")) {
        let mut out = io::stdout().lock();
        out.write_all(text.as_bytes())?;
        writeln!(out)?;
        return Ok(());
    }

    let path = match output {
        Some(path) => path.to_path_buf(),
        None => dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(app.export_file_name()),
    };
    fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;

    info!(file = %path.display(), count = app.tasks().len(), "csv exported");
    println!("Exported {} item(s) to {}.", app.tasks().len(), path.display());
    Ok(())
}

#[instrument(skip(app, cfg))]
fn cmd_import(app: &mut App, cfg: &Config, file: &Path, mode: Option<&str>) -> anyhow::Result<()> {
    info!("command import");
    let from_stdin = file == Path::new("-");

    let mode = match mode {
        Some(raw) => Some(raw.parse::<ImportMode>()?),
        None => match cfg.import_policy()? {
            ImportPolicy::Fixed(mode) => Some(mode),
            ImportPolicy::Ask => None,
        },
    };
    if from_stdin && mode.is_none() {
        return Err(anyhow!("importing from stdin needs --mode overwrite or --mode append"));
    }

    let text = if from_stdin {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        buf
    } else {
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?
    };

    let mut decider = decider_for(cfg, false);
    let summary = app.import_csv(&text, mode, decider.as_mut())?;

    if !summary.new_types.is_empty() {
        warn!(types = ?summary.new_types, "registered task types found in the import");
        println!("Registered new type(s): {}.", summary.new_types.join(", "));
    }
    println!(
        "Imported {} item(s) ({}); {} item(s) in total.",
        summary.imported, summary.mode, summary.total
    );
    Ok(())
}

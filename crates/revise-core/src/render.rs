use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::calendar::{CalendarCell, CalendarCursor};
use crate::config::Config;
use crate::store::{TaskStore, TypeRegistry};
use crate::task::Task;
use crate::theme::{Palette, Theme};

/// Calendar entries longer than this many characters are cut and get `...`.
pub const CALENDAR_NAME_CHARS: usize = 10;

const WEEKDAYS: [&str; 7] = ["日", "一", "二", "三", "四", "五", "六"];
const DAY_CELL_WIDTH: usize = 5;
const SHORT_ID_CHARS: usize = 8;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    palette: Palette,
}

impl Renderer {
    pub fn new(cfg: &Config, theme: Theme) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
            palette: theme.palette(),
        })
    }

    /// Renderer that never emits escape codes.
    pub fn plain(theme: Theme) -> Self {
        Self {
            color: false,
            palette: theme.palette(),
        }
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.palette = theme.palette();
    }

    #[tracing::instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub fn print_task_table(&self, tasks: &[&Task]) -> anyhow::Result<()> {
        self.write_task_table(io::stdout().lock(), tasks)
    }

    pub fn write_task_table<W: Write>(&self, mut out: W, tasks: &[&Task]) -> anyhow::Result<()> {
        if tasks.is_empty() {
            writeln!(out, "{}", self.paint("No matching items.", self.palette.muted))?;
            return Ok(());
        }

        let headers = ["ID", "日期", "事项名称", "类型", "优先级", "状态", "备注"]
            .map(str::to_string)
            .to_vec();

        let rows = tasks
            .iter()
            .map(|task| {
                let status_code = if task.completed {
                    self.palette.done
                } else {
                    self.palette.pending
                };
                vec![
                    self.paint(short_id(&task.id), self.palette.accent),
                    task.date.to_string(),
                    task.name.clone(),
                    task.task_type.clone(),
                    task.priority.label().to_string(),
                    self.paint(task.status_glyph(), status_code),
                    task.note.clone(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        writeln!(out, "{}", self.paint(&format!("{} item(s)", tasks.len()), self.palette.muted))?;
        Ok(())
    }

    pub fn print_task(&self, task: &Task) -> anyhow::Result<()> {
        self.write_task(io::stdout().lock(), task)
    }

    pub fn write_task<W: Write>(&self, mut out: W, task: &Task) -> anyhow::Result<()> {
        writeln!(out, "id        {}", self.paint(&task.id, self.palette.accent))?;
        writeln!(out, "date      {}", task.date)?;
        writeln!(out, "name      {}", task.name)?;
        writeln!(out, "type      {}", task.task_type)?;
        writeln!(out, "priority  {}", task.priority)?;
        writeln!(out, "status    {}", task.status_glyph())?;
        if !task.note.is_empty() {
            writeln!(out, "note      {}", task.note)?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, cells))]
    pub fn print_calendar(&self, cursor: CalendarCursor, cells: &[CalendarCell<'_>]) -> anyhow::Result<()> {
        self.write_calendar(io::stdout().lock(), cursor, cells)
    }

    /// Month grid followed by the items of each in-month day.
    pub fn write_calendar<W: Write>(
        &self,
        mut out: W,
        cursor: CalendarCursor,
        cells: &[CalendarCell<'_>],
    ) -> anyhow::Result<()> {
        let title = cursor.title();
        let grid_width = DAY_CELL_WIDTH * WEEKDAYS.len();
        let indent = grid_width.saturating_sub(UnicodeWidthStr::width(title.as_str())) / 2;
        writeln!(out, "{}{}", " ".repeat(indent), self.paint(&title, self.palette.accent))?;

        for weekday in WEEKDAYS {
            write!(out, "{}", pad_left(weekday, DAY_CELL_WIDTH))?;
        }
        writeln!(out)?;

        for week in cells.chunks(WEEKDAYS.len()) {
            for cell in week {
                let marker = if cell.has_tasks() { "•" } else { " " };
                let text = pad_left(&format!("{}{marker}", cell.day), DAY_CELL_WIDTH);
                let text = if cell.is_today {
                    self.paint(&text, self.palette.today)
                } else if !cell.in_month {
                    self.paint(&text, self.palette.muted)
                } else if cell.has_tasks() {
                    self.paint(&text, self.palette.accent)
                } else {
                    text
                };
                write!(out, "{text}")?;
            }
            writeln!(out)?;
        }

        let busy: Vec<&CalendarCell<'_>> = cells
            .iter()
            .filter(|cell| cell.in_month && cell.has_tasks())
            .collect();
        if busy.is_empty() {
            return Ok(());
        }

        writeln!(out)?;
        for cell in busy {
            let entries = cell
                .tasks
                .iter()
                .map(|task| {
                    let code = if task.completed {
                        self.palette.done
                    } else {
                        self.palette.pending
                    };
                    format!(
                        "{} {}",
                        self.paint(task.status_glyph(), code),
                        calendar_label(&task.name)
                    )
                })
                .collect::<Vec<_>>()
                .join("  ");
            writeln!(
                out,
                "{}  {entries}",
                self.paint(&cell.date.format("%m-%d").to_string(), self.palette.muted)
            )?;
        }
        Ok(())
    }

    pub fn print_types(&self, types: &TypeRegistry, tasks: &TaskStore) -> anyhow::Result<()> {
        self.write_types(io::stdout().lock(), types, tasks)
    }

    /// Each label with the number of items using it.
    pub fn write_types<W: Write>(&self, mut out: W, types: &TypeRegistry, tasks: &TaskStore) -> anyhow::Result<()> {
        let headers = vec!["类型".to_string(), "事项数".to_string()];
        let rows = types
            .list()
            .iter()
            .map(|label| {
                let count = tasks.count_of_type(label);
                let count = if count == 0 {
                    self.paint("0", self.palette.muted)
                } else {
                    count.to_string()
                };
                vec![label.clone(), count]
            })
            .collect();
        write_table(&mut out, headers, rows)
    }

    pub fn print_themes(&self, current: Theme) -> anyhow::Result<()> {
        self.write_themes(io::stdout().lock(), current)
    }

    pub fn write_themes<W: Write>(&self, mut out: W, current: Theme) -> anyhow::Result<()> {
        for theme in Theme::ALL {
            let line = format!("{:<9}{}", theme.storage_value(), theme.display_name());
            if theme == current {
                writeln!(out, "* {}", self.paint(&line, self.palette.accent))?;
            } else {
                writeln!(out, "  {line}")?;
            }
        }
        Ok(())
    }

    pub fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// Cuts long names for the calendar listing.
pub fn calendar_label(name: &str) -> String {
    if name.chars().count() <= CALENDAR_NAME_CHARS {
        return name.to_string();
    }
    let head: String = name.chars().take(CALENDAR_NAME_CHARS).collect();
    format!("{head}...")
}

pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_CHARS) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

fn pad_left(text: &str, width: usize) -> String {
    let visible = UnicodeWidthStr::width(text);
    format!("{}{text}", " ".repeat(width.saturating_sub(visible)))
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (idx, header) in headers.iter().enumerate() {
        let padding = widths[idx].saturating_sub(UnicodeWidthStr::width(header.as_str()));
        write!(writer, "{header}{} ", " ".repeat(padding))?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate};
use tracing::debug;

use crate::datetime::Clock;
use crate::task::Task;

/// Six weeks of seven days.
pub const GRID_CELLS: usize = 42;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarCell<'a> {
    pub date: NaiveDate,
    pub day: u32,
    pub in_month: bool,
    pub is_today: bool,
    pub tasks: Vec<&'a Task>,
}

impl CalendarCell<'_> {
    pub fn has_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }
}

/// Month currently shown by the calendar view. `month0` is zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarCursor {
    year: i32,
    month0: u32,
}

impl CalendarCursor {
    /// Out-of-range months carry into the year, so `(2024, 12)` is January 2025.
    pub fn new(year: i32, month0: u32) -> Self {
        let (year, month0) = normalize(year, i64::from(month0));
        Self { year, month0 }
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month0: date.month0(),
        }
    }

    pub fn today(clock: &Clock) -> Self {
        Self::containing(clock.today())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month0(&self) -> u32 {
        self.month0
    }

    pub fn shift(self, months: i32) -> Self {
        let (year, month0) = normalize(self.year, i64::from(self.month0) + i64::from(months));
        Self { year, month0 }
    }

    pub fn prev_month(self) -> Self {
        self.shift(-1)
    }

    pub fn next_month(self) -> Self {
        self.shift(1)
    }

    /// Header text, e.g. `2024年3月`.
    pub fn title(&self) -> String {
        format!("{}年{}月", self.year, self.month0 + 1)
    }

    pub fn grid<'a>(&self, tasks: &'a [Task], today: NaiveDate) -> Vec<CalendarCell<'a>> {
        month_grid(self.year, self.month0, tasks, today)
    }
}

fn normalize(year: i32, month0: i64) -> (i32, u32) {
    let carry = month0.div_euclid(12);
    let month0 = month0.rem_euclid(12) as u32;
    let year = i64::from(year) + carry;
    let year = year.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
    (year, month0)
}

/// Buckets `tasks` into the 42-cell grid for the given month, starting on
/// the Sunday on or before the 1st. Cell task lists keep store order.
#[tracing::instrument(skip(tasks, today), fields(total = tasks.len()))]
pub fn month_grid<'a>(
    year: i32,
    month0: u32,
    tasks: &'a [Task],
    today: NaiveDate,
) -> Vec<CalendarCell<'a>> {
    let (year, month0) = normalize(year, i64::from(month0));
    let first = first_day_of_month(year, month0 + 1);
    let lead = i64::from(first.weekday().num_days_from_sunday());
    let grid_start = add_days(first, -lead);
    let grid_end = add_days(grid_start, GRID_CELLS as i64 - 1);

    let mut by_day: HashMap<NaiveDate, Vec<&'a Task>> = HashMap::new();
    for task in tasks {
        if task.date >= grid_start && task.date <= grid_end {
            by_day.entry(task.date).or_default().push(task);
        }
    }

    let cells: Vec<CalendarCell<'a>> = (0..GRID_CELLS as i64)
        .map(|offset| {
            let date = add_days(grid_start, offset);
            CalendarCell {
                date,
                day: date.day(),
                in_month: date.year() == year && date.month0() == month0,
                is_today: date == today,
                tasks: by_day.get(&date).cloned().unwrap_or_default(),
            }
        })
        .collect();

    debug!(
        start = %grid_start,
        end = %grid_end,
        with_tasks = cells.iter().filter(|cell| cell.has_tasks()).count(),
        "calendar grid built"
    );
    cells
}

fn first_day_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(days)).unwrap_or(date)
}

use anyhow::{
  Context,
  anyhow
};
use chrono::NaiveDate;
use tracing::trace;

use crate::datetime::parse_date_expr;
use crate::task::{
  Priority,
  Task
};

/// Optional predicates narrowing a
/// task query. Absent fields match
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
  pub task_type: Option<String>,
  pub priority:  Option<Priority>,
  pub completed: Option<bool>,
  pub date_from: Option<NaiveDate>,
  pub date_to:   Option<NaiveDate>
}

impl FilterSpec {
  /// Narrows to a single day, the
  /// way clicking a calendar cell
  /// does.
  pub fn on_day(date: NaiveDate) -> Self {
    Self {
      date_from: Some(date),
      date_to: Some(date),
      ..Self::default()
    }
  }

  pub fn is_empty(&self) -> bool {
    self == &Self::default()
  }

  /// Builds a spec from terms like
  /// `type:OKR事项 priority:high
  /// status:done from:2024-03-01
  /// to:today on:-1d`.
  #[tracing::instrument(skip(
    terms, today
  ))]
  pub fn parse(
    terms: &[String],
    today: NaiveDate
  ) -> anyhow::Result<Self> {
    let mut spec = Self::default();

    for term in terms {
      let (key, value) = term
        .split_once(':')
        .ok_or_else(|| {
          anyhow!(
            "filter term must look \
             like key:value, got: \
             {term}"
          )
        })?;
      let value = value.trim();
      if value.is_empty() {
        return Err(anyhow!(
          "filter term has no value: \
           {term}"
        ));
      }

      match key
        .trim()
        .to_ascii_lowercase()
        .as_str()
      {
        | "type" => {
          spec.task_type =
            Some(value.to_string());
        }
        | "priority" | "pri" => {
          spec.priority = Some(
            value.parse::<Priority>()?
          );
        }
        | "status" => {
          spec.completed = Some(
            parse_status(value)?
          );
        }
        | "from" => {
          spec.date_from = Some(
            parse_bound(value, today)?
          );
        }
        | "to" => {
          spec.date_to = Some(
            parse_bound(value, today)?
          );
        }
        | "on" | "date" => {
          let date =
            parse_bound(value, today)?;
          spec.date_from = Some(date);
          spec.date_to = Some(date);
        }
        | other => {
          return Err(anyhow!(
            "unknown filter key: \
             {other}"
          ));
        }
      }
    }

    trace!(?spec, "parsed filter spec");
    Ok(spec)
  }

  pub fn matches(
    &self,
    task: &Task
  ) -> bool {
    if let Some(task_type) =
      &self.task_type
      && &task.task_type != task_type
    {
      return false;
    }

    if let Some(priority) = self.priority
      && task.priority != priority
    {
      return false;
    }

    if let Some(completed) =
      self.completed
      && task.completed != completed
    {
      return false;
    }

    if let Some(from) = self.date_from
      && task.date < from
    {
      return false;
    }

    if let Some(to) = self.date_to
      && task.date > to
    {
      return false;
    }

    true
  }
}

/// Stable filter: keeps input order,
/// never resorts.
pub fn filter<'a>(
  tasks: &'a [Task],
  spec: &FilterSpec
) -> Vec<&'a Task> {
  tasks
    .iter()
    .filter(|task| spec.matches(task))
    .collect()
}

fn parse_status(
  value: &str
) -> anyhow::Result<bool> {
  match value
    .to_ascii_lowercase()
    .as_str()
  {
    | "done" | "completed"
    | "complete" | "true" | "✅" => {
      Ok(true)
    }
    | "pending" | "open" | "todo"
    | "false" | "❌" => Ok(false),
    | other => Err(anyhow!(
      "unknown status filter: {other} \
       (expected done or pending)"
    ))
  }
}

fn parse_bound(
  value: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  parse_date_expr(value, today)
    .with_context(|| {
      format!(
        "invalid date in filter: \
         {value}"
      )
    })
}

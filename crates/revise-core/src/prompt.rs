use std::collections::VecDeque;

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Select};
use tracing::debug;

use crate::merge::ImportMode;

/// Questions the core asks before destructive or ambiguous steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Question {
    DeleteTask { name: String },
    DeleteTasks { count: usize },
    DeleteType { label: String },
}

impl Question {
    pub fn prompt(&self) -> String {
        match self {
            Question::DeleteTask { name } => format!("Delete item \"{name}\"?"),
            Question::DeleteTasks { count } => format!("Delete the {count} selected items?"),
            Question::DeleteType { label } => format!("Delete task type \"{label}\"?"),
        }
    }
}

/// Decision port standing in for blocking dialogs.
pub trait Decider {
    fn confirm(&mut self, question: &Question) -> anyhow::Result<bool>;

    /// `count` is the number of parsed rows about to be imported.
    fn import_mode(&mut self, count: usize) -> anyhow::Result<ImportMode>;
}

/// Asks on the terminal.
#[derive(Debug, Default)]
pub struct TerminalDecider;

impl Decider for TerminalDecider {
    fn confirm(&mut self, question: &Question) -> anyhow::Result<bool> {
        let answer = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(question.prompt())
            .default(false)
            .interact()?;
        debug!(?question, answer, "confirmation answered");
        Ok(answer)
    }

    fn import_mode(&mut self, count: usize) -> anyhow::Result<ImportMode> {
        let choices = [
            "Append to existing items",
            "Overwrite existing items",
        ];
        let picked = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Import {count} item(s) how?"))
            .items(&choices)
            .default(0)
            .interact()?;
        let mode = if picked == 1 {
            ImportMode::Overwrite
        } else {
            ImportMode::Append
        };
        debug!(%mode, "import mode chosen");
        Ok(mode)
    }
}

/// Answers from a fixed script; used for `--yes`, `confirm = off` and tests.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDecider {
    answers: VecDeque<bool>,
    default_answer: bool,
    mode: Option<ImportMode>,
    pub asked: Vec<Question>,
}

impl ScriptedDecider {
    /// Says yes to everything.
    pub fn yes() -> Self {
        Self {
            default_answer: true,
            ..Self::default()
        }
    }

    /// Says no to everything.
    pub fn no() -> Self {
        Self::default()
    }

    pub fn with_answers(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: ImportMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

impl Decider for ScriptedDecider {
    fn confirm(&mut self, question: &Question) -> anyhow::Result<bool> {
        self.asked.push(question.clone());
        Ok(self.answers.pop_front().unwrap_or(self.default_answer))
    }

    fn import_mode(&mut self, count: usize) -> anyhow::Result<ImportMode> {
        self.mode.ok_or_else(|| {
            anyhow::anyhow!(
                "import of {count} item(s) needs a mode; pass --mode overwrite or --mode append"
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_answers_then_default() {
        let mut decider = ScriptedDecider::with_answers([true, false]);
        let q = Question::DeleteTasks { count: 2 };
        assert!(decider.confirm(&q).expect("answer"));
        assert!(!decider.confirm(&q).expect("answer"));
        assert!(!decider.confirm(&q).expect("default"));
        assert_eq!(decider.asked.len(), 3);
    }

    #[test]
    fn scripted_mode_is_required() {
        assert!(ScriptedDecider::yes().import_mode(3).is_err());
        let mut decider = ScriptedDecider::no().with_mode(ImportMode::Overwrite);
        assert_eq!(decider.import_mode(3).expect("mode"), ImportMode::Overwrite);
    }

    #[test]
    fn prompts_name_their_subject() {
        assert_eq!(
            Question::DeleteType { label: "OKR事项".to_string() }.prompt(),
            "Delete task type \"OKR事项\"?"
        );
    }
}

use crate::error::AppError;
use crate::model::rule::RecurrenceRule;
use crate::model::status::TaskStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::Date;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub completed_at: String,
    /// The occurrence this entry closed, when it had a due date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Date>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesState {
    #[default]
    Active,
    /// Only ever seen on a staged copy while an advance is in flight.
    Advancing,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" | "0" => Ok(Self::Low),
            "medium" | "1" => Ok(Self::Medium),
            "high" | "2" => Ok(Self::High),
            _ => Err(AppError::invalid_input(format!("unknown priority '{value}'"))),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub created_at: String,
    #[serde(default)]
    pub due_date: Option<Date>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub completion_history: Vec<CompletionEntry>,
    #[serde(default)]
    pub recurring_parent_id: Option<String>,
    #[serde(default)]
    pub recurrence: Option<RecurrenceRule>,
    #[serde(default)]
    pub series_state: SeriesState,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub note: Option<String>,
}

impl Task {
    pub fn new<I: Into<String>, T: Into<String>, C: Into<String>>(
        id: I,
        title: T,
        created_at: C,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: TaskStatus::NotStarted,
            created_at: created_at.into(),
            due_date: None,
            completed_at: None,
            completion_history: Vec::new(),
            recurring_parent_id: None,
            recurrence: None,
            series_state: SeriesState::Active,
            project: None,
            tags: Vec::new(),
            priority: None,
            note: None,
        }
    }

    pub fn due(mut self, due_date: Date) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn repeating(mut self, rule: RecurrenceRule) -> Self {
        self.recurrence = Some(rule);
        self
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_closed()
    }

    /// The rule this task schedules by, ignoring `none` rules.
    pub fn active_rule(&self) -> Option<&RecurrenceRule> {
        self.recurrence.as_ref().filter(|rule| !rule.is_none())
    }
}

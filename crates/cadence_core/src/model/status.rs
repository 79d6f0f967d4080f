use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "RawStatus")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Planned,
    Waiting,
    Done,
    Archived,
    Cancelled,
}

/// Status as it appears in stored data: canonical names, legacy names from
/// the pending/completed era, or legacy integer codes.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawStatus {
    Code(i64),
    Name(String),
}

impl TryFrom<RawStatus> for TaskStatus {
    type Error = AppError;

    fn try_from(raw: RawStatus) -> Result<Self, Self::Error> {
        match raw {
            RawStatus::Code(code) => TaskStatus::from_code(code),
            RawStatus::Name(name) => name.parse(),
        }
    }
}

impl TaskStatus {
    pub fn from_code(code: i64) -> Result<Self, AppError> {
        match code {
            0 => Ok(Self::NotStarted),
            1 => Ok(Self::InProgress),
            2 => Ok(Self::Done),
            3 => Ok(Self::Archived),
            4 => Ok(Self::Waiting),
            5 => Ok(Self::Cancelled),
            6 => Ok(Self::Planned),
            other => Err(AppError::invalid_data(format!("unknown status code {other}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Planned => "planned",
            Self::Waiting => "waiting",
            Self::Done => "done",
            Self::Archived => "archived",
            Self::Cancelled => "cancelled",
        }
    }

    /// Done, archived and cancelled tasks no longer count as the live
    /// occurrence of a series.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Done | Self::Archived | Self::Cancelled)
    }

    /// Statuses that trigger series advancement.
    pub fn is_completion(self) -> bool {
        matches!(self, Self::Done | Self::Archived)
    }
}

impl FromStr for TaskStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "not_started" | "pending" | "todo" => Ok(Self::NotStarted),
            "in_progress" => Ok(Self::InProgress),
            "planned" => Ok(Self::Planned),
            "waiting" => Ok(Self::Waiting),
            "done" | "completed" => Ok(Self::Done),
            "archived" => Ok(Self::Archived),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => match other.parse::<i64>() {
                Ok(code) => Self::from_code(code),
                Err(_) => Err(AppError::invalid_input(format!("unknown status '{value}'"))),
            },
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

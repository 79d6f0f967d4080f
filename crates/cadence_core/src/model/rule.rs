use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use time::Date;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceKind {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    MonthlyWeekday,
    MonthlyLastDay,
}

impl RecurrenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::MonthlyWeekday => "monthly_weekday",
            Self::MonthlyLastDay => "monthly_last_day",
        }
    }
}

impl FromStr for RecurrenceKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "none" | "" => Ok(Self::None),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "monthly_weekday" => Ok(Self::MonthlyWeekday),
            "monthly_last_day" => Ok(Self::MonthlyLastDay),
            _ => Err(AppError::invalid_rule(format!(
                "unknown recurrence type '{value}'"
            ))),
        }
    }
}

impl fmt::Display for RecurrenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const LAST_WEEK_OF_MONTH: u8 = 5;

fn default_interval() -> u32 {
    1
}

/// Repeat pattern attached to a template task.
///
/// Weekday numbers run from 0 (Sunday) to 6 (Saturday). Fields that do not
/// apply to `kind` are ignored by the calculator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    #[serde(rename = "type")]
    pub kind: RecurrenceKind,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub weekdays: BTreeSet<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month_day: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_of_month: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekday: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<Date>,
    #[serde(default)]
    pub completion_based: bool,
}

impl Default for RecurrenceRule {
    fn default() -> Self {
        Self::new(RecurrenceKind::None)
    }
}

impl RecurrenceRule {
    pub fn new(kind: RecurrenceKind) -> Self {
        Self {
            kind,
            interval: 1,
            weekdays: BTreeSet::new(),
            month_day: None,
            week_of_month: None,
            weekday: None,
            end_date: None,
            completion_based: false,
        }
    }

    pub fn daily(interval: u32) -> Self {
        Self {
            interval,
            ..Self::new(RecurrenceKind::Daily)
        }
    }

    pub fn weekly<I: IntoIterator<Item = u8>>(interval: u32, weekdays: I) -> Self {
        Self {
            interval,
            weekdays: weekdays.into_iter().collect(),
            ..Self::new(RecurrenceKind::Weekly)
        }
    }

    pub fn monthly(interval: u32, month_day: Option<u8>) -> Self {
        Self {
            interval,
            month_day,
            ..Self::new(RecurrenceKind::Monthly)
        }
    }

    pub fn monthly_weekday(interval: u32, week_of_month: u8, weekday: u8) -> Self {
        Self {
            interval,
            week_of_month: Some(week_of_month),
            weekday: Some(weekday),
            ..Self::new(RecurrenceKind::MonthlyWeekday)
        }
    }

    pub fn monthly_last_day(interval: u32) -> Self {
        Self {
            interval,
            ..Self::new(RecurrenceKind::MonthlyLastDay)
        }
    }

    pub fn until(mut self, end_date: Date) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn from_completion(mut self) -> Self {
        self.completion_based = true;
        self
    }

    pub fn is_none(&self) -> bool {
        self.kind == RecurrenceKind::None
    }

    /// Interval used for arithmetic. Zero never reaches the calculator as
    /// a real value.
    pub fn effective_interval(&self) -> u32 {
        self.interval.max(1)
    }

    /// Rejects malformed combinations. A `none` rule is always valid since
    /// every other field is inert.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.is_none() {
            return Ok(());
        }

        if self.interval == 0 {
            return Err(AppError::invalid_rule("interval must be at least 1"));
        }

        if let Some(day) = self.weekdays.iter().find(|day| **day > 6) {
            return Err(AppError::invalid_rule(format!(
                "weekday {day} is out of range 0-6"
            )));
        }

        if let Some(day) = self.weekday
            && day > 6
        {
            return Err(AppError::invalid_rule(format!(
                "weekday {day} is out of range 0-6"
            )));
        }

        if let Some(day) = self.month_day
            && !(1..=31).contains(&day)
        {
            return Err(AppError::invalid_rule(format!(
                "month_day {day} is out of range 1-31"
            )));
        }

        if let Some(week) = self.week_of_month
            && !(1..=LAST_WEEK_OF_MONTH).contains(&week)
        {
            return Err(AppError::invalid_rule(format!(
                "week_of_month {week} is out of range 1-5"
            )));
        }

        if self.kind == RecurrenceKind::MonthlyWeekday
            && (self.week_of_month.is_none() || self.weekday.is_none())
        {
            return Err(AppError::invalid_rule(
                "monthly_weekday requires both week_of_month and weekday",
            ));
        }

        Ok(())
    }

    pub fn describe(&self) -> String {
        let every = |unit: &str| {
            if self.effective_interval() == 1 {
                format!("every {unit}")
            } else {
                format!("every {} {unit}s", self.effective_interval())
            }
        };

        let mut text = match self.kind {
            RecurrenceKind::None => return "does not repeat".to_string(),
            RecurrenceKind::Daily => every("day"),
            RecurrenceKind::Weekly => {
                let days: Vec<&str> = if self.weekdays.is_empty() {
                    self.weekday.iter().map(|day| weekday_name(*day)).collect()
                } else {
                    self.weekdays.iter().map(|day| weekday_name(*day)).collect()
                };
                if days.is_empty() {
                    every("week")
                } else {
                    format!("{} on {}", every("week"), days.join(", "))
                }
            }
            RecurrenceKind::Monthly => match self.month_day {
                Some(day) => format!("{} on day {day}", every("month")),
                None => every("month"),
            },
            RecurrenceKind::MonthlyWeekday => {
                let week = match self.week_of_month.unwrap_or(1) {
                    1 => "first",
                    2 => "second",
                    3 => "third",
                    4 => "fourth",
                    _ => "last",
                };
                format!(
                    "{} on the {week} {}",
                    every("month"),
                    weekday_name(self.weekday.unwrap_or(0))
                )
            }
            RecurrenceKind::MonthlyLastDay => format!("{} on the last day", every("month")),
        };

        if self.completion_based {
            text.push_str(" after completion");
        }
        if let Some(end) = self.end_date {
            text.push_str(&format!(" until {end}"));
        }
        text
    }
}

const WEEKDAY_NAMES: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

pub fn weekday_name(day: u8) -> &'static str {
    WEEKDAY_NAMES.get(usize::from(day)).copied().unwrap_or("?")
}

/// Accepts a weekday number (0=Sunday) or an English name/prefix of at
/// least three letters.
pub fn parse_weekday(value: &str) -> Result<u8, AppError> {
    let trimmed = value.trim().to_ascii_lowercase();
    if let Ok(number) = trimmed.parse::<u8>() {
        if number <= 6 {
            return Ok(number);
        }
        return Err(AppError::invalid_rule(format!(
            "weekday {number} is out of range 0-6"
        )));
    }

    if trimmed.len() >= 3
        && let Some(index) = WEEKDAY_NAMES.iter().position(|name| name.starts_with(&trimmed))
    {
        return Ok(index as u8);
    }

    Err(AppError::invalid_rule(format!("unknown weekday '{value}'")))
}

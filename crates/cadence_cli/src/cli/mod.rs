use cadence_core::config::{ConfigOverrides, validate_preview_count};
use cadence_core::error::AppError;
use cadence_core::model::rule::parse_weekday;
use cadence_core::model::{Priority, RecurrenceKind, RecurrenceRule};
use cadence_core::series::RecurrenceEdit;
use cadence_core::task_api::parse_date;
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeSet;
use time::Date;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a new task, optionally repeating
    ///
    /// Example: cadence add "Pay rent" --due 2025-01-31 --repeat monthly
    /// Example: cadence add "Gym" --repeat weekly --on mon,wed,fri
    Add {
        title: Option<String>,
        #[arg(long, value_name = "YYYY-MM-DD")]
        due: Option<String>,
        #[command(flatten)]
        rule: RuleArgs,
        #[command(flatten)]
        details: DetailArgs,
    },
    /// Show details of a task
    ///
    /// Example: cadence show task-1
    Show { id: String },
    /// Edit a task's title or display fields
    ///
    /// Example: cadence edit task-1 "Pay rent and utilities"
    /// Example: cadence edit task-1 --due 2025-02-01 --priority high
    Edit {
        id: String,
        new_title: Option<String>,
        #[arg(long, value_name = "YYYY-MM-DD")]
        due: Option<String>,
        #[command(flatten)]
        details: DetailArgs,
    },
    /// Delete a task
    ///
    /// Example: cadence delete task-1
    Delete { id: String },
    /// Set a task's status
    ///
    /// Example: cadence status task-1 in_progress
    /// Example: cadence status task-1 archived -m "no longer needed"
    Status {
        id: String,
        status: String,
        #[arg(short = 'm', long = "message", value_name = "MESSAGE")]
        message: Option<String>,
    },
    /// Mark a task as done, advancing its series
    ///
    /// Example: cadence done task-1
    /// Example: cadence done task-1 -m "Paid by transfer"
    Done {
        id: String,
        message: Option<String>,
        #[arg(short = 'm', long = "message", value_name = "MESSAGE")]
        message_flag: Option<String>,
    },
    /// Skip the current occurrence of a repeating task
    ///
    /// Example: cadence skip task-1
    Skip { id: String },
    /// Change how a task repeats
    ///
    /// Example: cadence repeat task-1 --repeat monthly-weekday --week 5 --weekday mon
    /// Example: cadence repeat task-1 --repeat none
    Repeat {
        id: String,
        #[command(flatten)]
        rule: RuleArgs,
        /// Remove the end date
        #[arg(long, conflicts_with = "until")]
        no_until: bool,
        /// Anchor on the due date rather than the completion date
        #[arg(long, conflicts_with = "from_completion")]
        from_due: bool,
    },
    /// Preview upcoming occurrence dates
    ///
    /// Example: cadence preview task-1 --count 10
    Preview {
        id: String,
        #[arg(long)]
        count: Option<usize>,
        #[arg(long, value_name = "YYYY-MM-DD")]
        from: Option<String>,
    },
    /// Show a series: its template and every instance
    ///
    /// Example: cadence series task-1
    Series { id: String },
    /// Report overdue occurrences, or move them forward with --force
    ///
    /// Example: cadence rollover --force
    Rollover {
        #[arg(long)]
        force: bool,
    },
    /// List tasks
    ///
    /// Example: cadence list today
    /// Example: cadence list backlog
    List {
        #[command(subcommand)]
        list: ListCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ListCommand {
    /// List tasks due today or earlier
    ///
    /// Example: cadence list today
    Today,
    /// List tasks due later or without a due date
    ///
    /// Example: cadence list backlog
    Backlog,
}

#[derive(Args, Debug, Default, Clone)]
pub struct RuleArgs {
    /// none, daily, weekly, monthly, monthly-weekday, monthly-last-day
    #[arg(long = "repeat", value_name = "TYPE")]
    pub kind: Option<String>,
    /// Repeat every N units
    #[arg(long, value_name = "N")]
    pub every: Option<u32>,
    /// Weekdays for weekly rules, comma separated
    #[arg(long, value_name = "DAYS")]
    pub on: Option<String>,
    /// Day of month for monthly rules
    #[arg(long, value_name = "1-31")]
    pub day: Option<u8>,
    /// Week of month for monthly-weekday rules (5 = last)
    #[arg(long, value_name = "1-5")]
    pub week: Option<u8>,
    /// Weekday for monthly-weekday rules
    #[arg(long, value_name = "DAY")]
    pub weekday: Option<String>,
    /// Last date an occurrence may fall on
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub until: Option<String>,
    /// Anchor the next occurrence on the completion date
    #[arg(long)]
    pub from_completion: bool,
}

#[derive(Args, Debug, Default, Clone)]
pub struct DetailArgs {
    #[arg(long)]
    pub project: Option<String>,
    /// Tag, may be repeated
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
    /// low, medium or high
    #[arg(long)]
    pub priority: Option<String>,
    #[arg(long)]
    pub note: Option<String>,
}

impl DetailArgs {
    pub fn priority(&self) -> Result<Option<Priority>, AppError> {
        self.priority.as_deref().map(str::parse).transpose()
    }
}

impl RuleArgs {
    fn has_rule_fields(&self) -> bool {
        self.every.is_some()
            || self.on.is_some()
            || self.day.is_some()
            || self.week.is_some()
            || self.weekday.is_some()
            || self.until.is_some()
            || self.from_completion
    }

    /// Rule for a new task. Pattern flags without `--repeat` are rejected.
    pub fn to_rule(&self) -> Result<Option<RecurrenceRule>, AppError> {
        let Some(kind) = self.kind.as_deref() else {
            if self.has_rule_fields() {
                return Err(AppError::invalid_input("--repeat is required with rule options"));
            }
            return Ok(None);
        };

        let mut rule = RecurrenceRule::new(kind.parse::<RecurrenceKind>()?);
        if let Some(every) = self.every {
            rule.interval = every;
        }
        if let Some(days) = self.on.as_deref() {
            rule.weekdays = parse_weekday_list(days)?;
        }
        rule.month_day = self.day;
        rule.week_of_month = self.week;
        rule.weekday = self.weekday.as_deref().map(parse_weekday).transpose()?;
        rule.end_date = self.until.as_deref().map(parse_date).transpose()?;
        rule.completion_based = self.from_completion;
        rule.validate()?;
        Ok(Some(rule))
    }

    /// Partial edit for an existing task. Only flags that were given change.
    pub fn to_edit(&self, no_until: bool, from_due: bool) -> Result<RecurrenceEdit, AppError> {
        Ok(RecurrenceEdit {
            kind: self
                .kind
                .as_deref()
                .map(str::parse::<RecurrenceKind>)
                .transpose()?,
            interval: self.every,
            weekdays: self.on.as_deref().map(parse_weekday_list).transpose()?,
            month_day: self.day.map(Some),
            week_of_month: self.week.map(Some),
            weekday: self
                .weekday
                .as_deref()
                .map(parse_weekday)
                .transpose()?
                .map(Some),
            end_date: if no_until {
                Some(None)
            } else {
                self.until.as_deref().map(parse_date).transpose()?.map(Some)
            },
            completion_based: match (self.from_completion, from_due) {
                (true, _) => Some(true),
                (false, true) => Some(false),
                (false, false) => None,
            },
        })
    }
}

/// `mon,wed,fri` or `1,3,5`.
pub fn parse_weekday_list(raw: &str) -> Result<BTreeSet<u8>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_weekday)
        .collect()
}

pub fn parse_optional_date(raw: Option<&str>) -> Result<Option<Date>, AppError> {
    raw.map(parse_date).transpose()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOverrideTarget {
    Theme,
    PreviewCount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfigOverride {
    pub target: ConfigOverrideTarget,
    pub value: String,
}

/// Parse a raw `KEY=VALUE` override string into a structured target.
pub fn parse_config_override(raw: &str) -> Result<ParsedConfigOverride, String> {
    let trimmed = raw.trim();
    let (key_raw, value_raw) = trimmed
        .split_once('=')
        .ok_or_else(|| "override must be in KEY=VALUE format".to_string())?;

    let value = value_raw.trim().to_string();
    let canonical_field =
        canonicalize_flag_name(key_raw).ok_or_else(|| "override key cannot be empty".to_string())?;

    let target = match canonical_field.as_str() {
        "theme" => ConfigOverrideTarget::Theme,
        "preview_count" | "preview" => ConfigOverrideTarget::PreviewCount,
        other => return Err(format!("unknown config field '{other}'")),
    };
    Ok(ParsedConfigOverride { target, value })
}

/// Folds every `--config-override` flag into one set of overrides; later
/// flags win.
pub fn collect_config_overrides(raw: &[String]) -> Result<ConfigOverrides, AppError> {
    let mut overrides = ConfigOverrides::default();
    for entry in raw {
        let parsed = parse_config_override(entry).map_err(AppError::invalid_input)?;
        match parsed.target {
            ConfigOverrideTarget::Theme => overrides.theme = Some(parsed.value),
            ConfigOverrideTarget::PreviewCount => {
                let count = parsed.value.parse::<usize>().map_err(|_| {
                    AppError::invalid_input(format!(
                        "preview_count must be a number, got '{}'",
                        parsed.value
                    ))
                })?;
                overrides.preview_count = Some(validate_preview_count(count)?);
            }
        }
    }
    Ok(overrides)
}

fn canonicalize_flag_name(name: &str) -> Option<String> {
    let mut cleaned = String::new();
    let mut previous_underscore = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
            previous_underscore = false;
        } else if !previous_underscore && !cleaned.is_empty() {
            cleaned.push('_');
            previous_underscore = true;
        }
    }

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

//! Template/instance bookkeeping.
//!
//! Instances point at their template through `recurring_parent_id`; nothing
//! points the other way. The template → instances direction is always
//! derived from the task list via [`SeriesIndex`].

use crate::error::AppError;
use crate::model::{RecurrenceKind, RecurrenceRule, SeriesState, Task, TaskStatus};
use crate::storage::{TaskStore, require_task};
use std::collections::{BTreeSet, HashMap};
use time::Date;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRole {
    Template,
    Instance,
    Plain,
}

pub fn role(task: &Task) -> TaskRole {
    if task.recurring_parent_id.is_some() {
        TaskRole::Instance
    } else if task.active_rule().is_some() {
        TaskRole::Template
    } else {
        TaskRole::Plain
    }
}

pub fn is_template(task: &Task) -> bool {
    role(task) == TaskRole::Template
}

pub fn is_instance(task: &Task) -> bool {
    role(task) == TaskRole::Instance
}

/// The task itself when it is a template, otherwise its parent. A parent
/// that is missing or no longer repeats is reported as `AmbiguousParent`.
pub fn resolve_template<S: TaskStore + ?Sized>(store: &S, task: &Task) -> Result<Task, AppError> {
    match (role(task), task.recurring_parent_id.as_deref()) {
        (TaskRole::Template, _) => Ok(task.clone()),
        (TaskRole::Instance, Some(parent_id)) => store
            .load_task(parent_id)?
            .filter(is_template)
            .ok_or_else(|| AppError::ambiguous_parent(task.id.as_str(), parent_id)),
        _ => Err(AppError::invalid_input(format!(
            "task {} is not recurring",
            task.id
        ))),
    }
}

/// Derived template id → instance ids lookup.
#[derive(Debug, Default, Clone)]
pub struct SeriesIndex {
    children: HashMap<String, Vec<String>>,
}

impl SeriesIndex {
    pub fn build(tasks: &[Task]) -> Self {
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for task in tasks {
            if let Some(parent_id) = task.recurring_parent_id.as_ref() {
                children
                    .entry(parent_id.clone())
                    .or_default()
                    .push(task.id.clone());
            }
        }
        Self { children }
    }

    pub fn instance_ids(&self, template_id: &str) -> &[String] {
        self.children
            .get(template_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Instances of a template ordered by due date, undated ones last.
pub fn list_instances<S: TaskStore + ?Sized>(
    store: &S,
    template_id: &str,
) -> Result<Vec<Task>, AppError> {
    let tasks = store.list_tasks()?;
    let index = SeriesIndex::build(&tasks);
    let ids: BTreeSet<&str> = index
        .instance_ids(template_id)
        .iter()
        .map(String::as_str)
        .collect();

    let mut instances: Vec<Task> = tasks
        .iter()
        .filter(|task| ids.contains(task.id.as_str()))
        .cloned()
        .collect();
    instances.sort_by(|a, b| {
        (a.due_date.is_none(), a.due_date, &a.created_at).cmp(&(
            b.due_date.is_none(),
            b.due_date,
            &b.created_at,
        ))
    });
    Ok(instances)
}

/// The open instance currently standing in for the series, earliest first
/// if more than one is open.
pub fn active_instance(instances: &[Task]) -> Option<&Task> {
    instances
        .iter()
        .filter(|task| task.is_open())
        .min_by_key(|task| (task.due_date.is_none(), task.due_date))
}

/// Where the series currently stands: the live instance's due date, or the
/// latest due date the series has reached.
pub fn current_due(template: &Task, instances: &[Task]) -> Option<Date> {
    if let Some(live) = active_instance(instances) {
        return live.due_date;
    }
    instances
        .iter()
        .filter_map(|task| task.due_date)
        .chain(template.due_date)
        .max()
}

/// Builds a new instance for `due`. Display attributes are copied now and
/// never re-synced from the template afterwards.
pub fn materialize_instance(template: &Task, due: Date, id: String, created_at: String) -> Task {
    Task {
        id,
        title: template.title.clone(),
        status: TaskStatus::NotStarted,
        created_at,
        due_date: Some(due),
        completed_at: None,
        completion_history: Vec::new(),
        recurring_parent_id: Some(template.id.clone()),
        recurrence: template.recurrence.clone(),
        series_state: SeriesState::Active,
        project: template.project.clone(),
        tags: template.tags.clone(),
        priority: template.priority,
        note: template.note.clone(),
    }
}

/// Fixes an unset monthly day to the day of `due`, so short months clamp
/// and later months return to it. Completion-based rules stay unpinned and
/// take the day of each completion.
pub fn pin_month_day(mut rule: RecurrenceRule, due: Option<Date>) -> RecurrenceRule {
    if rule.kind == RecurrenceKind::Monthly && !rule.completion_based && rule.month_day.is_none()
    {
        rule.month_day = due.map(|due| due.day());
    }
    rule
}

/// Partial change to a recurrence rule. Outer `None` leaves a field alone;
/// `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecurrenceEdit {
    pub kind: Option<RecurrenceKind>,
    pub interval: Option<u32>,
    pub weekdays: Option<BTreeSet<u8>>,
    pub month_day: Option<Option<u8>>,
    pub week_of_month: Option<Option<u8>>,
    pub weekday: Option<Option<u8>>,
    pub end_date: Option<Option<Date>>,
    pub completion_based: Option<bool>,
}

impl RecurrenceEdit {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, rule: &RecurrenceRule) -> RecurrenceRule {
        let mut next = rule.clone();
        if let Some(kind) = self.kind {
            next.kind = kind;
        }
        if let Some(interval) = self.interval {
            next.interval = interval;
        }
        if let Some(weekdays) = self.weekdays.as_ref() {
            next.weekdays = weekdays.clone();
        }
        if let Some(month_day) = self.month_day {
            next.month_day = month_day;
        }
        if let Some(week_of_month) = self.week_of_month {
            next.week_of_month = week_of_month;
        }
        if let Some(weekday) = self.weekday {
            next.weekday = weekday;
        }
        if let Some(end_date) = self.end_date {
            next.end_date = end_date;
        }
        if let Some(completion_based) = self.completion_based {
            next.completion_based = completion_based;
        }
        next
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceEditOutcome {
    /// Task the edit landed on, as saved.
    pub template: Task,
    /// True when the caller addressed an instance and the write went to
    /// its template.
    pub redirected: bool,
    /// Instances whose displayed rule copy is now stale.
    pub refresh_instance_ids: Vec<String>,
}

/// Applies a recurrence edit to the series template. Edits addressed to an
/// instance are redirected; a plain task becomes a template. Materialized
/// instances keep their copies.
pub fn redirect_recurrence_edit<S: TaskStore + ?Sized>(
    store: &mut S,
    task_id: &str,
    edit: &RecurrenceEdit,
) -> Result<RecurrenceEditOutcome, AppError> {
    if edit.is_empty() {
        return Err(AppError::invalid_input("no recurrence fields to change"));
    }

    let task = require_task(store, task_id)?;
    let mut target = match role(&task) {
        TaskRole::Plain => task.clone(),
        _ => resolve_template(store, &task)?,
    };
    let redirected = target.id != task.id;

    let base = target.recurrence.clone().unwrap_or_default();
    let mut rule = edit.apply_to(&base);
    let pinned_from_due = base.kind == RecurrenceKind::Monthly
        && !base.completion_based
        && base.month_day.is_some()
        && base.month_day == target.due_date.map(|due| due.day());
    if rule.completion_based && pinned_from_due && edit.month_day.is_none() {
        rule.month_day = None;
    }
    let rule = pin_month_day(rule, target.due_date);
    rule.validate()?;

    target.recurrence = if rule.is_none() { None } else { Some(rule) };
    target.series_state = SeriesState::Active;
    let template = store.save_task(target)?;

    let refresh_instance_ids = list_instances(store, &template.id)?
        .into_iter()
        .map(|instance| instance.id)
        .collect::<Vec<_>>();

    info!(
        template = %template.id,
        requested = %task.id,
        redirected,
        refresh = refresh_instance_ids.len(),
        "recurrence edited"
    );

    Ok(RecurrenceEditOutcome {
        template,
        redirected,
        refresh_instance_ids,
    })
}

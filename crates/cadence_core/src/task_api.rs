use crate::advance::{
    Advancement, RolloverReport, advance_on_completion, advance_on_status_change,
    rollover_overdue, skip_occurrence, start_series,
};
use crate::clock::{Clock, clock_from_env, format_timestamp};
use crate::config::validate_preview_count;
use crate::error::AppError;
use crate::model::{Priority, RecurrenceRule, Task, TaskStatus};
use crate::occurrence::next_occurrence;
use crate::preview::preview_next;
use crate::series::{
    RecurrenceEdit, RecurrenceEditOutcome, SeriesIndex, TaskRole, current_due, list_instances,
    pin_month_day, redirect_recurrence_edit, resolve_template, role,
};
use crate::storage::json_store::JsonStore;
use crate::storage::{TaskStore, allocate_id, require_task};
use std::collections::HashSet;
use time::Date;
use time::macros::format_description;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub due_date: Option<Date>,
    pub recurrence: Option<RecurrenceRule>,
    pub project: Option<String>,
    pub tags: Vec<String>,
    pub priority: Option<Priority>,
    pub note: Option<String>,
}

impl NewTask {
    pub fn titled<T: Into<String>>(title: T) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Display-attribute changes. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub due_date: Option<Date>,
    pub project: Option<String>,
    pub tags: Option<Vec<String>>,
    pub priority: Option<Priority>,
    pub note: Option<String>,
}

impl TaskEdit {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Series {
    pub template: Task,
    pub instances: Vec<Task>,
}

enum ListMode {
    Today,
    Backlog,
}

pub fn compute_next_occurrence(rule: &RecurrenceRule, anchor: Date) -> Option<Date> {
    next_occurrence(rule, anchor)
}

pub fn add_task(new_task: NewTask) -> Result<Task, AppError> {
    let store = JsonStore::from_env()?;
    let clock = clock_from_env()?;
    add_task_with_store(&store, clock.as_ref(), new_task)
}

pub fn get_task(id: &str) -> Result<Task, AppError> {
    let store = JsonStore::from_env()?;
    get_task_with_store(&store, id)
}

pub fn list_today() -> Result<Vec<Task>, AppError> {
    let store = JsonStore::from_env()?;
    let clock = clock_from_env()?;
    list_with_store(&store, clock.as_ref(), ListMode::Today)
}

pub fn list_backlog() -> Result<Vec<Task>, AppError> {
    let store = JsonStore::from_env()?;
    let clock = clock_from_env()?;
    list_with_store(&store, clock.as_ref(), ListMode::Backlog)
}

pub fn list_series(id: &str) -> Result<Series, AppError> {
    let store = JsonStore::from_env()?;
    list_series_with_store(&store, id)
}

pub fn edit_task(id: &str, edit: TaskEdit) -> Result<Task, AppError> {
    let store = JsonStore::from_env()?;
    edit_task_with_store(&store, id, edit)
}

pub fn delete_task(id: &str) -> Result<Task, AppError> {
    let store = JsonStore::from_env()?;
    delete_task_with_store(&store, id)
}

pub fn set_status(id: &str, status: TaskStatus, message: Option<&str>) -> Result<Advancement, AppError> {
    let store = JsonStore::from_env()?;
    let clock = clock_from_env()?;
    set_status_with_store(&store, clock.as_ref(), id, status, message)
}

pub fn complete_task(id: &str, message: Option<&str>) -> Result<Advancement, AppError> {
    let store = JsonStore::from_env()?;
    let clock = clock_from_env()?;
    complete_task_with_store(&store, clock.as_ref(), id, message)
}

pub fn skip_task(id: &str) -> Result<Advancement, AppError> {
    let store = JsonStore::from_env()?;
    let clock = clock_from_env()?;
    skip_task_with_store(&store, clock.as_ref(), id)
}

pub fn rollover(force: bool) -> Result<RolloverReport, AppError> {
    let store = JsonStore::from_env()?;
    let clock = clock_from_env()?;
    rollover_with_store(&store, clock.as_ref(), force)
}

pub fn preview_iterations(
    id: &str,
    count: usize,
    start_from: Option<Date>,
) -> Result<Vec<Date>, AppError> {
    let store = JsonStore::from_env()?;
    let clock = clock_from_env()?;
    preview_iterations_with_store(&store, clock.as_ref(), id, count, start_from)
}

pub fn edit_recurrence(id: &str, edit: RecurrenceEdit) -> Result<RecurrenceEditOutcome, AppError> {
    let store = JsonStore::from_env()?;
    let clock = clock_from_env()?;
    edit_recurrence_with_store(&store, clock.as_ref(), id, &edit)
}

pub fn add_task_with_store(
    store: &JsonStore,
    clock: &dyn Clock,
    new_task: NewTask,
) -> Result<Task, AppError> {
    let title = new_task.title.trim();
    if title.is_empty() {
        return Err(AppError::invalid_input("title is required"));
    }

    let recurrence = match new_task.recurrence {
        Some(rule) if !rule.is_none() => {
            rule.validate()?;
            Some(rule)
        }
        _ => None,
    };
    let now = clock.now();
    let due_date = match new_task.due_date {
        Some(due) => Some(due),
        None if recurrence.is_some() => Some(now.date()),
        None => None,
    };
    let recurrence = recurrence.map(|rule| pin_month_day(rule, due_date));
    let created_at = format_timestamp(now)?;

    let template = store.transaction(|state| {
        let mut task = Task::new(allocate_id(state, now)?, title, created_at);
        task.due_date = due_date;
        task.recurrence = recurrence;
        task.project = clean_text(new_task.project.as_deref());
        task.tags = clean_tags(&new_task.tags);
        task.priority = new_task.priority;
        task.note = clean_text(new_task.note.as_deref());
        let task = state.create_task(task)?;

        if role(&task) == TaskRole::Template {
            start_series(state, &task.id, now)?;
        }
        Ok(task)
    })?;

    info!(task = %template.id, recurring = template.recurrence.is_some(), "task added");
    Ok(template)
}

pub fn get_task_with_store(store: &JsonStore, id: &str) -> Result<Task, AppError> {
    require_task(&store.read()?, id)
}

fn list_with_store(store: &JsonStore, clock: &dyn Clock, mode: ListMode) -> Result<Vec<Task>, AppError> {
    let tasks = store.read()?.tasks;
    Ok(filter_tasks(&tasks, clock.today(), mode))
}

/// Open occurrences only: closed tasks are dropped, and a template with a
/// live instance is represented by that instance.
fn filter_tasks(tasks: &[Task], today: Date, mode: ListMode) -> Vec<Task> {
    let live_parents: HashSet<&str> = tasks
        .iter()
        .filter(|task| task.is_open())
        .filter_map(|task| task.recurring_parent_id.as_deref())
        .collect();

    let index = SeriesIndex::build(tasks);
    let mut filtered: Vec<Task> = tasks
        .iter()
        .filter(|task| task.is_open() && !live_parents.contains(task.id.as_str()))
        .map(|task| occurrence_view(task, tasks, &index))
        .filter(|task| match (&mode, task.due_date) {
            (ListMode::Today, Some(due)) => due <= today,
            (ListMode::Today, None) => false,
            (ListMode::Backlog, Some(due)) => due > today,
            (ListMode::Backlog, None) => true,
        })
        .collect();

    filtered.sort_by(|a, b| {
        (a.due_date.is_none(), a.due_date, &a.created_at).cmp(&(
            b.due_date.is_none(),
            b.due_date,
            &b.created_at,
        ))
    });
    filtered
}

/// A template standing in as its own occurrence is shown at the date the
/// series has reached rather than the due date it was created with.
fn occurrence_view(task: &Task, tasks: &[Task], index: &SeriesIndex) -> Task {
    let mut view = task.clone();
    if role(task) == TaskRole::Template {
        let ids = index.instance_ids(&task.id);
        let instances: Vec<Task> = tasks
            .iter()
            .filter(|candidate| ids.contains(&candidate.id))
            .cloned()
            .collect();
        view.due_date = current_due(task, &instances);
    }
    view
}

pub fn list_series_with_store(store: &JsonStore, id: &str) -> Result<Series, AppError> {
    let state = store.read()?;
    let task = require_task(&state, id)?;
    let template = resolve_template(&state, &task)?;
    let instances = list_instances(&state, &template.id)?;
    Ok(Series {
        template,
        instances,
    })
}

pub fn edit_task_with_store(store: &JsonStore, id: &str, edit: TaskEdit) -> Result<Task, AppError> {
    if edit.is_empty() {
        return Err(AppError::invalid_input("nothing to change"));
    }
    let title = match edit.title.as_deref().map(str::trim) {
        Some("") => return Err(AppError::invalid_input("title is required")),
        other => other.map(str::to_string),
    };

    store.transaction(|state| {
        let mut task = require_task(state, id)?;
        if let Some(title) = title {
            task.title = title;
        }
        if let Some(due) = edit.due_date {
            task.due_date = Some(due);
        }
        if let Some(project) = edit.project.as_deref() {
            task.project = clean_text(Some(project));
        }
        if let Some(tags) = edit.tags.as_ref() {
            task.tags = clean_tags(tags);
        }
        if let Some(priority) = edit.priority {
            task.priority = Some(priority);
        }
        if let Some(note) = edit.note.as_deref() {
            task.note = clean_text(Some(note));
        }
        state.save_task(task)
    })
}

/// Deleting a template leaves its instances in place; they then surface as
/// orphans.
pub fn delete_task_with_store(store: &JsonStore, id: &str) -> Result<Task, AppError> {
    store.transaction(|state| {
        let task = require_task(state, id)?;
        let orphaned = list_instances(state, &task.id)?.len();
        let removed = state.delete_task(&task.id)?;
        if orphaned > 0 {
            warn!(task = %removed.id, orphaned, "deleted template with existing instances");
        }
        Ok(removed)
    })
}

/// Completion statuses on an open task advance its series; anything else is
/// a plain status update.
pub fn set_status_with_store(
    store: &JsonStore,
    clock: &dyn Clock,
    id: &str,
    status: TaskStatus,
    message: Option<&str>,
) -> Result<Advancement, AppError> {
    let now = clock.now();
    store.transaction(|state| {
        let mut task = require_task(state, id)?;
        if status.is_completion() && task.is_open() {
            return advance_on_status_change(state, &task.id, status, now, message);
        }

        task.status = status;
        if !status.is_closed() {
            task.completed_at = None;
        } else if task.completed_at.is_none() {
            task.completed_at = Some(format_timestamp(now)?);
        }
        Ok(Advancement::single(state.save_task(task)?))
    })
}

pub fn complete_task_with_store(
    store: &JsonStore,
    clock: &dyn Clock,
    id: &str,
    message: Option<&str>,
) -> Result<Advancement, AppError> {
    let now = clock.now();
    store.transaction(|state| advance_on_completion(state, id.trim(), now, message))
}

pub fn skip_task_with_store(
    store: &JsonStore,
    clock: &dyn Clock,
    id: &str,
) -> Result<Advancement, AppError> {
    let now = clock.now();
    store.transaction(|state| skip_occurrence(state, id.trim(), now))
}

pub fn rollover_with_store(
    store: &JsonStore,
    clock: &dyn Clock,
    force: bool,
) -> Result<RolloverReport, AppError> {
    let now = clock.now();
    if !force {
        let mut snapshot = store.read()?;
        return rollover_overdue(&mut snapshot, now, false);
    }
    store.transaction(|state| rollover_overdue(state, now, true))
}

pub fn preview_iterations_with_store(
    store: &JsonStore,
    clock: &dyn Clock,
    id: &str,
    count: usize,
    start_from: Option<Date>,
) -> Result<Vec<Date>, AppError> {
    let count = validate_preview_count(count)?;
    preview_next(&store.read()?, id, count, start_from, clock.today())
}

/// Applies a recurrence edit to the series template. A plain task that
/// gains a rule gets its first instance straight away.
pub fn edit_recurrence_with_store(
    store: &JsonStore,
    clock: &dyn Clock,
    id: &str,
    edit: &RecurrenceEdit,
) -> Result<RecurrenceEditOutcome, AppError> {
    let now = clock.now();
    store.transaction(|state| {
        let before = require_task(state, id)?;
        let mut outcome = redirect_recurrence_edit(state, id, edit)?;
        if role(&before) == TaskRole::Plain && role(&outcome.template) == TaskRole::Template {
            let started = start_series(state, &outcome.template.id, now)?;
            if let Some(template) = started.template {
                outcome.template = template;
            }
            outcome
                .refresh_instance_ids
                .extend(started.new_instance.map(|instance| instance.id));
        }
        Ok(outcome)
    })
}

/// `YYYY-MM-DD`.
pub fn parse_date(value: &str) -> Result<Date, AppError> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(value.trim(), format).map_err(|_| {
        AppError::invalid_input(format!("date must be YYYY-MM-DD, got '{}'", value.trim()))
    })
}

pub fn task_overdue(task: &Task, today: Date) -> bool {
    task.is_open() && task.due_date.is_some_and(|due| due < today)
}

fn clean_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn clean_tags(tags: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().trim_start_matches('#').to_ascii_lowercase();
        if !tag.is_empty() && !cleaned.contains(&tag) {
            cleaned.push(tag);
        }
    }
    cleaned
}

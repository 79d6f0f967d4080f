//! Series start and advancement on completion, skip, and rollover.
//!
//! Every entry point stages its writes on a copy of the store through
//! [`atomically`], so a failure part way through (say, creating the next
//! instance) leaves the caller's store untouched.

use crate::clock::format_timestamp;
use crate::error::AppError;
use crate::model::{CompletionEntry, RecurrenceRule, SeriesState, Task, TaskStatus};
use crate::occurrence::{first_occurrence_on_or_after, next_occurrence};
use crate::series::{
    SeriesIndex, TaskRole, active_instance, current_due, list_instances, materialize_instance,
    resolve_template, role,
};
use crate::storage::{TaskStore, allocate_id, atomically, require_task};
use time::{Date, OffsetDateTime};
use tracing::{debug, info, warn};

/// What an advance changed. Callers merge these values into whatever view
/// of the task list they hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advancement {
    /// The task that was addressed, as saved.
    pub updated: Task,
    /// The series template after the advance, when one was involved.
    pub template: Option<Task>,
    pub new_instance: Option<Task>,
    /// The series has no further occurrences.
    pub exhausted: bool,
    /// The advance wrote to tasks beyond the one addressed, so dependent
    /// views should be refreshed.
    pub parent_child_logic_executed: bool,
}

impl Advancement {
    pub(crate) fn single(updated: Task) -> Self {
        Self {
            updated,
            template: None,
            new_instance: None,
            exhausted: false,
            parent_child_logic_executed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloverReport {
    /// Active occurrences whose due date is before today, as found.
    pub overdue: Vec<Task>,
    /// One entry per overdue occurrence when rollover was forced.
    pub advanced: Vec<Advancement>,
}

struct Closing {
    status: TaskStatus,
    at: OffsetDateTime,
    stamp: String,
    message: Option<String>,
    event_date: Date,
    /// Completion events honor `completion_based`; skips always anchor on
    /// the due date.
    completion: bool,
    floor: Option<Date>,
}

impl Closing {
    fn anchor(&self, rule: &RecurrenceRule, due: Option<Date>) -> Date {
        if self.completion && rule.completion_based {
            self.event_date
        } else {
            due.unwrap_or(self.event_date)
        }
    }

    fn next_after(&self, rule: &RecurrenceRule, anchor: Date) -> Option<Date> {
        match self.floor {
            Some(floor) => first_occurrence_on_or_after(rule, anchor, floor),
            None => next_occurrence(rule, anchor),
        }
    }

    fn close(&self, mut task: Task) -> Task {
        task.status = self.status;
        if self.completion {
            task.completed_at = Some(self.stamp.clone());
            task.completion_history.push(self.history_entry(task.due_date));
        }
        task
    }

    fn history_entry(&self, due_date: Option<Date>) -> CompletionEntry {
        CompletionEntry {
            message: self.message.clone(),
            completed_at: self.stamp.clone(),
            due_date,
        }
    }
}

/// Marks a task done and advances its series.
pub fn advance_on_completion<S>(
    store: &mut S,
    task_id: &str,
    completed_at: OffsetDateTime,
    message: Option<&str>,
) -> Result<Advancement, AppError>
where
    S: TaskStore + Clone,
{
    advance_on_status_change(store, task_id, TaskStatus::Done, completed_at, message)
}

/// Moves a task to a completion status (`done` or `archived`) and advances
/// its series.
pub fn advance_on_status_change<S>(
    store: &mut S,
    task_id: &str,
    status: TaskStatus,
    at: OffsetDateTime,
    message: Option<&str>,
) -> Result<Advancement, AppError>
where
    S: TaskStore + Clone,
{
    if !status.is_completion() {
        return Err(AppError::invalid_input(format!(
            "status {status} does not complete a task"
        )));
    }
    let message = match message.map(str::trim) {
        Some("") => return Err(AppError::invalid_input("message is required")),
        other => other.map(str::to_string),
    };
    let closing = Closing {
        status,
        at,
        stamp: format_timestamp(at)?,
        message,
        event_date: at.date(),
        completion: true,
        floor: None,
    };

    atomically(store, |staged| {
        let task = require_task(staged, task_id)?;
        if task.status.is_closed() {
            return Err(AppError::invalid_input("task already completed"));
        }
        advance_task(staged, task, &closing)
    })
}

/// Moves past the current occurrence without completing it. A skipped
/// instance is cancelled and replaced by its successor.
pub fn skip_occurrence<S>(
    store: &mut S,
    task_id: &str,
    at: OffsetDateTime,
) -> Result<Advancement, AppError>
where
    S: TaskStore + Clone,
{
    let closing = Closing {
        status: TaskStatus::Cancelled,
        at,
        stamp: format_timestamp(at)?,
        message: None,
        event_date: at.date(),
        completion: false,
        floor: None,
    };

    atomically(store, |staged| {
        let task = require_task(staged, task_id)?;
        if task.status.is_closed() {
            return Err(AppError::invalid_input("task already closed"));
        }
        if role(&task) == TaskRole::Plain {
            return Err(AppError::invalid_input(format!(
                "task {} is not recurring",
                task.id
            )));
        }
        advance_task(staged, task, &closing)
    })
}

/// Materializes the first instance of a template, due on the template's own
/// due date (or `at`'s date when it has none). A template whose end date is
/// already behind that date is marked exhausted instead.
pub fn start_series<S>(
    store: &mut S,
    template_id: &str,
    at: OffsetDateTime,
) -> Result<Advancement, AppError>
where
    S: TaskStore + Clone,
{
    let stamp = format_timestamp(at)?;

    atomically(store, |staged| {
        let mut template = require_task(staged, template_id)?;
        if role(&template) != TaskRole::Template {
            return Err(AppError::invalid_input(format!(
                "task {} is not a recurring template",
                template.id
            )));
        }
        if let Some(live) = active_instance(&list_instances(staged, &template.id)?) {
            return Err(AppError::invalid_input(format!(
                "task {} already has a live instance {}",
                template.id, live.id
            )));
        }

        let due = template.due_date.unwrap_or(at.date());
        template.due_date = Some(due);
        let ended = template
            .active_rule()
            .and_then(|rule| rule.end_date)
            .is_some_and(|end_date| due > end_date);
        if ended {
            template.series_state = SeriesState::Exhausted;
            let template = staged.save_task(template)?;
            info!(template = %template.id, %due, "series ended before its first occurrence");
            return Ok(Advancement {
                template: Some(template.clone()),
                exhausted: true,
                ..Advancement::single(template)
            });
        }

        template.series_state = SeriesState::Active;
        let template = staged.save_task(template)?;

        let id = allocate_id(staged, at)?;
        let created = staged.create_task(materialize_instance(&template, due, id, stamp))?;
        info!(template = %template.id, instance = %created.id, %due, "series started");

        Ok(Advancement {
            template: Some(template.clone()),
            new_instance: Some(created),
            parent_child_logic_executed: true,
            ..Advancement::single(template)
        })
    })
}

/// Finds active occurrences due before `now`'s date. With `force`, each one
/// is moved to its first occurrence on or after today.
pub fn rollover_overdue<S>(
    store: &mut S,
    now: OffsetDateTime,
    force: bool,
) -> Result<RolloverReport, AppError>
where
    S: TaskStore + Clone,
{
    let today = now.date();
    let overdue = overdue_occurrences(store, today)?;
    if !force || overdue.is_empty() {
        return Ok(RolloverReport {
            overdue,
            advanced: Vec::new(),
        });
    }

    let closing = Closing {
        status: TaskStatus::Cancelled,
        at: now,
        stamp: format_timestamp(now)?,
        message: None,
        event_date: today,
        completion: false,
        floor: Some(today),
    };

    let advanced = atomically(store, |staged| {
        overdue
            .iter()
            .map(|task| {
                let current = require_task(staged, &task.id)?;
                advance_task(staged, current, &closing)
            })
            .collect::<Result<Vec<_>, AppError>>()
    })?;

    info!(count = advanced.len(), %today, "rolled over overdue occurrences");
    Ok(RolloverReport { overdue, advanced })
}

/// Active occurrences (live instances, or open templates without one) due
/// strictly before `today`. Orphaned instances and exhausted series are
/// left out.
pub fn overdue_occurrences<S: TaskStore + ?Sized>(
    store: &S,
    today: Date,
) -> Result<Vec<Task>, AppError> {
    let tasks = store.list_tasks()?;
    let index = SeriesIndex::build(&tasks);
    let mut overdue = Vec::new();

    for template in tasks.iter().filter(|task| role(task) == TaskRole::Template) {
        if template.series_state == SeriesState::Exhausted {
            continue;
        }
        let instances: Vec<Task> = tasks
            .iter()
            .filter(|task| index.instance_ids(&template.id).contains(&task.id))
            .cloned()
            .collect();
        let occurrence = match active_instance(&instances) {
            Some(live) => live.clone(),
            None if template.is_open() => template.clone(),
            None => continue,
        };
        if occurrence.due_date.is_some_and(|due| due < today) {
            overdue.push(occurrence);
        }
    }

    overdue.sort_by_key(|task| task.due_date);
    Ok(overdue)
}

fn advance_task<S: TaskStore + ?Sized>(
    store: &mut S,
    task: Task,
    closing: &Closing,
) -> Result<Advancement, AppError> {
    match role(&task) {
        TaskRole::Plain => Ok(Advancement::single(store.save_task(closing.close(task))?)),
        TaskRole::Template => advance_template(store, task, closing),
        TaskRole::Instance => match resolve_template(store, &task) {
            Ok(template) => advance_instance(store, task, template, closing),
            Err(err) if err.is_recoverable() => {
                warn!(task = %task.id, error = %err, "closing orphaned instance as a plain task");
                Ok(Advancement::single(store.save_task(closing.close(task))?))
            }
            Err(err) => Err(err),
        },
    }
}

fn advance_instance<S: TaskStore + ?Sized>(
    store: &mut S,
    instance: Task,
    mut template: Task,
    closing: &Closing,
) -> Result<Advancement, AppError> {
    let closed = store.save_task(closing.close(instance))?;

    let Some(rule) = template.active_rule().cloned() else {
        return Err(AppError::ambiguous_parent(closed.id.as_str(), template.id.as_str()));
    };
    if template.series_state == SeriesState::Exhausted {
        return Ok(Advancement {
            template: Some(template),
            exhausted: true,
            ..Advancement::single(closed)
        });
    }

    template.series_state = SeriesState::Advancing;
    let anchor = closing.anchor(&rule, closed.due_date);
    let Some(next) = closing.next_after(&rule, anchor) else {
        template.series_state = SeriesState::Exhausted;
        let template = store.save_task(template)?;
        info!(template = %template.id, %anchor, "series exhausted");
        return Ok(Advancement {
            template: Some(template),
            exhausted: true,
            parent_child_logic_executed: true,
            ..Advancement::single(closed)
        });
    };
    debug!(template = %template.id, %anchor, %next, "next occurrence computed");

    template.series_state = SeriesState::Active;
    let instances = list_instances(store, &template.id)?;
    if let Some(existing) = instances
        .iter()
        .find(|task| task.is_open() && task.due_date == Some(next))
    {
        debug!(template = %template.id, instance = %existing.id, %next, "instance already exists");
        return Ok(Advancement {
            template: Some(template),
            ..Advancement::single(closed)
        });
    }

    let id = allocate_id(store, closing.at)?;
    let created = store.create_task(materialize_instance(
        &template,
        next,
        id,
        closing.stamp.clone(),
    ))?;
    info!(template = %template.id, instance = %created.id, due = %next, "instance materialized");

    Ok(Advancement {
        template: Some(template),
        new_instance: Some(created),
        parent_child_logic_executed: true,
        ..Advancement::single(closed)
    })
}

/// Completing or skipping the template itself: only allowed when it is the
/// active occurrence, and moves its due date forward in place.
fn advance_template<S: TaskStore + ?Sized>(
    store: &mut S,
    mut template: Task,
    closing: &Closing,
) -> Result<Advancement, AppError> {
    let instances = list_instances(store, &template.id)?;
    if let Some(live) = active_instance(&instances) {
        return Err(AppError::invalid_input(format!(
            "task {} has a live instance {}; complete that instead",
            template.id, live.id
        )));
    }

    let Some(rule) = template.active_rule().cloned() else {
        return Ok(Advancement::single(store.save_task(closing.close(template))?));
    };
    if template.series_state == SeriesState::Exhausted {
        let closed = store.save_task(closing.close(template))?;
        return Ok(Advancement {
            exhausted: true,
            ..Advancement::single(closed)
        });
    }

    let due = current_due(&template, &instances);
    let anchor = closing.anchor(&rule, due);
    let Some(next) = closing.next_after(&rule, anchor) else {
        let mut closed = closing.close(template);
        closed.series_state = SeriesState::Exhausted;
        let closed = store.save_task(closed)?;
        info!(template = %closed.id, %anchor, "series exhausted");
        return Ok(Advancement {
            template: Some(closed.clone()),
            exhausted: true,
            ..Advancement::single(closed)
        });
    };

    if closing.completion {
        template.completion_history.push(closing.history_entry(due));
    }
    template.due_date = Some(next);
    template.status = TaskStatus::NotStarted;
    template.series_state = SeriesState::Active;
    let template = store.save_task(template)?;
    info!(template = %template.id, %anchor, due = %next, "template advanced in place");

    Ok(Advancement {
        template: Some(template.clone()),
        ..Advancement::single(template)
    })
}

#[cfg(test)]
mod tests {
    use super::{
        advance_on_completion, advance_on_status_change, overdue_occurrences, rollover_overdue,
        skip_occurrence, start_series,
    };
    use crate::error::AppError;
    use crate::model::{RecurrenceRule, SeriesState, Task, TaskStatus};
    use crate::series::{list_instances, materialize_instance};
    use crate::storage::{TaskState, TaskStore};
    use time::macros::{date, datetime};

    const CREATED: &str = "2025-01-01T00:00:00Z";

    fn weekly_template(completion_based: bool) -> Task {
        let mut rule = RecurrenceRule::weekly(1, []);
        rule.completion_based = completion_based;
        Task::new("tpl", "water plants", CREATED)
            .due(date!(2025 - 01 - 06))
            .repeating(rule)
    }

    fn with_instance(template: Task) -> TaskState {
        let instance = materialize_instance(
            &template,
            date!(2025 - 01 - 06),
            "inst-1".into(),
            CREATED.into(),
        );
        TaskState::new(vec![template, instance])
    }

    #[test]
    fn completing_instance_creates_successor_from_due_date() {
        let mut state = with_instance(weekly_template(false));

        let outcome = advance_on_completion(
            &mut state,
            "inst-1",
            datetime!(2025-01-08 18:00 UTC),
            Some("watered"),
        )
        .unwrap();

        assert_eq!(outcome.updated.status, TaskStatus::Done);
        assert_eq!(outcome.updated.completion_history.len(), 1);
        assert!(outcome.parent_child_logic_executed);
        assert!(!outcome.exhausted);
        let next = outcome.new_instance.unwrap();
        assert_eq!(next.due_date, Some(date!(2025 - 01 - 13)));
        assert_eq!(next.recurring_parent_id.as_deref(), Some("tpl"));
        assert_eq!(next.status, TaskStatus::NotStarted);

        let instances = list_instances(&state, "tpl").unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(
            instances.iter().filter(|task| task.is_open()).count(),
            1
        );
    }

    #[test]
    fn lateness_only_shifts_completion_based_series() {
        let on_time = datetime!(2025-01-06 09:00 UTC);
        let late = datetime!(2025-01-11 09:00 UTC);

        let due_based = |at| {
            let mut state = with_instance(weekly_template(false));
            advance_on_completion(&mut state, "inst-1", at, None)
                .unwrap()
                .new_instance
                .unwrap()
                .due_date
        };
        assert_eq!(due_based(on_time), due_based(late));

        let mut state = with_instance(weekly_template(true));
        let shifted = advance_on_completion(&mut state, "inst-1", late, None)
            .unwrap()
            .new_instance
            .unwrap()
            .due_date;
        assert_eq!(shifted, Some(date!(2025 - 01 - 18)));
    }

    #[test]
    fn end_date_exhausts_the_series() {
        let mut template = weekly_template(false);
        template.recurrence = Some(RecurrenceRule::weekly(1, []).until(date!(2025 - 01 - 10)));
        let mut state = with_instance(template);

        let outcome =
            advance_on_completion(&mut state, "inst-1", datetime!(2025-01-06 10:00 UTC), None)
                .unwrap();

        assert!(outcome.exhausted);
        assert!(outcome.new_instance.is_none());
        assert_eq!(outcome.template.unwrap().series_state, SeriesState::Exhausted);
        assert_eq!(
            state.load_task("tpl").unwrap().unwrap().series_state,
            SeriesState::Exhausted
        );
    }

    #[test]
    fn exhausted_series_instance_completes_as_plain() {
        let mut template = weekly_template(false);
        template.series_state = SeriesState::Exhausted;
        let mut state = with_instance(template);

        let outcome =
            advance_on_completion(&mut state, "inst-1", datetime!(2025-01-06 10:00 UTC), None)
                .unwrap();
        assert!(outcome.exhausted);
        assert!(!outcome.parent_child_logic_executed);
        assert_eq!(state.tasks.len(), 2);
    }

    #[test]
    fn template_without_live_instance_advances_in_place() {
        let mut state = TaskState::new(vec![weekly_template(false)]);

        let outcome = advance_on_completion(
            &mut state,
            "tpl",
            datetime!(2025-01-06 10:00 UTC),
            Some("done early"),
        )
        .unwrap();

        let stored = state.load_task("tpl").unwrap().unwrap();
        assert_eq!(stored.due_date, Some(date!(2025 - 01 - 13)));
        assert_eq!(stored.status, TaskStatus::NotStarted);
        assert_eq!(stored.completion_history.len(), 1);
        assert_eq!(
            stored.completion_history[0].due_date,
            Some(date!(2025 - 01 - 06))
        );
        assert!(outcome.new_instance.is_none());
        assert_eq!(state.tasks.len(), 1);
    }

    #[test]
    fn template_with_live_instance_cannot_be_completed() {
        let mut state = with_instance(weekly_template(false));
        let before = state.clone();

        let err = advance_on_completion(&mut state, "tpl", datetime!(2025-01-06 10:00 UTC), None)
            .unwrap_err();
        assert_eq!(err.code(), "invalid_input");
        assert!(err.message().contains("inst-1"));
        assert_eq!(state, before);
    }

    #[test]
    fn closed_tasks_and_blank_messages_are_rejected() {
        let mut state = with_instance(weekly_template(false));
        let at = datetime!(2025-01-06 10:00 UTC);

        let blank = advance_on_completion(&mut state, "inst-1", at, Some("  ")).unwrap_err();
        assert_eq!(blank, AppError::invalid_input("message is required"));

        advance_on_completion(&mut state, "inst-1", at, None).unwrap();
        let again = advance_on_completion(&mut state, "inst-1", at, None).unwrap_err();
        assert_eq!(again, AppError::invalid_input("task already completed"));
    }

    #[test]
    fn status_change_requires_a_completion_status() {
        let mut state = with_instance(weekly_template(false));
        let at = datetime!(2025-01-06 10:00 UTC);

        let err = advance_on_status_change(&mut state, "inst-1", TaskStatus::Waiting, at, None)
            .unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        let archived =
            advance_on_status_change(&mut state, "inst-1", TaskStatus::Archived, at, None).unwrap();
        assert_eq!(archived.updated.status, TaskStatus::Archived);
        assert!(archived.new_instance.is_some());
    }

    #[test]
    fn orphaned_instance_closes_as_plain() {
        let mut state = with_instance(weekly_template(false));
        state.delete_task("tpl").unwrap();

        let outcome =
            advance_on_completion(&mut state, "inst-1", datetime!(2025-01-06 10:00 UTC), None)
                .unwrap();
        assert_eq!(outcome.updated.status, TaskStatus::Done);
        assert!(outcome.template.is_none());
        assert_eq!(state.tasks.len(), 1);
    }

    #[test]
    fn duplicate_guard_skips_existing_successor() {
        let template = weekly_template(false);
        let existing = materialize_instance(
            &template,
            date!(2025 - 01 - 13),
            "inst-2".into(),
            CREATED.into(),
        );
        let mut state = with_instance(template);
        state.create_task(existing).unwrap();

        let outcome =
            advance_on_completion(&mut state, "inst-1", datetime!(2025-01-06 10:00 UTC), None)
                .unwrap();
        assert!(outcome.new_instance.is_none());
        assert_eq!(state.tasks.len(), 3);
    }

    #[derive(Clone)]
    struct FailingCreate(TaskState);

    impl TaskStore for FailingCreate {
        fn load_task(&self, id: &str) -> Result<Option<Task>, AppError> {
            self.0.load_task(id)
        }
        fn save_task(&mut self, task: Task) -> Result<Task, AppError> {
            self.0.save_task(task)
        }
        fn create_task(&mut self, _task: Task) -> Result<Task, AppError> {
            Err(AppError::persistence("disk full"))
        }
        fn delete_task(&mut self, id: &str) -> Result<Task, AppError> {
            self.0.delete_task(id)
        }
        fn list_tasks(&self) -> Result<Vec<Task>, AppError> {
            self.0.list_tasks()
        }
    }

    #[test]
    fn failed_instance_creation_leaves_store_untouched() {
        let mut store = FailingCreate(with_instance(weekly_template(false)));
        let before = store.0.clone();

        let err =
            advance_on_completion(&mut store, "inst-1", datetime!(2025-01-06 10:00 UTC), None)
                .unwrap_err();

        assert_eq!(err, AppError::persistence("disk full"));
        assert_eq!(store.0, before);
    }

    #[test]
    fn start_series_materializes_first_instance_once() {
        let mut state = TaskState::new(vec![weekly_template(false)]);
        let at = datetime!(2025-01-02 09:00 UTC);

        let outcome = start_series(&mut state, "tpl", at).unwrap();
        let first = outcome.new_instance.unwrap();
        assert_eq!(first.due_date, Some(date!(2025 - 01 - 06)));
        assert_eq!(first.recurring_parent_id.as_deref(), Some("tpl"));
        assert!(outcome.parent_child_logic_executed);

        let again = start_series(&mut state, "tpl", at).unwrap_err();
        assert_eq!(again.code(), "invalid_input");
        assert_eq!(state.tasks.len(), 2);
    }

    #[test]
    fn start_series_past_end_date_exhausts_without_instance() {
        let template = Task::new("tpl", "stretch", CREATED)
            .due(date!(2025 - 02 - 01))
            .repeating(RecurrenceRule::daily(1).until(date!(2025 - 01 - 15)));
        let mut state = TaskState::new(vec![template]);

        let outcome = start_series(&mut state, "tpl", datetime!(2025-01-20 09:00 UTC)).unwrap();

        assert!(outcome.exhausted);
        assert!(outcome.new_instance.is_none());
        assert_eq!(outcome.updated.series_state, SeriesState::Exhausted);
        assert_eq!(state.tasks.len(), 1);
        assert!(list_instances(&state, "tpl").unwrap().is_empty());
    }

    #[test]
    fn late_completion_shifts_completion_based_monthly_series() {
        let mut rule = RecurrenceRule::monthly(1, None);
        rule.completion_based = true;
        let template = Task::new("tpl", "haircut", CREATED)
            .due(date!(2025 - 01 - 15))
            .repeating(rule);
        let instance = materialize_instance(
            &template,
            date!(2025 - 01 - 15),
            "inst-1".into(),
            CREATED.into(),
        );
        let mut state = TaskState::new(vec![template, instance]);

        let outcome =
            advance_on_completion(&mut state, "inst-1", datetime!(2025-01-20 18:00 UTC), None)
                .unwrap();

        assert_eq!(
            outcome.new_instance.unwrap().due_date,
            Some(date!(2025 - 02 - 20))
        );
    }

    #[test]
    fn skip_cancels_instance_and_creates_successor() {
        let mut state = with_instance(weekly_template(true));

        let outcome =
            skip_occurrence(&mut state, "inst-1", datetime!(2025-01-09 10:00 UTC)).unwrap();

        assert_eq!(outcome.updated.status, TaskStatus::Cancelled);
        assert!(outcome.updated.completion_history.is_empty());
        assert_eq!(
            outcome.new_instance.unwrap().due_date,
            Some(date!(2025 - 01 - 13))
        );
    }

    #[test]
    fn skip_rejects_plain_tasks() {
        let mut state = TaskState::new(vec![Task::new("plain", "x", CREATED)]);
        let err = skip_occurrence(&mut state, "plain", datetime!(2025-01-09 10:00 UTC)).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn rollover_reports_without_force_and_catches_up_with_force() {
        let mut state = with_instance(weekly_template(false));
        let before = state.clone();
        let now = datetime!(2025-01-22 08:00 UTC);

        let report = rollover_overdue(&mut state, now, false).unwrap();
        assert_eq!(report.overdue.len(), 1);
        assert_eq!(report.overdue[0].id, "inst-1");
        assert!(report.advanced.is_empty());
        assert_eq!(state, before);

        let report = rollover_overdue(&mut state, now, true).unwrap();
        assert_eq!(report.advanced.len(), 1);
        let advanced = &report.advanced[0];
        assert_eq!(advanced.updated.status, TaskStatus::Cancelled);
        assert_eq!(
            advanced.new_instance.as_ref().unwrap().due_date,
            Some(date!(2025 - 01 - 27))
        );
        assert!(overdue_occurrences(&state, now.date()).unwrap().is_empty());
    }

    #[test]
    fn rollover_never_advances_completion_based_series_on_its_own() {
        let mut state = with_instance(weekly_template(true));
        let before = state.clone();
        let now = datetime!(2025-01-22 08:00 UTC);

        let report = rollover_overdue(&mut state, now, false).unwrap();
        assert_eq!(report.overdue.len(), 1);
        assert!(report.advanced.is_empty());
        assert_eq!(state, before);

        let report = rollover_overdue(&mut state, now, true).unwrap();
        assert_eq!(
            report.advanced[0].new_instance.as_ref().unwrap().due_date,
            Some(date!(2025 - 01 - 27))
        );
    }

    #[test]
    fn rollover_moves_template_in_place() {
        let mut state = TaskState::new(vec![weekly_template(false)]);
        let report = rollover_overdue(&mut state, datetime!(2025-01-20 08:00 UTC), true).unwrap();

        assert_eq!(report.advanced.len(), 1);
        let stored = state.load_task("tpl").unwrap().unwrap();
        assert_eq!(stored.due_date, Some(date!(2025 - 01 - 20)));
        assert!(stored.completion_history.is_empty());
    }
}

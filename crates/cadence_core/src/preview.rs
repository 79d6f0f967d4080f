use crate::error::AppError;
use crate::occurrence::next_n_occurrences;
use crate::series::{TaskRole, current_due, list_instances, resolve_template, role};
use crate::storage::{TaskStore, require_task};
use time::Date;
use tracing::debug;

/// Upcoming occurrence dates for the series `task_id` belongs to. Read-only.
///
/// Plain tasks preview as an empty list; an instance whose template cannot
/// be resolved is an error.
pub fn preview_next<S: TaskStore + ?Sized>(
    store: &S,
    task_id: &str,
    count: usize,
    start_from: Option<Date>,
    today: Date,
) -> Result<Vec<Date>, AppError> {
    let task = require_task(store, task_id)?;
    if role(&task) == TaskRole::Plain || count == 0 {
        return Ok(Vec::new());
    }

    let template = resolve_template(store, &task)?;
    let Some(rule) = template.active_rule() else {
        return Ok(Vec::new());
    };
    let instances = list_instances(store, &template.id)?;
    let anchor = current_due(&template, &instances).unwrap_or(today);

    let dates = next_n_occurrences(rule, anchor, count, start_from, today);
    debug!(template = %template.id, %anchor, count = dates.len(), "previewed occurrences");
    Ok(dates)
}

#[cfg(test)]
mod tests {
    use super::preview_next;
    use crate::model::{RecurrenceRule, Task};
    use crate::series::materialize_instance;
    use crate::storage::{TaskState, TaskStore};
    use time::macros::date;

    const CREATED: &str = "2025-01-01T00:00:00Z";

    fn monthly_state() -> TaskState {
        let template = Task::new("tpl", "rent", CREATED)
            .due(date!(2025 - 01 - 31))
            .repeating(RecurrenceRule::monthly(1, Some(31)).until(date!(2025 - 05 - 31)));
        TaskState::new(vec![template, Task::new("plain", "call", CREATED)])
    }

    #[test]
    fn previews_forward_from_current_due() {
        let state = monthly_state();
        let dates = preview_next(&state, "tpl", 3, None, date!(2025 - 01 - 10)).unwrap();
        assert_eq!(
            dates,
            vec![date!(2025 - 02 - 28), date!(2025 - 03 - 31), date!(2025 - 04 - 30)]
        );
    }

    #[test]
    fn preview_stops_at_end_date() {
        let state = monthly_state();
        let dates = preview_next(&state, "tpl", 10, None, date!(2025 - 01 - 10)).unwrap();
        assert_eq!(dates.len(), 4);
        assert_eq!(dates.last(), Some(&date!(2025 - 05 - 31)));
    }

    #[test]
    fn preview_is_idempotent() {
        let state = monthly_state();
        let today = date!(2025 - 01 - 10);
        let first = preview_next(&state, "tpl", 4, None, today).unwrap();
        let second = preview_next(&state, "tpl", 4, None, today).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn stale_due_date_walks_forward_from_anchor() {
        let state = monthly_state();
        let dates = preview_next(&state, "tpl", 2, None, date!(2025 - 03 - 15)).unwrap();
        assert_eq!(dates, vec![date!(2025 - 03 - 31), date!(2025 - 04 - 30)]);
    }

    #[test]
    fn stale_weekly_series_keeps_its_weekday() {
        let template = Task::new("gym", "gym", CREATED)
            .due(date!(2025 - 01 - 06))
            .repeating(RecurrenceRule::weekly(1, []));
        let state = TaskState::new(vec![template]);

        let dates = preview_next(&state, "gym", 3, None, date!(2025 - 01 - 10)).unwrap();
        assert_eq!(
            dates,
            vec![date!(2025 - 01 - 13), date!(2025 - 01 - 20), date!(2025 - 01 - 27)]
        );
        assert!(dates.iter().all(|date| date.weekday() == time::Weekday::Monday));
    }

    #[test]
    fn explicit_start_overrides_anchor() {
        let state = monthly_state();
        let dates =
            preview_next(&state, "tpl", 1, Some(date!(2025 - 02 - 28)), date!(2025 - 01 - 10))
                .unwrap();
        assert_eq!(dates, vec![date!(2025 - 03 - 31)]);
    }

    #[test]
    fn instances_preview_their_series() {
        let mut state = monthly_state();
        let template = state.load_task("tpl").unwrap().unwrap();
        state
            .create_task(materialize_instance(
                &template,
                date!(2025 - 02 - 28),
                "inst".into(),
                CREATED.into(),
            ))
            .unwrap();

        let dates = preview_next(&state, "inst", 1, None, date!(2025 - 01 - 10)).unwrap();
        assert_eq!(dates, vec![date!(2025 - 03 - 31)]);
    }

    #[test]
    fn plain_tasks_preview_empty_and_orphans_error() {
        let mut state = monthly_state();
        assert!(preview_next(&state, "plain", 5, None, date!(2025 - 01 - 10)).unwrap().is_empty());

        let template = state.load_task("tpl").unwrap().unwrap();
        state
            .create_task(materialize_instance(
                &template,
                date!(2025 - 02 - 28),
                "inst".into(),
                CREATED.into(),
            ))
            .unwrap();
        state.delete_task("tpl").unwrap();

        let err = preview_next(&state, "inst", 5, None, date!(2025 - 01 - 10)).unwrap_err();
        assert_eq!(err.code(), "ambiguous_parent");
    }
}
